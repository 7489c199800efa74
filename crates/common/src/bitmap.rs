//! `Cpuset`: an owned, never-null set of processing-unit indices.
//!
//! This is the pure data type described as "Bitmap" in spec.md section 3.
//! It knows nothing about hwloc or the OS; `nodescope_hwloc` is the layer
//! that turns a `Cpuset` into something the kernel understands and back.

use std::collections::BTreeSet;
use std::fmt;

use crate::error::{Error, Result};

/// A set of nonnegative processing-unit indices.
///
/// Never null: an empty set is represented by an empty `BTreeSet`, which is
/// distinguishable from "no cpuset at all" (callers model the latter with
/// `Option<Cpuset>`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cpuset {
    pus: BTreeSet<u32>,
}

impl Cpuset {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_pus(pus: impl IntoIterator<Item = u32>) -> Self {
        Self { pus: pus.into_iter().collect() }
    }

    pub fn is_empty(&self) -> bool {
        self.pus.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pus.len()
    }

    pub fn contains(&self, pu: u32) -> bool {
        self.pus.contains(&pu)
    }

    pub fn insert(&mut self, pu: u32) {
        self.pus.insert(pu);
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.pus.iter().copied()
    }

    /// Union of `self` and `other`, as a new set.
    pub fn union(&self, other: &Cpuset) -> Cpuset {
        Cpuset { pus: self.pus.union(&other.pus).copied().collect() }
    }

    /// `self` with every PU also in `other` removed.
    pub fn and_not(&self, other: &Cpuset) -> Cpuset {
        Cpuset { pus: self.pus.difference(&other.pus).copied().collect() }
    }

    pub fn intersects(&self, other: &Cpuset) -> bool {
        self.pus.intersection(&other.pus).next().is_some()
    }

    /// Keeps the first PU of each group in `cores` that intersects `self`,
    /// dropping the rest — the SMT-disable transform of spec.md section 3.
    /// `cores` is the list of per-core cpusets from the topology oracle.
    pub fn disable_smt(&self, cores: &[Cpuset]) -> Cpuset {
        let mut keep = BTreeSet::new();
        for core in cores {
            if let Some(first) = core.pus.intersection(&self.pus).min() {
                keep.insert(*first);
            }
        }
        Cpuset { pus: keep }
    }

    /// Renders in hwloc-style list form: `"0-3,8"`, or `""` for an empty set.
    pub fn to_list_string(&self) -> String {
        if self.pus.is_empty() {
            return String::new();
        }
        let mut parts = Vec::new();
        let mut iter = self.pus.iter().copied().peekable();
        while let Some(start) = iter.next() {
            let mut end = start;
            while let Some(&next) = iter.peek() {
                if next == end + 1 {
                    end = next;
                    iter.next();
                } else {
                    break;
                }
            }
            if start == end {
                parts.push(format!("{start}"));
            } else {
                parts.push(format!("{start}-{end}"));
            }
        }
        parts.join(",")
    }

    /// Parses the list form produced by [`Cpuset::to_list_string`]. The
    /// empty string denotes the empty (not absent) set.
    pub fn parse_list_string(s: &str) -> Result<Cpuset> {
        let mut pus = BTreeSet::new();
        let s = s.trim();
        if s.is_empty() {
            return Ok(Cpuset { pus });
        }
        for chunk in s.split(',') {
            let chunk = chunk.trim();
            if let Some((lo, hi)) = chunk.split_once('-') {
                let lo: u32 = lo.trim().parse().map_err(|_| {
                    Error::invalid_arg(format!("malformed cpuset range: {chunk}"))
                })?;
                let hi: u32 = hi.trim().parse().map_err(|_| {
                    Error::invalid_arg(format!("malformed cpuset range: {chunk}"))
                })?;
                if lo > hi {
                    return Err(Error::invalid_arg(format!("inverted cpuset range: {chunk}")));
                }
                pus.extend(lo..=hi);
            } else {
                let v: u32 = chunk
                    .parse()
                    .map_err(|_| Error::invalid_arg(format!("malformed cpuset entry: {chunk}")))?;
                pus.insert(v);
            }
        }
        Ok(Cpuset { pus })
    }

    /// Renders as a hex mask, most-significant word first, e.g. `"0x0000000f"`.
    pub fn to_hex_string(&self) -> String {
        let nbits = self.pus.iter().max().map(|m| m + 1).unwrap_or(0) as usize;
        let nwords = nbits.div_ceil(32).max(1);
        let mut words = vec![0u32; nwords];
        for &pu in &self.pus {
            let word = pu as usize / 32;
            let bit = pu % 32;
            words[word] |= 1 << bit;
        }
        let mut out = String::from("0x");
        for word in words.iter().rev() {
            out.push_str(&format!("{word:08x}"));
        }
        out
    }

    pub fn parse_hex_string(s: &str) -> Result<Cpuset> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        if s.is_empty() {
            return Ok(Cpuset::empty());
        }
        // Chunk from the right in 8-hex-digit (32-bit) words, most significant first.
        let chars: Vec<char> = s.chars().collect();
        let mut pus = BTreeSet::new();
        let mut word_index = 0usize;
        let mut pos = chars.len();
        while pos > 0 {
            let start = pos.saturating_sub(8);
            let word_str: String = chars[start..pos].iter().collect();
            let word = u32::from_str_radix(&word_str, 16)
                .map_err(|_| Error::invalid_arg(format!("malformed cpuset hex: {s}")))?;
            for bit in 0..32 {
                if word & (1 << bit) != 0 {
                    pus.insert((word_index * 32 + bit) as u32);
                }
            }
            pos = start;
            word_index += 1;
        }
        Ok(Cpuset { pus })
    }
}

impl fmt::Display for Cpuset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_list_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_format_round_trips() {
        for raw in ["", "0", "0-3,8", "1,3,5-7,20"] {
            let cs = Cpuset::parse_list_string(raw).unwrap();
            let back = Cpuset::parse_list_string(&cs.to_list_string()).unwrap();
            assert_eq!(cs, back, "round-trip failed for {raw:?}");
        }
    }

    #[test]
    fn hex_format_round_trips() {
        let cs = Cpuset::parse_list_string("0-3,8,40").unwrap();
        let hex = cs.to_hex_string();
        let back = Cpuset::parse_hex_string(&hex).unwrap();
        assert_eq!(cs, back);
    }

    #[test]
    fn empty_set_is_distinguishable() {
        let empty = Cpuset::empty();
        assert!(empty.is_empty());
        assert_eq!(empty.to_list_string(), "");
        assert_eq!(Cpuset::parse_list_string("").unwrap(), empty);
    }

    #[test]
    fn union_and_and_not() {
        let a = Cpuset::parse_list_string("0-3").unwrap();
        let b = Cpuset::parse_list_string("2-5").unwrap();
        assert_eq!(a.union(&b), Cpuset::parse_list_string("0-5").unwrap());
        assert_eq!(a.and_not(&b), Cpuset::parse_list_string("0-1").unwrap());
    }

    #[test]
    fn disable_smt_keeps_one_pu_per_core() {
        let cores = vec![
            Cpuset::parse_list_string("0,1").unwrap(),
            Cpuset::parse_list_string("2,3").unwrap(),
        ];
        let cs = Cpuset::parse_list_string("0-3").unwrap();
        assert_eq!(cs.disable_smt(&cores), Cpuset::parse_list_string("0,2").unwrap());
    }
}
