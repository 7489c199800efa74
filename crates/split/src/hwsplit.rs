//! The splitting engine (C8): turns a parent hardware pool, a set of
//! per-member colors and affinities, into a per-member child pool plus a
//! non-negative color each member can feed into `group.split`.

use std::collections::BTreeSet;

use nodescope_common::{Cpuset, Device, Error, ObjType, Result};
use nodescope_hwloc::{HwPool, Oracle};

use crate::map::{self, ResourceMap};

/// Sentinel colors a member may request instead of a real, non-negative
/// user color.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoColor {
    Undefined,
    AffinityPreserving,
    Packed,
    Spread,
}

impl AutoColor {
    fn from_i32(v: i32) -> Option<Self> {
        match v {
            -1 => Some(AutoColor::Undefined),
            -2 => Some(AutoColor::AffinityPreserving),
            -3 => Some(AutoColor::Packed),
            -4 => Some(AutoColor::Spread),
            _ => None,
        }
    }
}

/// One member's contribution to a collective split.
#[derive(Debug, Clone)]
pub struct SplitMember {
    pub color: i32,
    pub affinity: Cpuset,
}

/// The outcome of a split for one member.
#[derive(Debug, Clone)]
pub struct SplitResult {
    pub pool: HwPool,
    pub color: i32,
}

enum ColorClass {
    UserDefined,
    Automatic(AutoColor),
}

fn classify_colors(members: &[SplitMember]) -> Result<ColorClass> {
    let mut sorted: Vec<i32> = members.iter().map(|m| m.color).collect();
    sorted.sort_unstable();

    let all_nonneg = sorted.iter().all(|&c| c >= 0);
    let all_neg = sorted.iter().all(|&c| c < 0);

    if all_nonneg {
        Ok(ColorClass::UserDefined)
    } else if all_neg {
        let first = sorted[0];
        if sorted.iter().any(|&c| c != first) {
            return Err(Error::invalid_arg(
                "automatic split colors must all be the same sentinel",
            ));
        }
        let auto = AutoColor::from_i32(first)
            .ok_or_else(|| Error::invalid_arg("unrecognized automatic split color"))?;
        Ok(ColorClass::Automatic(auto))
    } else {
        Err(Error::invalid_arg("split colors mix positive and negative values"))
    }
}

/// Builds the list of "primary cpusets" members are distributed across:
/// `npieces` equal chunks of the parent cpuset when `split_at` is a host
/// type (or the `Last` sentinel), or the affinities of each parent device of
/// `split_at` when it names a device type.
fn primary_cpusets(
    oracle: &Oracle,
    parent: &HwPool,
    npieces: usize,
    split_at: ObjType,
) -> Result<Vec<Cpuset>> {
    if split_at.is_device() {
        Ok(parent
            .devices_of_type(split_at)
            .map(|d| d.affinity.clone())
            .collect())
    } else {
        (0..npieces)
            .map(|i| oracle.split_cpuset_by_chunk_id(parent.cpuset(), npieces, i))
            .collect()
    }
}

fn empty_children(oracle: &Oracle, ncolors: usize) -> Vec<HwPool> {
    (0..ncolors)
        .map(|_| HwPool::initialize(oracle, Cpuset::empty()).expect("empty-cpuset initialize never fails"))
        .collect()
}

fn device_types_present(parent: &HwPool) -> BTreeSet<ObjType> {
    parent.devices().iter().map(|d| d.obj_type).collect()
}

/// Round-robins the parent's devices across `ncolors` children, resetting
/// the counter for every device type so a type's devices spread evenly
/// across children independent of what other types have already placed.
/// Deliberately affinity-blind, by design.
fn redistribute_devices(oracle: &Oracle, parent: &HwPool, ncolors: usize) -> Vec<HwPool> {
    let mut children = empty_children(oracle, ncolors);
    for t in device_types_present(parent) {
        for (i, dev) in parent.devices_of_type(t).enumerate() {
            children[i % ncolors].add_device(dev.clone());
        }
    }
    children
}

/// Places the parent's devices, per type, the same affinity-preserving way
/// [`map::map_affinity_preserving`] places members: onto the `cpusets`
/// entry (color) whose affinity they intersect, falling back to the
/// member-redistribution's own fallback policy for devices that intersect
/// none or all of them.
fn redistribute_devices_affinity_preserving(
    oracle: &Oracle,
    parent: &HwPool,
    cpusets: &[Cpuset],
    fallback: map::FallbackMapper,
) -> Vec<HwPool> {
    let mut children = empty_children(oracle, cpusets.len());
    for t in device_types_present(parent) {
        let devs: Vec<&Device> = parent.devices_of_type(t).collect();
        let device_affinities: Vec<Cpuset> = devs.iter().map(|d| d.affinity.clone()).collect();
        let mut map = ResourceMap::new();
        map::map_affinity_preserving(&mut map, fallback, &device_affinities, cpusets);
        for (i, dev) in devs.into_iter().enumerate() {
            if let Some(rid) = map.get(i) {
                children[rid].add_device(dev.clone());
            }
        }
    }
    children
}

fn build_child_pools(
    oracle: &Oracle,
    cpusets: &[Cpuset],
    map: &ResourceMap,
    nmembers: usize,
) -> Result<Vec<HwPool>> {
    let mut out = Vec::with_capacity(nmembers);
    for fid in 0..nmembers {
        let rid = map
            .get(fid)
            .ok_or_else(|| Error::internal("split: member left unmapped"))?;
        out.push(HwPool::initialize(oracle, cpusets[rid].clone())?);
    }
    Ok(out)
}

/// The splitting engine's single entry point: `split_at = ObjType::Last`
/// means "split evenly, unanchored"; any other type anchors the split on
/// that object type's instances.
pub fn split(
    oracle: &Oracle,
    parent: &HwPool,
    npieces: usize,
    split_at: ObjType,
    members: &[SplitMember],
) -> Result<Vec<SplitResult>> {
    if npieces == 0 {
        return Err(Error::internal("split called with npieces=0"));
    }
    let nmembers = members.len();
    let class = classify_colors(members)?;
    let devices_affinity_preserving = matches!(
        class,
        ColorClass::Automatic(AutoColor::Undefined) | ColorClass::Automatic(AutoColor::AffinityPreserving)
    );
    let device_fallback: map::FallbackMapper = if split_at == ObjType::Last {
        |m, n, r| map::map_packed(m, n, r)
    } else {
        |m, n, r| map::map_spread(m, n, r)
    };

    let mut map = ResourceMap::new();
    let (cpusets, ncolors) = match class {
        ColorClass::UserDefined => {
            let cpusets = (0..npieces)
                .map(|i| oracle.split_cpuset_by_chunk_id(parent.cpuset(), npieces, i))
                .collect::<Result<Vec<_>>>()?;
            let colors: Vec<i32> = members.iter().map(|m| m.color).collect();
            map::map_colors(&mut map, &colors, cpusets.len());
            let ncolors = map.flatten().iter().collect::<std::collections::BTreeSet<_>>().len();
            (cpusets, ncolors.max(1))
        }
        ColorClass::Automatic(AutoColor::Packed) => {
            let cpusets = primary_cpusets(oracle, parent, npieces, split_at)?;
            map::map_packed(&mut map, nmembers, cpusets.len());
            (cpusets.clone(), cpusets.len())
        }
        ColorClass::Automatic(AutoColor::Spread) => {
            let cpusets = primary_cpusets(oracle, parent, npieces, split_at)?;
            map::map_spread(&mut map, nmembers, cpusets.len());
            (cpusets.clone(), cpusets.len())
        }
        ColorClass::Automatic(AutoColor::Undefined) | ColorClass::Automatic(AutoColor::AffinityPreserving) => {
            let cpusets = primary_cpusets(oracle, parent, npieces, split_at)?;
            let affinities: Vec<Cpuset> = members.iter().map(|m| m.affinity.clone()).collect();
            map::map_affinity_preserving(&mut map, device_fallback, &affinities, &cpusets);
            (cpusets.clone(), cpusets.len())
        }
    };

    if cpusets.is_empty() {
        return Err(Error::split("split produced no resources to map members onto"));
    }

    let children_pools = build_child_pools(oracle, &cpusets, &map, nmembers)?;
    let device_children = if devices_affinity_preserving {
        redistribute_devices_affinity_preserving(oracle, parent, &cpusets, device_fallback)
    } else {
        redistribute_devices(oracle, parent, ncolors)
    };

    let flat = map.flatten();
    let mut results = Vec::with_capacity(nmembers);
    for (fid, mut pool) in children_pools.into_iter().enumerate() {
        let rid = flat[fid];
        if let Some(dev_pool) = device_children.get(rid) {
            for dev in dev_pool.devices() {
                pool.add_device(dev.clone());
            }
        }
        results.push(SplitResult { pool, color: rid as i32 });
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_rejects_mixed_sign_colors() {
        let members = vec![
            SplitMember { color: 0, affinity: Cpuset::empty() },
            SplitMember { color: -1, affinity: Cpuset::empty() },
        ];
        assert!(classify_colors(&members).is_err());
    }

    #[test]
    fn classify_rejects_distinct_negative_sentinels() {
        let members = vec![
            SplitMember { color: -1, affinity: Cpuset::empty() },
            SplitMember { color: -2, affinity: Cpuset::empty() },
        ];
        assert!(classify_colors(&members).is_err());
    }

    #[test]
    fn classify_accepts_uniform_user_defined_colors() {
        let members = vec![
            SplitMember { color: 3, affinity: Cpuset::empty() },
            SplitMember { color: 0, affinity: Cpuset::empty() },
        ];
        assert!(matches!(classify_colors(&members).unwrap(), ColorClass::UserDefined));
    }

    fn gpu(pci: &str, affinity: Cpuset) -> Device {
        Device::new(ObjType::Gpu, affinity, pci, pci)
    }

    #[test]
    fn device_types_present_is_empty_for_a_device_free_pool() {
        let oracle = Oracle::load().expect("oracle should load");
        let pool = HwPool::initialize(&oracle, Cpuset::empty()).unwrap();
        assert!(device_types_present(&pool).is_empty());
    }

    #[test]
    fn device_types_present_collects_every_distinct_type() {
        let oracle = Oracle::load().expect("oracle should load");
        let cs = Cpuset::empty();
        let mut pool = HwPool::initialize(&oracle, cs.clone()).unwrap();
        pool.add_device(gpu("0000:01:00.0", cs.clone()));
        pool.add_device(gpu("0000:02:00.0", cs));
        assert_eq!(device_types_present(&pool), BTreeSet::from([ObjType::Gpu]));
    }

    #[test]
    fn redistribute_devices_resets_round_robin_per_type() {
        let oracle = Oracle::load().expect("oracle should load");
        let cs = Cpuset::empty();
        let mut pool = HwPool::initialize(&oracle, cs.clone()).unwrap();
        for i in 0..4 {
            pool.add_device(gpu(&format!("0000:0{i}:00.0"), cs.clone()));
        }
        let children = redistribute_devices(&oracle, &pool, 2);
        assert_eq!(children[0].devices().len(), 2);
        assert_eq!(children[1].devices().len(), 2);
    }
}
