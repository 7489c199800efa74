//! Collective primitives (C7) built on top of [`Group::gather_bbuff`] /
//! [`Group::scatter_bbuff`], so every backend gets them for free.

use nodescope_common::wire::{ByteBuffer, ByteReader};
use nodescope_common::{Error, Result, Rc};

use crate::Group;

/// Broadcasts a single `i32` (e.g. a return code) from `root` to everyone.
/// Implemented as a gather-to-root-then-scatter pair, matching the
/// "broadcast the failure code before scattering" discipline the splitter
/// relies on.
pub fn bcast_value<G: Group>(group: &G, value: i32, root: usize) -> Result<i32> {
    let mut buf = ByteBuffer::new();
    buf.put_i32(value);
    let gathered = group.gather_bbuff(&buf.into_vec(), root)?;
    let to_scatter = gathered.map(|bufs| {
        let winner = bufs[root].clone();
        vec![winner; group.size()]
    });
    let mine = group.scatter_bbuff(to_scatter.as_deref(), root)?;
    let mut r = ByteReader::new(&mine);
    r.get_i32()
}

/// Gathers one `i32` per member to `root`; `None` elsewhere.
pub fn gather_values<G: Group>(group: &G, value: i32, root: usize) -> Result<Option<Vec<i32>>> {
    let mut buf = ByteBuffer::new();
    buf.put_i32(value);
    let gathered = group.gather_bbuff(&buf.into_vec(), root)?;
    gathered
        .map(|bufs| {
            bufs.into_iter()
                .map(|b| ByteReader::new(&b).get_i32())
                .collect::<Result<Vec<i32>>>()
        })
        .transpose()
}

/// Scatters one `i32` per member from `root`.
pub fn scatter_values<G: Group>(group: &G, values: Option<&[i32]>, root: usize) -> Result<i32> {
    let to_scatter = values.map(|vs| {
        vs.iter()
            .map(|v| {
                let mut b = ByteBuffer::new();
                b.put_i32(*v);
                b.into_vec()
            })
            .collect::<Vec<_>>()
    });
    let mine = group.scatter_bbuff(to_scatter.as_deref(), root)?;
    ByteReader::new(&mine).get_i32()
}

/// Gathers length-prefixed opaque hardware-pool blobs (already serialized by
/// the caller) to `root`.
pub fn gather_hwpools<G: Group>(
    group: &G,
    serialized_pool: &[u8],
    root: usize,
) -> Result<Option<Vec<Vec<u8>>>> {
    group.gather_bbuff(serialized_pool, root)
}

/// Scatters one serialized hardware-pool blob per member from `root`.
pub fn scatter_hwpools<G: Group>(
    group: &G,
    serialized_pools: Option<&[Vec<u8>]>,
    root: usize,
) -> Result<Vec<u8>> {
    let mine = group.scatter_bbuff(serialized_pools, root)?;
    if mine.is_empty() {
        return Err(Error::new(Rc::ErrInternal, "scatter_hwpools: empty payload"));
    }
    Ok(mine)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SingleProcessGroup;

    #[test]
    fn bcast_value_round_trips_on_single_process() {
        let g = SingleProcessGroup::new();
        assert_eq!(bcast_value(&g, 42, 0).unwrap(), 42);
    }

    #[test]
    fn gather_and_scatter_values_round_trip() {
        let g = SingleProcessGroup::new();
        let gathered = gather_values(&g, 7, 0).unwrap().unwrap();
        assert_eq!(gathered, vec![7]);
        let scattered = scatter_values(&g, Some(&[9]), 0).unwrap();
        assert_eq!(scattered, 9);
    }
}
