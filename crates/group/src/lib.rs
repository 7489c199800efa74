//! Group abstraction (C6), its four backends, and collective primitives
//! (C7).
//!
//! A [`Group`] is an opaque, reference-counted handle exposing size, rank,
//! member PIDs, a barrier, and byte-level gather/scatter to a named root.
//! Every backend implements [`Group`] identically from the caller's point of
//! view; what differs is how `split` and the collectives are realized.

mod collective;
#[cfg(feature = "mpi")]
mod mpi_group;
mod openmp;
mod pthread;
mod single;
mod subgroup;

pub use collective::{bcast_value, gather_hwpools, gather_values, scatter_hwpools, scatter_values};
#[cfg(feature = "mpi")]
pub use mpi_group::MpiGroup;
pub use openmp::OpenmpGroup;
pub use pthread::PthreadGroup;
pub use single::SingleProcessGroup;
pub use subgroup::SubgroupDescriptor;

use nodescope_common::{IntrinsicScope, Result, ScopeCreateHints};

/// The interface every group backend implements.
///
/// Groups are reference-counted (`Clone` is cheap — an `Arc`-like share of
/// the backend's context) so a derived group can share state (notably the
/// pthread backend's shared context) with its parent.
pub trait Group: Clone + Send + Sync {
    fn size(&self) -> usize;
    fn rank(&self) -> usize;
    /// PIDs of every member, in rank order. Host-group PIDs only — this
    /// says nothing about which NUMA node or container each member runs in.
    fn pids(&self) -> Vec<libc::pid_t>;
    fn barrier(&self) -> Result<()>;
    /// Splits the group by MPI-style `(color, key)`. `color` determines
    /// which child group a member lands in; `key` orders members within it.
    fn split(&self, color: i32, key: i32) -> Result<Self>
    where
        Self: Sized;
    /// A singleton group containing only the caller.
    fn self_group(&self) -> Result<Self>
    where
        Self: Sized;
    /// Derives one of the intrinsic, parent-less scopes: `System`, `User`
    /// and `Job` all resolve to the node-local group this backend is
    /// already rooted in; `Process` resolves to [`Group::self_group`].
    /// `flags` is reserved and currently always empty.
    fn make_intrinsic(&self, iscope: IntrinsicScope, flags: ScopeCreateHints) -> Result<Self>
    where
        Self: Sized;
    /// Gathers one byte buffer per member to `root`; `None` everywhere else.
    fn gather_bbuff(&self, tx: &[u8], root: usize) -> Result<Option<Vec<Vec<u8>>>>;
    /// Scatters one byte buffer per member from `root`, a slice of length
    /// `size()` there and ignored elsewhere; returns this member's share.
    fn scatter_bbuff(&self, tx: Option<&[Vec<u8>]>, root: usize) -> Result<Vec<u8>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_process_group_is_trivially_itself() {
        let g = SingleProcessGroup::new();
        assert_eq!(g.size(), 1);
        assert_eq!(g.rank(), 0);
        g.barrier().unwrap();
    }
}
