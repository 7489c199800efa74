//! Pthread-backed group: one process, many threads, no native MPI-style
//! communicator to lean on — so `split` and the collectives are built out of
//! a shared context, a handful of mutex-guarded slots, and barriers.

use std::collections::HashMap;
use std::sync::{Arc, Barrier, Mutex};

use nodescope_common::{Error, IntrinsicScope, Result, ScopeCreateHints};

use crate::subgroup::{resolve_split, SubgroupDescriptor};
use crate::Group;

struct PthreadContext {
    nthreads: usize,
    barrier: Barrier,
    split_descriptors: Mutex<Vec<SubgroupDescriptor>>,
    child_groups: Mutex<HashMap<i32, Arc<PthreadContext>>>,
    gather_slots: Mutex<Vec<Option<Vec<u8>>>>,
    scatter_slot: Mutex<Option<Vec<Vec<u8>>>>,
}

impl PthreadContext {
    fn new(nthreads: usize) -> Self {
        Self {
            nthreads,
            barrier: Barrier::new(nthreads.max(1)),
            split_descriptors: Mutex::new(vec![SubgroupDescriptor::new(0, 0, 0); nthreads]),
            child_groups: Mutex::new(HashMap::new()),
            gather_slots: Mutex::new(vec![None; nthreads]),
            scatter_slot: Mutex::new(None),
        }
    }
}

/// A group backed by a team of threads within this process.
///
/// Every thread in the team holds a `PthreadGroup` pointing at the same
/// shared `Arc<PthreadContext>`; ranks are assigned by the caller at team
/// creation (the position in the spawn order), matching the TID-registration
/// rank assignment of the original backend in spirit, simplified since Rust
/// callers already know their thread's position when they spawn it.
#[derive(Clone)]
pub struct PthreadGroup {
    ctx: Arc<PthreadContext>,
    rank: usize,
}

impl PthreadGroup {
    /// Builds a fresh team of `nthreads` members; call this once from the
    /// spawning thread and hand one clone (with the appropriate `rank`,
    /// `0..nthreads`) to each worker.
    pub fn new_team(nthreads: usize) -> Vec<PthreadGroup> {
        let ctx = Arc::new(PthreadContext::new(nthreads));
        (0..nthreads).map(|rank| PthreadGroup { ctx: ctx.clone(), rank }).collect()
    }
}

impl Group for PthreadGroup {
    fn size(&self) -> usize {
        self.ctx.nthreads
    }

    fn rank(&self) -> usize {
        self.rank
    }

    fn pids(&self) -> Vec<libc::pid_t> {
        vec![unsafe { libc::getpid() }; self.ctx.nthreads]
    }

    fn barrier(&self) -> Result<()> {
        self.ctx.barrier.wait();
        Ok(())
    }

    fn split(&self, color: i32, key: i32) -> Result<Self> {
        {
            let mut descs = self.ctx.split_descriptors.lock().unwrap();
            descs[self.rank] = SubgroupDescriptor::new(color, key, self.rank as i32);
        }
        self.barrier()?;

        let resolved = resolve_split(&self.ctx.split_descriptors.lock().unwrap());
        let (new_color, new_size, new_rank) = resolved[self.rank];

        if self.rank == 0 {
            let mut distinct: Vec<i32> = resolved.iter().map(|(c, _, _)| *c).collect();
            distinct.sort_unstable();
            distinct.dedup();
            let mut map = self.ctx.child_groups.lock().unwrap();
            map.clear();
            for c in distinct {
                let size_for_color = resolved.iter().filter(|(cc, _, _)| *cc == c).count();
                map.insert(c, Arc::new(PthreadContext::new(size_for_color)));
            }
        }
        self.barrier()?;

        let child_ctx = {
            let map = self.ctx.child_groups.lock().unwrap();
            map.get(&new_color)
                .cloned()
                .ok_or_else(|| Error::internal("pthread split: child context missing after barrier"))?
        };
        self.barrier()?;

        let _ = new_size;
        Ok(PthreadGroup { ctx: child_ctx, rank: new_rank })
    }

    fn self_group(&self) -> Result<Self> {
        Ok(PthreadGroup { ctx: Arc::new(PthreadContext::new(1)), rank: 0 })
    }

    fn make_intrinsic(&self, iscope: IntrinsicScope, _flags: ScopeCreateHints) -> Result<Self> {
        match iscope {
            IntrinsicScope::System | IntrinsicScope::User | IntrinsicScope::Job => Ok(self.clone()),
            IntrinsicScope::Process => self.self_group(),
        }
    }

    fn gather_bbuff(&self, tx: &[u8], root: usize) -> Result<Option<Vec<Vec<u8>>>> {
        {
            let mut slots = self.ctx.gather_slots.lock().unwrap();
            slots[self.rank] = Some(tx.to_vec());
        }
        self.barrier()?;
        let result = if self.rank == root {
            let slots = self.ctx.gather_slots.lock().unwrap();
            Some(slots.iter().cloned().map(|s| s.unwrap_or_default()).collect())
        } else {
            None
        };
        self.barrier()?;
        Ok(result)
    }

    fn scatter_bbuff(&self, tx: Option<&[Vec<u8>]>, root: usize) -> Result<Vec<u8>> {
        if self.rank == root {
            let bufs = tx.ok_or_else(|| Error::invalid_arg("scatter root must supply buffers"))?;
            *self.ctx.scatter_slot.lock().unwrap() = Some(bufs.to_vec());
        }
        self.barrier()?;
        let mine = {
            let slot = self.ctx.scatter_slot.lock().unwrap();
            let bufs = slot
                .as_ref()
                .ok_or_else(|| Error::internal("pthread scatter: no data published"))?;
            bufs.get(self.rank)
                .cloned()
                .ok_or_else(|| Error::internal("pthread scatter: missing buffer for rank"))?
        };
        self.barrier()?;
        Ok(mine)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn split_partitions_team_by_color() {
        let team = PthreadGroup::new_team(4);
        let handles: Vec<_> = team
            .into_iter()
            .map(|g| {
                thread::spawn(move || {
                    let color = (g.rank() % 2) as i32;
                    let child = g.split(color, g.rank() as i32).unwrap();
                    (g.rank(), color, child.size(), child.rank())
                })
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for (_, _, size, _) in &results {
            assert_eq!(*size, 2);
        }
    }

    #[test]
    fn gather_collects_every_member_at_root() {
        let team = PthreadGroup::new_team(3);
        let handles: Vec<_> = team
            .into_iter()
            .map(|g| {
                thread::spawn(move || g.gather_bbuff(&[g.rank() as u8], 0).unwrap())
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let at_root: Vec<_> = results.into_iter().flatten().collect();
        assert_eq!(at_root.len(), 1);
        assert_eq!(at_root[0], vec![vec![0], vec![1], vec![2]]);
    }
}
