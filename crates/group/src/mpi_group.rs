//! MPI-backed group: thin wrapper around an `rsmpi` communicator.
//!
//! Size and rank are the communicator's own; `pids()` is an `Allgather` of
//! `getpid()`; `barrier()` uses a busy-poll on the nonblocking barrier so a
//! waiting rank doesn't spin a core at full tilt; `split` is MPI's own
//! communicator split.

use std::thread;
use std::time::Duration;

use mpi::topology::{Color, Communicator, SimpleCommunicator, SystemCommunicator};
use mpi::traits::*;

use nodescope_common::{Error, IntrinsicScope, Result, ScopeCreateHints};

use crate::Group;

/// The two shapes an MPI communicator takes in this backend: the world
/// communicator `nodescoped` clients attach with, and every communicator
/// produced by a subsequent `split`.
#[derive(Clone)]
enum Comm {
    World(SystemCommunicator),
    Split(SimpleCommunicator),
}

impl Comm {
    fn size(&self) -> usize {
        (match self {
            Comm::World(c) => c.size(),
            Comm::Split(c) => c.size(),
        }) as usize
    }

    fn rank(&self) -> usize {
        (match self {
            Comm::World(c) => c.rank(),
            Comm::Split(c) => c.rank(),
        }) as usize
    }
}

#[derive(Clone)]
pub struct MpiGroup {
    comm: Comm,
}

impl MpiGroup {
    pub fn from_world(world: SystemCommunicator) -> Self {
        Self { comm: Comm::World(world) }
    }

    fn split_comm(&self, color: i32, key: i32) -> Result<SimpleCommunicator> {
        let color = if color < 0 {
            Color::undefined()
        } else {
            Color::with_value(color)
        };
        let split = match &self.comm {
            Comm::World(c) => c.split_by_color_with_key(color, key),
            Comm::Split(c) => c.split_by_color_with_key(color, key),
        };
        split.ok_or_else(|| Error::new(nodescope_common::Rc::ErrMpi, "communicator split failed"))
    }
}

impl Group for MpiGroup {
    fn size(&self) -> usize {
        self.comm.size()
    }

    fn rank(&self) -> usize {
        self.comm.rank()
    }

    fn pids(&self) -> Vec<libc::pid_t> {
        let mine = unsafe { libc::getpid() };
        let size = self.size();
        let mut all = vec![0 as libc::pid_t; size];
        match &self.comm {
            Comm::World(c) => c.all_gather_into(&mine, &mut all[..]),
            Comm::Split(c) => c.all_gather_into(&mine, &mut all[..]),
        }
        all
    }

    fn barrier(&self) -> Result<()> {
        // Poll an immediate barrier rather than blocking so the thread
        // yields instead of burning a core while the rest of the group
        // catches up.
        let request = match &self.comm {
            Comm::World(c) => c.immediate_barrier(),
            Comm::Split(c) => c.immediate_barrier(),
        };
        let mut request = Some(request);
        loop {
            match request.take().unwrap().test() {
                Ok(()) => return Ok(()),
                Err(r) => {
                    request = Some(r);
                    thread::sleep(Duration::from_micros(100));
                }
            }
        }
    }

    fn split(&self, color: i32, key: i32) -> Result<Self> {
        Ok(Self { comm: Comm::Split(self.split_comm(color, key)?) })
    }

    fn self_group(&self) -> Result<Self> {
        Ok(Self { comm: Comm::Split(self.split_comm(self.rank() as i32, 0)?) })
    }

    /// `rsmpi` never bound `MPI_Comm_split_type`, so there is no portable
    /// way to derive a node-local communicator here; `System`/`User`/`Job`
    /// fall back to the current communicator unchanged, matching the
    /// already-node-local pthread and single-process backends.
    fn make_intrinsic(&self, iscope: IntrinsicScope, _flags: ScopeCreateHints) -> Result<Self> {
        match iscope {
            IntrinsicScope::System | IntrinsicScope::User | IntrinsicScope::Job => {
                Ok(Self { comm: self.comm.clone() })
            }
            IntrinsicScope::Process => self.self_group(),
        }
    }

    fn gather_bbuff(&self, tx: &[u8], root: usize) -> Result<Option<Vec<Vec<u8>>>> {
        let counts = {
            let mut counts = vec![0i32; self.size()];
            let mine = tx.len() as i32;
            match &self.comm {
                Comm::World(c) => c.process_at_rank(root as i32).gather_into(&mine, &mut counts[..]),
                Comm::Split(c) => c.process_at_rank(root as i32).gather_into(&mine, &mut counts[..]),
            };
            counts
        };
        if self.rank() != root {
            match &self.comm {
                Comm::World(c) => c.process_at_rank(root as i32).gather_varcount_into(tx),
                Comm::Split(c) => c.process_at_rank(root as i32).gather_varcount_into(tx),
            }
            return Ok(None);
        }
        let displs: Vec<i32> = counts
            .iter()
            .scan(0i32, |acc, &c| {
                let d = *acc;
                *acc += c;
                Some(d)
            })
            .collect();
        let mut recv = vec![0u8; counts.iter().sum::<i32>() as usize];
        {
            let mut partition =
                mpi::datatype::PartitionMut::new(&mut recv[..], counts.clone(), displs.clone());
            let root_proc = match &self.comm {
                Comm::World(c) => c.process_at_rank(root as i32),
                Comm::Split(c) => c.process_at_rank(root as i32),
            };
            root_proc.gather_varcount_into_root(tx, &mut partition);
        }
        let mut out = Vec::with_capacity(counts.len());
        for (i, &c) in counts.iter().enumerate() {
            let start = displs[i] as usize;
            out.push(recv[start..start + c as usize].to_vec());
        }
        Ok(Some(out))
    }

    fn scatter_bbuff(&self, tx: Option<&[Vec<u8>]>, root: usize) -> Result<Vec<u8>> {
        let is_root = self.rank() == root;

        // Establish each rank's receive length before the varcount scatter:
        // a non-root rank has no way to size its buffer otherwise.
        let counts: Option<Vec<i32>> = if is_root {
            let bufs = tx.ok_or_else(|| Error::invalid_arg("scatter root must supply buffers"))?;
            if bufs.len() != self.size() {
                return Err(Error::invalid_arg("scatter requires one buffer per member"));
            }
            Some(bufs.iter().map(|b| b.len() as i32).collect())
        } else {
            None
        };
        let mut my_count = 0i32;
        {
            let root_proc = match &self.comm {
                Comm::World(c) => c.process_at_rank(root as i32),
                Comm::Split(c) => c.process_at_rank(root as i32),
            };
            root_proc.scatter_into(counts.as_deref(), &mut my_count);
        }

        let mut mine = vec![0u8; my_count as usize];
        if is_root {
            let bufs = tx.ok_or_else(|| Error::invalid_arg("scatter root must supply buffers"))?;
            let counts = counts.expect("counts computed above for the root branch");
            let displs: Vec<i32> = counts
                .iter()
                .scan(0i32, |acc, &c| {
                    let d = *acc;
                    *acc += c;
                    Some(d)
                })
                .collect();
            let flat: Vec<u8> = bufs.concat();
            let partition = mpi::datatype::Partition::new(&flat[..], counts, displs);
            let root_proc = match &self.comm {
                Comm::World(c) => c.process_at_rank(root as i32),
                Comm::Split(c) => c.process_at_rank(root as i32),
            };
            root_proc.scatter_varcount_into_root(&partition, &mut mine[..]);
        } else {
            let root_proc = match &self.comm {
                Comm::World(c) => c.process_at_rank(root as i32),
                Comm::Split(c) => c.process_at_rank(root as i32),
            };
            root_proc.scatter_varcount_into(&mut mine[..]);
        }
        Ok(mine)
    }
}
