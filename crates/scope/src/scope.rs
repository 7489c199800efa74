//! Scope (C10): the public handle pairing a group with a hardware pool.

use nodescope_common::wire::{ByteBuffer, ByteReader};
use nodescope_common::{Cpuset, DeviceIdFormat, Error, ObjType, Rc, Result};
use nodescope_group::{bcast_value, Group, PthreadGroup};
use nodescope_hwloc::{BindStringFlags, HwPool, Oracle};
use nodescope_rmi::Client;
use nodescope_split::{split as run_split, SplitMember};

use crate::bind_stack::BindStack;

/// Pairs a group (C6) with a hardware pool (C4) and the caller's bind
/// stack (C5). Exclusively owns the pool; the group is shared — cloning a
/// [`Group`] backend shares its underlying context, so child scopes derived
/// from a `split` retain the same collective machinery as their siblings.
pub struct Scope<G: Group> {
    group: G,
    pool: HwPool,
    binds: BindStack,
    rmi_port: u16,
}

impl<G: Group> Scope<G> {
    /// Pairs a freshly attached bind stack with a pool spanning `cpuset`.
    ///
    /// `rmi_port` is remembered so a later `split` can attach its own
    /// connection for the child scope's bind stack without rediscovering
    /// the daemon.
    pub fn create(
        oracle: &Oracle,
        client: Client,
        rmi_port: u16,
        group: G,
        cpuset: Cpuset,
    ) -> Result<Self> {
        let pool = HwPool::initialize(oracle, cpuset)?;
        let binds = BindStack::attach(client)?;
        Ok(Self { group, pool, binds, rmi_port })
    }

    pub fn rank(&self) -> usize {
        self.group.rank()
    }

    pub fn size(&self) -> usize {
        self.group.size()
    }

    pub fn barrier(&self) -> Result<()> {
        self.group.barrier()
    }

    pub fn pool(&self) -> &HwPool {
        &self.pool
    }

    pub fn group(&self) -> &G {
        &self.group
    }

    /// Applies `cs` via RMI and pushes it onto the bind stack.
    pub fn bind_push(&mut self, cs: Cpuset) -> Result<()> {
        self.binds.push(cs)
    }

    /// Pops the bind stack, restoring the previous binding.
    pub fn bind_pop(&mut self) -> Result<()> {
        self.binds.pop()
    }

    pub fn bind_top(&self) -> Cpuset {
        self.binds.top()
    }

    pub fn nobjs(&self, oracle: &Oracle, t: ObjType) -> Result<usize> {
        self.pool.nobjects(oracle, t)
    }

    pub fn device_id(
        &self,
        oracle: &Oracle,
        t: ObjType,
        i: usize,
        id_format: DeviceIdFormat,
    ) -> Result<String> {
        oracle.get_device_id_in_cpuset(t, i, self.pool.cpuset(), id_format)
    }

    pub fn bind_string(&self, oracle: &Oracle, flags: BindStringFlags) -> String {
        oracle.bind_string(&self.binds.top(), flags)
    }

    /// Consumes the scope; releasing its resources is simply dropping it,
    /// this exists so callers can mirror the create/free pairing explicitly.
    pub fn free(self) {}

    /// Collectively splits this scope, unanchored (`split_at = LAST`).
    pub fn split(&mut self, oracle: &Oracle, npieces: usize, color: i32) -> Result<Self> {
        self.split_at(oracle, npieces, ObjType::Last, color)
    }

    /// Collectively splits this scope, anchored on `split_at`.
    ///
    /// Every member of the group must call this concurrently with its own
    /// color and current affinity; the root (rank 0) runs the splitting
    /// engine and the outcome (success or a shared failure code) is
    /// broadcast before the per-member pools are scattered back, so every
    /// member observes the same result.
    pub fn split_at(
        &mut self,
        oracle: &Oracle,
        npieces: usize,
        split_at: ObjType,
        color: i32,
    ) -> Result<Self> {
        let root = 0;
        let rank = self.group.rank();
        let my_affinity = self.binds.top();

        let mut mine = ByteBuffer::new();
        mine.put_i32(color);
        mine.put_cpuset(Some(&my_affinity));
        let gathered = self.group.gather_bbuff(&mine.into_vec(), root)?;

        let mut outcome_rc = Rc::Success as i32;
        let mut per_member: Vec<Vec<u8>> = Vec::new();
        if let Some(bufs) = gathered {
            let members = bufs
                .iter()
                .map(|b| {
                    let mut r = ByteReader::new(b);
                    let color = r.get_i32()?;
                    let affinity = r.get_cpuset()?.unwrap_or_default();
                    Ok(SplitMember { color, affinity })
                })
                .collect::<Result<Vec<SplitMember>>>();
            match members.and_then(|members| run_split(oracle, &self.pool, npieces, split_at, &members)) {
                Ok(results) => {
                    per_member = results
                        .iter()
                        .map(|res| {
                            let mut b = ByteBuffer::new();
                            b.put_i32(res.color);
                            b.put_bytes(&res.pool.to_bytes());
                            b.into_vec()
                        })
                        .collect();
                }
                Err(e) => outcome_rc = e.rc as i32,
            }
        }

        let outcome_rc = bcast_value(&self.group, outcome_rc, root)?;
        if outcome_rc != Rc::Success as i32 {
            return Err(Error::split("collective split failed on the coordinating member"));
        }

        let mine = self
            .group
            .scatter_bbuff(if rank == root { Some(&per_member) } else { None }, root)?;
        let mut r = ByteReader::new(&mine);
        let new_color = r.get_i32()?;
        let pool_bytes = r.get_bytes()?;
        let child_pool = HwPool::from_bytes(&pool_bytes)?;
        let child_group = self.group.split(new_color, rank as i32)?;

        let client = Client::attach(Some(self.rmi_port))?;
        let binds = BindStack::attach(client)?;
        Ok(Self { group: child_group, pool: child_pool, binds, rmi_port: self.rmi_port })
    }
}

/// Collectively splits `parent` across `nthreads` fresh pthreads, one color
/// per thread, and runs `body` inside each with its child scope.
///
/// Each thread attaches its own RMI client (`rmi_port` resolves the same
/// daemon the parent is attached to) and loads its own oracle, mirroring how
/// every other group backend's members independently discover topology —
/// threads here just happen to share an address space with the daemon.
pub fn thread_split<F>(
    parent: &Scope<PthreadGroup>,
    rmi_port: u16,
    nthreads: usize,
    split_at: ObjType,
    colors: &[i32],
    body: F,
) -> Result<()>
where
    F: Fn(Scope<PthreadGroup>, usize) + Sync,
{
    if colors.len() != nthreads {
        return Err(Error::invalid_arg("thread_split requires exactly one color per thread"));
    }
    let teams = PthreadGroup::new_team(nthreads);
    let parent_pool = parent.pool().clone();
    let body = &body;

    std::thread::scope(|s| -> Result<()> {
        let mut handles = Vec::with_capacity(nthreads);
        for (i, group) in teams.into_iter().enumerate() {
            let pool = parent_pool.clone();
            let color = colors[i];
            handles.push(s.spawn(move || -> Result<()> {
                let oracle = Oracle::load()?;
                let client = Client::attach(Some(rmi_port))?;
                let binds = BindStack::attach(client)?;
                let affinity = pool.cpuset().clone();
                let mut scope = Scope { group, pool, binds, rmi_port };
                let child = scope.split_at_with_affinity(&oracle, nthreads, split_at, color, &affinity)?;
                body(child, i);
                Ok(())
            }));
        }
        for h in handles {
            h.join().map_err(|_| Error::internal("a thread panicked during thread_split"))??;
        }
        Ok(())
    })
}

impl<G: Group> Scope<G> {
    /// Like [`Scope::split_at`] but with an explicit affinity instead of the
    /// caller's bind-stack top; used by [`thread_split`], where each member
    /// splits from the parent pool's cpuset rather than a prior push.
    fn split_at_with_affinity(
        &mut self,
        oracle: &Oracle,
        npieces: usize,
        split_at: ObjType,
        color: i32,
        affinity: &Cpuset,
    ) -> Result<Self> {
        let saved = self.binds.top();
        if *affinity != saved {
            self.binds.push(affinity.clone())?;
            let result = self.split_at(oracle, npieces, split_at, color);
            self.binds.pop()?;
            return result;
        }
        self.split_at(oracle, npieces, split_at, color)
    }
}
