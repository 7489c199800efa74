//! Task & bind stack (C5): the per-caller LIFO of cpusets that mediates
//! every CPU affinity change through the RMI server.

use nodescope_common::{Cpuset, Error, Result};
use nodescope_rmi::Client;

/// A caller's RMI handle plus the LIFO of cpusets it has pushed.
///
/// The bottom of the stack is always the affinity observed at attach time;
/// the stack is never empty once constructed.
pub struct BindStack {
    client: Client,
    tid: u64,
    stack: Vec<Cpuset>,
}

impl BindStack {
    /// Attaches to the daemon through `client` and seeds the stack with the
    /// caller's current affinity.
    pub fn attach(mut client: Client) -> Result<Self> {
        let tid = unsafe { libc::pthread_self() } as u64;
        let base = client.get_cpubind(tid)?;
        Ok(Self { client, tid, stack: vec![base] })
    }

    /// Applies `cs` via RMI and, only on success, pushes it.
    pub fn push(&mut self, cs: Cpuset) -> Result<()> {
        self.client.set_cpubind(self.tid, &cs)?;
        self.stack.push(cs);
        Ok(())
    }

    /// Discards the top of the stack, then re-applies what is now the top.
    /// Refuses to pop the base binding.
    pub fn pop(&mut self) -> Result<()> {
        if self.stack.len() < 2 {
            return Err(Error::invalid_arg("cannot pop the base binding off the bind stack"));
        }
        self.stack.pop();
        let top = self.stack.last().expect("bind stack is never empty after attach").clone();
        self.client.set_cpubind(self.tid, &top)?;
        Ok(())
    }

    pub fn top(&self) -> Cpuset {
        self.stack.last().expect("bind stack is never empty after attach").clone()
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn client_mut(&mut self) -> &mut Client {
        &mut self.client
    }
}

#[cfg(test)]
mod tests {
    // Exercised end-to-end in tests/bind_stack.rs, which needs a live RMI
    // server; nothing here is unit-testable without one.
}
