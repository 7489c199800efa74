//! Single-process group: size 1, rank 0, every collective is a no-op move.

use nodescope_common::{Error, IntrinsicScope, Result, ScopeCreateHints};

use crate::Group;

#[derive(Debug, Clone, Copy, Default)]
pub struct SingleProcessGroup;

impl SingleProcessGroup {
    pub fn new() -> Self {
        Self
    }
}

impl Group for SingleProcessGroup {
    fn size(&self) -> usize {
        1
    }

    fn rank(&self) -> usize {
        0
    }

    fn pids(&self) -> Vec<libc::pid_t> {
        vec![unsafe { libc::getpid() }]
    }

    fn barrier(&self) -> Result<()> {
        Ok(())
    }

    fn split(&self, _color: i32, _key: i32) -> Result<Self> {
        Ok(Self)
    }

    fn self_group(&self) -> Result<Self> {
        Ok(Self)
    }

    fn make_intrinsic(&self, _iscope: IntrinsicScope, _flags: ScopeCreateHints) -> Result<Self> {
        Ok(Self)
    }

    fn gather_bbuff(&self, tx: &[u8], root: usize) -> Result<Option<Vec<Vec<u8>>>> {
        if root != 0 {
            return Err(Error::invalid_arg("single-process group has only rank 0"));
        }
        Ok(Some(vec![tx.to_vec()]))
    }

    fn scatter_bbuff(&self, tx: Option<&[Vec<u8>]>, root: usize) -> Result<Vec<u8>> {
        if root != 0 {
            return Err(Error::invalid_arg("single-process group has only rank 0"));
        }
        let bufs = tx.ok_or_else(|| Error::invalid_arg("scatter root must supply buffers"))?;
        bufs.first()
            .cloned()
            .ok_or_else(|| Error::invalid_arg("scatter requires exactly one buffer"))
    }
}
