//! RMI server: owns the single authoritative hardware pool and dispatches
//! the RPCs in [`crate::proto::FunctionId`] against it.

use std::io::ErrorKind;
use std::net::{TcpListener, TcpStream};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use nodescope_common::wire::{ByteBuffer, ByteReader};
use nodescope_common::{Cpuset, Error, IntrinsicScope, ObjType, Result};
use nodescope_hwloc::{HwPool, Oracle};

use crate::proto::{read_message, write_message, FunctionId};

const POLL_TIMEOUT: Duration = Duration::from_secs(1);

/// The RMI server: one per daemon process, bound to a single loopback port.
pub struct Server {
    listener: TcpListener,
    oracle: Oracle,
    base_pool: HwPool,
    hwtopo_path: PathBuf,
    shutdown: Arc<AtomicBool>,
}

impl Server {
    /// Binds to `127.0.0.1:port` (0 lets the OS choose) and builds the base
    /// hardware pool spanning every PU the topology allows this process.
    pub fn bind(port: u16, hwtopo_path: PathBuf, shutdown: Arc<AtomicBool>) -> Result<Self> {
        let listener = TcpListener::bind(("127.0.0.1", port))
            .map_err(|e| Error::rpc(format!("binding RMI listener: {e}")))?;
        listener
            .set_nonblocking(true)
            .map_err(|e| Error::rpc(format!("setting listener nonblocking: {e}")))?;
        let oracle = Oracle::load()?;
        let base_pool = HwPool::initialize(&oracle, oracle.topology_cpuset())?;
        Ok(Self { listener, oracle, base_pool, hwtopo_path, shutdown })
    }

    pub fn local_port(&self) -> Result<u16> {
        self.listener
            .local_addr()
            .map(|a| a.port())
            .map_err(|e| Error::rpc(format!("reading bound port: {e}")))
    }

    /// Runs until `shutdown` is set or a client sends `Shutdown`. Polls
    /// `accept` with a 1s timeout so the shutdown flag is checked
    /// regularly even with no traffic.
    pub fn run(&mut self) -> Result<()> {
        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                return Ok(());
            }
            match self.listener.accept() {
                Ok((stream, _addr)) => {
                    if self.serve_connection(stream)? {
                        return Ok(());
                    }
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    std::thread::sleep(POLL_TIMEOUT);
                }
                Err(e) => return Err(Error::rpc(format!("accept failed: {e}"))),
            }
        }
    }

    /// Serves one client connection to completion; returns `true` if the
    /// client asked the server to shut down.
    fn serve_connection(&mut self, mut stream: TcpStream) -> Result<bool> {
        stream
            .set_nodelay(true)
            .map_err(|e| Error::rpc(format!("set_nodelay: {e}")))?;
        loop {
            let (fid, body) = match read_message(&mut stream) {
                Ok(msg) => msg,
                Err(_) => return Ok(false), // client disconnected
            };
            let mut reply = ByteBuffer::new();
            let shutdown_requested = self.dispatch(fid, &body, &mut reply)?;
            write_message(&mut stream, fid, &reply.into_vec())
                .map_err(|e| Error::rpc(format!("writing reply: {e}")))?;
            if shutdown_requested {
                self.shutdown.store(true, Ordering::SeqCst);
                return Ok(true);
            }
        }
    }

    fn dispatch(&mut self, fid: FunctionId, body: &[u8], reply: &mut ByteBuffer) -> Result<bool> {
        let mut r = ByteReader::new(body);
        match fid {
            FunctionId::Shutdown => {
                reply.put_i32(nodescope_common::Rc::SuccessShutdown as i32);
                return Ok(true);
            }
            FunctionId::Hello => {
                let _client_tid = r.get_u64()?;
                reply.put_i32(nodescope_common::Rc::Success as i32);
                reply.put_string(&self.hwtopo_path.to_string_lossy());
            }
            FunctionId::GetCpubind => {
                let tid = r.get_u64()? as libc::pthread_t;
                match self.oracle.task_get_cpubind(tid) {
                    Ok(cs) => {
                        reply.put_i32(nodescope_common::Rc::Success as i32);
                        reply.put_cpuset(Some(&cs));
                    }
                    Err(e) => {
                        reply.put_i32(e.rc as i32);
                        reply.put_cpuset(None);
                    }
                }
            }
            FunctionId::SetCpubind => {
                let tid = r.get_u64()? as libc::pthread_t;
                let cs = r.get_cpuset()?.unwrap_or_default();
                let rc = match self.oracle.task_set_cpubind_from_cpuset(tid, &cs) {
                    Ok(()) => nodescope_common::Rc::Success,
                    Err(e) => e.rc,
                };
                reply.put_i32(rc as i32);
            }
            FunctionId::ObjTypeDepth => {
                let t = ObjType::from_wire_i32(r.get_i32()?);
                match self.oracle.obj_type_depth(t) {
                    Ok(d) => {
                        reply.put_i32(nodescope_common::Rc::Success as i32);
                        reply.put_u32(d);
                    }
                    Err(e) => {
                        reply.put_i32(e.rc as i32);
                        reply.put_u32(0);
                    }
                }
            }
            FunctionId::GetNobjsInCpuset => {
                let t = ObjType::from_wire_i32(r.get_i32()?);
                let cs = r.get_cpuset()?.unwrap_or_default();
                match self.oracle.nobjs_in_cpuset(t, &cs) {
                    Ok(n) => {
                        reply.put_i32(nodescope_common::Rc::Success as i32);
                        reply.put_usize(n);
                    }
                    Err(e) => {
                        reply.put_i32(e.rc as i32);
                        reply.put_usize(0);
                    }
                }
            }
            FunctionId::GetDeviceInCpuset => {
                let t = ObjType::from_wire_i32(r.get_i32()?);
                let i = r.get_usize()?;
                let cs = r.get_cpuset()?.unwrap_or_default();
                let id_format = match r.get_i32()? {
                    0 => nodescope_common::DeviceIdFormat::Uuid,
                    1 => nodescope_common::DeviceIdFormat::Pci,
                    _ => nodescope_common::DeviceIdFormat::Ordinal,
                };
                match self.oracle.get_device_id_in_cpuset(t, i, &cs, id_format) {
                    Ok(id) => {
                        reply.put_i32(nodescope_common::Rc::Success as i32);
                        reply.put_string(&id);
                    }
                    Err(e) => {
                        reply.put_i32(e.rc as i32);
                        reply.put_string("");
                    }
                }
            }
            FunctionId::GetIntrinsicHwpool => {
                let npids = r.get_usize()?;
                let mut pids = Vec::with_capacity(npids);
                for _ in 0..npids {
                    pids.push(r.get_u64()?);
                }
                let scope = IntrinsicScope::from_wire_i32(r.get_i32()?).ok_or_else(|| {
                    Error::new(nodescope_common::Rc::ErrInvalidArg, "unrecognized intrinsic scope")
                })?;
                match self.intrinsic_hwpool_cpuset(scope, &pids) {
                    Ok(cs) => {
                        reply.put_i32(nodescope_common::Rc::Success as i32);
                        reply.put_cpuset(Some(&cs));
                    }
                    Err(e) => {
                        reply.put_i32(e.rc as i32);
                        reply.put_cpuset(None);
                    }
                }
            }
        }
        Ok(false)
    }

    /// Derives the cpuset for an intrinsic scope, per spec.md section 4.7:
    /// `SYSTEM` has no bindable cpuset of its own; `USER` is the whole
    /// allowed topology; `JOB` is the OR-reduction of every listed pid's
    /// current binding; `PROCESS` is the single listed pid's current
    /// binding.
    fn intrinsic_hwpool_cpuset(&self, scope: IntrinsicScope, pids: &[u64]) -> Result<Cpuset> {
        match scope {
            IntrinsicScope::System => Err(Error::new(
                nodescope_common::Rc::ErrNotSupported,
                "SYSTEM intrinsic scope has no bindable cpuset",
            )),
            IntrinsicScope::User => Ok(self.oracle.topology_cpuset()),
            IntrinsicScope::Job => {
                if pids.is_empty() {
                    return Err(Error::invalid_arg("JOB intrinsic scope requires at least one pid"));
                }
                let mut cs = Cpuset::empty();
                for &pid in pids {
                    cs = cs.union(&self.oracle.task_get_cpubind(pid as libc::pthread_t)?);
                }
                Ok(cs)
            }
            IntrinsicScope::Process => {
                if pids.len() != 1 {
                    return Err(Error::invalid_arg("PROCESS intrinsic scope requires exactly one pid"));
                }
                self.oracle.task_get_cpubind(pids[0] as libc::pthread_t)
            }
        }
    }
}
