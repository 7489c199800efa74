//! RMI client: the caller-side handle every task attaches through.
//!
//! Port resolution precedence, per spec.md section 6: an explicit argument,
//! then `NODESCOPE_PORT`, then scanning the session directory for a running
//! daemon, then (if nothing is found) starting one and retrying with
//! backoff and jitter.

use std::fs;
use std::io::{BufReader, BufWriter};
use std::net::TcpStream;
use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use rand::Rng;

use nodescope_common::wire::{ByteBuffer, ByteReader};
use nodescope_common::{Cpuset, DeviceIdFormat, Error, IntrinsicScope, ObjType, Result};

use crate::proto::{read_message, write_message, FunctionId};

const RECV_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_CONNECT_ATTEMPTS: u32 = 6;

fn session_dir() -> PathBuf {
    let base = std::env::var("NODESCOPE_TMPDIR")
        .or_else(|_| std::env::var("TMPDIR"))
        .unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(base)
}

/// Scans the session directory for a `nodescoped.<port>` entry left behind
/// by a running daemon.
fn discover_port() -> Option<u16> {
    let dir = session_dir();
    let entries = fs::read_dir(dir).ok()?;
    for entry in entries.flatten() {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if let Some(port_str) = name.strip_prefix("nodescoped.") {
            if let Ok(port) = port_str.parse::<u16>() {
                return Some(port);
            }
        }
    }
    None
}

fn resolve_port(explicit: Option<u16>) -> Option<u16> {
    explicit
        .or_else(|| std::env::var("NODESCOPE_PORT").ok().and_then(|s| s.parse().ok()))
        .or_else(discover_port)
}

/// A connected RMI client handle.
pub struct Client {
    stream_r: BufReader<TcpStream>,
    stream_w: BufWriter<TcpStream>,
    pub hwtopo_path: String,
}

impl Client {
    /// Connects to the daemon, forking one via `nodescoped` if none is
    /// discoverable. Retries the connect-then-HELLO sequence with
    /// exponential backoff and jitter up to [`MAX_CONNECT_ATTEMPTS`] times.
    pub fn attach(explicit_port: Option<u16>) -> Result<Self> {
        let mut spawned_daemon = false;
        let mut rng = rand::thread_rng();
        for attempt in 0..MAX_CONNECT_ATTEMPTS {
            if let Some(port) = resolve_port(explicit_port) {
                match Self::connect_and_hello(port) {
                    Ok(client) => return Ok(client),
                    Err(_) if attempt + 1 < MAX_CONNECT_ATTEMPTS => {}
                    Err(e) => return Err(e),
                }
            } else if !spawned_daemon {
                Self::spawn_daemon()?;
                spawned_daemon = true;
            }
            let backoff_ms = 50u64 * (1 << attempt.min(6));
            let jitter_ms = rng.gen_range(0..=backoff_ms / 2 + 1);
            std::thread::sleep(Duration::from_millis(backoff_ms + jitter_ms));
        }
        Err(Error::unavailable("no nodescoped reachable after retrying with backoff"))
    }

    fn spawn_daemon() -> Result<()> {
        Command::new("nodescoped")
            .arg("--no-daemonize=false")
            .spawn()
            .map_err(|e| Error::unavailable(format!("failed to start nodescoped: {e}")))?;
        Ok(())
    }

    fn connect_and_hello(port: u16) -> Result<Self> {
        let stream = TcpStream::connect(("127.0.0.1", port))
            .map_err(|e| Error::unavailable(format!("connect failed: {e}")))?;
        stream
            .set_read_timeout(Some(RECV_TIMEOUT))
            .map_err(|e| Error::rpc(format!("set_read_timeout: {e}")))?;
        stream.set_nodelay(true).ok();
        let stream_w = BufWriter::new(stream.try_clone().map_err(|e| Error::rpc(e.to_string()))?);
        let stream_r = BufReader::new(stream);
        let mut client = Self { stream_r, stream_w, hwtopo_path: String::new() };

        let tid = unsafe { libc::pthread_self() } as u64;
        let mut body = ByteBuffer::new();
        body.put_u64(tid);
        let reply = client.call(FunctionId::Hello, &body.into_vec())?;
        let mut r = ByteReader::new(&reply);
        let rc = r.get_i32()?;
        let hwtopo_path = r.get_string()?;
        if rc != nodescope_common::Rc::Success as i32 {
            return Err(Error::rpc("HELLO handshake rejected by server"));
        }
        client.hwtopo_path = hwtopo_path;
        Ok(client)
    }

    fn call(&mut self, fid: FunctionId, body: &[u8]) -> Result<Vec<u8>> {
        write_message(&mut self.stream_w, fid, body).map_err(|e| Error::rpc(e.to_string()))?;
        let (reply_fid, reply_body) = read_message(&mut self.stream_r)?;
        if reply_fid != fid {
            return Err(Error::internal("RMI reply function id did not match request"));
        }
        Ok(reply_body)
    }

    pub fn shutdown(&mut self) -> Result<()> {
        self.call(FunctionId::Shutdown, &[])?;
        Ok(())
    }

    pub fn get_cpubind(&mut self, tid: u64) -> Result<Cpuset> {
        let mut body = ByteBuffer::new();
        body.put_u64(tid);
        let reply = self.call(FunctionId::GetCpubind, &body.into_vec())?;
        let mut r = ByteReader::new(&reply);
        check_rc(r.get_i32()?)?;
        r.get_cpuset()?.ok_or_else(|| Error::internal("server returned no cpuset"))
    }

    pub fn set_cpubind(&mut self, tid: u64, cs: &Cpuset) -> Result<()> {
        let mut body = ByteBuffer::new();
        body.put_u64(tid);
        body.put_cpuset(Some(cs));
        let reply = self.call(FunctionId::SetCpubind, &body.into_vec())?;
        check_rc(ByteReader::new(&reply).get_i32()?)
    }

    pub fn obj_type_depth(&mut self, t: ObjType) -> Result<u32> {
        let mut body = ByteBuffer::new();
        body.put_i32(t.to_wire_i32());
        let reply = self.call(FunctionId::ObjTypeDepth, &body.into_vec())?;
        let mut r = ByteReader::new(&reply);
        check_rc(r.get_i32()?)?;
        r.get_u32()
    }

    pub fn nobjs_in_cpuset(&mut self, t: ObjType, cs: &Cpuset) -> Result<usize> {
        let mut body = ByteBuffer::new();
        body.put_i32(t.to_wire_i32());
        body.put_cpuset(Some(cs));
        let reply = self.call(FunctionId::GetNobjsInCpuset, &body.into_vec())?;
        let mut r = ByteReader::new(&reply);
        check_rc(r.get_i32()?)?;
        r.get_usize()
    }

    pub fn device_in_cpuset(
        &mut self,
        t: ObjType,
        i: usize,
        cs: &Cpuset,
        id_format: DeviceIdFormat,
    ) -> Result<String> {
        let mut body = ByteBuffer::new();
        body.put_i32(t.to_wire_i32());
        body.put_usize(i);
        body.put_cpuset(Some(cs));
        body.put_i32(match id_format {
            DeviceIdFormat::Uuid => 0,
            DeviceIdFormat::Pci => 1,
            DeviceIdFormat::Ordinal => 2,
        });
        let reply = self.call(FunctionId::GetDeviceInCpuset, &body.into_vec())?;
        let mut r = ByteReader::new(&reply);
        check_rc(r.get_i32()?)?;
        r.get_string()
    }

    /// Queries the cpuset for an intrinsic scope; `pids` carries the task(s)
    /// the server needs to resolve `Job`/`Process` against (ignored for
    /// `System`/`User`).
    pub fn intrinsic_hwpool_cpuset(&mut self, scope: IntrinsicScope, pids: &[u64]) -> Result<Cpuset> {
        let mut body = ByteBuffer::new();
        body.put_usize(pids.len());
        for &pid in pids {
            body.put_u64(pid);
        }
        body.put_i32(scope.to_wire_i32());
        let reply = self.call(FunctionId::GetIntrinsicHwpool, &body.into_vec())?;
        let mut r = ByteReader::new(&reply);
        check_rc(r.get_i32()?)?;
        r.get_cpuset()?.ok_or_else(|| Error::internal("server returned no intrinsic cpuset"))
    }
}

fn check_rc(rc: i32) -> Result<()> {
    if rc == nodescope_common::Rc::Success as i32 {
        Ok(())
    } else {
        Err(Error::new(nodescope_common::Rc::from_i32(rc), "RMI call returned a non-success code"))
    }
}
