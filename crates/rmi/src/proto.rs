//! Function ids and framing for the RMI wire protocol.
//!
//! A message on the wire is `u32 fid || body`, itself prefixed with a
//! `u32` byte length so a stream socket can delimit messages (the original
//! protocol used a message-oriented ZeroMQ socket; over a plain TCP stream
//! we frame explicitly instead).

use std::io::{self, Read, Write};

use nodescope_common::Result;
use nodescope_common::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum FunctionId {
    Shutdown = 1,
    Hello = 2,
    GetCpubind = 3,
    SetCpubind = 4,
    ObjTypeDepth = 5,
    GetNobjsInCpuset = 6,
    GetDeviceInCpuset = 7,
    GetIntrinsicHwpool = 8,
}

impl FunctionId {
    pub fn from_u32(v: u32) -> Option<Self> {
        match v {
            1 => Some(Self::Shutdown),
            2 => Some(Self::Hello),
            3 => Some(Self::GetCpubind),
            4 => Some(Self::SetCpubind),
            5 => Some(Self::ObjTypeDepth),
            6 => Some(Self::GetNobjsInCpuset),
            7 => Some(Self::GetDeviceInCpuset),
            8 => Some(Self::GetIntrinsicHwpool),
            _ => None,
        }
    }
}

/// The maximum message body accepted from the wire — guards against a
/// corrupt or hostile length prefix causing an unbounded allocation.
const MAX_BODY_LEN: u32 = 64 * 1024 * 1024;

/// Writes `fid || body` to `w`, length-prefixed.
pub fn write_message(w: &mut impl Write, fid: FunctionId, body: &[u8]) -> io::Result<()> {
    let len = 4 + body.len() as u32;
    w.write_all(&len.to_le_bytes())?;
    w.write_all(&(fid as u32).to_le_bytes())?;
    w.write_all(body)?;
    w.flush()
}

/// Reads one length-prefixed `fid || body` message from `r`.
pub fn read_message(r: &mut impl Read) -> Result<(FunctionId, Vec<u8>)> {
    let mut len_bytes = [0u8; 4];
    r.read_exact(&mut len_bytes)
        .map_err(|e| Error::rpc(format!("reading message length: {e}")))?;
    let len = u32::from_le_bytes(len_bytes);
    if len < 4 || len > MAX_BODY_LEN {
        return Err(Error::new(nodescope_common::Rc::ErrMsg, "message length out of bounds"));
    }
    let mut rest = vec![0u8; len as usize];
    r.read_exact(&mut rest)
        .map_err(|e| Error::rpc(format!("reading message body: {e}")))?;
    let fid_raw = u32::from_le_bytes(rest[0..4].try_into().unwrap());
    let fid = FunctionId::from_u32(fid_raw)
        .ok_or_else(|| Error::internal(format!("unknown RPC function id {fid_raw}")))?;
    Ok((fid, rest[4..].to_vec()))
}
