//! The stable, numeric return-code enum and the library's error type.
//!
//! `Rc` mirrors the wire-stable enum from the original C return codes
//! (`QV_SUCCESS`, `QV_ERR_*`, ...): clients on both sides of the RMI boundary
//! agree on its numeric values, so it is `#[repr(i32)]` and packed onto the
//! wire as a plain four-byte integer (see `nodescope_common::wire`).

use std::fmt;

/// Stable return code, packed on the wire as an `i32`.
///
/// Ordering matches spec.md section 6 and must not be reordered: clients and
/// servers built against different versions of this crate still need to
/// agree on the numeric value of each variant.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rc {
    Success = 0,
    SuccessAlreadyDone,
    SuccessShutdown,
    Err,
    ErrEnv,
    ErrInternal,
    ErrFileIo,
    ErrSys,
    ErrOor,
    ErrInvalidArg,
    ErrHwloc,
    ErrMpi,
    ErrMsg,
    ErrRpc,
    ErrNotSupported,
    ErrNotFound,
    ErrSplit,
    ResUnavailable,
}

impl Rc {
    /// Human-readable description, the analogue of `qv_strerr`.
    pub fn message(&self) -> &'static str {
        match self {
            Rc::Success => "success",
            Rc::SuccessAlreadyDone => "success, operation already performed",
            Rc::SuccessShutdown => "success, shutdown in progress",
            Rc::Err => "unspecified error",
            Rc::ErrEnv => "environment error",
            Rc::ErrInternal => "internal invariant violation",
            Rc::ErrFileIo => "file I/O error",
            Rc::ErrSys => "system error",
            Rc::ErrOor => "out of resources",
            Rc::ErrInvalidArg => "invalid argument",
            Rc::ErrHwloc => "hwloc topology error",
            Rc::ErrMpi => "MPI error",
            Rc::ErrMsg => "malformed message",
            Rc::ErrRpc => "RPC failure",
            Rc::ErrNotSupported => "operation not supported",
            Rc::ErrNotFound => "not found",
            Rc::ErrSplit => "split failed",
            Rc::ResUnavailable => "resource unavailable",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Rc::Success | Rc::SuccessAlreadyDone | Rc::SuccessShutdown)
    }

    /// Round-trips through the wire representation; an unrecognized code
    /// from a newer peer is mapped to `Err` rather than panicking.
    pub fn from_i32(v: i32) -> Rc {
        match v {
            0 => Rc::Success,
            1 => Rc::SuccessAlreadyDone,
            2 => Rc::SuccessShutdown,
            4 => Rc::ErrEnv,
            5 => Rc::ErrInternal,
            6 => Rc::ErrFileIo,
            7 => Rc::ErrSys,
            8 => Rc::ErrOor,
            9 => Rc::ErrInvalidArg,
            10 => Rc::ErrHwloc,
            11 => Rc::ErrMpi,
            12 => Rc::ErrMsg,
            13 => Rc::ErrRpc,
            14 => Rc::ErrNotSupported,
            15 => Rc::ErrNotFound,
            16 => Rc::ErrSplit,
            17 => Rc::ResUnavailable,
            _ => Rc::Err,
        }
    }
}

impl fmt::Display for Rc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message())
    }
}

/// The library's public error type: a stable code plus context.
///
/// Per spec.md section 7, precondition failures (`ErrInvalidArg`) are never
/// logged; everything else is logged at the point it is first observed, then
/// returned. This type only carries the already-decided code and message; the
/// logging itself happens at the call site via `log::warn!`/`log::error!` so
/// the decision of *whether* to log stays next to the policy that made it.
#[derive(Debug, thiserror::Error)]
#[error("{rc}: {msg}")]
pub struct Error {
    pub rc: Rc,
    pub msg: String,
}

impl Error {
    pub fn new(rc: Rc, msg: impl Into<String>) -> Self {
        Self { rc, msg: msg.into() }
    }

    pub fn invalid_arg(msg: impl Into<String>) -> Self {
        Self::new(Rc::ErrInvalidArg, msg)
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        let e = Self::new(Rc::ErrInternal, msg);
        log::error!("{e}");
        e
    }

    pub fn hwloc(msg: impl Into<String>) -> Self {
        let e = Self::new(Rc::ErrHwloc, msg);
        log::error!("{e}");
        e
    }

    pub fn rpc(msg: impl Into<String>) -> Self {
        let e = Self::new(Rc::ErrRpc, msg);
        log::error!("{e}");
        e
    }

    pub fn split(msg: impl Into<String>) -> Self {
        let e = Self::new(Rc::ErrSplit, msg);
        log::error!("{e}");
        e
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::new(Rc::ResUnavailable, msg)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rc_round_trips_through_wire_values() {
        for rc in [
            Rc::Success,
            Rc::ErrInvalidArg,
            Rc::ErrSplit,
            Rc::ResUnavailable,
        ] {
            assert_eq!(Rc::from_i32(rc as i32), rc);
        }
    }

    #[test]
    fn unknown_wire_value_maps_to_err() {
        assert_eq!(Rc::from_i32(9999), Rc::Err);
    }
}
