//! Shared data model, wire codec and error types for the `nodescope` crates.
//!
//! Nothing in here talks to hwloc, sockets, or threads; it is the vocabulary
//! the rest of the workspace shares.

pub mod bitmap;
pub mod device;
pub mod error;
pub mod intrinsic;
pub mod objtype;
pub mod version;
pub mod wire;

pub use bitmap::Cpuset;
pub use device::Device;
pub use error::{Error, Rc, Result};
pub use intrinsic::{IntrinsicScope, ScopeCreateHints};
pub use objtype::{DeviceIdFormat, ObjType};
