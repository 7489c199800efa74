//! Hardware-locality oracle (C3) and hardware pool (C4).
//!
//! Everything that actually talks to `hwloc` lives here; the rest of the
//! workspace only sees [`Oracle`] and [`HwPool`].

mod gpu;
mod oracle;
mod pool;

pub use gpu::GpuCpuset;
pub use oracle::{BindStringFlags, Oracle};
pub use pool::HwPool;
