//! Vendor GPU libraries are out of scope; this trait is the single seam a
//! real accelerator backend would implement to report its own affinity
//! instead of hwloc's (which sees GPUs only as generic PCI/os devices).

use nodescope_common::Cpuset;

/// Resolves a device's CPU affinity from a vendor-specific source.
pub trait GpuCpuset {
    fn cpuset(&self, device_id: i32) -> Option<Cpuset>;
}

/// No vendor library wired in; every device reports no additional affinity
/// information beyond what hwloc's PCI locality already gave it.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoGpuCpuset;

impl GpuCpuset for NoGpuCpuset {
    fn cpuset(&self, _device_id: i32) -> Option<Cpuset> {
        None
    }
}
