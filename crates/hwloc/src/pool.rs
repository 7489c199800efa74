//! Hardware pool (C4): one cpuset plus one device multimap.

use nodescope_common::wire::{ByteBuffer, ByteReader};
use nodescope_common::{Cpuset, Device, ObjType, Result};

use crate::oracle::Oracle;

/// A set of CPU and device resources, all within a single cpuset.
///
/// Invariants (checked by [`HwPool::initialize`] and preserved by every
/// other constructor in the workspace): (I1) `cpuset` is an owned clone, not
/// a borrow of the parent's; (I2) every device's affinity is a subset of
/// `cpuset`; (I3) only device types the oracle actually supports appear in
/// `devices`.
#[derive(Debug, Clone, Default)]
pub struct HwPool {
    cpuset: Cpuset,
    devices: Vec<Device>,
}

impl HwPool {
    /// Builds a pool by discovering every device whose affinity is a subset
    /// of `cpuset`.
    pub fn initialize(oracle: &Oracle, cpuset: Cpuset) -> Result<Self> {
        let mut devices = Vec::new();
        for dev in oracle.gpus() {
            if dev.affinity.and_not(&cpuset).is_empty() {
                devices.push(dev.clone());
            }
        }
        Ok(Self { cpuset, devices })
    }

    pub fn cpuset(&self) -> &Cpuset {
        &self.cpuset
    }

    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    pub fn devices_of_type(&self, t: ObjType) -> impl Iterator<Item = &Device> {
        self.devices.iter().filter(move |d| d.obj_type == t)
    }

    /// For host types, the count of topology objects of `type` contained in
    /// the cpuset; for device types, the multimap count.
    pub fn nobjects(&self, oracle: &Oracle, t: ObjType) -> Result<usize> {
        if t.is_device() {
            Ok(self.devices_of_type(t).count())
        } else {
            oracle.nobjs_in_cpuset(t, &self.cpuset)
        }
    }

    pub fn add_device(&mut self, dev: Device) {
        self.devices.push(dev);
    }

    /// Empties the device map, retaining only the cpuset — used between the
    /// two passes of the splitter.
    pub fn release_devices(&mut self) {
        self.devices.clear();
    }

    /// Serializes this pool for the C7 collectives' gather/scatter, per
    /// spec.md section 6's "cereal-style binary archive" pool encoding.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = ByteBuffer::new();
        buf.put_cpuset(Some(&self.cpuset));
        buf.put_usize(self.devices.len());
        for dev in &self.devices {
            dev.write(&mut buf);
        }
        buf.into_vec()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut r = ByteReader::new(bytes);
        let cpuset = r.get_cpuset()?.unwrap_or_default();
        let n = r.get_usize()?;
        let mut devices = Vec::with_capacity(n);
        for _ in 0..n {
            devices.push(nodescope_common::Device::read(&mut r)?);
        }
        Ok(Self { cpuset, devices })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodescope_common::device::ORDINAL_INVISIBLE;

    fn dev(pci: &str, affinity: Cpuset) -> Device {
        let mut d = Device::new(ObjType::Gpu, affinity, pci, pci);
        d.ordinal_id = ORDINAL_INVISIBLE;
        d
    }

    #[test]
    fn release_devices_keeps_cpuset() {
        let cs = Cpuset::parse_list_string("0-3").unwrap();
        let mut pool = HwPool { cpuset: cs.clone(), devices: vec![dev("0000:01:00.0", cs.clone())] };
        pool.release_devices();
        assert!(pool.devices().is_empty());
        assert_eq!(pool.cpuset(), &cs);
    }

    #[test]
    fn wire_round_trip_preserves_cpuset_and_devices() {
        let cs = Cpuset::parse_list_string("0-3").unwrap();
        let pool = HwPool { cpuset: cs.clone(), devices: vec![dev("0000:01:00.0", cs.clone())] };
        let bytes = pool.to_bytes();
        let back = HwPool::from_bytes(&bytes).unwrap();
        assert_eq!(back.cpuset(), &cs);
        assert_eq!(back.devices().len(), 1);
        assert_eq!(back.devices()[0].pci_bus_id, "0000:01:00.0");
    }
}
