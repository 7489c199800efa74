//! Device descriptor: the unit the hardware pool's device multimap stores.

use crate::bitmap::Cpuset;
use crate::error::Result;
use crate::objtype::ObjType;
use crate::wire::{ByteBuffer, ByteReader};

/// Ordinal id meaning "not exposed in the visible-devices list".
pub const ORDINAL_INVISIBLE: i32 = -1;

/// A single accelerator/NIC/etc. discovered under the topology.
///
/// Equality and hashing are by `uuid` alone, per spec: two descriptors for
/// the same physical device compare equal even if other fields (e.g. a
/// freshly re-enumerated ordinal id) differ.
#[derive(Debug, Clone)]
pub struct Device {
    pub obj_type: ObjType,
    pub hints: u64,
    pub affinity: Cpuset,
    /// Index into the process's visible-devices list, or `ORDINAL_INVISIBLE`.
    pub ordinal_id: i32,
    pub vendor_id: u32,
    pub smi_id: String,
    pub name: String,
    /// `DDDD:BB:DD.F` formatted PCI bus id.
    pub pci_bus_id: String,
    pub uuid: String,
}

impl Device {
    pub fn new(
        obj_type: ObjType,
        affinity: Cpuset,
        pci_bus_id: impl Into<String>,
        uuid: impl Into<String>,
    ) -> Self {
        Self {
            obj_type,
            hints: 0,
            affinity,
            ordinal_id: ORDINAL_INVISIBLE,
            vendor_id: 0,
            smi_id: String::new(),
            name: String::new(),
            pci_bus_id: pci_bus_id.into(),
            uuid: uuid.into(),
        }
    }

    pub fn is_visible(&self) -> bool {
        self.ordinal_id != ORDINAL_INVISIBLE
    }

    /// Packs this descriptor into `buf`, the per-field encoding spec.md
    /// section 6 calls a `cereal`-style archive.
    pub fn write(&self, buf: &mut ByteBuffer) {
        buf.put_i32(self.obj_type.to_wire_i32());
        buf.put_u64(self.hints);
        buf.put_cpuset(Some(&self.affinity));
        buf.put_i32(self.ordinal_id);
        buf.put_u32(self.vendor_id);
        buf.put_string(&self.smi_id);
        buf.put_string(&self.name);
        buf.put_string(&self.pci_bus_id);
        buf.put_string(&self.uuid);
    }

    pub fn read(r: &mut ByteReader) -> Result<Self> {
        let obj_type = ObjType::from_wire_i32(r.get_i32()?);
        let hints = r.get_u64()?;
        let affinity = r.get_cpuset()?.unwrap_or_default();
        let ordinal_id = r.get_i32()?;
        let vendor_id = r.get_u32()?;
        let smi_id = r.get_string()?;
        let name = r.get_string()?;
        let pci_bus_id = r.get_string()?;
        let uuid = r.get_string()?;
        Ok(Self {
            obj_type,
            hints,
            affinity,
            ordinal_id,
            vendor_id,
            smi_id,
            name,
            pci_bus_id,
            uuid,
        })
    }
}

impl PartialEq for Device {
    fn eq(&self, other: &Self) -> bool {
        self.uuid == other.uuid
    }
}

impl Eq for Device {}

impl std::hash::Hash for Device {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.uuid.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_is_by_uuid_only() {
        let a = Device::new(ObjType::Gpu, Cpuset::empty(), "0000:01:00.0", "uuid-1");
        let mut b = Device::new(ObjType::Gpu, Cpuset::empty(), "0000:02:00.0", "uuid-1");
        b.ordinal_id = 3;
        assert_eq!(a, b);
    }

    #[test]
    fn invisible_ordinal_is_default() {
        let d = Device::new(ObjType::Gpu, Cpuset::empty(), "0000:01:00.0", "uuid-1");
        assert!(!d.is_visible());
    }

    #[test]
    fn wire_round_trip_preserves_every_field() {
        let mut d = Device::new(
            ObjType::Gpu,
            Cpuset::parse_list_string("0-3").unwrap(),
            "0000:01:00.0",
            "uuid-1",
        );
        d.vendor_id = 0x10de;
        d.name = "Example GPU".to_string();
        d.smi_id = "0".to_string();
        d.ordinal_id = 2;

        let mut buf = crate::wire::ByteBuffer::new();
        d.write(&mut buf);
        let bytes = buf.into_vec();
        let mut r = crate::wire::ByteReader::new(&bytes);
        let back = Device::read(&mut r).unwrap();

        assert_eq!(back.obj_type, d.obj_type);
        assert_eq!(back.vendor_id, d.vendor_id);
        assert_eq!(back.name, d.name);
        assert_eq!(back.affinity, d.affinity);
        assert_eq!(back.ordinal_id, d.ordinal_id);
        assert_eq!(back.uuid, d.uuid);
    }
}
