//! Hardware object type enumeration shared by the topology oracle, the
//! hardware pool and the splitting engine.

/// Closed enumeration of hardware object types.
///
/// `Last` is a sentinel meaning "no specific type" — used by the splitter's
/// `split` entry point, as opposed to `split_at`, to mean "split evenly
/// without anchoring on a particular object type".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ObjType {
    Machine,
    Package,
    Core,
    Pu,
    L1Cache,
    L2Cache,
    L3Cache,
    L4Cache,
    L5Cache,
    NumaNode,
    Gpu,
    Last,
}

impl ObjType {
    /// True for every type except `Gpu` and `Last` — the topology-resident,
    /// non-device, non-sentinel types.
    pub fn is_host_resource(self) -> bool {
        !matches!(self, ObjType::Gpu | ObjType::Last)
    }

    pub fn is_device(self) -> bool {
        matches!(self, ObjType::Gpu)
    }

    /// The wire encoding used by the RMI protocol and the hardware-pool
    /// serializer; `Last` has no host-resource slot of its own on the wire
    /// and is encoded as `-1`.
    pub fn to_wire_i32(self) -> i32 {
        match self {
            ObjType::Machine => 0,
            ObjType::Package => 1,
            ObjType::Core => 2,
            ObjType::Pu => 3,
            ObjType::L1Cache => 4,
            ObjType::L2Cache => 5,
            ObjType::L3Cache => 6,
            ObjType::L4Cache => 7,
            ObjType::L5Cache => 8,
            ObjType::NumaNode => 9,
            ObjType::Gpu => 10,
            ObjType::Last => -1,
        }
    }

    /// Inverse of [`ObjType::to_wire_i32`]; unrecognized values decode as
    /// `Last` rather than erroring, matching a tolerant-of-newer-peers wire
    /// policy.
    pub fn from_wire_i32(v: i32) -> ObjType {
        match v {
            0 => ObjType::Machine,
            1 => ObjType::Package,
            2 => ObjType::Core,
            3 => ObjType::Pu,
            4 => ObjType::L1Cache,
            5 => ObjType::L2Cache,
            6 => ObjType::L3Cache,
            7 => ObjType::L4Cache,
            8 => ObjType::L5Cache,
            9 => ObjType::NumaNode,
            10 => ObjType::Gpu,
            _ => ObjType::Last,
        }
    }
}

/// Rendering chosen when formatting a device's identity for a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceIdFormat {
    Uuid,
    Pci,
    Ordinal,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_resource_predicate() {
        assert!(ObjType::Machine.is_host_resource());
        assert!(ObjType::Pu.is_host_resource());
        assert!(!ObjType::Gpu.is_host_resource());
        assert!(!ObjType::Last.is_host_resource());
    }
}
