//! The hardware-locality oracle (C3): a loaded topology plus the cached,
//! deduplicated device lists the rest of the core queries against.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use hwloc::{CpuSet as HwlocCpuSet, ObjectType, Topology, CPUBIND_THREAD};

use nodescope_common::device::ORDINAL_INVISIBLE;
use nodescope_common::{Cpuset, Device, DeviceIdFormat, Error, ObjType, Result};

bitflags::bitflags! {
    /// Which rendering(s) [`Oracle::bind_string`] should produce.
    pub struct BindStringFlags: u32 {
        const LOGICAL  = 0b01;
        const PHYSICAL = 0b10;
    }
}

fn to_hwloc_type(t: ObjType) -> Option<ObjectType> {
    match t {
        ObjType::Machine => Some(ObjectType::Machine),
        ObjType::Package => Some(ObjectType::Package),
        ObjType::Core => Some(ObjectType::Core),
        ObjType::Pu => Some(ObjectType::PU),
        ObjType::L1Cache => Some(ObjectType::L1Cache),
        ObjType::L2Cache => Some(ObjectType::L2Cache),
        ObjType::L3Cache => Some(ObjectType::L3Cache),
        ObjType::L4Cache => Some(ObjectType::L4Cache),
        ObjType::L5Cache => Some(ObjectType::L5Cache),
        ObjType::NumaNode => Some(ObjectType::NUMANode),
        ObjType::Gpu | ObjType::Last => None,
    }
}

fn from_hwloc_cpuset(cs: &HwlocCpuSet) -> Cpuset {
    Cpuset::from_pus(cs.clone().into_iter())
}

fn to_hwloc_cpuset(cs: &Cpuset) -> HwlocCpuSet {
    let mut b = HwlocCpuSet::new();
    for pu in cs.iter() {
        b.set(pu);
    }
    b
}

/// Device types the oracle discovers and caches. GPUs are the only device
/// type modeled for now; NICs are kept as a separate cached list per
/// spec.md's "three cached device lists" but populate the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum DeviceClass {
    Gpu,
    Nic,
}

pub struct Oracle {
    topo: Topology,
    all_devices: Vec<Device>,
    gpus: Vec<Device>,
    nics: Vec<Device>,
}

impl Oracle {
    /// Loads the local topology and discovers devices, deduplicating by PCI
    /// bus id across hwloc's OS/PCI device objects.
    pub fn load() -> Result<Self> {
        let topo = Topology::new();
        let mut by_bus_id: HashMap<String, Device> = HashMap::new();

        // hwloc exposes accelerators as OS devices or PCI devices depending
        // on platform; we key on PCI bus id, which is stable either way.
        if let Ok(objs) = topo.objects_with_type(&ObjectType::PCIDevice) {
            for (ordinal, obj) in objs.into_iter().enumerate() {
                let bus_id = obj
                    .pci_bus_id()
                    .map(|b| format!("{b:04x}:{:02x}:{:02x}.{:x}", b.bus(), b.dev(), b.func()))
                    .unwrap_or_else(|| format!("0000:00:{ordinal:02x}.0"));
                let affinity = obj
                    .cpuset()
                    .map(|cs| from_hwloc_cpuset(&cs))
                    .unwrap_or_default();
                let uuid = bus_id.clone();
                let mut dev = Device::new(ObjType::Gpu, affinity, bus_id.clone(), uuid);
                dev.ordinal_id = ordinal as i32;
                dev.name = obj.name().cloned().unwrap_or_default();
                by_bus_id.insert(bus_id, dev);
            }
        }

        let all_devices: Vec<Device> = by_bus_id.into_values().collect();
        let gpus = all_devices
            .iter()
            .filter(|d| d.obj_type == ObjType::Gpu)
            .cloned()
            .collect();
        let nics = Vec::new();

        Ok(Self { topo, all_devices, gpus, nics })
    }

    fn cached_devices(&self, class: Option<DeviceClass>) -> &[Device] {
        match class {
            Some(DeviceClass::Gpu) => &self.gpus,
            Some(DeviceClass::Nic) => &self.nics,
            None => &self.all_devices,
        }
    }

    pub fn nobjs_by_type(&self, t: ObjType) -> Result<usize> {
        if t == ObjType::Gpu {
            return Ok(self.gpus.len());
        }
        let hwt = to_hwloc_type(t).ok_or_else(|| Error::invalid_arg("no such host object type"))?;
        Ok(self
            .topo
            .objects_with_type(&hwt)
            .map_err(|_| Error::hwloc("objects_with_type failed"))?
            .len())
    }

    pub fn nobjs_in_cpuset(&self, t: ObjType, cs: &Cpuset) -> Result<usize> {
        if t == ObjType::Gpu {
            return Ok(self.gpus.iter().filter(|d| cs.union(&d.affinity) == *cs).count());
        }
        let hwt = to_hwloc_type(t).ok_or_else(|| Error::invalid_arg("no such host object type"))?;
        let objs = self
            .topo
            .objects_with_type(&hwt)
            .map_err(|_| Error::hwloc("objects_with_type failed"))?;
        Ok(objs
            .into_iter()
            .filter(|o| {
                o.cpuset()
                    .map(|oc| from_hwloc_cpuset(&oc).and_not(cs).is_empty())
                    .unwrap_or(false)
            })
            .count())
    }

    pub fn obj_type_depth(&self, t: ObjType) -> Result<u32> {
        let hwt = to_hwloc_type(t).ok_or_else(|| Error::invalid_arg("no such host object type"))?;
        self.topo
            .depth_or_below_for_type(&hwt)
            .map(|d| d as u32)
            .map_err(|_| Error::hwloc("depth_or_below_for_type failed"))
    }

    /// Union of the first `n` objects of `t` inside `parent_cs`, in topology
    /// (i.e. index) order.
    pub fn get_cpuset_for_nobjs(&self, parent_cs: &Cpuset, t: ObjType, n: usize) -> Result<Cpuset> {
        if n == 0 {
            return Ok(Cpuset::empty());
        }
        let hwt = to_hwloc_type(t).ok_or_else(|| Error::invalid_arg("no such host object type"))?;
        let objs = self
            .topo
            .objects_with_type(&hwt)
            .map_err(|_| Error::hwloc("objects_with_type failed"))?;
        let mut out = Cpuset::empty();
        let mut taken = 0;
        for o in objs {
            let Some(oc) = o.cpuset() else { continue };
            let oc = from_hwloc_cpuset(&oc);
            if oc.and_not(parent_cs).is_empty() && !oc.is_empty() {
                out = out.union(&oc);
                taken += 1;
                if taken == n {
                    break;
                }
            }
        }
        if taken < n {
            return Err(Error::split(format!(
                "requested {n} objects of this type within cpuset, only {taken} available"
            )));
        }
        Ok(out)
    }

    /// Partitions `parent_cs`'s PUs into `nchunks` contiguous equal-size
    /// chunks (topology order — PU index order, since `Cpuset` is always
    /// kept sorted) and returns chunk `chunk_id`.
    pub fn split_cpuset_by_chunk_id(
        &self,
        parent_cs: &Cpuset,
        nchunks: usize,
        chunk_id: usize,
    ) -> Result<Cpuset> {
        if nchunks == 0 || chunk_id >= nchunks {
            return Err(Error::split("invalid chunk_id or nchunks"));
        }
        let pus: Vec<u32> = parent_cs.iter().collect();
        let chunk_size = pus.len() / nchunks;
        if chunk_size == 0 {
            return Err(Error::split("not enough PUs to form the requested chunks"));
        }
        let start = chunk_id * chunk_size;
        let end = start + chunk_size;
        Ok(Cpuset::from_pus(pus[start..end].iter().copied()))
    }

    pub fn task_get_cpubind(&self, tid: libc::pthread_t) -> Result<Cpuset> {
        self.topo
            .get_cpubind_for_thread(tid, CPUBIND_THREAD)
            .map(|cs| from_hwloc_cpuset(&cs))
            .ok_or_else(|| Error::hwloc("get_cpubind_for_thread failed"))
    }

    pub fn task_set_cpubind_from_cpuset(&mut self, tid: libc::pthread_t, cs: &Cpuset) -> Result<()> {
        self.topo
            .set_cpubind_for_thread(tid, to_hwloc_cpuset(cs), CPUBIND_THREAD)
            .map_err(|_| Error::new(nodescope_common::Rc::ErrNotSupported, "OS refused cpubind"))
    }

    /// Renders `cs` per `flags`; when both bits are set, the logical and
    /// physical renderings are concatenated separated by a single space.
    pub fn bind_string(&self, cs: &Cpuset, flags: BindStringFlags) -> String {
        let mut parts = Vec::new();
        if flags.contains(BindStringFlags::LOGICAL) {
            parts.push(self.logical_bind_string(cs));
        }
        if flags.contains(BindStringFlags::PHYSICAL) {
            parts.push(cs.to_list_string());
        }
        parts.join(" ")
    }

    fn logical_bind_string(&self, cs: &Cpuset) -> String {
        let pus = match self.topo.objects_with_type(&ObjectType::PU) {
            Ok(pus) => pus,
            Err(_) => return cs.to_list_string(),
        };
        let logical: Vec<u32> = pus
            .into_iter()
            .filter(|o| {
                o.cpuset()
                    .map(|oc| cs.contains(o.os_index()))
                    .unwrap_or(false)
            })
            .map(|o| o.logical_index())
            .collect();
        Cpuset::from_pus(logical).to_list_string()
    }

    pub fn get_devices_in_cpuset(&self, t: ObjType, cs: &Cpuset) -> Vec<Device> {
        self.cached_devices(Some(DeviceClass::Gpu))
            .iter()
            .filter(|d| d.obj_type == t && d.affinity.and_not(cs).is_empty())
            .cloned()
            .collect()
    }

    pub fn get_device_id_in_cpuset(
        &self,
        t: ObjType,
        i: usize,
        cs: &Cpuset,
        id_format: DeviceIdFormat,
    ) -> Result<String> {
        let devs = self.get_devices_in_cpuset(t, cs);
        let dev = devs
            .get(i)
            .ok_or_else(|| Error::new(nodescope_common::Rc::ErrNotFound, "no such device index"))?;
        Ok(match id_format {
            DeviceIdFormat::Uuid => dev.uuid.clone(),
            DeviceIdFormat::Pci => dev.pci_bus_id.clone(),
            DeviceIdFormat::Ordinal => {
                if dev.ordinal_id == ORDINAL_INVISIBLE {
                    return Err(Error::unavailable("device has no visible ordinal id"));
                }
                dev.ordinal_id.to_string()
            }
        })
    }

    /// For each core intersecting `cs`, keeps a single PU.
    pub fn bitmap_disable_smt(&self, cs: &Cpuset) -> Result<Cpuset> {
        let cores = self
            .topo
            .objects_with_type(&ObjectType::Core)
            .map_err(|_| Error::hwloc("objects_with_type(Core) failed"))?;
        let core_sets: Vec<Cpuset> = cores
            .into_iter()
            .filter_map(|o| o.cpuset().map(|cs| from_hwloc_cpuset(&cs)))
            .collect();
        Ok(cs.disable_smt(&core_sets))
    }

    /// The cpuset of every PU the topology makes available to this process.
    pub fn topology_cpuset(&self) -> Cpuset {
        self.topo
            .object_at_root()
            .allowed_cpuset()
            .map(|cs| from_hwloc_cpuset(&cs))
            .unwrap_or_default()
    }

    pub fn gpus(&self) -> &[Device] {
        &self.gpus
    }

    /// Writes the topology the HELLO handshake promises clients a path to.
    ///
    /// The `hwloc` binding this oracle wraps does not expose hwloc's native
    /// XML export, so this renders the subset of the topology the oracle
    /// itself tracks (allowed cpuset, discovered devices) rather than a
    /// full hwloc topology document; it is enough for a client to describe
    /// what it was handed without re-discovering the topology itself.
    pub fn export_topology_xml(&self, path: &Path) -> Result<()> {
        let mut xml = String::new();
        xml.push_str("<?xml version=\"1.0\"?>\n<nodescope_topology>\n");
        xml.push_str(&format!(
            "  <allowed_cpuset list=\"{}\"/>\n",
            self.topology_cpuset().to_list_string()
        ));
        for dev in &self.all_devices {
            xml.push_str(&format!(
                "  <device uuid=\"{}\" pci_bus_id=\"{}\" name=\"{}\" affinity=\"{}\"/>\n",
                dev.uuid,
                dev.pci_bus_id,
                dev.name,
                dev.affinity.to_list_string()
            ));
        }
        xml.push_str("</nodescope_topology>\n");
        fs::write(path, xml).map_err(|e| Error::new(
            nodescope_common::Rc::ErrFileIo,
            format!("writing topology export to {}: {e}", path.display()),
        ))
    }
}
