//! 内存清单
//!
//! 在进程内模拟远程清单服务，用于测试夹具和离线模式（`--inventory-file`）。
//! 提交的变更操作会按远程服务的语义作用到内存树上，并记录下来供调用方检查。
//!
//! # 示例
//!
//! ```ignore
//! use vmops_inventory::memory::{MemoryInventory, VmSeed};
//!
//! let inv = MemoryInventory::new();
//! let dc = inv.add_datacenter(&inv.root(), "dc1");
//! let folders = inv.folders_of(&dc)?;
//! let cluster = inv.add_cluster(&folders.host, "cluster-a");
//! let host = inv.add_host(&cluster, "esx-01", false);
//! let ds = inv.add_datastore(&folders.datastore, "ds-01", 100 << 30, 500 << 30);
//! inv.attach(&host, &ds);
//! ```

mod snapshot;

pub use snapshot::{InventorySnapshot, SnapshotEntry};

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

use crate::error::{InventoryError, Result};
use crate::models::{
    ArrayUpdateOperation, ComputeResourceSummary, ConnectInfo, CustomizationIdentity,
    CustomizationSpecItem, DatacenterFolders, DatastoreSummary, DeviceInfo, DeviceOperation,
    DvsInfo, EthernetAdapter, EventFilter, EventRecursion, EventType, FaultKind, GuestInfo,
    HostSummary, InventoryEvent, InventoryObject, IpAssignment, MacAddressType,
    ManagedObjectRef, NetworkSummary, NicBacking, ObjectKind, PowerState, RemoteFault,
    SnapshotNode, SnapshotTree, TaskHandle, TaskOperation, TaskResult, VAppProperty,
    VirtualDevice, VmConfigInfo, VmConfigSpec, VmSummary,
};
use crate::service::InventoryService;

/// 虚拟机夹具参数
#[derive(Debug, Clone)]
pub struct VmSeed {
    pub name: String,
    pub guest_id: String,
    pub guest_full_name: String,
    pub template: bool,
    pub num_cpu: i32,
    pub num_cores_per_socket: i32,
    pub memory_mb: i64,
    pub devices: Vec<VirtualDevice>,
    pub vapp_properties: Vec<VAppProperty>,
    pub power_state: PowerState,
    pub host: Option<ManagedObjectRef>,
}

impl VmSeed {
    /// Linux 虚拟机夹具
    pub fn linux(name: &str) -> Self {
        Self {
            name: name.to_string(),
            guest_id: "ubuntu64Guest".to_string(),
            guest_full_name: "Ubuntu Linux (64-bit)".to_string(),
            template: false,
            num_cpu: 2,
            num_cores_per_socket: 1,
            memory_mb: 4096,
            devices: Vec::new(),
            vapp_properties: Vec::new(),
            power_state: PowerState::PoweredOff,
            host: None,
        }
    }

    /// Windows 虚拟机夹具
    pub fn windows(name: &str) -> Self {
        Self {
            guest_id: "windows2019srv_64Guest".to_string(),
            guest_full_name: "Microsoft Windows Server 2019 (64-bit)".to_string(),
            ..Self::linux(name)
        }
    }

    pub fn template(mut self) -> Self {
        self.template = true;
        self
    }

    pub fn with_guest(mut self, guest_id: &str, guest_full_name: &str) -> Self {
        self.guest_id = guest_id.to_string();
        self.guest_full_name = guest_full_name.to_string();
        self
    }

    /// 追加一块 vmxnet3 网卡，key 从 4000 开始
    pub fn with_nic(mut self, network: Option<(&ManagedObjectRef, &str)>) -> Self {
        let index = self.devices.iter().filter(|d| d.is_ethernet()).count() as i32;
        self.devices.push(VirtualDevice {
            key: 4000 + index,
            label: format!("Network adapter {}", index + 1),
            controller_key: Some(100),
            unit_number: Some(7 + index),
            connectable: Some(ConnectInfo::connected(true)),
            info: DeviceInfo::Ethernet {
                adapter: EthernetAdapter::Vmxnet3,
                backing: network.map(|(moref, name)| NicBacking::Network {
                    network: moref.clone(),
                    device_name: name.to_string(),
                }),
                mac_address: Some(format!("00:50:56:00:00:{:02x}", index + 1)),
                address_type: MacAddressType::Assigned,
            },
        });
        self
    }

    /// 追加一块磁盘（挂在 SCSI 控制器 1000 上，控制器不存在时自动补齐）
    pub fn with_disk(mut self, capacity_gb: u64) -> Self {
        if !self.devices.iter().any(|d| d.key == 1000) {
            self.devices.push(VirtualDevice {
                key: 1000,
                label: "SCSI controller 0".to_string(),
                controller_key: Some(100),
                unit_number: Some(3),
                connectable: None,
                info: DeviceInfo::ScsiController { bus_number: 0 },
            });
        }
        let index = self.devices.iter().filter(|d| d.is_disk()).count() as i32;
        self.devices.push(VirtualDevice {
            key: 2000 + index,
            label: format!("Hard disk {}", index + 1),
            controller_key: Some(1000),
            unit_number: Some(index),
            connectable: None,
            info: DeviceInfo::Disk {
                capacity_kb: capacity_gb * 1024 * 1024,
                thin: false,
                file_name: Some(format!("[datastore] {}/{}.vmdk", self.name, self.name)),
                datastore: None,
            },
        });
        self
    }

    pub fn with_vapp_property(mut self, key: i32, id: &str, value: &str) -> Self {
        self.vapp_properties.push(VAppProperty {
            key,
            id: id.to_string(),
            label: None,
            value: value.to_string(),
            user_configurable: true,
        });
        self
    }

    pub fn on_host(mut self, host: &ManagedObjectRef) -> Self {
        self.host = Some(host.clone());
        self
    }
}

#[derive(Debug, Clone)]
struct VmState {
    config: VmConfigInfo,
    power_state: PowerState,
    guest: GuestInfo,
    /// 剩余多少次 guest_info 查询仍返回无 IP
    ip_delay: u32,
    host: Option<ManagedObjectRef>,
    snapshots: SnapshotTree,
}

#[derive(Debug, Clone)]
enum NodeProps {
    Container,
    Host {
        in_maintenance_mode: bool,
        datastores: Vec<ManagedObjectRef>,
        networks: Vec<ManagedObjectRef>,
    },
    Datastore {
        free_space: u64,
        capacity: u64,
    },
    Network {
        dvs: Option<DvsInfo>,
        portgroup_key: Option<String>,
    },
    Vm(Box<VmState>),
}

#[derive(Debug, Clone)]
struct Node {
    name: String,
    parent: Option<ManagedObjectRef>,
    children: Vec<ManagedObjectRef>,
    props: NodeProps,
}

#[derive(Debug, Default)]
struct State {
    nodes: HashMap<ManagedObjectRef, Node>,
    root: Option<ManagedObjectRef>,
    next_id: u64,
    dc_folders: HashMap<ManagedObjectRef, DatacenterFolders>,
    root_pools: HashMap<ManagedObjectRef, ManagedObjectRef>,
    snapshot_owner: HashMap<ManagedObjectRef, ManagedObjectRef>,
    customization_specs: Vec<CustomizationSpecItem>,
    events: Vec<InventoryEvent>,
    pending_faults: Vec<(String, RemoteFault)>,
    submitted: Vec<TaskOperation>,
    tasks: HashMap<String, TaskResult>,
}

/// 内存清单服务
pub struct MemoryInventory {
    state: Mutex<State>,
}

impl Default for MemoryInventory {
    fn default() -> Self {
        Self::new()
    }
}

fn id_prefix(kind: ObjectKind) -> &'static str {
    match kind {
        ObjectKind::Folder => "group",
        ObjectKind::Datacenter => "datacenter",
        ObjectKind::ComputeResource => "domain-s",
        ObjectKind::ClusterComputeResource => "domain-c",
        ObjectKind::ResourcePool => "resgroup",
        ObjectKind::VirtualApp => "resgroup-v",
        ObjectKind::StoragePod => "group-p",
        ObjectKind::HostSystem => "host",
        ObjectKind::Datastore => "datastore",
        ObjectKind::Network => "network",
        ObjectKind::DistributedPortGroup => "dvportgroup",
        ObjectKind::VirtualMachine => "vm",
        ObjectKind::VirtualMachineSnapshot => "snapshot",
    }
}

/// ID 末尾的序号即创建顺序
fn creation_order(moref: &ManagedObjectRef) -> u64 {
    moref
        .id
        .rsplit('-')
        .next()
        .and_then(|n| n.parse().ok())
        .unwrap_or(u64::MAX)
}

fn not_found(moref: &ManagedObjectRef) -> InventoryError {
    InventoryError::ObjectNotFound(moref.to_string())
}

impl State {
    fn alloc(&mut self, kind: ObjectKind) -> ManagedObjectRef {
        self.next_id += 1;
        ManagedObjectRef::new(kind, format!("{}-{}", id_prefix(kind), self.next_id))
    }

    fn insert_node(
        &mut self,
        parent: Option<&ManagedObjectRef>,
        kind: ObjectKind,
        name: &str,
        props: NodeProps,
        visible: bool,
    ) -> ManagedObjectRef {
        let moref = self.alloc(kind);
        self.nodes.insert(
            moref.clone(),
            Node {
                name: name.to_string(),
                parent: parent.cloned(),
                children: Vec::new(),
                props,
            },
        );
        if visible {
            if let Some(parent) = parent.and_then(|p| self.nodes.get_mut(p)) {
                parent.children.push(moref.clone());
            }
        }
        moref
    }

    fn insert(
        &mut self,
        parent: &ManagedObjectRef,
        kind: ObjectKind,
        name: &str,
        props: NodeProps,
    ) -> ManagedObjectRef {
        self.insert_node(Some(parent), kind, name, props, true)
    }

    fn node(&self, moref: &ManagedObjectRef) -> Result<&Node> {
        self.nodes.get(moref).ok_or_else(|| not_found(moref))
    }

    fn node_mut(&mut self, moref: &ManagedObjectRef) -> Result<&mut Node> {
        self.nodes.get_mut(moref).ok_or_else(|| not_found(moref))
    }

    fn vm(&self, moref: &ManagedObjectRef) -> Result<&VmState> {
        match &self.node(moref)?.props {
            NodeProps::Vm(vm) => Ok(vm),
            _ => Err(kind_mismatch(ObjectKind::VirtualMachine, moref)),
        }
    }

    fn vm_mut(&mut self, moref: &ManagedObjectRef) -> Result<&mut VmState> {
        match &mut self.node_mut(moref)?.props {
            NodeProps::Vm(vm) => Ok(vm),
            _ => Err(kind_mismatch(ObjectKind::VirtualMachine, moref)),
        }
    }

    fn object(&self, moref: &ManagedObjectRef) -> Option<InventoryObject> {
        self.nodes
            .get(moref)
            .map(|n| InventoryObject::new(moref.clone(), n.name.clone()))
    }

    fn is_descendant(&self, candidate: &ManagedObjectRef, ancestor: &ManagedObjectRef) -> bool {
        let mut current = self.nodes.get(candidate).and_then(|n| n.parent.clone());
        while let Some(parent) = current {
            if &parent == ancestor {
                return true;
            }
            current = self.nodes.get(&parent).and_then(|n| n.parent.clone());
        }
        false
    }

    fn detach(&mut self, moref: &ManagedObjectRef) {
        let parent = self.nodes.get(moref).and_then(|n| n.parent.clone());
        if let Some(parent) = parent.and_then(|p| self.nodes.get_mut(&p)) {
            parent.children.retain(|c| c != moref);
        }
    }

    fn push_event(&mut self, entity: &ManagedObjectRef, event_type: EventType, message: String) {
        let key = self.events.len() as i64 + 1;
        self.events.push(InventoryEvent {
            key,
            event_type,
            entity: entity.clone(),
            created_time: Utc::now(),
            full_formatted_message: message,
        });
    }

    fn take_injected_fault(&mut self, label: &str) -> Option<RemoteFault> {
        let index = self.pending_faults.iter().position(|(l, _)| l == label)?;
        Some(self.pending_faults.remove(index).1)
    }

    fn apply(&mut self, operation: &TaskOperation) -> Result<TaskResult> {
        if let Some(fault) = self.take_injected_fault(operation.label()) {
            // 网卡数量不符时远程服务已经完成克隆，只是没有完成定制
            if matches!(fault.kind, FaultKind::NicSettingMismatch { .. }) {
                self.apply_unfaulted(operation)?;
            }
            return Ok(TaskResult::Faulted(fault));
        }
        self.apply_unfaulted(operation)
    }

    fn apply_unfaulted(&mut self, operation: &TaskOperation) -> Result<TaskResult> {
        match operation {
            TaskOperation::CloneVm {
                vm,
                folder,
                name,
                spec,
            } => {
                let duplicate = self
                    .node(folder)?
                    .children
                    .iter()
                    .find(|c| {
                        c.kind == ObjectKind::VirtualMachine
                            && self.nodes.get(*c).map(|n| &n.name) == Some(name)
                    })
                    .cloned();
                if let Some(existing) = duplicate {
                    return Ok(TaskResult::Faulted(RemoteFault::new(
                        FaultKind::DuplicateName {
                            name: name.clone(),
                            object: Some(existing),
                        },
                        format!("The name '{}' already exists.", name),
                    )));
                }

                let source = self.vm(vm)?.clone();
                let mut config = source.config.clone();
                config.name = name.clone();
                config.template = spec.template;
                config.current_snapshot = None;
                if let Some(change) = &spec.config {
                    apply_config_spec(&mut config, change);
                }

                let mut guest = GuestInfo::default();
                if let Some(custom) = &spec.customization {
                    guest.host_name = match &custom.identity {
                        Some(CustomizationIdentity::LinuxPrep(id)) => Some(id.host_name.clone()),
                        Some(CustomizationIdentity::Sysprep(id)) => Some(id.computer_name.clone()),
                        None => None,
                    };
                    guest.ip_address = custom.nic_setting_map.iter().find_map(|m| match &m.adapter.ip {
                        IpAssignment::Fixed { address } => Some(address.clone()),
                        IpAssignment::Dhcp => None,
                    });
                }

                let new_vm = self.insert(
                    folder,
                    ObjectKind::VirtualMachine,
                    name,
                    NodeProps::Vm(Box::new(VmState {
                        config,
                        power_state: if spec.power_on {
                            PowerState::PoweredOn
                        } else {
                            PowerState::PoweredOff
                        },
                        guest,
                        ip_delay: 0,
                        host: spec.location.host.clone().or(source.host),
                        snapshots: SnapshotTree::default(),
                    })),
                );

                if spec.power_on {
                    self.push_event(&new_vm, EventType::VmPoweredOn, format!("{} 已开机", name));
                    if spec.customization.is_some() {
                        self.push_event(
                            &new_vm,
                            EventType::CustomizationSucceeded,
                            format!("Customization of VM {} succeeded.", name),
                        );
                    }
                }

                Ok(TaskResult::Succeeded {
                    result: Some(new_vm),
                })
            }
            TaskOperation::Reconfigure { vm, spec } => {
                apply_config_spec(&mut self.vm_mut(vm)?.config, spec);
                Ok(TaskResult::Succeeded { result: None })
            }
            TaskOperation::Relocate { vm, spec, .. } => {
                let state = self.vm_mut(vm)?;
                if let Some(host) = &spec.host {
                    state.host = Some(host.clone());
                }
                Ok(TaskResult::Succeeded { result: None })
            }
            TaskOperation::PowerOn { vm } => {
                self.set_power(vm, PowerState::PoweredOn)?;
                self.push_event(vm, EventType::VmPoweredOn, "虚拟机已开机".to_string());
                Ok(TaskResult::Succeeded { result: None })
            }
            TaskOperation::PowerOff { vm } => {
                self.set_power(vm, PowerState::PoweredOff)?;
                self.push_event(vm, EventType::VmPoweredOff, "虚拟机已关机".to_string());
                Ok(TaskResult::Succeeded { result: None })
            }
            TaskOperation::Reset { vm } => {
                self.set_power(vm, PowerState::PoweredOn)?;
                Ok(TaskResult::Succeeded { result: None })
            }
            TaskOperation::Suspend { vm } => {
                self.set_power(vm, PowerState::Suspended)?;
                Ok(TaskResult::Succeeded { result: None })
            }
            TaskOperation::Rename { entity, new_name } => {
                let node = self.node_mut(entity)?;
                node.name = new_name.clone();
                if let NodeProps::Vm(vm) = &mut node.props {
                    vm.config.name = new_name.clone();
                }
                Ok(TaskResult::Succeeded { result: None })
            }
            TaskOperation::MoveIntoFolder { folder, entities } => {
                self.node(folder)?;
                for entity in entities {
                    self.node(entity)?;
                    self.detach(entity);
                    self.node_mut(entity)?.parent = Some(folder.clone());
                    self.node_mut(folder)?.children.push(entity.clone());
                }
                Ok(TaskResult::Succeeded { result: None })
            }
            TaskOperation::CreateSnapshot {
                vm,
                name,
                description,
                memory,
                ..
            } => {
                let snapshot = self.alloc(ObjectKind::VirtualMachineSnapshot);
                let state = self.vm_mut(vm)?;
                let node = SnapshotNode {
                    snapshot: snapshot.clone(),
                    name: name.clone(),
                    description: description.clone(),
                    create_time: Utc::now(),
                    state: if *memory {
                        state.power_state
                    } else {
                        PowerState::PoweredOff
                    },
                    children: Vec::new(),
                };
                let parent = state.snapshots.current.clone();
                match parent.and_then(|p| find_snapshot_mut(&mut state.snapshots.roots, &p)) {
                    Some(parent) => parent.children.push(node),
                    None => state.snapshots.roots.push(node),
                }
                state.snapshots.current = Some(snapshot.clone());
                self.snapshot_owner.insert(snapshot.clone(), vm.clone());
                Ok(TaskResult::Succeeded {
                    result: Some(snapshot),
                })
            }
            TaskOperation::RevertToSnapshot { snapshot } => {
                let owner = self
                    .snapshot_owner
                    .get(snapshot)
                    .cloned()
                    .ok_or_else(|| not_found(snapshot))?;
                let state = self.vm_mut(&owner)?;
                let power = find_snapshot_mut(&mut state.snapshots.roots, snapshot)
                    .map(|n| n.state)
                    .ok_or_else(|| not_found(snapshot))?;
                state.snapshots.current = Some(snapshot.clone());
                state.power_state = power;
                Ok(TaskResult::Succeeded { result: None })
            }
            TaskOperation::RevertToCurrentSnapshot { vm } => {
                let state = self.vm(vm)?;
                if state.snapshots.current.is_none() {
                    return Ok(TaskResult::Faulted(RemoteFault::new(
                        FaultKind::Other {
                            fault_type: "NotFound".to_string(),
                        },
                        "虚拟机没有当前快照",
                    )));
                }
                Ok(TaskResult::Succeeded { result: None })
            }
            TaskOperation::RemoveSnapshot {
                snapshot,
                remove_children,
            } => {
                let owner = self
                    .snapshot_owner
                    .remove(snapshot)
                    .ok_or_else(|| not_found(snapshot))?;
                let state = self.vm_mut(&owner)?;
                remove_snapshot(&mut state.snapshots.roots, snapshot, *remove_children);
                let current_alive = state
                    .snapshots
                    .current
                    .as_ref()
                    .map(|c| contains_snapshot(&state.snapshots.roots, c))
                    .unwrap_or(false);
                if !current_alive {
                    state.snapshots.current = None;
                }
                Ok(TaskResult::Succeeded { result: None })
            }
            TaskOperation::Destroy { entity } => {
                self.node(entity)?;
                self.detach(entity);
                self.nodes.remove(entity);
                Ok(TaskResult::Succeeded { result: None })
            }
        }
    }

    fn set_power(&mut self, vm: &ManagedObjectRef, power: PowerState) -> Result<()> {
        self.vm_mut(vm)?.power_state = power;
        Ok(())
    }
}

fn kind_mismatch(expected: ObjectKind, actual: &ManagedObjectRef) -> InventoryError {
    InventoryError::KindMismatch {
        expected: expected.type_name().to_string(),
        actual: actual.to_string(),
    }
}

fn apply_config_spec(config: &mut VmConfigInfo, spec: &VmConfigSpec) {
    if let Some(cpus) = spec.num_cpus {
        config.num_cpu = cpus;
    }
    if let Some(cores) = spec.num_cores_per_socket {
        config.num_cores_per_socket = cores;
    }
    if let Some(memory) = spec.memory_mb {
        config.memory_mb = memory;
    }
    if let Some(annotation) = &spec.annotation {
        config.annotation = Some(annotation.clone());
    }

    for change in &spec.device_change {
        match change.operation {
            DeviceOperation::Add => {
                let mut device = change.device.clone();
                if device.key < 0 {
                    device.key = config.devices.iter().map(|d| d.key).max().unwrap_or(0) + 1;
                }
                config.devices.push(device);
            }
            DeviceOperation::Edit => {
                if let Some(existing) = config
                    .devices
                    .iter_mut()
                    .find(|d| d.key == change.device.key)
                {
                    *existing = change.device.clone();
                }
            }
            DeviceOperation::Remove => config.devices.retain(|d| d.key != change.device.key),
        }
    }

    for change in &spec.vapp_properties {
        match change.operation {
            ArrayUpdateOperation::Add => config.vapp_properties.push(change.info.clone()),
            ArrayUpdateOperation::Edit => {
                if let Some(existing) = config
                    .vapp_properties
                    .iter_mut()
                    .find(|p| p.key == change.info.key)
                {
                    *existing = change.info.clone();
                }
            }
            ArrayUpdateOperation::Remove => config
                .vapp_properties
                .retain(|p| p.key != change.info.key),
        }
    }
}

fn find_snapshot_mut<'a>(
    nodes: &'a mut [SnapshotNode],
    target: &ManagedObjectRef,
) -> Option<&'a mut SnapshotNode> {
    for node in nodes.iter_mut() {
        if &node.snapshot == target {
            return Some(node);
        }
        if let Some(found) = find_snapshot_mut(&mut node.children, target) {
            return Some(found);
        }
    }
    None
}

fn contains_snapshot(nodes: &[SnapshotNode], target: &ManagedObjectRef) -> bool {
    nodes
        .iter()
        .any(|n| &n.snapshot == target || contains_snapshot(&n.children, target))
}

fn remove_snapshot(
    nodes: &mut Vec<SnapshotNode>,
    target: &ManagedObjectRef,
    remove_children: bool,
) -> bool {
    if let Some(pos) = nodes.iter().position(|n| &n.snapshot == target) {
        let removed = nodes.remove(pos);
        if !remove_children {
            for (offset, child) in removed.children.into_iter().enumerate() {
                nodes.insert(pos + offset, child);
            }
        }
        return true;
    }
    nodes
        .iter_mut()
        .any(|n| remove_snapshot(&mut n.children, target, remove_children))
}

impl MemoryInventory {
    /// 创建只有根文件夹的空清单
    pub fn new() -> Self {
        let mut state = State::default();
        let root = state.insert_node(None, ObjectKind::Folder, "Datacenters", NodeProps::Container, false);
        state.root = Some(root);
        Self {
            state: Mutex::new(state),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ============================================
    // 夹具构建
    // ============================================

    /// 根文件夹
    pub fn root(&self) -> ManagedObjectRef {
        let state = self.lock();
        state
            .root
            .clone()
            .unwrap_or_else(|| ManagedObjectRef::new(ObjectKind::Folder, "group-1"))
    }

    pub fn add_folder(&self, parent: &ManagedObjectRef, name: &str) -> ManagedObjectRef {
        self.lock()
            .insert(parent, ObjectKind::Folder, name, NodeProps::Container)
    }

    /// 创建数据中心及其 vm/host/datastore/network 四个根文件夹
    pub fn add_datacenter(&self, parent: &ManagedObjectRef, name: &str) -> ManagedObjectRef {
        let mut state = self.lock();
        let dc = state.insert(parent, ObjectKind::Datacenter, name, NodeProps::Container);
        let folders = DatacenterFolders {
            vm: state.insert(&dc, ObjectKind::Folder, "vm", NodeProps::Container),
            host: state.insert(&dc, ObjectKind::Folder, "host", NodeProps::Container),
            datastore: state.insert(&dc, ObjectKind::Folder, "datastore", NodeProps::Container),
            network: state.insert(&dc, ObjectKind::Folder, "network", NodeProps::Container),
        };
        state.dc_folders.insert(dc.clone(), folders);
        dc
    }

    /// 数据中心根文件夹（同步版本，便于构建夹具）
    pub fn folders_of(&self, datacenter: &ManagedObjectRef) -> Result<DatacenterFolders> {
        self.lock()
            .dc_folders
            .get(datacenter)
            .cloned()
            .ok_or_else(|| not_found(datacenter))
    }

    fn add_compute(
        &self,
        parent: &ManagedObjectRef,
        kind: ObjectKind,
        name: &str,
    ) -> ManagedObjectRef {
        let mut state = self.lock();
        let cr = state.insert(parent, kind, name, NodeProps::Container);
        let pool = state.insert_node(
            Some(&cr),
            ObjectKind::ResourcePool,
            "Resources",
            NodeProps::Container,
            false,
        );
        state.root_pools.insert(cr.clone(), pool);
        cr
    }

    /// 创建集群（自带名为 Resources 的根资源池）
    pub fn add_cluster(&self, parent: &ManagedObjectRef, name: &str) -> ManagedObjectRef {
        self.add_compute(parent, ObjectKind::ClusterComputeResource, name)
    }

    /// 创建独立计算资源
    pub fn add_compute_resource(&self, parent: &ManagedObjectRef, name: &str) -> ManagedObjectRef {
        self.add_compute(parent, ObjectKind::ComputeResource, name)
    }

    /// 计算资源的根资源池
    pub fn root_pool_of(&self, compute: &ManagedObjectRef) -> Result<ManagedObjectRef> {
        self.lock()
            .root_pools
            .get(compute)
            .cloned()
            .ok_or_else(|| not_found(compute))
    }

    pub fn add_host(
        &self,
        compute: &ManagedObjectRef,
        name: &str,
        in_maintenance_mode: bool,
    ) -> ManagedObjectRef {
        self.lock().insert(
            compute,
            ObjectKind::HostSystem,
            name,
            NodeProps::Host {
                in_maintenance_mode,
                datastores: Vec::new(),
                networks: Vec::new(),
            },
        )
    }

    /// 创建资源池；父对象为计算资源时挂到其根资源池下
    pub fn add_resource_pool(&self, parent: &ManagedObjectRef, name: &str) -> ManagedObjectRef {
        self.add_pool_like(parent, ObjectKind::ResourcePool, name)
    }

    pub fn add_vapp(&self, parent: &ManagedObjectRef, name: &str) -> ManagedObjectRef {
        self.add_pool_like(parent, ObjectKind::VirtualApp, name)
    }

    fn add_pool_like(
        &self,
        parent: &ManagedObjectRef,
        kind: ObjectKind,
        name: &str,
    ) -> ManagedObjectRef {
        let mut state = self.lock();
        let parent = state
            .root_pools
            .get(parent)
            .cloned()
            .unwrap_or_else(|| parent.clone());
        state.insert(&parent, kind, name, NodeProps::Container)
    }

    pub fn add_storage_pod(&self, parent: &ManagedObjectRef, name: &str) -> ManagedObjectRef {
        self.lock()
            .insert(parent, ObjectKind::StoragePod, name, NodeProps::Container)
    }

    pub fn add_datastore(
        &self,
        parent: &ManagedObjectRef,
        name: &str,
        free_space: u64,
        capacity: u64,
    ) -> ManagedObjectRef {
        self.lock().insert(
            parent,
            ObjectKind::Datastore,
            name,
            NodeProps::Datastore {
                free_space,
                capacity,
            },
        )
    }

    pub fn add_network(&self, parent: &ManagedObjectRef, name: &str) -> ManagedObjectRef {
        self.lock().insert(
            parent,
            ObjectKind::Network,
            name,
            NodeProps::Network {
                dvs: None,
                portgroup_key: None,
            },
        )
    }

    pub fn add_portgroup(
        &self,
        parent: &ManagedObjectRef,
        name: &str,
        dvs: DvsInfo,
        portgroup_key: &str,
    ) -> ManagedObjectRef {
        self.lock().insert(
            parent,
            ObjectKind::DistributedPortGroup,
            name,
            NodeProps::Network {
                dvs: Some(dvs),
                portgroup_key: Some(portgroup_key.to_string()),
            },
        )
    }

    /// 将数据存储或网络挂载到主机
    pub fn attach(&self, host: &ManagedObjectRef, object: &ManagedObjectRef) {
        let mut state = self.lock();
        if let Some(Node {
            props:
                NodeProps::Host {
                    datastores,
                    networks,
                    ..
                },
            ..
        }) = state.nodes.get_mut(host)
        {
            match object.kind {
                ObjectKind::Datastore => datastores.push(object.clone()),
                ObjectKind::Network | ObjectKind::DistributedPortGroup => {
                    networks.push(object.clone())
                }
                _ => {}
            }
        }
    }

    pub fn set_maintenance(&self, host: &ManagedObjectRef, in_maintenance: bool) {
        if let Some(Node {
            props:
                NodeProps::Host {
                    in_maintenance_mode,
                    ..
                },
            ..
        }) = self.lock().nodes.get_mut(host)
        {
            *in_maintenance_mode = in_maintenance;
        }
    }

    pub fn add_vm(&self, folder: &ManagedObjectRef, seed: VmSeed) -> ManagedObjectRef {
        let config = VmConfigInfo {
            name: seed.name.clone(),
            guest_id: seed.guest_id,
            guest_full_name: seed.guest_full_name,
            template: seed.template,
            num_cpu: seed.num_cpu,
            num_cores_per_socket: seed.num_cores_per_socket,
            memory_mb: seed.memory_mb,
            annotation: None,
            devices: seed.devices,
            vapp_properties: seed.vapp_properties,
            current_snapshot: None,
        };
        self.lock().insert(
            folder,
            ObjectKind::VirtualMachine,
            &seed.name,
            NodeProps::Vm(Box::new(VmState {
                config,
                power_state: seed.power_state,
                guest: GuestInfo::default(),
                ip_delay: 0,
                host: seed.host,
                snapshots: SnapshotTree::default(),
            })),
        )
    }

    pub fn add_customization_spec(&self, item: CustomizationSpecItem) {
        self.lock().customization_specs.push(item);
    }

    /// 设置客户机 IP，前 `after_polls` 次查询仍返回无 IP
    pub fn set_guest_ip(&self, vm: &ManagedObjectRef, ip: &str, after_polls: u32) {
        if let Ok(state) = self.lock().vm_mut(vm) {
            state.guest.ip_address = Some(ip.to_string());
            state.ip_delay = after_polls;
        }
    }

    pub fn push_event(&self, entity: &ManagedObjectRef, event_type: EventType, message: &str) {
        self.lock().push_event(entity, event_type, message.to_string());
    }

    /// 下一次提交指定操作时返回给定故障
    pub fn inject_fault(&self, operation_label: &str, fault: RemoteFault) {
        self.lock()
            .pending_faults
            .push((operation_label.to_string(), fault));
    }

    /// 已提交的操作
    pub fn submitted(&self) -> Vec<TaskOperation> {
        self.lock().submitted.clone()
    }

    /// 按类型和名称查找任意对象（夹具辅助）
    pub fn lookup(&self, kind: ObjectKind, name: &str) -> Option<ManagedObjectRef> {
        let state = self.lock();
        let mut found: Vec<&ManagedObjectRef> = state
            .nodes
            .iter()
            .filter(|(moref, node)| moref.kind == kind && node.name == name)
            .map(|(moref, _)| moref)
            .collect();
        found.sort_by_key(|m| creation_order(m));
        found.first().map(|m| (*m).clone())
    }

    pub fn power_state_of(&self, vm: &ManagedObjectRef) -> Option<PowerState> {
        self.lock().vm(vm).ok().map(|v| v.power_state)
    }
}

#[async_trait]
impl InventoryService for MemoryInventory {
    async fn root_folder(&self) -> Result<ManagedObjectRef> {
        Ok(self.root())
    }

    async fn children(&self, parent: &ManagedObjectRef) -> Result<Vec<InventoryObject>> {
        let state = self.lock();
        let node = state.node(parent)?;
        let mut children: Vec<InventoryObject> =
            node.children.iter().filter_map(|c| state.object(c)).collect();

        if parent.kind.is_compute_resource() {
            if let Some(pool) = state.root_pools.get(parent) {
                children.extend(
                    state
                        .node(pool)?
                        .children
                        .iter()
                        .filter_map(|c| state.object(c)),
                );
            }
        }
        debug!("内存清单: {} 有 {} 个子对象", parent, children.len());
        Ok(children)
    }

    async fn datacenter_folders(
        &self,
        datacenter: &ManagedObjectRef,
    ) -> Result<DatacenterFolders> {
        self.folders_of(datacenter)
    }

    async fn compute_resources(
        &self,
        refs: &[ManagedObjectRef],
    ) -> Result<Vec<ComputeResourceSummary>> {
        let state = self.lock();
        refs.iter()
            .map(|r| {
                let node = state.node(r)?;
                let hosts: Vec<ManagedObjectRef> = node
                    .children
                    .iter()
                    .filter(|c| c.kind == ObjectKind::HostSystem)
                    .cloned()
                    .collect();
                let mut datastores: Vec<ManagedObjectRef> = Vec::new();
                let mut networks: Vec<ManagedObjectRef> = Vec::new();
                for host in &hosts {
                    if let Ok(Node {
                        props:
                            NodeProps::Host {
                                datastores: ds,
                                networks: nets,
                                ..
                            },
                        ..
                    }) = state.node(host)
                    {
                        for d in ds {
                            if !datastores.contains(d) {
                                datastores.push(d.clone());
                            }
                        }
                        for n in nets {
                            if !networks.contains(n) {
                                networks.push(n.clone());
                            }
                        }
                    }
                }
                Ok(ComputeResourceSummary {
                    moref: r.clone(),
                    name: node.name.clone(),
                    hosts,
                    resource_pool: state
                        .root_pools
                        .get(r)
                        .cloned()
                        .ok_or_else(|| kind_mismatch(ObjectKind::ComputeResource, r))?,
                    datastores,
                    networks,
                })
            })
            .collect()
    }

    async fn hosts(&self, refs: &[ManagedObjectRef]) -> Result<Vec<HostSummary>> {
        let state = self.lock();
        refs.iter()
            .map(|r| {
                let node = state.node(r)?;
                match &node.props {
                    NodeProps::Host {
                        in_maintenance_mode,
                        datastores,
                        networks,
                    } => Ok(HostSummary {
                        moref: r.clone(),
                        name: node.name.clone(),
                        in_maintenance_mode: *in_maintenance_mode,
                        parent: node.parent.clone().ok_or_else(|| not_found(r))?,
                        datastores: datastores.clone(),
                        networks: networks.clone(),
                    }),
                    _ => Err(kind_mismatch(ObjectKind::HostSystem, r)),
                }
            })
            .collect()
    }

    async fn datastores(&self, refs: &[ManagedObjectRef]) -> Result<Vec<DatastoreSummary>> {
        let state = self.lock();
        refs.iter()
            .map(|r| {
                let node = state.node(r)?;
                match &node.props {
                    NodeProps::Datastore {
                        free_space,
                        capacity,
                    } => Ok(DatastoreSummary {
                        moref: r.clone(),
                        name: node.name.clone(),
                        free_space: *free_space,
                        capacity: *capacity,
                        accessible: true,
                    }),
                    _ => Err(kind_mismatch(ObjectKind::Datastore, r)),
                }
            })
            .collect()
    }

    async fn networks(&self, refs: &[ManagedObjectRef]) -> Result<Vec<NetworkSummary>> {
        let state = self.lock();
        refs.iter()
            .map(|r| {
                let node = state.node(r)?;
                match &node.props {
                    NodeProps::Network { dvs, portgroup_key } => Ok(NetworkSummary {
                        moref: r.clone(),
                        name: node.name.clone(),
                        dvs: dvs.clone(),
                        portgroup_key: portgroup_key.clone(),
                    }),
                    _ => Err(kind_mismatch(ObjectKind::Network, r)),
                }
            })
            .collect()
    }

    async fn vms(&self, refs: &[ManagedObjectRef]) -> Result<Vec<VmSummary>> {
        let state = self.lock();
        refs.iter()
            .map(|r| {
                let vm = state.vm(r)?;
                Ok(VmSummary {
                    moref: r.clone(),
                    name: vm.config.name.clone(),
                    power_state: vm.power_state,
                    guest_full_name: Some(vm.config.guest_full_name.clone()),
                    ip_address: if vm.ip_delay == 0 {
                        vm.guest.ip_address.clone()
                    } else {
                        None
                    },
                    template: vm.config.template,
                    host: vm.host.clone(),
                    num_cpu: vm.config.num_cpu,
                    memory_mb: vm.config.memory_mb,
                })
            })
            .collect()
    }

    async fn vm_config(&self, vm: &ManagedObjectRef) -> Result<VmConfigInfo> {
        let state = self.lock();
        let vm = state.vm(vm)?;
        let mut config = vm.config.clone();
        config.current_snapshot = vm.snapshots.current.clone();
        Ok(config)
    }

    async fn guest_info(&self, vm: &ManagedObjectRef) -> Result<GuestInfo> {
        let mut state = self.lock();
        let vm = state.vm_mut(vm)?;
        if vm.ip_delay > 0 {
            vm.ip_delay -= 1;
            return Ok(GuestInfo {
                ip_address: None,
                ..vm.guest.clone()
            });
        }
        Ok(vm.guest.clone())
    }

    async fn snapshot_tree(&self, vm: &ManagedObjectRef) -> Result<SnapshotTree> {
        Ok(self.lock().vm(vm)?.snapshots.clone())
    }

    async fn customization_spec(&self, name: &str) -> Result<Option<CustomizationSpecItem>> {
        Ok(self
            .lock()
            .customization_specs
            .iter()
            .find(|s| s.name == name)
            .cloned())
    }

    async fn customization_spec_names(&self) -> Result<Vec<String>> {
        Ok(self
            .lock()
            .customization_specs
            .iter()
            .map(|s| s.name.clone())
            .collect())
    }

    async fn submit(&self, operation: &TaskOperation) -> Result<TaskHandle> {
        let mut state = self.lock();
        info!("内存清单: 执行 {} -> {}", operation.label(), operation.target());
        let result = state.apply(operation)?;
        state.submitted.push(operation.clone());

        let id = format!("task-{}", uuid::Uuid::new_v4());
        state.tasks.insert(id.clone(), result);
        Ok(TaskHandle {
            id,
            operation: operation.label().to_string(),
            target: operation.target().clone(),
        })
    }

    async fn wait_for_task(&self, task: &TaskHandle) -> Result<TaskResult> {
        self.lock()
            .tasks
            .remove(&task.id)
            .ok_or_else(|| InventoryError::TaskNotFound(task.id.clone()))
    }

    async fn query_events(&self, filter: &EventFilter) -> Result<Vec<InventoryEvent>> {
        let state = self.lock();
        Ok(state
            .events
            .iter()
            .filter(|e| filter.event_types.is_empty() || filter.event_types.contains(&e.event_type))
            .filter(|e| match filter.recursion {
                EventRecursion::SelfOnly => e.entity == filter.entity,
                EventRecursion::Children => {
                    e.entity == filter.entity
                        || state.nodes.get(&e.entity).and_then(|n| n.parent.as_ref())
                            == Some(&filter.entity)
                }
                EventRecursion::All => {
                    e.entity == filter.entity || state.is_descendant(&e.entity, &filter.entity)
                }
            })
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CloneSpec, RelocateSpec};

    fn clone_op(vm: &ManagedObjectRef, folder: &ManagedObjectRef, name: &str) -> TaskOperation {
        TaskOperation::CloneVm {
            vm: vm.clone(),
            folder: folder.clone(),
            name: name.to_string(),
            spec: Box::new(CloneSpec {
                location: RelocateSpec::default(),
                template: false,
                power_on: false,
                config: None,
                customization: None,
                snapshot: None,
            }),
        }
    }

    #[tokio::test]
    async fn test_cluster_children_include_root_pool_children() {
        let inv = MemoryInventory::new();
        let dc = inv.add_datacenter(&inv.root(), "dc1");
        let folders = inv.folders_of(&dc).unwrap();
        let cluster = inv.add_cluster(&folders.host, "cl1");
        inv.add_host(&cluster, "esx1", false);
        inv.add_resource_pool(&cluster, "prod");

        let names: Vec<String> = inv
            .children(&cluster)
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["esx1".to_string(), "prod".to_string()]);
    }

    #[tokio::test]
    async fn test_clone_duplicate_name_faults() {
        let inv = MemoryInventory::new();
        let dc = inv.add_datacenter(&inv.root(), "dc1");
        let folders = inv.folders_of(&dc).unwrap();
        let tmpl = inv.add_vm(&folders.vm, VmSeed::linux("tmpl").template());

        let task = inv.submit(&clone_op(&tmpl, &folders.vm, "web")).await.unwrap();
        assert!(matches!(
            inv.wait_for_task(&task).await.unwrap(),
            TaskResult::Succeeded { result: Some(_) }
        ));

        let task = inv.submit(&clone_op(&tmpl, &folders.vm, "web")).await.unwrap();
        match inv.wait_for_task(&task).await.unwrap() {
            TaskResult::Faulted(fault) => {
                assert!(matches!(fault.kind, FaultKind::DuplicateName { .. }))
            }
            other => panic!("意外结果: {:?}", other),
        }
        assert_eq!(inv.submitted().len(), 2);
    }

    #[tokio::test]
    async fn test_guest_ip_delay() {
        let inv = MemoryInventory::new();
        let dc = inv.add_datacenter(&inv.root(), "dc1");
        let folders = inv.folders_of(&dc).unwrap();
        let vm = inv.add_vm(&folders.vm, VmSeed::linux("web"));
        inv.set_guest_ip(&vm, "10.0.0.5", 2);

        assert_eq!(inv.guest_info(&vm).await.unwrap().ip_address, None);
        assert_eq!(inv.guest_info(&vm).await.unwrap().ip_address, None);
        assert_eq!(
            inv.guest_info(&vm).await.unwrap().ip_address.as_deref(),
            Some("10.0.0.5")
        );
    }

    #[tokio::test]
    async fn test_snapshot_lifecycle() {
        let inv = MemoryInventory::new();
        let dc = inv.add_datacenter(&inv.root(), "dc1");
        let folders = inv.folders_of(&dc).unwrap();
        let vm = inv.add_vm(&folders.vm, VmSeed::linux("db"));

        for name in ["base", "patched"] {
            let op = TaskOperation::CreateSnapshot {
                vm: vm.clone(),
                name: name.to_string(),
                description: String::new(),
                memory: false,
                quiesce: false,
            };
            let task = inv.submit(&op).await.unwrap();
            inv.wait_for_task(&task).await.unwrap();
        }

        let tree = inv.snapshot_tree(&vm).await.unwrap();
        assert_eq!(tree.len(), 2);
        let base = tree.find_by_name("base").unwrap().snapshot.clone();

        let op = TaskOperation::RemoveSnapshot {
            snapshot: base,
            remove_children: false,
        };
        let task = inv.submit(&op).await.unwrap();
        inv.wait_for_task(&task).await.unwrap();

        let tree = inv.snapshot_tree(&vm).await.unwrap();
        assert_eq!(tree.len(), 1);
        assert_eq!(tree.roots[0].name, "patched");
        assert!(tree.current.is_some());
    }
}
