//! 清单快照文件
//!
//! 以 JSON/YAML 描述的清单树，离线模式下加载为 [`MemoryInventory`]。
//!
//! ```yaml
//! children:
//!   - kind: datacenter
//!     name: dc1
//!     children:
//!       - kind: folder
//!         name: host
//!         children:
//!           - kind: cluster_compute_resource
//!             name: cluster-a
//!             children:
//!               - kind: host_system
//!                 name: esx-01
//!                 datastores: [ds-01]
//!                 networks: [app-net]
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

use super::{MemoryInventory, VmSeed};
use crate::error::{InventoryError, Result};
use crate::models::{
    CustomizationSpecItem, DvsInfo, ManagedObjectRef, ObjectKind, PowerState,
};

const GIB: u64 = 1024 * 1024 * 1024;

/// 清单快照（顶层）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InventorySnapshot {
    /// 根文件夹下的对象
    #[serde(default)]
    pub children: Vec<SnapshotEntry>,

    /// 服务端保存的定制规格
    #[serde(default)]
    pub customization_specs: Vec<CustomizationSpecItem>,
}

/// 快照中的单个对象
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub kind: ObjectKind,
    pub name: String,

    #[serde(default)]
    pub children: Vec<SnapshotEntry>,

    // 主机
    #[serde(default)]
    pub in_maintenance_mode: bool,

    /// 主机挂载的数据存储名称（同一数据中心内解析）
    #[serde(default)]
    pub datastores: Vec<String>,

    /// 主机可见的网络名称；虚拟机则为各网卡所连网络
    #[serde(default)]
    pub networks: Vec<String>,

    // 数据存储（GiB）
    #[serde(default)]
    pub free_gb: u64,

    #[serde(default)]
    pub capacity_gb: u64,

    // 分布式端口组
    #[serde(default)]
    pub dvs: Option<DvsInfo>,

    #[serde(default)]
    pub portgroup_key: Option<String>,

    // 虚拟机
    #[serde(default)]
    pub guest_id: Option<String>,

    #[serde(default)]
    pub guest_full_name: Option<String>,

    #[serde(default)]
    pub template: bool,

    #[serde(default)]
    pub num_cpu: Option<i32>,

    #[serde(default)]
    pub memory_mb: Option<i64>,

    #[serde(default)]
    pub disks_gb: Vec<u64>,

    #[serde(default)]
    pub power_state: Option<PowerState>,

    #[serde(default)]
    pub ip_address: Option<String>,

    /// 虚拟机所在主机名称
    #[serde(default)]
    pub host: Option<String>,
}

/// 树构建完成后才能解析的名称引用
enum Deferred {
    Attach {
        host: ManagedObjectRef,
        datacenter: ManagedObjectRef,
        datastores: Vec<String>,
        networks: Vec<String>,
    },
    Vm {
        folder: ManagedObjectRef,
        datacenter: Option<ManagedObjectRef>,
        entry: SnapshotEntry,
    },
}

impl MemoryInventory {
    /// 从快照文件加载（按扩展名选择 JSON 或 YAML）
    pub fn load_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| InventoryError::ConfigError(format!("读取清单文件失败 {:?}: {}", path, e)))?;

        let snapshot: InventorySnapshot = match path.extension().and_then(|s| s.to_str()) {
            Some("json") => serde_json::from_str(&content)
                .map_err(|e| InventoryError::ParseError(format!("{:?}: {}", path, e)))?,
            Some("yaml") | Some("yml") => serde_yaml::from_str(&content)
                .map_err(|e| InventoryError::ParseError(format!("{:?}: {}", path, e)))?,
            _ => {
                return Err(InventoryError::ConfigError(format!(
                    "不支持的清单文件格式: {:?}",
                    path
                )))
            }
        };

        info!("加载清单文件: {:?}", path);
        Self::from_snapshot(&snapshot)
    }

    /// 从内存中的快照构建
    pub fn from_snapshot(snapshot: &InventorySnapshot) -> Result<Self> {
        let inventory = Self::new();
        let root = inventory.root();
        let mut deferred = Vec::new();

        for entry in &snapshot.children {
            inventory.build_entry(&root, None, entry, &mut deferred)?;
        }
        for item in &snapshot.customization_specs {
            inventory.add_customization_spec(item.clone());
        }

        for item in deferred {
            match item {
                Deferred::Attach {
                    host,
                    datacenter,
                    datastores,
                    networks,
                } => {
                    for name in &datastores {
                        let ds = inventory
                            .find_under(&datacenter, &[ObjectKind::Datastore], name)
                            .ok_or_else(|| {
                                InventoryError::ConfigError(format!("主机引用了不存在的数据存储: {}", name))
                            })?;
                        inventory.attach(&host, &ds);
                    }
                    for name in &networks {
                        let net = inventory
                            .find_under(
                                &datacenter,
                                &[ObjectKind::Network, ObjectKind::DistributedPortGroup],
                                name,
                            )
                            .ok_or_else(|| {
                                InventoryError::ConfigError(format!("主机引用了不存在的网络: {}", name))
                            })?;
                        inventory.attach(&host, &net);
                    }
                }
                Deferred::Vm {
                    folder,
                    datacenter,
                    entry,
                } => {
                    inventory.build_vm(&folder, datacenter.as_ref(), &entry)?;
                }
            }
        }

        Ok(inventory)
    }

    fn build_entry(
        &self,
        parent: &ManagedObjectRef,
        datacenter: Option<&ManagedObjectRef>,
        entry: &SnapshotEntry,
        deferred: &mut Vec<Deferred>,
    ) -> Result<()> {
        debug!("构建清单对象: {} {}", entry.kind, entry.name);

        let created = match entry.kind {
            ObjectKind::Datacenter => {
                let dc = self.add_datacenter(parent, &entry.name);
                let folders = self.folders_of(&dc)?;
                for child in &entry.children {
                    // 四个根文件夹已自动创建，同名条目合并进去
                    let merged = match (child.kind, child.name.as_str()) {
                        (ObjectKind::Folder, "vm") => Some(&folders.vm),
                        (ObjectKind::Folder, "host") => Some(&folders.host),
                        (ObjectKind::Folder, "datastore") => Some(&folders.datastore),
                        (ObjectKind::Folder, "network") => Some(&folders.network),
                        _ => None,
                    };
                    match merged {
                        Some(folder) => {
                            for grandchild in &child.children {
                                self.build_entry(folder, Some(&dc), grandchild, deferred)?;
                            }
                        }
                        None => self.build_entry(&dc, Some(&dc), child, deferred)?,
                    }
                }
                return Ok(());
            }
            ObjectKind::Folder => self.add_folder(parent, &entry.name),
            ObjectKind::ComputeResource => self.add_compute_resource(parent, &entry.name),
            ObjectKind::ClusterComputeResource => self.add_cluster(parent, &entry.name),
            ObjectKind::ResourcePool => self.add_resource_pool(parent, &entry.name),
            ObjectKind::VirtualApp => self.add_vapp(parent, &entry.name),
            ObjectKind::StoragePod => self.add_storage_pod(parent, &entry.name),
            ObjectKind::HostSystem => {
                let host = self.add_host(parent, &entry.name, entry.in_maintenance_mode);
                let datacenter = datacenter.cloned().ok_or_else(|| {
                    InventoryError::ConfigError(format!("主机 {} 不在数据中心内", entry.name))
                })?;
                deferred.push(Deferred::Attach {
                    host: host.clone(),
                    datacenter,
                    datastores: entry.datastores.clone(),
                    networks: entry.networks.clone(),
                });
                host
            }
            ObjectKind::Datastore => self.add_datastore(
                parent,
                &entry.name,
                entry.free_gb * GIB,
                entry.capacity_gb.max(entry.free_gb) * GIB,
            ),
            ObjectKind::Network => self.add_network(parent, &entry.name),
            ObjectKind::DistributedPortGroup => {
                let dvs = entry.dvs.clone().ok_or_else(|| {
                    InventoryError::ConfigError(format!("分布式端口组 {} 缺少 dvs", entry.name))
                })?;
                let key = entry
                    .portgroup_key
                    .clone()
                    .unwrap_or_else(|| entry.name.clone());
                self.add_portgroup(parent, &entry.name, dvs, &key)
            }
            ObjectKind::VirtualMachine => {
                deferred.push(Deferred::Vm {
                    folder: parent.clone(),
                    datacenter: datacenter.cloned(),
                    entry: entry.clone(),
                });
                return Ok(());
            }
            ObjectKind::VirtualMachineSnapshot => {
                return Err(InventoryError::ConfigError(format!(
                    "清单文件中不能直接声明快照: {}",
                    entry.name
                )))
            }
        };

        for child in &entry.children {
            self.build_entry(&created, datacenter, child, deferred)?;
        }
        Ok(())
    }

    fn build_vm(
        &self,
        folder: &ManagedObjectRef,
        datacenter: Option<&ManagedObjectRef>,
        entry: &SnapshotEntry,
    ) -> Result<()> {
        let mut seed = VmSeed::linux(&entry.name);
        if let Some(guest_id) = &entry.guest_id {
            seed.guest_id = guest_id.clone();
        }
        if let Some(full_name) = &entry.guest_full_name {
            seed.guest_full_name = full_name.clone();
        }
        seed.template = entry.template;
        if let Some(cpu) = entry.num_cpu {
            seed.num_cpu = cpu;
        }
        if let Some(memory) = entry.memory_mb {
            seed.memory_mb = memory;
        }
        if let Some(power) = entry.power_state {
            seed.power_state = power;
        }

        let scope = datacenter.cloned().unwrap_or_else(|| self.root());
        for network in &entry.networks {
            let moref = self
                .find_under(
                    &scope,
                    &[ObjectKind::Network, ObjectKind::DistributedPortGroup],
                    network,
                )
                .ok_or_else(|| {
                    InventoryError::ConfigError(format!(
                        "虚拟机 {} 引用了不存在的网络: {}",
                        entry.name, network
                    ))
                })?;
            seed = seed.with_nic(Some((&moref, network)));
        }
        for size in &entry.disks_gb {
            seed = seed.with_disk(*size);
        }
        if let Some(host) = &entry.host {
            let moref = self
                .find_under(&scope, &[ObjectKind::HostSystem], host)
                .ok_or_else(|| {
                    InventoryError::ConfigError(format!(
                        "虚拟机 {} 引用了不存在的主机: {}",
                        entry.name, host
                    ))
                })?;
            seed = seed.on_host(&moref);
        }

        let vm = self.add_vm(folder, seed);
        if let Some(ip) = &entry.ip_address {
            self.set_guest_ip(&vm, ip, 0);
        }
        Ok(())
    }

    /// 在祖先对象之下按类型和名称查找（按创建顺序取第一个）
    fn find_under(
        &self,
        ancestor: &ManagedObjectRef,
        kinds: &[ObjectKind],
        name: &str,
    ) -> Option<ManagedObjectRef> {
        let state = self.lock();
        let mut found: Vec<&ManagedObjectRef> = state
            .nodes
            .iter()
            .filter(|(moref, node)| {
                kinds.contains(&moref.kind)
                    && node.name == name
                    && state.is_descendant(moref, ancestor)
            })
            .map(|(moref, _)| moref)
            .collect();
        found.sort_by_key(|m| super::creation_order(m));
        found.first().map(|m| (*m).clone())
    }
}
