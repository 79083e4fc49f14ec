//! 清单对象引用
//!
//! 远程清单中的所有对象都以 [`ManagedObjectRef`] 表示：一个对象类型加一个不透明 ID。
//! 对象相等性只看引用本身，不看名称，不同容器下完全可能存在同名对象。

use serde::{Deserialize, Serialize};
use std::fmt;

/// 清单对象类型
///
/// 封闭枚举，所有类型判断都应穷举匹配。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    /// 普通文件夹
    Folder,
    /// 数据中心
    Datacenter,
    /// 独立计算资源（单主机）
    ComputeResource,
    /// 集群计算资源
    ClusterComputeResource,
    /// 资源池
    ResourcePool,
    /// vApp（形似资源池的伪文件夹）
    VirtualApp,
    /// 数据存储集群
    StoragePod,
    /// 物理主机
    HostSystem,
    /// 数据存储
    Datastore,
    /// 标准网络
    Network,
    /// 分布式端口组
    DistributedPortGroup,
    /// 虚拟机（含模板）
    VirtualMachine,
    /// 虚拟机快照
    VirtualMachineSnapshot,
}

impl ObjectKind {
    /// 远程服务使用的类型名
    pub fn type_name(self) -> &'static str {
        match self {
            ObjectKind::Folder => "Folder",
            ObjectKind::Datacenter => "Datacenter",
            ObjectKind::ComputeResource => "ComputeResource",
            ObjectKind::ClusterComputeResource => "ClusterComputeResource",
            ObjectKind::ResourcePool => "ResourcePool",
            ObjectKind::VirtualApp => "VirtualApp",
            ObjectKind::StoragePod => "StoragePod",
            ObjectKind::HostSystem => "HostSystem",
            ObjectKind::Datastore => "Datastore",
            ObjectKind::Network => "Network",
            ObjectKind::DistributedPortGroup => "DistributedVirtualPortgroup",
            ObjectKind::VirtualMachine => "VirtualMachine",
            ObjectKind::VirtualMachineSnapshot => "VirtualMachineSnapshot",
        }
    }

    /// 是否可以包含子对象
    pub fn is_container(self) -> bool {
        match self {
            ObjectKind::Folder
            | ObjectKind::Datacenter
            | ObjectKind::ComputeResource
            | ObjectKind::ClusterComputeResource
            | ObjectKind::ResourcePool
            | ObjectKind::VirtualApp
            | ObjectKind::StoragePod => true,
            ObjectKind::HostSystem
            | ObjectKind::Datastore
            | ObjectKind::Network
            | ObjectKind::DistributedPortGroup
            | ObjectKind::VirtualMachine
            | ObjectKind::VirtualMachineSnapshot => false,
        }
    }

    /// 是否为计算资源（独立主机或集群）
    pub fn is_compute_resource(self) -> bool {
        matches!(
            self,
            ObjectKind::ComputeResource | ObjectKind::ClusterComputeResource
        )
    }

    /// 是否为网络（标准网络或分布式端口组）
    pub fn is_network(self) -> bool {
        matches!(self, ObjectKind::Network | ObjectKind::DistributedPortGroup)
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

/// 远程对象引用
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ManagedObjectRef {
    /// 对象类型
    pub kind: ObjectKind,

    /// 远程对象 ID
    pub id: String,
}

impl ManagedObjectRef {
    pub fn new(kind: ObjectKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }
}

impl fmt::Display for ManagedObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind.type_name(), self.id)
    }
}

/// 子对象列表中的一项（引用 + 名称）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryObject {
    pub moref: ManagedObjectRef,
    pub name: String,
}

impl InventoryObject {
    pub fn new(moref: ManagedObjectRef, name: impl Into<String>) -> Self {
        Self {
            moref,
            name: name.into(),
        }
    }

    pub fn kind(&self) -> ObjectKind {
        self.moref.kind
    }
}

/// 数据中心下的四个根文件夹
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatacenterFolders {
    pub vm: ManagedObjectRef,
    pub host: ManagedObjectRef,
    pub datastore: ManagedObjectRef,
    pub network: ManagedObjectRef,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_is_reference_not_name() {
        let a = InventoryObject::new(ManagedObjectRef::new(ObjectKind::VirtualMachine, "vm-1"), "web");
        let b = InventoryObject::new(ManagedObjectRef::new(ObjectKind::VirtualMachine, "vm-2"), "web");
        assert_ne!(a.moref, b.moref);
        assert_eq!(a.name, b.name);
    }

    #[test]
    fn test_container_kinds() {
        assert!(ObjectKind::ClusterComputeResource.is_container());
        assert!(ObjectKind::ClusterComputeResource.is_compute_resource());
        assert!(ObjectKind::StoragePod.is_container());
        assert!(!ObjectKind::HostSystem.is_container());
        assert!(ObjectKind::DistributedPortGroup.is_network());
    }

    #[test]
    fn test_kind_serde_name() {
        let json = serde_json::to_string(&ObjectKind::ClusterComputeResource).unwrap();
        assert_eq!(json, "\"cluster_compute_resource\"");
    }
}
