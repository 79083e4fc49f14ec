//! 属性快照
//!
//! 批量属性查询返回的只读快照，仅在一次命令调用期间有效。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::object::ManagedObjectRef;
use super::spec::{VAppProperty, VirtualDevice};

/// 虚拟机电源状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerState {
    PoweredOn,
    PoweredOff,
    Suspended,
}

impl PowerState {
    pub fn display_name(&self) -> &'static str {
        match self {
            PowerState::PoweredOn => "运行中",
            PowerState::PoweredOff => "已关机",
            PowerState::Suspended => "已挂起",
        }
    }
}

/// 计算资源快照（独立主机或集群）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputeResourceSummary {
    pub moref: ManagedObjectRef,
    pub name: String,

    /// 成员主机
    #[serde(default)]
    pub hosts: Vec<ManagedObjectRef>,

    /// 根资源池
    pub resource_pool: ManagedObjectRef,

    /// 成员主机可见的数据存储
    #[serde(default)]
    pub datastores: Vec<ManagedObjectRef>,

    /// 成员主机可见的网络
    #[serde(default)]
    pub networks: Vec<ManagedObjectRef>,
}

/// 物理主机快照
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostSummary {
    pub moref: ManagedObjectRef,
    pub name: String,

    /// 是否处于维护模式
    #[serde(default)]
    pub in_maintenance_mode: bool,

    /// 所属计算资源
    pub parent: ManagedObjectRef,

    #[serde(default)]
    pub datastores: Vec<ManagedObjectRef>,

    #[serde(default)]
    pub networks: Vec<ManagedObjectRef>,
}

/// 数据存储快照
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatastoreSummary {
    pub moref: ManagedObjectRef,
    pub name: String,

    /// 可用空间（字节）
    pub free_space: u64,

    /// 总容量（字节）
    pub capacity: u64,

    #[serde(default = "default_true")]
    pub accessible: bool,
}

fn default_true() -> bool {
    true
}

/// 分布式交换机信息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DvsInfo {
    pub uuid: String,
    pub name: String,
}

/// 网络快照
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkSummary {
    pub moref: ManagedObjectRef,
    pub name: String,

    /// 分布式端口组所属交换机；标准网络为 None
    #[serde(default)]
    pub dvs: Option<DvsInfo>,

    /// 分布式端口组 key
    #[serde(default)]
    pub portgroup_key: Option<String>,
}

/// 虚拟机列表快照
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VmSummary {
    pub moref: ManagedObjectRef,
    pub name: String,
    pub power_state: PowerState,

    #[serde(default)]
    pub guest_full_name: Option<String>,

    #[serde(default)]
    pub ip_address: Option<String>,

    #[serde(default)]
    pub template: bool,

    #[serde(default)]
    pub host: Option<ManagedObjectRef>,

    pub num_cpu: i32,
    pub memory_mb: i64,
}

/// 虚拟机配置快照
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VmConfigInfo {
    pub name: String,

    /// 客户机操作系统标识（如 ubuntu64Guest）
    pub guest_id: String,

    /// 客户机操作系统全名（如 Ubuntu Linux (64-bit)）
    pub guest_full_name: String,

    #[serde(default)]
    pub template: bool,

    pub num_cpu: i32,
    pub num_cores_per_socket: i32,
    pub memory_mb: i64,

    #[serde(default)]
    pub annotation: Option<String>,

    /// 硬件设备列表
    #[serde(default)]
    pub devices: Vec<VirtualDevice>,

    /// vApp 属性描述
    #[serde(default)]
    pub vapp_properties: Vec<VAppProperty>,

    /// 当前快照
    #[serde(default)]
    pub current_snapshot: Option<ManagedObjectRef>,
}

/// 客户机网卡信息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuestNic {
    #[serde(default)]
    pub network: Option<String>,

    #[serde(default)]
    pub mac_address: Option<String>,

    #[serde(default)]
    pub ip_addresses: Vec<String>,

    #[serde(default)]
    pub connected: bool,
}

/// 客户机运行时信息
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GuestInfo {
    #[serde(default)]
    pub ip_address: Option<String>,

    #[serde(default)]
    pub host_name: Option<String>,

    #[serde(default)]
    pub nets: Vec<GuestNic>,

    #[serde(default)]
    pub tools_running: bool,
}

/// 快照树节点
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotNode {
    pub snapshot: ManagedObjectRef,
    pub name: String,

    #[serde(default)]
    pub description: String,

    pub create_time: DateTime<Utc>,
    pub state: PowerState,

    #[serde(default)]
    pub children: Vec<SnapshotNode>,
}

/// 虚拟机快照树
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotTree {
    #[serde(default)]
    pub current: Option<ManagedObjectRef>,

    #[serde(default)]
    pub roots: Vec<SnapshotNode>,
}

impl SnapshotTree {
    /// 按名称深度优先查找快照（同名时取第一个）
    pub fn find_by_name(&self, name: &str) -> Option<&SnapshotNode> {
        let mut stack: Vec<&SnapshotNode> = self.roots.iter().rev().collect();
        while let Some(node) = stack.pop() {
            if node.name == name {
                return Some(node);
            }
            stack.extend(node.children.iter().rev());
        }
        None
    }

    /// 所有同名快照（先序）
    pub fn find_all_by_name(&self, name: &str) -> Vec<&SnapshotNode> {
        let mut found = Vec::new();
        let mut stack: Vec<&SnapshotNode> = self.roots.iter().rev().collect();
        while let Some(node) = stack.pop() {
            if node.name == name {
                found.push(node);
            }
            stack.extend(node.children.iter().rev());
        }
        found
    }

    /// 快照总数
    pub fn len(&self) -> usize {
        fn count(nodes: &[SnapshotNode]) -> usize {
            nodes.iter().map(|n| 1 + count(&n.children)).sum()
        }
        count(&self.roots)
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }
}
