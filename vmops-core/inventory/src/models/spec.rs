//! 提交给远程服务的规格载荷
//!
//! 克隆/重配置/迁移规格、设备变更和客户机定制。所有可选字段在缺省时
//! 不参与序列化，远程服务因此会保留模板上已有的值。

use serde::{Deserialize, Serialize};

use super::object::ManagedObjectRef;

// ============================================
// 设备
// ============================================

/// 网卡类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EthernetAdapter {
    Vmxnet3,
    E1000,
    E1000e,
}

/// MAC 地址分配方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MacAddressType {
    Generated,
    Manual,
    Assigned,
}

/// 网卡后端
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NicBacking {
    /// 标准网络
    Network {
        network: ManagedObjectRef,
        device_name: String,
    },
    /// 分布式端口组
    DistributedPort {
        switch_uuid: String,
        portgroup_key: String,
    },
}

/// 设备连接状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectInfo {
    pub connected: bool,
    pub start_connected: bool,
    pub allow_guest_control: bool,
}

impl ConnectInfo {
    pub fn connected(connected: bool) -> Self {
        Self {
            connected,
            start_connected: connected,
            allow_guest_control: true,
        }
    }
}

/// 设备类型相关数据
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DeviceInfo {
    Ethernet {
        adapter: EthernetAdapter,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        backing: Option<NicBacking>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mac_address: Option<String>,
        address_type: MacAddressType,
    },
    Disk {
        capacity_kb: u64,
        #[serde(default)]
        thin: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        file_name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        datastore: Option<ManagedObjectRef>,
    },
    ScsiController {
        bus_number: i32,
    },
    Other {
        summary: String,
    },
}

/// 虚拟硬件设备
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VirtualDevice {
    /// 设备 key（新增设备使用负数临时 key）
    pub key: i32,

    pub label: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controller_key: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_number: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connectable: Option<ConnectInfo>,

    pub info: DeviceInfo,
}

impl VirtualDevice {
    pub fn is_ethernet(&self) -> bool {
        matches!(self.info, DeviceInfo::Ethernet { .. })
    }

    pub fn is_disk(&self) -> bool {
        matches!(self.info, DeviceInfo::Disk { .. })
    }

    pub fn is_scsi_controller(&self) -> bool {
        matches!(self.info, DeviceInfo::ScsiController { .. })
    }
}

/// 设备变更操作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceOperation {
    Add,
    Edit,
    Remove,
}

/// 设备文件操作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileOperation {
    Create,
    Destroy,
}

/// 单条设备变更
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfigSpec {
    pub operation: DeviceOperation,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_operation: Option<FileOperation>,

    pub device: VirtualDevice,
}

// ============================================
// vApp 属性
// ============================================

/// vApp 属性描述
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VAppProperty {
    pub key: i32,
    pub id: String,

    #[serde(default)]
    pub label: Option<String>,

    #[serde(default)]
    pub value: String,

    #[serde(default = "default_user_configurable")]
    pub user_configurable: bool,
}

fn default_user_configurable() -> bool {
    true
}

/// vApp 属性变更操作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArrayUpdateOperation {
    Add,
    Edit,
    Remove,
}

/// 单条 vApp 属性变更
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VAppPropertySpec {
    pub operation: ArrayUpdateOperation,
    pub info: VAppProperty,
}

// ============================================
// 重配置 / 迁移 / 克隆
// ============================================

/// 虚拟机重配置规格
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VmConfigSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_cpus: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_cores_per_socket: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_mb: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_reservation_mb: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotation: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub device_change: Vec<DeviceConfigSpec>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub vapp_properties: Vec<VAppPropertySpec>,
}

impl VmConfigSpec {
    /// 是否没有任何变更
    pub fn is_empty(&self) -> bool {
        self.num_cpus.is_none()
            && self.num_cores_per_socket.is_none()
            && self.memory_mb.is_none()
            && self.memory_reservation_mb.is_none()
            && self.annotation.is_none()
            && self.device_change.is_empty()
            && self.vapp_properties.is_empty()
    }
}

/// 磁盘迁移方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiskMoveType {
    /// 完整复制所有磁盘
    MoveAllDiskBackingsAndDisallowSharing,
    /// 基于快照创建子磁盘（链接克隆）
    CreateNewChildDiskBacking,
}

/// 磁盘格式转换
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiskTransform {
    /// 精简置备
    Sparse,
    /// 厚置备
    Flat,
}

/// 迁移规格（同时作为克隆的放置位置）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelocateSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<ManagedObjectRef>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pool: Option<ManagedObjectRef>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datastore: Option<ManagedObjectRef>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk_move_type: Option<DiskMoveType>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<DiskTransform>,
}

/// 克隆规格
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloneSpec {
    pub location: RelocateSpec,

    /// 克隆结果是否标记为模板
    pub template: bool,

    /// 克隆完成后是否开机
    pub power_on: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<VmConfigSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customization: Option<CustomizationSpec>,

    /// 链接克隆所基于的快照
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<ManagedObjectRef>,
}

// ============================================
// 客户机定制
// ============================================

/// 密码
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Password {
    pub value: String,
    pub plain_text: bool,
}

/// Windows 用户数据
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserData {
    pub full_name: String,
    pub org_name: String,

    #[serde(default)]
    pub product_id: String,
}

/// Windows 加域 / 工作组信息
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identification {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_workgroup: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_domain: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain_admin: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain_admin_password: Option<Password>,
}

/// Windows 无人值守设置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuiUnattended {
    pub auto_logon: bool,
    pub auto_logon_count: i32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<Password>,

    /// Windows 时区索引
    pub time_zone: i32,
}

/// Windows Sysprep 身份
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SysprepIdentity {
    pub computer_name: String,
    pub user_data: UserData,
    pub identification: Identification,
    pub gui_unattended: GuiUnattended,
}

/// Linux 身份
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinuxPrepIdentity {
    pub host_name: String,
    pub domain: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hw_clock_utc: Option<bool>,
}

/// 客户机定制身份
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CustomizationIdentity {
    Sysprep(SysprepIdentity),
    LinuxPrep(LinuxPrepIdentity),
}

/// IP 分配方式
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IpAssignment {
    Dhcp,
    Fixed { address: String },
}

/// 单块网卡的 IP 设置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpSettings {
    pub ip: IpAssignment,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subnet_mask: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub gateway: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dns_domain: Option<String>,
}

/// 网卡与 IP 设置的映射
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterMapping {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac_address: Option<String>,

    pub adapter: IpSettings,
}

/// 全局 IP 设置
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalIpSettings {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dns_server_list: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dns_suffix_list: Vec<String>,
}

/// 客户机定制规格
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomizationSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<CustomizationIdentity>,

    #[serde(default)]
    pub global_ip_settings: GlobalIpSettings,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nic_setting_map: Vec<AdapterMapping>,
}

/// 服务端保存的定制规格条目
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomizationSpecItem {
    pub name: String,

    #[serde(default)]
    pub description: String,

    pub spec: CustomizationSpec,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_overrides_are_omitted() {
        let spec = VmConfigSpec {
            num_cpus: Some(4),
            ..Default::default()
        };
        let json = serde_json::to_value(&spec).unwrap();
        let obj = json.as_object().unwrap();
        assert_eq!(obj.len(), 1);
        assert_eq!(obj["num_cpus"], 4);
        assert!(!obj.contains_key("memory_mb"));
    }

    #[test]
    fn test_config_spec_is_empty() {
        assert!(VmConfigSpec::default().is_empty());
        let spec = VmConfigSpec {
            annotation: Some("note".to_string()),
            ..Default::default()
        };
        assert!(!spec.is_empty());
    }
}
