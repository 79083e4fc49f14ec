//! 克隆规格构建
//!
//! 把已解析的放置位置、网络、模板配置和用户覆盖项组装成一次性的 [`CloneSpec`]。
//! 构建是纯函数：所有远程名称解析都由调用方事先完成，这里只做校验和组装。
//! 规格提交后不再修改，需要修正时重新构建。

pub mod customization;
pub mod hardware;
pub mod network;

pub use customization::{build_customization, parse_ip_entry, GuestFamily};
pub use hardware::{gib_to_mb, resource_overrides, vapp_property_changes};
pub use network::{nic_backing, nic_edits, AUTO};

use serde::{Deserialize, Serialize};
use tracing::debug;
use vmops_inventory::{
    CloneSpec, CustomizationSpecItem, DiskMoveType, DiskTransform, NetworkSummary,
    RelocateSpec, VmConfigInfo,
};

use crate::error::{OrchestratorError, Result};
use crate::placement::{Placement, PlacementConstraints};

/// 克隆选项（用户输入）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CloneOptions {
    /// 模板（或源虚拟机）名称
    pub template: String,

    /// 新虚拟机名称
    pub name: String,

    /// 目标文件夹路径（相对 vm 根文件夹）
    #[serde(default)]
    pub folder: Option<String>,

    /// 放置约束
    #[serde(default)]
    pub placement: PlacementConstraints,

    // ---- 网络与定制 ----
    /// MAC 地址，按网卡顺序；`auto` 表示保持自动分配
    #[serde(default)]
    pub mac_addresses: Vec<String>,

    /// IP 设置，按网卡顺序：`dhcp` 或 `a.b.c.d/prefix`
    #[serde(default)]
    pub ip_addresses: Vec<String>,

    #[serde(default)]
    pub gateways: Vec<String>,

    #[serde(default)]
    pub dns_servers: Vec<String>,

    #[serde(default)]
    pub dns_suffixes: Vec<String>,

    #[serde(default)]
    pub hostname: Option<String>,

    #[serde(default)]
    pub domain: Option<String>,

    /// 时区（Linux 为区域名，Windows 为时区索引）
    #[serde(default)]
    pub time_zone: Option<String>,

    /// 引用服务端保存的定制规格
    #[serde(default)]
    pub customization_spec: Option<String>,

    /// 不生成定制身份；引用的定制规格原样透传
    #[serde(default)]
    pub disable_customization: bool,

    // ---- 资源覆盖 ----
    #[serde(default)]
    pub cpus: Option<i32>,

    #[serde(default)]
    pub cores_per_socket: Option<i32>,

    /// 内存 (GiB)
    #[serde(default)]
    pub memory_gb: Option<f64>,

    /// 内存预留 (GiB)
    #[serde(default)]
    pub memory_reservation_gb: Option<f64>,

    #[serde(default)]
    pub annotation: Option<String>,

    /// vApp 属性 (id, value)
    #[serde(default)]
    pub vapp_properties: Vec<(String, String)>,

    // ---- 克隆行为 ----
    /// 基于模板当前快照做链接克隆
    #[serde(default)]
    pub linked_clone: bool,

    /// 精简置备
    #[serde(default)]
    pub thin: bool,

    /// 克隆结果标记为模板
    #[serde(default)]
    pub mark_as_template: bool,

    #[serde(default)]
    pub power_on: bool,
}

impl CloneOptions {
    pub fn new(template: &str, name: &str) -> Self {
        Self {
            template: template.to_string(),
            name: name.to_string(),
            ..Default::default()
        }
    }

    /// 选项组合校验，必须在任何远程调用之前执行
    pub fn validate(&self) -> Result<()> {
        fn violation(msg: impl Into<String>) -> Result<()> {
            Err(OrchestratorError::ConstraintViolation(msg.into()))
        }

        if self.template.trim().is_empty() {
            return violation("未指定模板");
        }
        if self.name.trim().is_empty() {
            return violation("未指定虚拟机名称");
        }

        self.placement.check_exclusive()?;

        // MAC 与 IP 数量对应；全部为 auto 或单个 MAC 且无 IP 时放行
        let all_auto = self.mac_addresses.iter().all(|m| m.eq_ignore_ascii_case(AUTO));
        let single_mac_without_ip = self.mac_addresses.len() == 1 && self.ip_addresses.is_empty();
        if !self.mac_addresses.is_empty()
            && !all_auto
            && !single_mac_without_ip
            && self.mac_addresses.len() != self.ip_addresses.len()
        {
            return violation(format!(
                "MAC 地址数量 ({}) 与 IP 数量 ({}) 不一致",
                self.mac_addresses.len(),
                self.ip_addresses.len()
            ));
        }

        if !self.placement.switches.is_empty()
            && self.placement.switches.len() != self.placement.networks.len()
        {
            return violation(format!(
                "交换机数量 ({}) 与网络数量 ({}) 不一致",
                self.placement.switches.len(),
                self.placement.networks.len()
            ));
        }
        if self.placement.networks.iter().any(|n| n.trim().is_empty()) {
            return violation("网络名称不能为空");
        }

        for entry in &self.ip_addresses {
            parse_ip_entry(entry)?;
        }

        if matches!(self.cpus, Some(n) if n <= 0) {
            return violation("CPU 数量必须大于 0");
        }
        if matches!(self.cores_per_socket, Some(n) if n <= 0) {
            return violation("每插槽核数必须大于 0");
        }
        if let (Some(cpus), Some(cores)) = (self.cpus, self.cores_per_socket) {
            if cpus % cores != 0 {
                return violation(format!("CPU 数量 {} 不是每插槽核数 {} 的整数倍", cpus, cores));
            }
        }
        if matches!(self.memory_gb, Some(m) if !m.is_finite() || m <= 0.0) {
            return violation("内存必须是大于 0 的有限值");
        }
        if matches!(self.memory_reservation_gb, Some(m) if !m.is_finite() || m < 0.0) {
            return violation("内存预留必须是非负的有限值");
        }
        if let (Some(memory), Some(reservation)) = (self.memory_gb, self.memory_reservation_gb) {
            if reservation > memory {
                return violation("内存预留不能超过内存大小");
            }
        }

        if self.mark_as_template && self.power_on {
            return violation("模板不能开机");
        }

        Ok(())
    }
}

/// 构建所需的已解析输入
#[derive(Debug, Clone, Copy)]
pub struct SpecInputs<'a> {
    /// 模板配置
    pub template: &'a VmConfigInfo,

    pub placement: &'a Placement,

    /// 按网卡顺序解析好的网络
    pub networks: &'a [NetworkSummary],

    /// 引用的定制规格条目
    pub customization_item: Option<&'a CustomizationSpecItem>,
}

/// 构建克隆规格
pub fn build_clone_spec(options: &CloneOptions, inputs: &SpecInputs<'_>) -> Result<CloneSpec> {
    options.validate()?;

    let template = inputs.template;
    if inputs.networks.len() != options.placement.networks.len() {
        return Err(OrchestratorError::ConstraintViolation(format!(
            "已解析网络数量 ({}) 与请求的网络数量 ({}) 不一致",
            inputs.networks.len(),
            options.placement.networks.len()
        )));
    }

    let snapshot = if options.linked_clone {
        let current = template.current_snapshot.clone().ok_or_else(|| {
            OrchestratorError::ConstraintViolation(format!(
                "链接克隆要求模板 '{}' 存在当前快照",
                template.name
            ))
        })?;
        Some(current)
    } else {
        None
    };

    let location = RelocateSpec {
        host: inputs.placement.host.as_ref().map(|h| h.moref.clone()),
        pool: Some(inputs.placement.pool.clone()),
        datastore: inputs.placement.datastore.as_ref().map(|d| d.moref.clone()),
        disk_move_type: options
            .linked_clone
            .then_some(DiskMoveType::CreateNewChildDiskBacking),
        transform: options.thin.then_some(DiskTransform::Sparse),
    };

    let mut config = resource_overrides(options);
    config.device_change = nic_edits(template, inputs.networks, &options.mac_addresses)?;
    config.vapp_properties = vapp_property_changes(&template.vapp_properties, &options.vapp_properties);

    let customization = if options.mark_as_template {
        None
    } else {
        build_customization(template, options, inputs.customization_item)?
    };

    let spec = CloneSpec {
        location,
        template: options.mark_as_template,
        power_on: options.power_on,
        config: (!config.is_empty()).then_some(config),
        customization,
        snapshot,
    };
    debug!("克隆规格: {:?}", spec);
    Ok(spec)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mac_ip_length_rules() {
        let mut options = CloneOptions::new("tmpl", "vm");
        options.mac_addresses = vec!["00:50:56:aa:bb:01".into(), "00:50:56:aa:bb:02".into()];
        options.ip_addresses = vec!["10.0.0.5/24".into()];
        assert!(matches!(
            options.validate(),
            Err(OrchestratorError::ConstraintViolation(_))
        ));

        options.ip_addresses.push("dhcp".into());
        assert!(options.validate().is_ok());

        options.mac_addresses = vec!["auto".into(), "AUTO".into()];
        options.ip_addresses.clear();
        assert!(options.validate().is_ok());

        options.mac_addresses = vec!["00:50:56:aa:bb:01".into()];
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_switch_count_must_match_networks() {
        let mut options = CloneOptions::new("tmpl", "vm");
        options.placement.networks = vec!["a".into(), "b".into()];
        options.placement.switches = vec!["dvs-1".into()];
        assert!(options.validate().is_err());
        options.placement.switches.push(AUTO.into());
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_datastore_and_cluster_conflict() {
        let mut options = CloneOptions::new("tmpl", "vm");
        options.placement.datastore = Some("ds1".into());
        options.placement.datastore_cluster = Some("pod".into());
        assert!(matches!(
            options.validate(),
            Err(OrchestratorError::ConstraintViolation(_))
        ));
    }

    #[test]
    fn test_resource_values() {
        let mut options = CloneOptions::new("tmpl", "vm");
        options.cpus = Some(6);
        options.cores_per_socket = Some(4);
        assert!(options.validate().is_err());
        options.cores_per_socket = Some(3);
        assert!(options.validate().is_ok());

        options.memory_gb = Some(4.0);
        options.memory_reservation_gb = Some(8.0);
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_memory_must_be_finite() {
        let mut options = CloneOptions::new("tmpl", "vm");
        options.memory_gb = Some(f64::NAN);
        assert!(matches!(
            options.validate(),
            Err(OrchestratorError::ConstraintViolation(_))
        ));

        options.memory_gb = Some(f64::INFINITY);
        assert!(options.validate().is_err());

        options.memory_gb = Some(4.0);
        options.memory_reservation_gb = Some(f64::NAN);
        assert!(options.validate().is_err());

        options.memory_reservation_gb = Some(2.0);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_template_cannot_power_on() {
        let mut options = CloneOptions::new("tmpl", "vm");
        options.mark_as_template = true;
        options.power_on = true;
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_invalid_ip_entry() {
        let mut options = CloneOptions::new("tmpl", "vm");
        options.ip_addresses = vec!["10.0.0.300/24".into()];
        assert!(options.validate().is_err());
    }
}
