//! 客户机定制
//!
//! 按模板的客户机操作系统选择定制身份：Windows 使用 Sysprep，Linux 使用 LinuxPrep，
//! 其他系统直接报错，不做静默降级。Windows 的无人值守、自动登录和密码等策略
//! 只从引用的定制规格中原样复制，这里不自行生成。

use std::net::Ipv4Addr;
use tracing::debug;
use vmops_inventory::{
    AdapterMapping, CustomizationIdentity, CustomizationSpec, CustomizationSpecItem,
    IpAssignment, IpSettings, LinuxPrepIdentity, VmConfigInfo,
};

use super::CloneOptions;
use crate::error::{OrchestratorError, Result};

/// 客户机操作系统家族
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuestFamily {
    Windows,
    Linux,
}

impl GuestFamily {
    /// 按客户机操作系统名称识别（不区分大小写的子串匹配）
    pub fn detect(guest: &str) -> Result<Self> {
        let lower = guest.to_lowercase();
        if lower.contains("windows") {
            Ok(GuestFamily::Windows)
        } else if !is_apple(&lower) {
            Ok(GuestFamily::Linux)
        } else {
            Err(unsupported(guest))
        }
    }

    /// 按模板的客户机标识与全名识别，任一为 macOS 即不支持
    pub fn of_template(template: &VmConfigInfo) -> Result<Self> {
        let names = [template.guest_id.as_str(), template.guest_full_name.as_str()];
        if names.iter().any(|n| is_apple(&n.to_lowercase())) {
            return Err(unsupported(&template.guest_id));
        }
        if names.iter().any(|n| n.to_lowercase().contains("windows")) {
            return Ok(GuestFamily::Windows);
        }
        Ok(GuestFamily::Linux)
    }
}

fn is_apple(lower: &str) -> bool {
    ["darwin", "mac os", "macos"].iter().any(|m| lower.contains(m))
}

fn unsupported(guest: &str) -> OrchestratorError {
    OrchestratorError::Unsupported(format!("无法为客户机操作系统 '{}' 生成定制规格", guest))
}

/// 解析一条 IP 设置：`dhcp` 或 `a.b.c.d[/prefix]`
pub fn parse_ip_entry(entry: &str) -> Result<IpSettings> {
    let invalid = || OrchestratorError::ConstraintViolation(format!("无效的 IP 设置: '{}'", entry));

    if entry.eq_ignore_ascii_case("dhcp") {
        return Ok(IpSettings {
            ip: IpAssignment::Dhcp,
            subnet_mask: None,
            gateway: Vec::new(),
            dns_domain: None,
        });
    }

    let (address, prefix) = match entry.split_once('/') {
        Some((address, prefix)) => (address, Some(prefix)),
        None => (entry, None),
    };
    let address: Ipv4Addr = address.parse().map_err(|_| invalid())?;
    let subnet_mask = match prefix {
        Some(prefix) => {
            let bits: u32 = prefix.parse().map_err(|_| invalid())?;
            if bits > 32 {
                return Err(invalid());
            }
            let mask = u32::MAX.checked_shl(32 - bits).unwrap_or(0);
            Some(Ipv4Addr::from(mask).to_string())
        }
        None => None,
    };

    Ok(IpSettings {
        ip: IpAssignment::Fixed {
            address: address.to_string(),
        },
        subnet_mask,
        gateway: Vec::new(),
        dns_domain: None,
    })
}

/// 构建客户机定制
///
/// - 禁用定制时原样透传引用的定制规格（没有引用则不定制）；
/// - 指定了主机名或域名，或引用的规格没有身份信息时，按客户机系统生成身份；
/// - 指定了 IP 列表时按顺序覆盖网卡映射，否则沿用规格中的映射，
///   规格中也没有时为模板的每块网卡生成一条 DHCP 映射。
pub fn build_customization(
    template: &VmConfigInfo,
    options: &CloneOptions,
    item: Option<&CustomizationSpecItem>,
) -> Result<Option<CustomizationSpec>> {
    if options.disable_customization {
        return Ok(item.map(|i| i.spec.clone()));
    }

    let mut spec = item.map(|i| i.spec.clone()).unwrap_or_default();
    let item_identity = item.and_then(|i| i.spec.identity.as_ref());
    let needs_identity =
        options.hostname.is_some() || options.domain.is_some() || item_identity.is_none();

    if needs_identity {
        let family = GuestFamily::of_template(template)?;
        let hostname = options.hostname.clone().unwrap_or_else(|| options.name.clone());
        spec.identity = Some(match family {
            GuestFamily::Linux => {
                let base = match item_identity {
                    Some(CustomizationIdentity::LinuxPrep(linux)) => Some(linux),
                    Some(CustomizationIdentity::Sysprep(_)) => {
                        return Err(OrchestratorError::ConstraintViolation(format!(
                            "定制规格 '{}' 是 Windows 规格, 模板 '{}' 为 Linux",
                            item.map(|i| i.name.as_str()).unwrap_or_default(),
                            template.name
                        )))
                    }
                    None => None,
                };
                CustomizationIdentity::LinuxPrep(LinuxPrepIdentity {
                    host_name: hostname,
                    domain: options
                        .domain
                        .clone()
                        .or_else(|| base.map(|b| b.domain.clone()))
                        .unwrap_or_default(),
                    time_zone: options
                        .time_zone
                        .clone()
                        .or_else(|| base.and_then(|b| b.time_zone.clone())),
                    hw_clock_utc: base.and_then(|b| b.hw_clock_utc),
                })
            }
            GuestFamily::Windows => {
                let mut sysprep = match item_identity {
                    Some(CustomizationIdentity::Sysprep(sysprep)) => sysprep.clone(),
                    _ => {
                        return Err(OrchestratorError::ConstraintViolation(format!(
                            "Windows 模板 '{}' 需要引用包含 Sysprep 身份的定制规格",
                            template.name
                        )))
                    }
                };
                sysprep.computer_name = hostname;
                if let Some(domain) = &options.domain {
                    sysprep.identification.join_domain = Some(domain.clone());
                    sysprep.identification.join_workgroup = None;
                }
                if let Some(tz) = &options.time_zone {
                    sysprep.gui_unattended.time_zone = tz.parse().map_err(|_| {
                        OrchestratorError::ConstraintViolation(format!(
                            "Windows 时区必须是数字索引: '{}'",
                            tz
                        ))
                    })?;
                }
                CustomizationIdentity::Sysprep(sysprep)
            }
        });
    }

    if !options.ip_addresses.is_empty() {
        spec.nic_setting_map = options
            .ip_addresses
            .iter()
            .enumerate()
            .map(|(index, entry)| {
                let mut adapter = parse_ip_entry(entry)?;
                if matches!(adapter.ip, IpAssignment::Fixed { .. }) {
                    let gateway = if options.gateways.len() == 1 {
                        options.gateways.first()
                    } else {
                        options.gateways.get(index)
                    };
                    adapter.gateway = gateway.cloned().into_iter().collect();
                }
                adapter.dns_domain = options.domain.clone();
                let mac_address = options
                    .mac_addresses
                    .get(index)
                    .filter(|m| !super::network::is_auto(m))
                    .map(|m| m.to_lowercase());
                Ok(AdapterMapping {
                    mac_address,
                    adapter,
                })
            })
            .collect::<Result<Vec<_>>>()?;
    } else if spec.nic_setting_map.is_empty() {
        let nics = template.devices.iter().filter(|d| d.is_ethernet()).count();
        spec.nic_setting_map = (0..nics)
            .map(|_| AdapterMapping {
                mac_address: None,
                adapter: IpSettings {
                    ip: IpAssignment::Dhcp,
                    subnet_mask: None,
                    gateway: Vec::new(),
                    dns_domain: options.domain.clone(),
                },
            })
            .collect();
    }

    if !options.dns_servers.is_empty() {
        spec.global_ip_settings.dns_server_list = options.dns_servers.clone();
    }
    if !options.dns_suffixes.is_empty() {
        spec.global_ip_settings.dns_suffix_list = options.dns_suffixes.clone();
    }

    debug!("定制规格: {:?}", spec);
    Ok(Some(spec))
}

#[cfg(test)]
mod tests {
    use super::*;
    use vmops_inventory::{GuiUnattended, Identification, Password, SysprepIdentity, UserData};

    fn template(guest: &str) -> VmConfigInfo {
        VmConfigInfo {
            name: "golden".into(),
            guest_id: "otherGuest".into(),
            guest_full_name: guest.into(),
            template: true,
            num_cpu: 2,
            num_cores_per_socket: 1,
            memory_mb: 2048,
            annotation: None,
            devices: vec![],
            vapp_properties: vec![],
            current_snapshot: None,
        }
    }

    fn sysprep_item() -> CustomizationSpecItem {
        CustomizationSpecItem {
            name: "win-base".into(),
            description: String::new(),
            spec: CustomizationSpec {
                identity: Some(CustomizationIdentity::Sysprep(SysprepIdentity {
                    computer_name: "placeholder".into(),
                    user_data: UserData {
                        full_name: "Ops".into(),
                        org_name: "Example".into(),
                        product_id: String::new(),
                    },
                    identification: Identification {
                        join_workgroup: Some("WORKGROUP".into()),
                        ..Default::default()
                    },
                    gui_unattended: GuiUnattended {
                        auto_logon: true,
                        auto_logon_count: 1,
                        password: Some(Password {
                            value: "secret".into(),
                            plain_text: true,
                        }),
                        time_zone: 210,
                    },
                })),
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_guest_family_detection() {
        assert_eq!(
            GuestFamily::detect("Microsoft Windows Server 2019").unwrap(),
            GuestFamily::Windows
        );
        assert_eq!(GuestFamily::detect("Ubuntu Linux").unwrap(), GuestFamily::Linux);
        assert!(matches!(
            GuestFamily::detect("Mac OS X"),
            Err(OrchestratorError::Unsupported(_))
        ));
        assert!(GuestFamily::detect("darwin64Guest").is_err());
        assert!(GuestFamily::detect("Apple macOS 10.14 (64-bit)").is_err());
    }

    #[test]
    fn test_template_family_uses_guest_id_and_full_name() {
        let mut mac = template("Apple macOS 10.14 (64-bit)");
        mac.guest_id = "darwin18_64Guest".into();
        assert!(matches!(
            GuestFamily::of_template(&mac),
            Err(OrchestratorError::Unsupported(_))
        ));

        let mut mac_by_id = template("");
        mac_by_id.guest_id = "darwin18_64Guest".into();
        assert!(GuestFamily::of_template(&mac_by_id).is_err());

        assert!(GuestFamily::of_template(&template("Apple macOS 13 (64-bit)")).is_err());

        let mut win = template("Microsoft Windows Server 2019 (64-bit)");
        win.guest_id = "windows2019srv_64Guest".into();
        assert_eq!(GuestFamily::of_template(&win).unwrap(), GuestFamily::Windows);

        let linux = template("Ubuntu Linux (64-bit)");
        assert_eq!(GuestFamily::of_template(&linux).unwrap(), GuestFamily::Linux);
    }

    #[test]
    fn test_parse_ip_entry() {
        let fixed = parse_ip_entry("10.1.2.3/24").unwrap();
        assert_eq!(
            fixed.ip,
            IpAssignment::Fixed {
                address: "10.1.2.3".into()
            }
        );
        assert_eq!(fixed.subnet_mask.as_deref(), Some("255.255.255.0"));
        assert_eq!(parse_ip_entry("10.1.2.3/0").unwrap().subnet_mask.as_deref(), Some("0.0.0.0"));
        assert_eq!(parse_ip_entry("DHCP").unwrap().ip, IpAssignment::Dhcp);
        assert!(parse_ip_entry("10.1.2.3/33").is_err());
        assert!(parse_ip_entry("web").is_err());
    }

    #[test]
    fn test_linux_identity_defaults() {
        let options = CloneOptions::new("golden", "web-01");
        let spec = build_customization(&template("Ubuntu Linux (64-bit)"), &options, None)
            .unwrap()
            .unwrap();
        match spec.identity {
            Some(CustomizationIdentity::LinuxPrep(linux)) => {
                assert_eq!(linux.host_name, "web-01");
                assert_eq!(linux.domain, "");
            }
            other => panic!("意外身份: {:?}", other),
        }
    }

    #[test]
    fn test_windows_copies_unattended_verbatim() {
        let mut options = CloneOptions::new("win2019", "app-01");
        options.domain = Some("corp.example".into());
        let item = sysprep_item();
        let spec = build_customization(
            &template("Microsoft Windows Server 2019 (64-bit)"),
            &options,
            Some(&item),
        )
        .unwrap()
        .unwrap();
        match spec.identity {
            Some(CustomizationIdentity::Sysprep(sysprep)) => {
                assert_eq!(sysprep.computer_name, "app-01");
                assert_eq!(sysprep.identification.join_domain.as_deref(), Some("corp.example"));
                assert!(sysprep.identification.join_workgroup.is_none());
                assert_eq!(sysprep.gui_unattended.time_zone, 210);
                assert!(sysprep.gui_unattended.auto_logon);
            }
            other => panic!("意外身份: {:?}", other),
        }
    }

    #[test]
    fn test_windows_without_sysprep_item() {
        let options = CloneOptions::new("win2019", "app-01");
        let err = build_customization(&template("Microsoft Windows 10"), &options, None).unwrap_err();
        assert!(matches!(err, OrchestratorError::ConstraintViolation(_)));
    }

    #[test]
    fn test_disabled_passes_item_through() {
        let mut options = CloneOptions::new("golden", "web-01");
        options.disable_customization = true;
        options.hostname = Some("ignored".into());
        let item = sysprep_item();
        let spec = build_customization(&template("Mac OS X"), &options, Some(&item)).unwrap();
        assert_eq!(spec, Some(item.spec.clone()));
        assert!(build_customization(&template("Mac OS X"), &options, None)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_item_identity_kept_without_hostname() {
        let options = CloneOptions::new("win2019", "app-01");
        let item = sysprep_item();
        let spec = build_customization(&template("Mac OS X"), &options, Some(&item))
            .unwrap()
            .unwrap();
        assert_eq!(spec.identity, item.spec.identity);
    }

    #[test]
    fn test_ip_mappings_with_gateway() {
        let mut options = CloneOptions::new("golden", "web-01");
        options.ip_addresses = vec!["10.0.0.5/24".into(), "dhcp".into()];
        options.gateways = vec!["10.0.0.1".into()];
        options.dns_servers = vec!["10.0.0.53".into()];
        let spec = build_customization(&template("CentOS 7"), &options, None)
            .unwrap()
            .unwrap();
        assert_eq!(spec.nic_setting_map.len(), 2);
        assert_eq!(spec.nic_setting_map[0].adapter.gateway, vec!["10.0.0.1".to_string()]);
        assert!(spec.nic_setting_map[1].adapter.gateway.is_empty());
        assert_eq!(spec.global_ip_settings.dns_server_list, vec!["10.0.0.53".to_string()]);
    }
}
