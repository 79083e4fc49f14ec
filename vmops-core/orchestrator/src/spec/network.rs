//! 网卡绑定

use vmops_inventory::{
    ConnectInfo, DeviceConfigSpec, DeviceInfo, DeviceOperation, MacAddressType, NetworkSummary,
    NicBacking, VirtualDevice, VmConfigInfo,
};

use crate::error::{OrchestratorError, Result};

/// "不指定"哨兵值（MAC 地址、交换机）
pub const AUTO: &str = "auto";

pub(crate) fn is_auto(value: &str) -> bool {
    value.eq_ignore_ascii_case(AUTO)
}

/// 网络对应的网卡后端：有分布式交换机时使用分布式端口组，否则使用标准网络
pub fn nic_backing(network: &NetworkSummary) -> NicBacking {
    match (&network.dvs, &network.portgroup_key) {
        (Some(dvs), Some(key)) => NicBacking::DistributedPort {
            switch_uuid: dvs.uuid.clone(),
            portgroup_key: key.clone(),
        },
        _ => NicBacking::Network {
            network: network.moref.clone(),
            device_name: network.name.clone(),
        },
    }
}

/// 按位置把网络和 MAC 绑定到模板的网卡上
///
/// 第 i 个网络/MAC 作用于模板的第 i 块网卡，每块被改动的网卡生成一条 `Edit`。
/// MAC 仅在显式给出且不是 `auto` 时设置。
pub fn nic_edits(
    template: &VmConfigInfo,
    networks: &[NetworkSummary],
    mac_addresses: &[String],
) -> Result<Vec<DeviceConfigSpec>> {
    let adapters: Vec<&VirtualDevice> = template.devices.iter().filter(|d| d.is_ethernet()).collect();
    let wanted = networks.len().max(mac_addresses.len());
    if wanted > adapters.len() {
        return Err(OrchestratorError::ConstraintViolation(format!(
            "模板 '{}' 只有 {} 块网卡, 请求了 {} 块",
            template.name,
            adapters.len(),
            wanted
        )));
    }

    let mut edits = Vec::with_capacity(wanted);
    for (index, adapter) in adapters.iter().take(wanted).enumerate() {
        let mut device = (*adapter).clone();
        if let DeviceInfo::Ethernet {
            backing,
            mac_address,
            address_type,
            ..
        } = &mut device.info
        {
            if let Some(network) = networks.get(index) {
                *backing = Some(nic_backing(network));
                device.connectable = Some(ConnectInfo::connected(true));
            }
            if let Some(mac) = mac_addresses.get(index).filter(|m| !is_auto(m)) {
                *mac_address = Some(mac.to_lowercase());
                *address_type = MacAddressType::Manual;
            }
        }
        edits.push(DeviceConfigSpec {
            operation: DeviceOperation::Edit,
            file_operation: None,
            device,
        });
    }
    Ok(edits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use vmops_inventory::{DvsInfo, EthernetAdapter, ManagedObjectRef, ObjectKind};

    fn nic(key: i32) -> VirtualDevice {
        VirtualDevice {
            key,
            label: format!("Network adapter {}", key - 3999),
            controller_key: Some(100),
            unit_number: Some(7),
            connectable: None,
            info: DeviceInfo::Ethernet {
                adapter: EthernetAdapter::Vmxnet3,
                backing: None,
                mac_address: Some("00:50:56:00:00:01".into()),
                address_type: MacAddressType::Assigned,
            },
        }
    }

    fn template(nics: i32) -> VmConfigInfo {
        VmConfigInfo {
            name: "golden".into(),
            guest_id: "ubuntu64Guest".into(),
            guest_full_name: "Ubuntu Linux (64-bit)".into(),
            template: true,
            num_cpu: 2,
            num_cores_per_socket: 1,
            memory_mb: 2048,
            annotation: None,
            devices: (0..nics).map(|i| nic(4000 + i)).collect(),
            vapp_properties: vec![],
            current_snapshot: None,
        }
    }

    fn standard(name: &str) -> NetworkSummary {
        NetworkSummary {
            moref: ManagedObjectRef::new(ObjectKind::Network, format!("network-{}", name)),
            name: name.into(),
            dvs: None,
            portgroup_key: None,
        }
    }

    fn portgroup(name: &str) -> NetworkSummary {
        NetworkSummary {
            moref: ManagedObjectRef::new(ObjectKind::DistributedPortGroup, format!("dvpg-{}", name)),
            name: name.into(),
            dvs: Some(DvsInfo {
                uuid: "50 1a 2b".into(),
                name: "dvs-prod".into(),
            }),
            portgroup_key: Some("dvportgroup-77".into()),
        }
    }

    #[test]
    fn test_prefers_distributed_backing() {
        match nic_backing(&portgroup("app")) {
            NicBacking::DistributedPort {
                switch_uuid,
                portgroup_key,
            } => {
                assert_eq!(switch_uuid, "50 1a 2b");
                assert_eq!(portgroup_key, "dvportgroup-77");
            }
            other => panic!("意外后端: {:?}", other),
        }
        assert!(matches!(
            nic_backing(&standard("app")),
            NicBacking::Network { .. }
        ));
    }

    #[test]
    fn test_positional_binding_and_mac() {
        let edits = nic_edits(
            &template(2),
            &[standard("front"), portgroup("back")],
            &["auto".to_string(), "00:50:56:AA:00:02".to_string()],
        )
        .unwrap();
        assert_eq!(edits.len(), 2);
        assert_eq!(edits[0].device.key, 4000);
        assert_eq!(edits[1].device.key, 4001);

        match &edits[0].device.info {
            DeviceInfo::Ethernet {
                mac_address,
                address_type,
                ..
            } => {
                assert_eq!(mac_address.as_deref(), Some("00:50:56:00:00:01"));
                assert_eq!(*address_type, MacAddressType::Assigned);
            }
            _ => unreachable!(),
        }
        match &edits[1].device.info {
            DeviceInfo::Ethernet {
                mac_address,
                address_type,
                backing,
                ..
            } => {
                assert_eq!(mac_address.as_deref(), Some("00:50:56:aa:00:02"));
                assert_eq!(*address_type, MacAddressType::Manual);
                assert!(matches!(backing, Some(NicBacking::DistributedPort { .. })));
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_too_few_adapters() {
        let err = nic_edits(&template(1), &[standard("a"), standard("b")], &[]).unwrap_err();
        assert!(matches!(err, OrchestratorError::ConstraintViolation(_)));
    }

    #[test]
    fn test_no_networks_no_edits() {
        assert!(nic_edits(&template(1), &[], &[]).unwrap().is_empty());
    }
}
