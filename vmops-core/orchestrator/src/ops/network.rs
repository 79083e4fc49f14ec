//! 网卡网络变更与连接状态

use tracing::info;
use vmops_inventory::{
    ConnectInfo, DeviceConfigSpec, DeviceInfo, DeviceOperation, NetworkSummary, TaskOperation,
    VirtualDevice, VmConfigSpec,
};

use super::{nth_device, Session};
use crate::error::{OrchestratorError, Result};
use crate::resolver::{KindFilter, TraversalOptions};
use crate::spec::network::{is_auto, nic_backing};
use crate::task::FaultPolicy;

/// 按名称解析网络；给定交换机（UUID 或名称，`auto` 除外）时只接受该分布式交换机上的端口组
pub async fn resolve_network(
    session: &Session<'_>,
    name: &str,
    switch: Option<&str>,
) -> Result<NetworkSummary> {
    let folders = session.resolver().folders(session.dc()).await?;
    let refs: Vec<_> = session
        .resolver()
        .find_all(&folders.network, KindFilter::NETWORKS, name, TraversalOptions::default())
        .await?
        .into_iter()
        .map(|o| o.moref)
        .collect();
    if refs.is_empty() {
        return Err(OrchestratorError::not_found("网络", name));
    }

    let summaries = session.inventory.networks(&refs).await?;
    let switch = switch.filter(|s| !is_auto(s));
    summaries
        .into_iter()
        .find(|n| match switch {
            None => true,
            Some(wanted) => n
                .dvs
                .as_ref()
                .map(|dvs| dvs.uuid == wanted || dvs.name == wanted)
                .unwrap_or(false),
        })
        .ok_or_else(|| {
            OrchestratorError::NotFound(format!(
                "交换机 '{}' 上没有网络 '{}'",
                switch.unwrap_or_default(),
                name
            ))
        })
}

/// 按顺序解析多个网络，`switches` 为空时不限交换机
pub async fn resolve_networks(
    session: &Session<'_>,
    names: &[String],
    switches: &[String],
) -> Result<Vec<NetworkSummary>> {
    let mut resolved = Vec::with_capacity(names.len());
    for (index, name) in names.iter().enumerate() {
        let switch = switches.get(index).map(String::as_str);
        resolved.push(resolve_network(session, name, switch).await?);
    }
    Ok(resolved)
}

/// 列出虚拟机的网卡
pub async fn list_nics(session: &Session<'_>, vm_name: &str) -> Result<Vec<VirtualDevice>> {
    let (_, config) = session.vm_with_config(vm_name).await?;
    Ok(config.devices.into_iter().filter(|d| d.is_ethernet()).collect())
}

/// 把第 `nic_index` 块网卡（1 起始）接到指定网络
pub async fn set_network(
    session: &Session<'_>,
    vm_name: &str,
    nic_index: usize,
    network: &str,
    switch: Option<&str>,
) -> Result<()> {
    let (vm, config) = session.vm_with_config(vm_name).await?;
    let mut device = nth_device(&config, nic_index, "网卡", VirtualDevice::is_ethernet)?.clone();
    let target = resolve_network(session, network, switch).await?;

    if let DeviceInfo::Ethernet { backing, .. } = &mut device.info {
        *backing = Some(nic_backing(&target));
    }
    device.connectable = Some(ConnectInfo::connected(true));
    info!("虚拟机 {} 的 {} 切换到网络 {}", vm.name, device.label, target.name);

    reconfigure_device(session, &vm.moref, device).await
}

/// 连接或断开第 `nic_index` 块网卡
pub async fn set_connected(
    session: &Session<'_>,
    vm_name: &str,
    nic_index: usize,
    connected: bool,
) -> Result<()> {
    let (vm, config) = session.vm_with_config(vm_name).await?;
    let mut device = nth_device(&config, nic_index, "网卡", VirtualDevice::is_ethernet)?.clone();
    device.connectable = Some(ConnectInfo::connected(connected));
    info!(
        "虚拟机 {} 的 {} {}",
        vm.name,
        device.label,
        if connected { "已连接" } else { "已断开" }
    );

    reconfigure_device(session, &vm.moref, device).await
}

async fn reconfigure_device(
    session: &Session<'_>,
    vm: &vmops_inventory::ManagedObjectRef,
    device: VirtualDevice,
) -> Result<()> {
    let op = TaskOperation::Reconfigure {
        vm: vm.clone(),
        spec: VmConfigSpec {
            device_change: vec![DeviceConfigSpec {
                operation: DeviceOperation::Edit,
                file_operation: None,
                device,
            }],
            ..Default::default()
        },
    };
    session.driver().submit_and_await(&op, FaultPolicy::strict()).await?;
    Ok(())
}
