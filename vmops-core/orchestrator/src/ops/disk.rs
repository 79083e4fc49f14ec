//! 磁盘工作流

use serde::Serialize;
use tracing::info;
use vmops_inventory::{
    DeviceConfigSpec, DeviceInfo, DeviceOperation, FileOperation, ManagedObjectRef, TaskOperation,
    VirtualDevice, VmConfigInfo, VmConfigSpec,
};

use super::{nth_device, Session};
use crate::error::{OrchestratorError, Result};
use crate::task::FaultPolicy;

/// SCSI 控制器保留给自身的单元号
const SCSI_RESERVED_UNIT: i32 = 7;
const SCSI_MAX_UNITS: i32 = 16;

/// 磁盘列表中的一行
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiskInfo {
    /// 1 起始
    pub index: usize,
    pub label: String,
    pub capacity_gb: f64,
    pub thin: bool,
    pub file_name: Option<String>,
}

fn gib_to_kb(gib: f64) -> u64 {
    (gib * 1024.0 * 1024.0).round() as u64
}

/// 磁盘大小必须是大于 0 的有限值
fn check_size(size_gb: f64) -> Result<()> {
    if !size_gb.is_finite() || size_gb <= 0.0 {
        return Err(OrchestratorError::ConstraintViolation(format!(
            "无效的磁盘大小: {}",
            size_gb
        )));
    }
    Ok(())
}

fn disk_capacity_kb(device: &VirtualDevice) -> u64 {
    match &device.info {
        DeviceInfo::Disk { capacity_kb, .. } => *capacity_kb,
        _ => 0,
    }
}

pub fn disks_of(config: &VmConfigInfo) -> Vec<DiskInfo> {
    config
        .devices
        .iter()
        .filter(|d| d.is_disk())
        .enumerate()
        .filter_map(|(i, d)| match &d.info {
            DeviceInfo::Disk {
                capacity_kb,
                thin,
                file_name,
                ..
            } => Some(DiskInfo {
                index: i + 1,
                label: d.label.clone(),
                capacity_gb: *capacity_kb as f64 / (1024.0 * 1024.0),
                thin: *thin,
                file_name: file_name.clone(),
            }),
            _ => None,
        })
        .collect()
}

/// 第一个有空闲单元号的 SCSI 控制器及单元号
fn free_scsi_slot(config: &VmConfigInfo) -> Result<(i32, i32)> {
    for controller in config.devices.iter().filter(|d| d.is_scsi_controller()) {
        let used: Vec<i32> = config
            .devices
            .iter()
            .filter(|d| d.controller_key == Some(controller.key))
            .filter_map(|d| d.unit_number)
            .collect();
        if let Some(unit) =
            (0..SCSI_MAX_UNITS).find(|u| *u != SCSI_RESERVED_UNIT && !used.contains(u))
        {
            return Ok((controller.key, unit));
        }
    }
    Err(OrchestratorError::ConstraintViolation(format!(
        "虚拟机 '{}' 没有可用的 SCSI 控制器插槽",
        config.name
    )))
}

pub async fn list_disks(session: &Session<'_>, vm_name: &str) -> Result<Vec<DiskInfo>> {
    let (_, config) = session.vm_with_config(vm_name).await?;
    Ok(disks_of(&config))
}

/// 新增磁盘
pub async fn add_disk(
    session: &Session<'_>,
    vm_name: &str,
    size_gb: f64,
    thin: bool,
    datastore: Option<&str>,
) -> Result<()> {
    check_size(size_gb)?;
    let (vm, config) = session.vm_with_config(vm_name).await?;
    let (controller_key, unit_number) = free_scsi_slot(&config)?;
    let datastore = match datastore {
        Some(name) => Some(session.selector().datastore(session.dc(), name).await?.moref),
        None => None,
    };

    info!(
        "为虚拟机 {} 新增 {}GB 磁盘 (控制器 {}, 单元 {})",
        vm.name, size_gb, controller_key, unit_number
    );
    let device = VirtualDevice {
        key: -1,
        label: "New Hard disk".to_string(),
        controller_key: Some(controller_key),
        unit_number: Some(unit_number),
        connectable: None,
        info: DeviceInfo::Disk {
            capacity_kb: gib_to_kb(size_gb),
            thin,
            file_name: None,
            datastore,
        },
    };
    submit_change(
        session,
        &vm.moref,
        DeviceOperation::Add,
        Some(FileOperation::Create),
        device,
    )
    .await
}

/// 扩容第 `index` 块磁盘；新容量必须大于当前容量
pub async fn extend_disk(
    session: &Session<'_>,
    vm_name: &str,
    index: usize,
    new_size_gb: f64,
) -> Result<()> {
    check_size(new_size_gb)?;
    let (vm, config) = session.vm_with_config(vm_name).await?;
    let mut device = nth_device(&config, index, "磁盘", VirtualDevice::is_disk)?.clone();
    let current = disk_capacity_kb(&device);
    let wanted = gib_to_kb(new_size_gb);
    if wanted <= current {
        return Err(OrchestratorError::ConstraintViolation(format!(
            "{} 只能扩容: 当前 {}KB, 请求 {}KB",
            device.label, current, wanted
        )));
    }

    if let DeviceInfo::Disk { capacity_kb, .. } = &mut device.info {
        *capacity_kb = wanted;
    }
    info!("虚拟机 {} 的 {} 扩容到 {}GB", vm.name, device.label, new_size_gb);
    submit_change(session, &vm.moref, DeviceOperation::Edit, None, device).await
}

/// 移除第 `index` 块磁盘，`destroy_files` 时同时删除磁盘文件
pub async fn remove_disk(
    session: &Session<'_>,
    vm_name: &str,
    index: usize,
    destroy_files: bool,
) -> Result<()> {
    let (vm, config) = session.vm_with_config(vm_name).await?;
    let device = nth_device(&config, index, "磁盘", VirtualDevice::is_disk)?.clone();
    info!("移除虚拟机 {} 的 {}", vm.name, device.label);
    let file_operation = destroy_files.then_some(FileOperation::Destroy);
    submit_change(session, &vm.moref, DeviceOperation::Remove, file_operation, device).await
}

async fn submit_change(
    session: &Session<'_>,
    vm: &ManagedObjectRef,
    operation: DeviceOperation,
    file_operation: Option<FileOperation>,
    device: VirtualDevice,
) -> Result<()> {
    let op = TaskOperation::Reconfigure {
        vm: vm.clone(),
        spec: VmConfigSpec {
            device_change: vec![DeviceConfigSpec {
                operation,
                file_operation,
                device,
            }],
            ..Default::default()
        },
    };
    session
        .driver()
        .submit_and_await(&op, FaultPolicy::strict())
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(
        key: i32,
        controller: Option<i32>,
        unit: Option<i32>,
        info: DeviceInfo,
    ) -> VirtualDevice {
        VirtualDevice {
            key,
            label: format!("device {}", key),
            controller_key: controller,
            unit_number: unit,
            connectable: None,
            info,
        }
    }

    fn disk(key: i32, unit: i32) -> VirtualDevice {
        device(
            key,
            Some(1000),
            Some(unit),
            DeviceInfo::Disk {
                capacity_kb: 10 * 1024 * 1024,
                thin: true,
                file_name: None,
                datastore: None,
            },
        )
    }

    fn config(devices: Vec<VirtualDevice>) -> VmConfigInfo {
        VmConfigInfo {
            name: "db-01".into(),
            guest_id: "ubuntu64Guest".into(),
            guest_full_name: "Ubuntu Linux (64-bit)".into(),
            template: false,
            num_cpu: 2,
            num_cores_per_socket: 1,
            memory_mb: 4096,
            annotation: None,
            devices,
            vapp_properties: vec![],
            current_snapshot: None,
        }
    }

    fn controller() -> VirtualDevice {
        device(1000, Some(100), Some(3), DeviceInfo::ScsiController { bus_number: 0 })
    }

    #[test]
    fn test_disk_size_must_be_finite_and_positive() {
        assert!(check_size(0.5).is_ok());
        for size in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                check_size(size),
                Err(OrchestratorError::ConstraintViolation(_))
            ));
        }
    }

    #[test]
    fn test_free_slot_skips_reserved_unit() {
        let mut devices = vec![controller()];
        devices.extend((0..7).map(|u| disk(2000 + u, u)));
        assert_eq!(free_scsi_slot(&config(devices)).unwrap(), (1000, 8));
    }

    #[test]
    fn test_no_controller() {
        assert!(matches!(
            free_scsi_slot(&config(vec![])),
            Err(OrchestratorError::ConstraintViolation(_))
        ));
    }

    #[test]
    fn test_disk_listing() {
        let disks = disks_of(&config(vec![controller(), disk(2000, 0), disk(2001, 1)]));
        assert_eq!(disks.len(), 2);
        assert_eq!(disks[1].index, 2);
        assert!((disks[0].capacity_gb - 10.0).abs() < f64::EPSILON);
    }
}
