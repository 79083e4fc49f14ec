//! 命令工作流
//!
//! 每个命令打开一个 [`Session`]：确定数据中心，携带本次调用的配置引用，
//! 然后按 解析 → 放置 → 构建规格 → 提交任务 → 就绪等待 的顺序执行。

pub mod clone;
pub mod disk;
pub mod listing;
pub mod migrate;
pub mod network;
pub mod power;
pub mod snapshot;

use tracing::{debug, info};
use vmops_inventory::{InventoryObject, InventoryService, ManagedObjectRef, VmConfigInfo};

use crate::config::OrchestratorConfig;
use crate::error::{OrchestratorError, Result};
use crate::placement::PlacementSelector;
use crate::readiness::ReadinessPoller;
use crate::resolver::PathResolver;
use crate::task::TaskDriver;

/// 单次命令的执行上下文
pub struct Session<'a> {
    pub inventory: &'a dyn InventoryService,
    pub config: &'a OrchestratorConfig,
    pub datacenter: InventoryObject,
}

impl<'a> Session<'a> {
    /// 打开会话
    ///
    /// 数据中心优先取参数，其次取配置默认值；都未给出时，清单中只有一个数据中心则使用它。
    pub async fn open(
        inventory: &'a dyn InventoryService,
        config: &'a OrchestratorConfig,
        datacenter: Option<&str>,
    ) -> Result<Session<'a>> {
        let resolver = PathResolver::new(inventory);
        let wanted = datacenter.or(config.defaults.datacenter.as_deref());

        let datacenter = match wanted {
            Some(name) => resolver.find_datacenter(name).await?,
            None => {
                let mut all = resolver.list_datacenters().await?;
                match all.len() {
                    1 => all.remove(0),
                    0 => return Err(OrchestratorError::not_found("数据中心", "*")),
                    n => {
                        return Err(OrchestratorError::Config(format!(
                            "清单中有 {} 个数据中心, 请指定 --datacenter",
                            n
                        )))
                    }
                }
            }
        };
        info!("使用数据中心: {}", datacenter.name);

        Ok(Session {
            inventory,
            config,
            datacenter,
        })
    }

    pub fn dc(&self) -> &ManagedObjectRef {
        &self.datacenter.moref
    }

    pub fn resolver(&self) -> PathResolver<'a> {
        PathResolver::new(self.inventory)
    }

    pub fn selector(&self) -> PlacementSelector<'a> {
        PlacementSelector::new(self.inventory)
    }

    pub fn driver(&self) -> TaskDriver<'a> {
        TaskDriver::new(self.inventory)
    }

    pub fn poller(&self) -> ReadinessPoller<'a> {
        ReadinessPoller::new(self.inventory)
            .with_transient_backoff(self.config.readiness.transient_backoff())
    }

    /// 在数据中心的 vm 根文件夹下查找虚拟机
    pub async fn find_vm(&self, name: &str) -> Result<InventoryObject> {
        self.resolver().find_vm(self.dc(), None, name).await
    }

    /// 查找虚拟机并读取其配置
    pub async fn vm_with_config(&self, name: &str) -> Result<(InventoryObject, VmConfigInfo)> {
        let vm = self.find_vm(name).await?;
        let config = self.inventory.vm_config(&vm.moref).await?;
        debug!("虚拟机 {} ({}) 有 {} 个设备", vm.name, vm.moref, config.devices.len());
        Ok((vm, config))
    }
}

/// 按 1 起始的序号选出某类设备
pub(crate) fn nth_device<'d, F>(
    config: &'d VmConfigInfo,
    index: usize,
    what: &str,
    pred: F,
) -> Result<&'d vmops_inventory::VirtualDevice>
where
    F: Fn(&vmops_inventory::VirtualDevice) -> bool,
{
    let devices: Vec<_> = config.devices.iter().filter(|d| pred(d)).collect();
    if index == 0 || index > devices.len() {
        return Err(OrchestratorError::ConstraintViolation(format!(
            "虚拟机 '{}' 没有第 {} 个{} (共 {} 个)",
            config.name,
            index,
            what,
            devices.len()
        )));
    }
    Ok(devices[index - 1])
}
