//! 任务驱动与故障分类
//!
//! 提交一个变更操作并阻塞等待其结束。远程故障按类型分为可恢复与致命两类；
//! 同名冲突是否可恢复由调用方按操作决定。

use tracing::{info, warn};
use vmops_inventory::{
    FaultKind, InventoryService, ManagedObjectRef, RemoteFault, TaskOperation, TaskResult,
};

use crate::error::{OrchestratorError, Result};

/// 故障处理策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaultPolicy {
    /// 同名冲突视为可恢复（对象已存在，继续后续步骤）
    pub recover_duplicate_name: bool,
}

impl FaultPolicy {
    /// 克隆：同名冲突可恢复
    pub fn for_clone() -> Self {
        Self {
            recover_duplicate_name: true,
        }
    }

    /// 迁移、删除、快照、磁盘、电源等操作：所有故障均致命
    pub fn strict() -> Self {
        Self {
            recover_duplicate_name: false,
        }
    }
}

/// 任务结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    /// 正常完成
    Completed { result: Option<ManagedObjectRef> },
    /// 远程报告故障但按策略可以继续
    Recovered { fault: RemoteFault },
}

impl TaskOutcome {
    pub fn result(&self) -> Option<&ManagedObjectRef> {
        match self {
            TaskOutcome::Completed { result } => result.as_ref(),
            TaskOutcome::Recovered { .. } => None,
        }
    }
}

/// 对远程故障分类
pub fn classify(
    operation: &TaskOperation,
    fault: RemoteFault,
    policy: FaultPolicy,
) -> Result<TaskOutcome> {
    match &fault.kind {
        FaultKind::NicSettingMismatch {
            num_copies_of_nic_mapping,
            num_network_cards,
        } => {
            let vm_name = match operation {
                TaskOperation::CloneVm { name, .. } => name.clone(),
                other => other.target().to_string(),
            };
            Err(OrchestratorError::CustomizationNicMismatch {
                vm_name,
                nic_mapping_count: *num_copies_of_nic_mapping,
                nic_count: *num_network_cards,
            })
        }
        FaultKind::DuplicateName { name, .. } if policy.recover_duplicate_name => {
            warn!("{}: 对象 '{}' 已存在, 继续执行", operation.label(), name);
            Ok(TaskOutcome::Recovered { fault })
        }
        _ => Err(OrchestratorError::RemoteFault {
            operation: operation.label().to_string(),
            fault,
        }),
    }
}

/// 任务驱动
pub struct TaskDriver<'a> {
    inventory: &'a dyn InventoryService,
}

impl<'a> TaskDriver<'a> {
    pub fn new(inventory: &'a dyn InventoryService) -> Self {
        Self { inventory }
    }

    /// 提交并等待任务结束；同一时刻只有一个未完成的变更
    pub async fn submit_and_await(
        &self,
        operation: &TaskOperation,
        policy: FaultPolicy,
    ) -> Result<TaskOutcome> {
        info!("提交 {} -> {}", operation.label(), operation.target());
        let handle = self.inventory.submit(operation).await?;

        match self.inventory.wait_for_task(&handle).await? {
            TaskResult::Succeeded { result } => {
                info!("{} 完成 (任务 {})", operation.label(), handle.id);
                Ok(TaskOutcome::Completed { result })
            }
            TaskResult::Faulted(fault) => {
                warn!("{} 失败 (任务 {}): {}", operation.label(), handle.id, fault);
                classify(operation, fault, policy)
            }
        }
    }
}
