//! 电源操作

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;
use vmops_inventory::{ManagedObjectRef, PowerState, TaskOperation};

use super::Session;
use crate::error::{OrchestratorError, Result};
use crate::readiness::PollContext;
use crate::task::FaultPolicy;

/// 电源动作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerAction {
    On,
    Off,
    Reset,
    Suspend,
}

impl PowerAction {
    /// 动作完成后的电源状态
    pub fn target_state(&self) -> PowerState {
        match self {
            PowerAction::On | PowerAction::Reset => PowerState::PoweredOn,
            PowerAction::Off => PowerState::PoweredOff,
            PowerAction::Suspend => PowerState::Suspended,
        }
    }

    fn operation(&self, vm: ManagedObjectRef) -> TaskOperation {
        match self {
            PowerAction::On => TaskOperation::PowerOn { vm },
            PowerAction::Off => TaskOperation::PowerOff { vm },
            PowerAction::Reset => TaskOperation::Reset { vm },
            PowerAction::Suspend => TaskOperation::Suspend { vm },
        }
    }
}

/// 电源操作结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerOutcome {
    Changed,
    /// 已处于目标状态，未提交任务
    AlreadyInState,
}

/// 执行电源动作；`wait` 给出时等待电源状态生效
pub async fn power(
    session: &Session<'_>,
    vm_name: &str,
    action: PowerAction,
    wait: Option<Duration>,
    cancel: &CancellationToken,
) -> Result<PowerOutcome> {
    let vm = session.find_vm(vm_name).await?;
    let summary = session
        .inventory
        .vms(std::slice::from_ref(&vm.moref))
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| OrchestratorError::not_found("虚拟机", vm_name))?;

    if summary.template {
        return Err(OrchestratorError::Unsupported(format!(
            "'{}' 是模板, 不能执行电源操作",
            vm_name
        )));
    }

    let target = action.target_state();
    if action != PowerAction::Reset && summary.power_state == target {
        info!("虚拟机 {} 已处于{}状态", vm.name, target.display_name());
        return Ok(PowerOutcome::AlreadyInState);
    }
    if action == PowerAction::Reset && summary.power_state != PowerState::PoweredOn {
        return Err(OrchestratorError::ConstraintViolation(format!(
            "虚拟机 '{}' 未运行, 不能重置",
            vm_name
        )));
    }

    info!("虚拟机 {}: {:?}", vm.name, action);
    session
        .driver()
        .submit_and_await(&action.operation(vm.moref.clone()), FaultPolicy::strict())
        .await?;

    if let Some(timeout) = wait {
        let interval = Duration::from_secs(session.config.readiness.ip_interval);
        let ctx = PollContext::new(timeout, interval).with_cancel(cancel);
        session
            .poller()
            .wait_for_power_state(&vm.moref, target, &ctx)
            .await?;
    }
    Ok(PowerOutcome::Changed)
}
