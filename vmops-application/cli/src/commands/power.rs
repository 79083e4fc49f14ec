//! Power 命令处理

use anyhow::{Context, Result};
use colored::Colorize;
use std::time::Duration;
use vmops_orchestrator::ops::power::power;
use vmops_orchestrator::{PowerAction, PowerOutcome};

use super::common::{spinner, AppContext};
use crate::PowerArg;

pub async fn handle(
    app: &AppContext,
    vm: &str,
    action: PowerArg,
    wait_secs: Option<u64>,
) -> Result<()> {
    let action = match action {
        PowerArg::On => PowerAction::On,
        PowerArg::Off => PowerAction::Off,
        PowerArg::Reset => PowerAction::Reset,
        PowerArg::Suspend => PowerAction::Suspend,
    };
    let session = app.session().await?;

    let progress = spinner(format!("{} {:?}", vm, action));
    let result = power(
        &session,
        vm,
        action,
        wait_secs.map(Duration::from_secs),
        &app.cancel,
    )
    .await;
    progress.finish_and_clear();

    let state = action.target_state().display_name();
    match result.with_context(|| format!("虚拟机 {} 电源操作失败", vm))? {
        PowerOutcome::Changed => {
            println!("{} 虚拟机 {} → {}", "✓".green().bold(), vm.cyan().bold(), state.green());
        }
        PowerOutcome::AlreadyInState => {
            println!(
                "{} 虚拟机 {} 已处于{}状态",
                "-".bright_black(),
                vm.cyan().bold(),
                state
            );
        }
    }
    Ok(())
}
