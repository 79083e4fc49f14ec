//! Snapshot 命令处理

use anyhow::Result;
use colored::Colorize;
use vmops_orchestrator::ops::snapshot;

use super::common::{spinner, AppContext};
use super::output::output_formatted;
use crate::SnapshotAction;

pub async fn handle(app: &AppContext, action: SnapshotAction) -> Result<()> {
    let session = app.session().await?;
    match action {
        SnapshotAction::Create {
            vm,
            name,
            description,
            memory,
            quiesce,
        } => {
            let progress = spinner(format!("创建快照 {}/{}", vm, name));
            let result =
                snapshot::create_snapshot(&session, &vm, &name, &description, memory, quiesce)
                    .await;
            progress.finish_and_clear();
            result?;
            println!(
                "{} 虚拟机 {} 快照 {} 已创建",
                "✓".green().bold(),
                vm.cyan().bold(),
                name.yellow()
            );
        }
        SnapshotAction::List { vm, format } => {
            let entries = snapshot::list_snapshots(&session, &vm).await?;
            if entries.is_empty() && format == "table" {
                println!("{}", "虚拟机没有快照".yellow());
            } else {
                output_formatted(&entries, &format)?;
            }
        }
        SnapshotAction::Revert { vm, name } => {
            snapshot::revert_snapshot(&session, &vm, name.as_deref()).await?;
            println!(
                "{} 虚拟机 {} 已恢复到快照 {}",
                "✓".green().bold(),
                vm.cyan().bold(),
                name.as_deref().unwrap_or("(当前)").yellow()
            );
        }
        SnapshotAction::Delete { vm, name, children } => {
            snapshot::delete_snapshot(&session, &vm, &name, children).await?;
            println!(
                "{} 虚拟机 {} 快照 {} 已删除{}",
                "✓".green().bold(),
                vm.cyan().bold(),
                name.yellow(),
                if children { " (含子快照)" } else { "" }
            );
        }
    }
    Ok(())
}
