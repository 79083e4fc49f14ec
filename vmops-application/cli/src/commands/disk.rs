//! Disk 命令处理

use anyhow::Result;
use colored::Colorize;
use vmops_orchestrator::ops::disk;

use super::common::AppContext;
use super::output::output_formatted;
use crate::DiskAction;

pub async fn handle(app: &AppContext, action: DiskAction) -> Result<()> {
    let session = app.session().await?;
    match action {
        DiskAction::List { vm, format } => {
            let disks = disk::list_disks(&session, &vm).await?;
            output_formatted(&disks, &format)?;
        }
        DiskAction::Add {
            vm,
            size,
            thin,
            datastore,
        } => {
            disk::add_disk(&session, &vm, size, thin, datastore.as_deref()).await?;
            println!(
                "{} 虚拟机 {} 新增 {}GB 磁盘{}",
                "✓".green().bold(),
                vm.cyan().bold(),
                size,
                if thin { " (精简置备)" } else { "" }
            );
        }
        DiskAction::Extend { vm, index, size } => {
            disk::extend_disk(&session, &vm, index, size).await?;
            println!(
                "{} 虚拟机 {} 磁盘 {} 已扩容到 {}GB",
                "✓".green().bold(),
                vm.cyan().bold(),
                index,
                size
            );
        }
        DiskAction::Remove {
            vm,
            index,
            keep_files,
        } => {
            disk::remove_disk(&session, &vm, index, !keep_files).await?;
            println!(
                "{} 虚拟机 {} 磁盘 {} 已移除{}",
                "✓".green().bold(),
                vm.cyan().bold(),
                index,
                if keep_files { " (保留文件)" } else { "" }
            );
        }
    }
    Ok(())
}
