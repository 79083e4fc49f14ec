//! Migrate 命令处理

use anyhow::{Context, Result};
use colored::Colorize;
use vmops_inventory::MovePriority;
use vmops_orchestrator::{migrate_vm, MigrateOptions};

use super::common::{spinner, AppContext};
use crate::{MigrateArgs, PriorityArg};

pub async fn handle(app: &AppContext, args: MigrateArgs) -> Result<()> {
    let options = MigrateOptions {
        vm: args.vm,
        host: args.host,
        pool: args.pool,
        datastore: args.datastore,
        datastore_cluster: args.datastore_cluster,
        priority: match args.priority {
            PriorityArg::Default => MovePriority::Default,
            PriorityArg::High => MovePriority::High,
            PriorityArg::Low => MovePriority::Low,
        },
    };
    let session = app.session().await?;

    let progress = spinner(format!("迁移 {}", options.vm));
    let result = migrate_vm(&session, &options).await;
    progress.finish_and_clear();
    result.with_context(|| format!("迁移虚拟机 {} 失败", options.vm))?;

    println!("{} 虚拟机 {} 迁移完成", "✓".green().bold(), options.vm.cyan().bold());
    for (label, target) in [
        ("主机", &options.host),
        ("资源池", &options.pool),
        ("数据存储", &options.datastore),
        ("数据存储集群", &options.datastore_cluster),
    ] {
        if let Some(target) = target {
            println!("  {}: {}", label, target.yellow());
        }
    }
    Ok(())
}
