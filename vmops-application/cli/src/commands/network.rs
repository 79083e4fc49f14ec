//! Network 命令处理

use anyhow::Result;
use colored::Colorize;
use vmops_orchestrator::ops::network;

use super::common::AppContext;
use super::output::{print_table, NicRow};
use crate::NetworkAction;

pub async fn handle(app: &AppContext, action: NetworkAction) -> Result<()> {
    let session = app.session().await?;
    match action {
        NetworkAction::List { vm } => {
            let rows: Vec<NicRow> = network::list_nics(&session, &vm)
                .await?
                .iter()
                .enumerate()
                .map(|(i, d)| NicRow::from_device(i + 1, d))
                .collect();
            if rows.is_empty() {
                println!("{}", "虚拟机没有网卡".yellow());
            } else {
                print_table(&rows);
            }
        }
        NetworkAction::Set {
            vm,
            nic,
            network: target,
            switch,
        } => {
            network::set_network(&session, &vm, nic, &target, switch.as_deref()).await?;
            println!(
                "{} {} 网卡 {} 已切换到 {}",
                "✓".green().bold(),
                vm.cyan().bold(),
                nic,
                target.yellow()
            );
        }
        NetworkAction::Connect { vm, nic } => {
            network::set_connected(&session, &vm, nic, true).await?;
            println!("{} {} 网卡 {} 已连接", "✓".green().bold(), vm.cyan().bold(), nic);
        }
        NetworkAction::Disconnect { vm, nic } => {
            network::set_connected(&session, &vm, nic, false).await?;
            println!("{} {} 网卡 {} 已断开", "✓".green().bold(), vm.cyan().bold(), nic);
        }
    }
    Ok(())
}
