//! List 命令处理

use anyhow::Result;
use colored::Colorize;
use vmops_orchestrator::ops::listing;

use super::common::AppContext;
use super::output::{output_formatted, NameRow, PathRow};
use crate::{ListAction, ListArgs};

pub async fn handle(app: &AppContext, action: ListAction) -> Result<()> {
    let session = app.session().await?;
    match action {
        ListAction::Vms(args) => {
            let vms = listing::list_vms(&session, args.pattern.as_deref()).await?;
            output_formatted(&vms, &args.format)?;
        }
        ListAction::Templates(args) => {
            let templates = listing::list_templates(&session, args.pattern.as_deref()).await?;
            output_formatted(&templates, &args.format)?;
        }
        ListAction::Hosts(args) => {
            let hosts = listing::list_hosts(&session, args.pattern.as_deref()).await?;
            output_formatted(&hosts, &args.format)?;
        }
        ListAction::Datastores(args) => {
            let datastores = listing::list_datastores(&session, args.pattern.as_deref()).await?;
            output_formatted(&datastores, &args.format)?;
        }
        ListAction::MaxFree(args) => {
            let best = listing::max_free_datastore(&session, args.pattern.as_deref()).await?;
            if args.format == "table" {
                println!("{}", best.name.green().bold());
            } else {
                output_formatted(std::slice::from_ref(&best), &args.format)?;
            }
        }
        ListAction::DatastoreClusters(args) => {
            let filter = listing::compile_filter(args.pattern.as_deref())?;
            let clusters: Vec<_> = listing::list_datastore_clusters(&session)
                .await?
                .into_iter()
                .filter(|c| filter.as_ref().map(|re| re.is_match(&c.name)).unwrap_or(true))
                .collect();
            output_formatted(&clusters, &args.format)?;
        }
        ListAction::Networks(args) => {
            let networks = listing::list_networks(&session, args.pattern.as_deref()).await?;
            output_formatted(&networks, &args.format)?;
        }
        ListAction::Pools(args) => {
            let pools = path_rows(listing::list_pools(&session).await?, &args)?;
            output_formatted(&pools, &args.format)?;
        }
        ListAction::Folders(args) => {
            let folders = path_rows(listing::list_folders(&session).await?, &args)?;
            output_formatted(&folders, &args.format)?;
        }
        ListAction::CustomizationSpecs(args) => {
            let names: Vec<NameRow> =
                listing::list_customization_specs(&session, args.pattern.as_deref())
                    .await?
                    .into_iter()
                    .map(|name| NameRow { name })
                    .collect();
            output_formatted(&names, &args.format)?;
        }
    }
    Ok(())
}

/// 按路径过滤并转换为输出行
fn path_rows(
    entries: Vec<(String, vmops_inventory::InventoryObject)>,
    args: &ListArgs,
) -> Result<Vec<PathRow>> {
    let filter = listing::compile_filter(args.pattern.as_deref())?;
    Ok(entries
        .into_iter()
        .filter(|(path, _)| filter.as_ref().map(|re| re.is_match(path)).unwrap_or(true))
        .map(PathRow::from)
        .collect())
}
