//! 列表与查找
//!
//! 名称过滤使用正则表达式；属性按批量接口分批获取。

use regex::Regex;
use serde::Serialize;
use tracing::debug;
use vmops_inventory::{
    DatastoreSummary, HostSummary, InventoryObject, ManagedObjectRef, NetworkSummary, ObjectKind,
    VmSummary,
};

use super::Session;
use crate::error::{OrchestratorError, Result};
use crate::placement::pick_from_datastore_cluster;
use crate::resolver::{KindFilter, TraversalOptions};

/// 单次批量属性查询的对象数
const PROPERTY_BATCH: usize = 100;

/// 数据存储集群及其成员
#[derive(Debug, Clone, Serialize)]
pub struct DatastoreClusterInfo {
    pub name: String,
    pub members: Vec<DatastoreSummary>,
    pub free_space: u64,
    pub capacity: u64,
}

/// 编译名称过滤表达式
pub fn compile_filter(pattern: Option<&str>) -> Result<Option<Regex>> {
    pattern
        .map(|p| {
            Regex::new(p).map_err(|e| {
                OrchestratorError::ConstraintViolation(format!("无效的过滤表达式 '{}': {}", p, e))
            })
        })
        .transpose()
}

fn keep(filter: &Option<Regex>, name: &str) -> bool {
    filter.as_ref().map(|re| re.is_match(name)).unwrap_or(true)
}

fn refs_of(objects: Vec<InventoryObject>) -> Vec<ManagedObjectRef> {
    objects.into_iter().map(|o| o.moref).collect()
}

async fn vm_summaries(session: &Session<'_>) -> Result<Vec<VmSummary>> {
    let folders = session.resolver().folders(session.dc()).await?;
    let refs = refs_of(
        session
            .resolver()
            .list_recursive(&folders.vm, KindFilter::VMS, TraversalOptions::default())
            .await?,
    );

    let mut summaries = Vec::with_capacity(refs.len());
    for batch in refs.chunks(PROPERTY_BATCH) {
        debug!("获取 {} 台虚拟机属性", batch.len());
        summaries.extend(session.inventory.vms(batch).await?);
    }
    Ok(summaries)
}

/// 虚拟机（不含模板）
pub async fn list_vms(session: &Session<'_>, pattern: Option<&str>) -> Result<Vec<VmSummary>> {
    let filter = compile_filter(pattern)?;
    Ok(vm_summaries(session)
        .await?
        .into_iter()
        .filter(|vm| !vm.template && keep(&filter, &vm.name))
        .collect())
}

pub async fn list_templates(session: &Session<'_>, pattern: Option<&str>) -> Result<Vec<VmSummary>> {
    let filter = compile_filter(pattern)?;
    Ok(vm_summaries(session)
        .await?
        .into_iter()
        .filter(|vm| vm.template && keep(&filter, &vm.name))
        .collect())
}

pub async fn list_hosts(session: &Session<'_>, pattern: Option<&str>) -> Result<Vec<HostSummary>> {
    let filter = compile_filter(pattern)?;
    Ok(session
        .selector()
        .list_hosts(session.dc())
        .await?
        .into_iter()
        .filter(|h| keep(&filter, &h.name))
        .collect())
}

pub async fn list_datastores(
    session: &Session<'_>,
    pattern: Option<&str>,
) -> Result<Vec<DatastoreSummary>> {
    let filter = compile_filter(pattern)?;
    let folders = session.resolver().folders(session.dc()).await?;
    let refs = refs_of(
        session
            .resolver()
            .list_recursive(&folders.datastore, KindFilter::DATASTORES, TraversalOptions::default())
            .await?,
    );
    Ok(session
        .inventory
        .datastores(&refs)
        .await?
        .into_iter()
        .filter(|d| keep(&filter, &d.name))
        .collect())
}

/// 可用空间最大的可访问数据存储
pub async fn max_free_datastore(
    session: &Session<'_>,
    pattern: Option<&str>,
) -> Result<DatastoreSummary> {
    let candidates: Vec<DatastoreSummary> = list_datastores(session, pattern)
        .await?
        .into_iter()
        .filter(|d| d.accessible)
        .collect();
    pick_from_datastore_cluster(&candidates)
        .cloned()
        .ok_or_else(|| {
            OrchestratorError::NotFound(format!(
                "没有匹配 '{}' 的可用数据存储",
                pattern.unwrap_or("*")
            ))
        })
}

pub async fn list_datastore_clusters(session: &Session<'_>) -> Result<Vec<DatastoreClusterInfo>> {
    let folders = session.resolver().folders(session.dc()).await?;
    let pods = session
        .resolver()
        .list_recursive(
            &folders.datastore,
            KindFilter::DATASTORE_CLUSTERS,
            TraversalOptions::default(),
        )
        .await?;

    let mut clusters = Vec::with_capacity(pods.len());
    for pod in pods {
        let member_refs: Vec<ManagedObjectRef> = session
            .inventory
            .children(&pod.moref)
            .await?
            .into_iter()
            .filter(|c| c.kind() == ObjectKind::Datastore)
            .map(|c| c.moref)
            .collect();
        let members = session.inventory.datastores(&member_refs).await?;
        clusters.push(DatastoreClusterInfo {
            name: pod.name,
            free_space: members.iter().map(|m| m.free_space).sum(),
            capacity: members.iter().map(|m| m.capacity).sum(),
            members,
        });
    }
    Ok(clusters)
}

pub async fn list_networks(
    session: &Session<'_>,
    pattern: Option<&str>,
) -> Result<Vec<NetworkSummary>> {
    let filter = compile_filter(pattern)?;
    let folders = session.resolver().folders(session.dc()).await?;
    let refs = refs_of(
        session
            .resolver()
            .list_recursive(&folders.network, KindFilter::NETWORKS, TraversalOptions::default())
            .await?,
    );
    Ok(session
        .inventory
        .networks(&refs)
        .await?
        .into_iter()
        .filter(|n| keep(&filter, &n.name))
        .collect())
}

/// 资源池路径（相对 host 根文件夹，含 vApp）
pub async fn list_pools(session: &Session<'_>) -> Result<Vec<(String, InventoryObject)>> {
    let folders = session.resolver().folders(session.dc()).await?;
    session
        .resolver()
        .list_paths(&folders.host, KindFilter::POOLS, TraversalOptions::default())
        .await
}

/// 虚拟机文件夹路径（相对 vm 根文件夹）
pub async fn list_folders(session: &Session<'_>) -> Result<Vec<(String, InventoryObject)>> {
    let folders = session.resolver().folders(session.dc()).await?;
    session
        .resolver()
        .list_paths(&folders.vm, KindFilter::FOLDERS, TraversalOptions::default())
        .await
}

pub async fn list_customization_specs(
    session: &Session<'_>,
    pattern: Option<&str>,
) -> Result<Vec<String>> {
    let filter = compile_filter(pattern)?;
    Ok(session
        .inventory
        .customization_spec_names()
        .await?
        .into_iter()
        .filter(|n| keep(&filter, n))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_pattern() {
        assert!(matches!(
            compile_filter(Some("web-(")),
            Err(OrchestratorError::ConstraintViolation(_))
        ));
        assert!(compile_filter(None).unwrap().is_none());
    }

    #[test]
    fn test_keep() {
        let filter = compile_filter(Some("^web-\\d+$")).unwrap();
        assert!(keep(&filter, "web-01"));
        assert!(!keep(&filter, "db-01"));
        assert!(keep(&None, "anything"));
    }
}
