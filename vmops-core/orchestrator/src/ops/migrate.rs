//! 迁移工作流

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::info;
use vmops_inventory::{HostSummary, ManagedObjectRef, MovePriority, RelocateSpec, TaskOperation};

use super::Session;
use crate::error::{OrchestratorError, Result};
use crate::task::FaultPolicy;

/// 迁移选项，至少指定一个目标
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MigrateOptions {
    pub vm: String,

    #[serde(default)]
    pub host: Option<String>,

    #[serde(default)]
    pub pool: Option<String>,

    #[serde(default)]
    pub datastore: Option<String>,

    #[serde(default)]
    pub datastore_cluster: Option<String>,

    #[serde(default)]
    pub priority: MovePriority,
}

impl MigrateOptions {
    pub fn validate(&self) -> Result<()> {
        if self.host.is_none()
            && self.pool.is_none()
            && self.datastore.is_none()
            && self.datastore_cluster.is_none()
        {
            return Err(OrchestratorError::ConstraintViolation(
                "迁移至少需要指定主机、资源池、数据存储或数据存储集群之一".to_string(),
            ));
        }
        if self.datastore.is_some() && self.datastore_cluster.is_some() {
            return Err(OrchestratorError::ConstraintViolation(
                "数据存储与数据存储集群只能指定一个".to_string(),
            ));
        }
        Ok(())
    }
}

/// 构建迁移规格；只填写显式给出的目标
pub async fn relocate_spec(session: &Session<'_>, options: &MigrateOptions) -> Result<RelocateSpec> {
    options.validate()?;
    let selector = session.selector();

    let host = match &options.host {
        Some(name) => {
            let host = selector.find_host(session.dc(), name).await?;
            if host.in_maintenance_mode {
                return Err(OrchestratorError::ConstraintViolation(format!(
                    "主机 '{}' 处于维护模式",
                    host.name
                )));
            }
            Some(host)
        }
        None => None,
    };

    let pool = match (&options.pool, &host) {
        (Some(pool), _) => Some(selector.select_pool(session.dc(), pool).await?),
        // 跨计算资源迁移到主机时资源池取其根资源池
        (None, Some(host)) => session
            .inventory
            .compute_resources(std::slice::from_ref(&host.parent))
            .await?
            .into_iter()
            .next()
            .map(|c| c.resource_pool),
        (None, None) => None,
    };

    let datastore = match (&options.datastore, &options.datastore_cluster) {
        (Some(name), _) => Some(selector.datastore(session.dc(), name).await?),
        (None, Some(cluster)) => {
            let reachable = reachable_after_move(session, options, host.as_ref(), pool.as_ref()).await?;
            Some(
                selector
                    .datastore_from_cluster(session.dc(), cluster, reachable.as_ref())
                    .await?,
            )
        }
        (None, None) => None,
    };

    if let (Some(host), Some(ds)) = (&host, &datastore) {
        if !host.datastores.contains(&ds.moref) {
            return Err(OrchestratorError::ConstraintViolation(format!(
                "主机 '{}' 未挂载数据存储 '{}'",
                host.name, ds.name
            )));
        }
    }

    Ok(RelocateSpec {
        host: host.map(|h| h.moref),
        pool,
        datastore: datastore.map(|d| d.moref),
        disk_move_type: None,
        transform: None,
    })
}

/// 迁移后虚拟机所在主机能访问的数据存储
///
/// 目标主机优先，其次目标资源池所属计算资源，否则为虚拟机当前所在主机。
async fn reachable_after_move(
    session: &Session<'_>,
    options: &MigrateOptions,
    host: Option<&HostSummary>,
    pool: Option<&ManagedObjectRef>,
) -> Result<Option<HashSet<ManagedObjectRef>>> {
    if let Some(host) = host {
        return Ok(Some(host.datastores.iter().cloned().collect()));
    }
    let selector = session.selector();
    if let Some(pool) = pool {
        return match selector.owner_of_pool(session.dc(), pool).await? {
            Some(owner) => Ok(Some(selector.reachable_datastores(&owner).await?)),
            None => Ok(None),
        };
    }

    let vm = session.find_vm(&options.vm).await?;
    let current = session
        .inventory
        .vms(std::slice::from_ref(&vm.moref))
        .await?
        .into_iter()
        .next()
        .and_then(|summary| summary.host);
    match current {
        Some(current) => Ok(session
            .inventory
            .hosts(std::slice::from_ref(&current))
            .await?
            .into_iter()
            .next()
            .map(|h| h.datastores.into_iter().collect())),
        None => Ok(None),
    }
}

pub async fn migrate_vm(session: &Session<'_>, options: &MigrateOptions) -> Result<()> {
    let spec = relocate_spec(session, options).await?;
    let vm = session.find_vm(&options.vm).await?;
    info!("迁移虚拟机 {}: {:?}", vm.name, spec);

    let op = TaskOperation::Relocate {
        vm: vm.moref,
        spec,
        priority: options.priority,
    };
    session
        .driver()
        .submit_and_await(&op, FaultPolicy::strict())
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_a_target() {
        let options = MigrateOptions {
            vm: "web-01".into(),
            ..Default::default()
        };
        assert!(matches!(
            options.validate(),
            Err(OrchestratorError::ConstraintViolation(_))
        ));

        let options = MigrateOptions {
            vm: "web-01".into(),
            datastore: Some("ds1".into()),
            ..Default::default()
        };
        assert!(options.validate().is_ok());
    }
}
