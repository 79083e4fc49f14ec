//! 放置选择
//!
//! 根据显式约束（主机、资源池、数据存储、数据存储集群、网络）逐步淘汰候选计算资源，
//! 并在剩余候选中按固定规则决胜。

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info, warn};
use vmops_inventory::{
    ComputeResourceSummary, DatastoreSummary, HostSummary, InventoryObject, InventoryService,
    ManagedObjectRef, ObjectKind,
};

use crate::error::{OrchestratorError, Result};
use crate::resolver::{KindFilter, PathResolver, TraversalOptions};
use crate::spec::network::is_auto;

/// 放置约束
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlacementConstraints {
    /// 目标主机名称
    #[serde(default)]
    pub host: Option<String>,

    /// 资源池路径或名称（集群名也可以）
    #[serde(default)]
    pub pool: Option<String>,

    #[serde(default)]
    pub datastore: Option<String>,

    #[serde(default)]
    pub datastore_cluster: Option<String>,

    /// 网络 / VLAN 名称，按网卡顺序
    #[serde(default)]
    pub networks: Vec<String>,

    /// 分布式交换机 UUID 或名称，与 `networks` 一一对应；`auto` 表示不限
    #[serde(default)]
    pub switches: Vec<String>,
}

impl PlacementConstraints {
    /// 数据存储与数据存储集群互斥
    pub fn check_exclusive(&self) -> Result<()> {
        if self.datastore.is_some() && self.datastore_cluster.is_some() {
            return Err(OrchestratorError::ConstraintViolation(
                "数据存储与数据存储集群只能指定一个".to_string(),
            ));
        }
        Ok(())
    }
}

/// 解析完成的放置位置
#[derive(Debug, Clone, PartialEq)]
pub struct Placement {
    /// 显式指定的主机
    pub host: Option<HostSummary>,

    /// 目标资源池
    pub pool: ManagedObjectRef,

    /// 目标数据存储；为空时沿用模板所在存储
    pub datastore: Option<DatastoreSummary>,
}

/// 在数据存储集群成员中选择可用空间最大的一个
///
/// 从第一个成员开始，后续成员只有严格更大时才替换。
pub fn pick_from_datastore_cluster(members: &[DatastoreSummary]) -> Option<&DatastoreSummary> {
    let mut best: Option<&DatastoreSummary> = None;
    for member in members {
        match best {
            Some(current) if member.free_space <= current.free_space => {}
            _ => best = Some(member),
        }
    }
    best
}

/// 计算资源中非维护模式主机能访问的数据存储与网络
struct Reach {
    datastores: HashSet<ManagedObjectRef>,
    networks: HashSet<ManagedObjectRef>,
}

impl Reach {
    /// 没有可用主机时返回 `None`
    fn of(compute: &ComputeResourceSummary, active: &[HostSummary]) -> Option<Self> {
        let hosts: Vec<&HostSummary> = active
            .iter()
            .filter(|h| compute.hosts.contains(&h.moref))
            .collect();
        if hosts.is_empty() {
            return None;
        }
        Some(Self {
            datastores: hosts.iter().flat_map(|h| h.datastores.iter().cloned()).collect(),
            networks: hosts.iter().flat_map(|h| h.networks.iter().cloned()).collect(),
        })
    }
}

/// 放置选择器
pub struct PlacementSelector<'a> {
    inventory: &'a dyn InventoryService,
    resolver: PathResolver<'a>,
}

impl<'a> PlacementSelector<'a> {
    pub fn new(inventory: &'a dyn InventoryService) -> Self {
        Self {
            inventory,
            resolver: PathResolver::new(inventory),
        }
    }

    /// 按约束淘汰计算资源
    ///
    /// 淘汰顺序固定：维护模式、数据存储、数据存储集群、网络。任何一步清空候选集都会
    /// 以说明该步条件的消息失败。存储与网络条件只按非维护模式主机挂载的对象判断。
    /// 剩余候选保持遍历顺序，调用方取第一个。
    pub async fn select_hosts(
        &self,
        datacenter: &ManagedObjectRef,
        constraints: &PlacementConstraints,
    ) -> Result<Vec<ComputeResourceSummary>> {
        constraints.check_exclusive()?;
        let folders = self.resolver.folders(datacenter).await?;

        let refs: Vec<ManagedObjectRef> = self
            .resolver
            .list_recursive(&folders.host, KindFilter::COMPUTE, TraversalOptions::pools())
            .await?
            .into_iter()
            .map(|o| o.moref)
            .collect();
        if refs.is_empty() {
            return Err(OrchestratorError::ConstraintViolation(
                "数据中心下没有任何计算资源".to_string(),
            ));
        }
        let computes = self.inventory.compute_resources(&refs).await?;
        debug!("候选计算资源: {}", computes.len());

        // 1. 维护模式：之后的存储与网络条件只看非维护模式主机能访问到的对象
        let host_refs: Vec<ManagedObjectRef> =
            computes.iter().flat_map(|c| c.hosts.iter().cloned()).collect();
        let active: Vec<HostSummary> = self
            .inventory
            .hosts(&host_refs)
            .await?
            .into_iter()
            .filter(|h| !h.in_maintenance_mode)
            .collect();
        let mut candidates: Vec<(ComputeResourceSummary, Reach)> = computes
            .into_iter()
            .filter_map(|c| {
                let reach = Reach::of(&c, &active)?;
                Some((c, reach))
            })
            .collect();
        if candidates.is_empty() {
            return Err(OrchestratorError::ConstraintViolation(
                "没有处于非维护模式的主机".to_string(),
            ));
        }

        // 2. 数据存储
        if let Some(name) = &constraints.datastore {
            let ds = self.resolver.find_datastore(datacenter, name).await?;
            candidates.retain(|(_, reach)| reach.datastores.contains(&ds.moref));
            if candidates.is_empty() {
                return Err(OrchestratorError::ConstraintViolation(format!(
                    "没有主机挂载所需的数据存储 '{}'",
                    name
                )));
            }
        }

        // 3. 数据存储集群
        if let Some(name) = &constraints.datastore_cluster {
            let members = self.cluster_members(datacenter, name).await?;
            candidates.retain(|(_, reach)| members.iter().any(|m| reach.datastores.contains(m)));
            if candidates.is_empty() {
                return Err(OrchestratorError::ConstraintViolation(format!(
                    "没有主机挂载所需数据存储集群 '{}' 的成员",
                    name
                )));
            }
        }

        // 4. 网络：必须同时具备全部网络，指定交换机时只认该交换机上的端口组
        if !constraints.networks.is_empty() {
            let mut wanted: Vec<Vec<ManagedObjectRef>> = Vec::new();
            for (index, name) in constraints.networks.iter().enumerate() {
                let switch = constraints.switches.get(index).map(String::as_str);
                wanted.push(self.network_refs(&folders.network, name, switch).await?);
            }
            candidates.retain(|(_, reach)| {
                wanted
                    .iter()
                    .all(|alternatives| alternatives.iter().any(|n| reach.networks.contains(n)))
            });
            if candidates.is_empty() {
                return Err(OrchestratorError::ConstraintViolation(format!(
                    "没有主机同时连接所需的网络: {}",
                    constraints.networks.join(", ")
                )));
            }
        }

        let candidates: Vec<ComputeResourceSummary> =
            candidates.into_iter().map(|(c, _)| c).collect();
        if candidates.len() > 1 {
            debug!(
                "{} 个计算资源满足条件，按遍历顺序选择 {}",
                candidates.len(),
                candidates[0].name
            );
        }
        Ok(candidates)
    }

    /// 按名称找出网络；给定交换机（`auto` 除外）时只保留该分布式交换机上的端口组
    async fn network_refs(
        &self,
        network_folder: &ManagedObjectRef,
        name: &str,
        switch: Option<&str>,
    ) -> Result<Vec<ManagedObjectRef>> {
        let refs: Vec<ManagedObjectRef> = self
            .resolver
            .find_all(network_folder, KindFilter::NETWORKS, name, TraversalOptions::default())
            .await?
            .into_iter()
            .map(|o| o.moref)
            .collect();
        if refs.is_empty() {
            return Err(OrchestratorError::not_found("网络", name));
        }

        let Some(wanted) = switch.filter(|s| !is_auto(s)) else {
            return Ok(refs);
        };
        let on_switch: Vec<ManagedObjectRef> = self
            .inventory
            .networks(&refs)
            .await?
            .into_iter()
            .filter(|n| {
                n.dvs
                    .as_ref()
                    .map(|dvs| dvs.uuid == wanted || dvs.name == wanted)
                    .unwrap_or(false)
            })
            .map(|n| n.moref)
            .collect();
        if on_switch.is_empty() {
            return Err(OrchestratorError::NotFound(format!(
                "交换机 '{}' 上没有网络 '{}'",
                wanted, name
            )));
        }
        Ok(on_switch)
    }

    /// 计算资源中非维护模式主机挂载的数据存储
    pub async fn reachable_datastores(
        &self,
        compute: &ComputeResourceSummary,
    ) -> Result<HashSet<ManagedObjectRef>> {
        Ok(self
            .inventory
            .hosts(&compute.hosts)
            .await?
            .into_iter()
            .filter(|h| !h.in_maintenance_mode)
            .flat_map(|h| h.datastores)
            .collect())
    }

    /// 资源池所属的计算资源
    pub async fn owner_of_pool(
        &self,
        datacenter: &ManagedObjectRef,
        pool: &ManagedObjectRef,
    ) -> Result<Option<ComputeResourceSummary>> {
        let folders = self.resolver.folders(datacenter).await?;
        let refs: Vec<ManagedObjectRef> = self
            .resolver
            .list_recursive(&folders.host, KindFilter::COMPUTE, TraversalOptions::pools())
            .await?
            .into_iter()
            .map(|o| o.moref)
            .collect();
        for compute in self.inventory.compute_resources(&refs).await? {
            if compute.resource_pool == *pool {
                return Ok(Some(compute));
            }
            let nested = self
                .resolver
                .list_recursive(&compute.resource_pool, KindFilter::POOLS, TraversalOptions::default())
                .await?;
            if nested.iter().any(|o| o.moref == *pool) {
                return Ok(Some(compute));
            }
        }
        Ok(None)
    }

    /// 解析资源池：先按路径解析，失败后按名称递归查找；计算资源映射到其根资源池
    pub async fn select_pool(
        &self,
        datacenter: &ManagedObjectRef,
        pool: &str,
    ) -> Result<ManagedObjectRef> {
        let folders = self.resolver.folders(datacenter).await?;
        let options = TraversalOptions::pools();

        let target = match self
            .resolver
            .resolve_path(&folders.host, pool, KindFilter::POOL_PATH, options)
            .await
        {
            Ok(moref) if moref != folders.host && moref.kind != ObjectKind::Folder => moref,
            Ok(_) | Err(OrchestratorError::PathNotFound { .. }) => self
                .resolver
                .find_recursive(&folders.host, KindFilter::POOLS, pool, options)
                .await?
                .map(|o| o.moref)
                .ok_or_else(|| OrchestratorError::not_found("资源池", pool))?,
            Err(e) => return Err(e),
        };

        if target.kind.is_compute_resource() {
            let summary = self
                .inventory
                .compute_resources(std::slice::from_ref(&target))
                .await?;
            return summary
                .into_iter()
                .next()
                .map(|c| c.resource_pool)
                .ok_or_else(|| OrchestratorError::not_found("资源池", pool));
        }
        Ok(target)
    }

    /// 所有物理主机（集群展开为成员主机）
    pub async fn list_hosts(&self, datacenter: &ManagedObjectRef) -> Result<Vec<HostSummary>> {
        let folders = self.resolver.folders(datacenter).await?;
        let refs: Vec<ManagedObjectRef> = self
            .resolver
            .list_recursive(&folders.host, KindFilter::COMPUTE, TraversalOptions::pools())
            .await?
            .into_iter()
            .map(|o| o.moref)
            .collect();
        let host_refs: Vec<ManagedObjectRef> = self
            .inventory
            .compute_resources(&refs)
            .await?
            .into_iter()
            .flat_map(|c| c.hosts)
            .collect();
        Ok(self.inventory.hosts(&host_refs).await?)
    }

    /// 按名称查找主机；失败时列出找到的全部主机名
    pub async fn find_host(&self, datacenter: &ManagedObjectRef, name: &str) -> Result<HostSummary> {
        let hosts = self.list_hosts(datacenter).await?;
        let names: Vec<String> = hosts.iter().map(|h| h.name.clone()).collect();
        hosts.into_iter().find(|h| h.name == name).ok_or_else(|| {
            OrchestratorError::NotFound(format!(
                "主机 '{}' 不存在, 找到的主机: [{}]",
                name,
                names.join(", ")
            ))
        })
    }

    /// 数据存储集群成员
    pub async fn cluster_members(
        &self,
        datacenter: &ManagedObjectRef,
        name: &str,
    ) -> Result<Vec<ManagedObjectRef>> {
        let pod = self.resolver.find_datastore_cluster(datacenter, name).await?;
        Ok(self
            .inventory
            .children(&pod.moref)
            .await?
            .into_iter()
            .filter(|c| c.kind() == ObjectKind::Datastore)
            .map(|c| c.moref)
            .collect())
    }

    /// 在数据存储集群中选出可用空间最大的成员
    ///
    /// 给定 `reachable` 时只在目标主机能访问的成员中选择。
    pub async fn datastore_from_cluster(
        &self,
        datacenter: &ManagedObjectRef,
        name: &str,
        reachable: Option<&HashSet<ManagedObjectRef>>,
    ) -> Result<DatastoreSummary> {
        let mut members = self.cluster_members(datacenter, name).await?;
        if members.is_empty() {
            return Err(OrchestratorError::ConstraintViolation(format!(
                "数据存储集群 '{}' 没有成员",
                name
            )));
        }
        if let Some(reachable) = reachable {
            members.retain(|m| reachable.contains(m));
        }
        let summaries = self.inventory.datastores(&members).await?;
        pick_from_datastore_cluster(&summaries)
            .cloned()
            .ok_or_else(|| {
                OrchestratorError::ConstraintViolation(format!(
                    "数据存储集群 '{}' 中没有目标主机可访问的成员",
                    name
                ))
            })
    }

    pub async fn datastore(
        &self,
        datacenter: &ManagedObjectRef,
        name: &str,
    ) -> Result<DatastoreSummary> {
        let ds: InventoryObject = self.resolver.find_datastore(datacenter, name).await?;
        self.inventory
            .datastores(std::slice::from_ref(&ds.moref))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| OrchestratorError::not_found("数据存储", name))
    }

    /// 完整的克隆/迁移放置
    ///
    /// 显式主机优先（资源池取该主机所属计算资源的根资源池，除非同时指定资源池）；
    /// 其次显式资源池；否则取满足约束的第一个计算资源的根资源池。
    pub async fn resolve_placement(
        &self,
        datacenter: &ManagedObjectRef,
        constraints: &PlacementConstraints,
    ) -> Result<Placement> {
        constraints.check_exclusive()?;

        let (host, pool, reachable) = if let Some(host_name) = &constraints.host {
            let host = self.find_host(datacenter, host_name).await?;
            if host.in_maintenance_mode {
                return Err(OrchestratorError::ConstraintViolation(format!(
                    "主机 '{}' 处于维护模式",
                    host.name
                )));
            }
            let pool = match &constraints.pool {
                Some(pool) => self.select_pool(datacenter, pool).await?,
                None => self
                    .inventory
                    .compute_resources(std::slice::from_ref(&host.parent))
                    .await?
                    .into_iter()
                    .next()
                    .map(|c| c.resource_pool)
                    .ok_or_else(|| OrchestratorError::not_found("计算资源", &host.parent.id))?,
            };
            let reachable: HashSet<ManagedObjectRef> = host.datastores.iter().cloned().collect();
            (Some(host), pool, Some(reachable))
        } else if let Some(pool) = &constraints.pool {
            let pool = self.select_pool(datacenter, pool).await?;
            let reachable = match self.owner_of_pool(datacenter, &pool).await? {
                Some(owner) => Some(self.reachable_datastores(&owner).await?),
                None => None,
            };
            (None, pool, reachable)
        } else {
            let candidates = self.select_hosts(datacenter, constraints).await?;
            let chosen = candidates
                .into_iter()
                .next()
                .ok_or_else(|| OrchestratorError::ConstraintViolation("没有可用的计算资源".to_string()))?;
            info!("选择计算资源: {}", chosen.name);
            let reachable = self.reachable_datastores(&chosen).await?;
            (None, chosen.resource_pool, Some(reachable))
        };

        let datastore = match (&constraints.datastore, &constraints.datastore_cluster) {
            (Some(name), _) => Some(self.datastore(datacenter, name).await?),
            (None, Some(cluster)) => {
                let ds = self
                    .datastore_from_cluster(datacenter, cluster, reachable.as_ref())
                    .await?;
                info!("数据存储集群 '{}' 选择成员 {}", cluster, ds.name);
                Some(ds)
            }
            (None, None) => None,
        };

        if let (Some(host), Some(ds)) = (&host, &datastore) {
            if !host.datastores.contains(&ds.moref) {
                warn!("主机 {} 未挂载数据存储 {}", host.name, ds.name);
                return Err(OrchestratorError::ConstraintViolation(format!(
                    "主机 '{}' 未挂载数据存储 '{}'",
                    host.name, ds.name
                )));
            }
        }

        Ok(Placement {
            host,
            pool,
            datastore,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ds(name: &str, free: u64) -> DatastoreSummary {
        DatastoreSummary {
            moref: ManagedObjectRef::new(ObjectKind::Datastore, name),
            name: name.to_string(),
            free_space: free,
            capacity: 1000,
            accessible: true,
        }
    }

    #[test]
    fn test_pick_largest_free_space() {
        let members = vec![ds("a", 100), ds("b", 200)];
        assert_eq!(pick_from_datastore_cluster(&members).unwrap().name, "b");
    }

    #[test]
    fn test_pick_keeps_first_on_tie() {
        let members = vec![ds("a", 300), ds("b", 300), ds("c", 100)];
        assert_eq!(pick_from_datastore_cluster(&members).unwrap().name, "a");
    }

    #[test]
    fn test_pick_empty_cluster() {
        assert!(pick_from_datastore_cluster(&[]).is_none());
    }

    #[test]
    fn test_exclusive_datastore_options() {
        let constraints = PlacementConstraints {
            datastore: Some("ds1".into()),
            datastore_cluster: Some("pod1".into()),
            ..Default::default()
        };
        assert!(matches!(
            constraints.check_exclusive(),
            Err(OrchestratorError::ConstraintViolation(_))
        ));
    }
}
