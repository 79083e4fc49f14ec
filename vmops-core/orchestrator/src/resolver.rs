//! 路径解析
//!
//! 把人工输入的名称或 `/` 分隔路径解析为远程对象引用。所有查找都建立在同一个
//! 深度优先遍历 [`PathResolver::walk`] 之上：调用方提供"是否下探"谓词和返回
//! [`ControlFlow`] 的访问函数。
//!
//! 每次遍历都重新获取子对象，不跨调用缓存。清单按构造是一棵树，不做环检测。

use std::ops::ControlFlow;
use tracing::debug;
use vmops_inventory::{DatacenterFolders, InventoryObject, InventoryService, ManagedObjectRef, ObjectKind};

use crate::error::{OrchestratorError, Result};

/// 对象类型过滤
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KindFilter {
    /// 任意类型
    Any,
    /// 仅限列出的类型
    Only(&'static [ObjectKind]),
}

impl KindFilter {
    /// 文件夹路径
    pub const FOLDERS: KindFilter = KindFilter::Only(&[ObjectKind::Folder]);

    /// 计算资源（独立主机与集群）
    pub const COMPUTE: KindFilter = KindFilter::Only(&[
        ObjectKind::ComputeResource,
        ObjectKind::ClusterComputeResource,
    ]);

    /// 资源池路径上可能出现的所有容器
    pub const POOL_PATH: KindFilter = KindFilter::Only(&[
        ObjectKind::Folder,
        ObjectKind::ComputeResource,
        ObjectKind::ClusterComputeResource,
        ObjectKind::ResourcePool,
        ObjectKind::VirtualApp,
    ]);

    /// 可作为放置目标的资源池类对象
    pub const POOLS: KindFilter = KindFilter::Only(&[
        ObjectKind::ComputeResource,
        ObjectKind::ClusterComputeResource,
        ObjectKind::ResourcePool,
        ObjectKind::VirtualApp,
    ]);

    pub const VMS: KindFilter = KindFilter::Only(&[ObjectKind::VirtualMachine]);

    pub const HOSTS: KindFilter = KindFilter::Only(&[ObjectKind::HostSystem]);

    pub const DATASTORES: KindFilter = KindFilter::Only(&[ObjectKind::Datastore]);

    pub const DATASTORE_CLUSTERS: KindFilter = KindFilter::Only(&[ObjectKind::StoragePod]);

    pub const NETWORKS: KindFilter = KindFilter::Only(&[
        ObjectKind::Network,
        ObjectKind::DistributedPortGroup,
    ]);

    pub fn matches(&self, kind: ObjectKind) -> bool {
        match self {
            KindFilter::Any => true,
            KindFilter::Only(kinds) => kinds.contains(&kind),
        }
    }
}

/// 遍历选项
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TraversalOptions {
    /// 跳过 vApp：既不匹配也不下探
    pub exclude_virtual_apps: bool,
}

impl TraversalOptions {
    /// 集群/资源池解析使用的选项
    pub fn pools() -> Self {
        Self {
            exclude_virtual_apps: true,
        }
    }

    fn admits(&self, kind: ObjectKind) -> bool {
        !(self.exclude_virtual_apps && kind == ObjectKind::VirtualApp)
    }
}

/// 路径解析器
pub struct PathResolver<'a> {
    inventory: &'a dyn InventoryService,
}

impl<'a> PathResolver<'a> {
    pub fn new(inventory: &'a dyn InventoryService) -> Self {
        Self { inventory }
    }

    /// 深度优先遍历 `root` 的整棵子树（先序，子对象保持服务端顺序）
    ///
    /// `root` 本身不被访问。`descend` 决定是否展开某个容器；`visit` 返回
    /// `Break` 时停止遍历并返回当前对象。
    pub async fn walk<D, V>(
        &self,
        root: &ManagedObjectRef,
        descend: D,
        mut visit: V,
    ) -> Result<Option<InventoryObject>>
    where
        D: Fn(&InventoryObject) -> bool,
        V: FnMut(&InventoryObject) -> ControlFlow<()>,
    {
        let mut stack: Vec<InventoryObject> = self.inventory.children(root).await?;
        stack.reverse();

        while let Some(node) = stack.pop() {
            if visit(&node).is_break() {
                return Ok(Some(node));
            }
            if node.kind().is_container() && descend(&node) {
                let mut children = self.inventory.children(&node.moref).await?;
                children.reverse();
                stack.extend(children);
            }
        }
        Ok(None)
    }

    /// 逐段解析路径
    ///
    /// 空段被忽略，空路径返回 `root`。每段必须精确匹配当前节点的一个直接子对象，
    /// 第一个未匹配的段即返回 `PathNotFound`，不做模糊匹配也不回溯。
    pub async fn resolve_path(
        &self,
        root: &ManagedObjectRef,
        path: &str,
        filter: KindFilter,
        options: TraversalOptions,
    ) -> Result<ManagedObjectRef> {
        let mut current = root.clone();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            let children = self.inventory.children(&current).await?;
            current = children
                .into_iter()
                .find(|c| filter.matches(c.kind()) && options.admits(c.kind()) && c.name == segment)
                .map(|c| c.moref)
                .ok_or_else(|| OrchestratorError::PathNotFound {
                    segment: segment.to_string(),
                    path: path.to_string(),
                })?;
        }
        debug!("路径 '{}' 解析为 {}", path, current);
        Ok(current)
    }

    /// 在整棵子树中按名称查找，返回遍历顺序中的第一个匹配
    ///
    /// 找不到时返回 `None`，由调用方决定是否为错误。
    pub async fn find_recursive(
        &self,
        root: &ManagedObjectRef,
        filter: KindFilter,
        name: &str,
        options: TraversalOptions,
    ) -> Result<Option<InventoryObject>> {
        self.walk(
            root,
            |node| options.admits(node.kind()),
            |node| {
                if filter.matches(node.kind()) && options.admits(node.kind()) && node.name == name {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            },
        )
        .await
    }

    /// 在整棵子树中查找所有同名对象（遍历顺序）
    pub async fn find_all(
        &self,
        root: &ManagedObjectRef,
        filter: KindFilter,
        name: &str,
        options: TraversalOptions,
    ) -> Result<Vec<InventoryObject>> {
        let found = self.list_recursive(root, filter, options).await?;
        Ok(found.into_iter().filter(|o| o.name == name).collect())
    }

    /// 列出子树中所有符合类型的对象（遍历顺序）
    pub async fn list_recursive(
        &self,
        root: &ManagedObjectRef,
        filter: KindFilter,
        options: TraversalOptions,
    ) -> Result<Vec<InventoryObject>> {
        let mut found = Vec::new();
        self.walk(
            root,
            |node| options.admits(node.kind()),
            |node| {
                if filter.matches(node.kind()) && options.admits(node.kind()) {
                    found.push(node.clone());
                }
                ControlFlow::Continue(())
            },
        )
        .await?;
        Ok(found)
    }

    /// 列出子树中所有符合类型的对象及其相对 `root` 的路径
    pub async fn list_paths(
        &self,
        root: &ManagedObjectRef,
        filter: KindFilter,
        options: TraversalOptions,
    ) -> Result<Vec<(String, InventoryObject)>> {
        fn push_children(
            stack: &mut Vec<(String, InventoryObject)>,
            prefix: &str,
            children: Vec<InventoryObject>,
        ) {
            for child in children.into_iter().rev() {
                stack.push((format!("{}/{}", prefix, child.name), child));
            }
        }

        let mut found = Vec::new();
        let mut stack: Vec<(String, InventoryObject)> = Vec::new();
        push_children(&mut stack, "", self.inventory.children(root).await?);
        while let Some((path, node)) = stack.pop() {
            if !options.admits(node.kind()) {
                continue;
            }
            if filter.matches(node.kind()) {
                found.push((path.clone(), node.clone()));
            }
            if node.kind().is_container() {
                let children = self.inventory.children(&node.moref).await?;
                push_children(&mut stack, &path, children);
            }
        }
        Ok(found)
    }

    /// 查找数据中心
    ///
    /// 只穿过普通文件夹，不会进入数据中心内部（数据中心不嵌套），命中即返回。
    pub async fn find_datacenter(&self, name: &str) -> Result<InventoryObject> {
        let root = self.inventory.root_folder().await?;
        self.walk(
            &root,
            |node| node.kind() == ObjectKind::Folder,
            |node| {
                if node.kind() == ObjectKind::Datacenter && node.name == name {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            },
        )
        .await?
        .ok_or_else(|| OrchestratorError::not_found("数据中心", name))
    }

    /// 列出所有数据中心
    pub async fn list_datacenters(&self) -> Result<Vec<InventoryObject>> {
        let root = self.inventory.root_folder().await?;
        let mut found = Vec::new();
        self.walk(
            &root,
            |node| node.kind() == ObjectKind::Folder,
            |node| {
                if node.kind() == ObjectKind::Datacenter {
                    found.push(node.clone());
                }
                ControlFlow::Continue(())
            },
        )
        .await?;
        Ok(found)
    }

    pub async fn folders(&self, datacenter: &ManagedObjectRef) -> Result<DatacenterFolders> {
        Ok(self.inventory.datacenter_folders(datacenter).await?)
    }

    /// 解析虚拟机文件夹路径（相对数据中心的 vm 根文件夹）
    pub async fn find_folder(
        &self,
        datacenter: &ManagedObjectRef,
        path: &str,
    ) -> Result<ManagedObjectRef> {
        let folders = self.folders(datacenter).await?;
        self.resolve_path(&folders.vm, path, KindFilter::FOLDERS, TraversalOptions::default())
            .await
    }

    /// 查找虚拟机或模板；给定文件夹时只在该文件夹子树内查找
    pub async fn find_vm(
        &self,
        datacenter: &ManagedObjectRef,
        folder: Option<&str>,
        name: &str,
    ) -> Result<InventoryObject> {
        let root = match folder {
            Some(path) => self.find_folder(datacenter, path).await?,
            None => self.folders(datacenter).await?.vm,
        };
        self.find_recursive(&root, KindFilter::VMS, name, TraversalOptions::default())
            .await?
            .ok_or_else(|| OrchestratorError::not_found("虚拟机", name))
    }

    pub async fn find_datastore(
        &self,
        datacenter: &ManagedObjectRef,
        name: &str,
    ) -> Result<InventoryObject> {
        let folders = self.folders(datacenter).await?;
        self.find_recursive(&folders.datastore, KindFilter::DATASTORES, name, TraversalOptions::default())
            .await?
            .ok_or_else(|| OrchestratorError::not_found("数据存储", name))
    }

    pub async fn find_datastore_cluster(
        &self,
        datacenter: &ManagedObjectRef,
        name: &str,
    ) -> Result<InventoryObject> {
        let folders = self.folders(datacenter).await?;
        self.find_recursive(
            &folders.datastore,
            KindFilter::DATASTORE_CLUSTERS,
            name,
            TraversalOptions::default(),
        )
        .await?
        .ok_or_else(|| OrchestratorError::not_found("数据存储集群", name))
    }

    pub async fn find_network(
        &self,
        datacenter: &ManagedObjectRef,
        name: &str,
    ) -> Result<InventoryObject> {
        let folders = self.folders(datacenter).await?;
        self.find_recursive(&folders.network, KindFilter::NETWORKS, name, TraversalOptions::default())
            .await?
            .ok_or_else(|| OrchestratorError::not_found("网络", name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vmops_inventory::{MemoryInventory, VmSeed};

    fn fixture() -> (MemoryInventory, ManagedObjectRef) {
        let inv = MemoryInventory::new();
        let nested = inv.add_folder(&inv.root(), "region-east");
        let dc = inv.add_datacenter(&nested, "dc1");
        let folders = inv.folders_of(&dc).unwrap();
        let prod = inv.add_folder(&folders.vm, "prod");
        let web = inv.add_folder(&prod, "web");
        inv.add_vm(&web, VmSeed::linux("web-01"));
        inv.add_vm(&folders.vm, VmSeed::linux("web-01"));
        let cluster = inv.add_cluster(&folders.host, "cluster-a");
        inv.add_resource_pool(&cluster, "batch");
        let vapp = inv.add_vapp(&cluster, "app-bundle");
        inv.add_resource_pool(&vapp, "inner");
        (inv, dc)
    }

    #[tokio::test]
    async fn test_resolve_path_is_deterministic() {
        let (inv, dc) = fixture();
        let resolver = PathResolver::new(&inv);
        let first = resolver.find_folder(&dc, "/prod//web/").await.unwrap();
        let second = resolver.find_folder(&dc, "prod/web").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.kind, ObjectKind::Folder);
    }

    #[tokio::test]
    async fn test_resolve_path_missing_segment() {
        let (inv, dc) = fixture();
        let resolver = PathResolver::new(&inv);
        match resolver.find_folder(&dc, "prod/db/replicas").await {
            Err(OrchestratorError::PathNotFound { segment, path }) => {
                assert_eq!(segment, "db");
                assert_eq!(path, "prod/db/replicas");
            }
            other => panic!("意外结果: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_path_is_root() {
        let (inv, dc) = fixture();
        let resolver = PathResolver::new(&inv);
        let folders = inv.folders_of(&dc).unwrap();
        assert_eq!(resolver.find_folder(&dc, "").await.unwrap(), folders.vm);
    }

    #[tokio::test]
    async fn test_find_recursive_first_in_traversal_order() {
        let (inv, dc) = fixture();
        let resolver = PathResolver::new(&inv);
        let folders = inv.folders_of(&dc).unwrap();
        let prod = resolver.find_folder(&dc, "prod").await.unwrap();

        // 深度优先先序：prod/web/web-01 先于根文件夹下的 web-01
        let found = resolver
            .find_recursive(&folders.vm, KindFilter::VMS, "web-01", TraversalOptions::default())
            .await
            .unwrap()
            .unwrap();
        let in_prod = resolver
            .find_recursive(&prod, KindFilter::VMS, "web-01", TraversalOptions::default())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.moref, in_prod.moref);

        let missing = resolver
            .find_recursive(&folders.vm, KindFilter::VMS, "nope", TraversalOptions::default())
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_find_datacenter_through_folders() {
        let (inv, _) = fixture();
        let resolver = PathResolver::new(&inv);
        let dc = resolver.find_datacenter("dc1").await.unwrap();
        assert_eq!(dc.kind(), ObjectKind::Datacenter);
        assert!(matches!(
            resolver.find_datacenter("dc9").await,
            Err(OrchestratorError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_virtual_app_exclusion_is_explicit() {
        let (inv, dc) = fixture();
        let resolver = PathResolver::new(&inv);
        let folders = inv.folders_of(&dc).unwrap();

        let with_vapps = resolver
            .find_recursive(&folders.host, KindFilter::POOLS, "inner", TraversalOptions::default())
            .await
            .unwrap();
        assert!(with_vapps.is_some());

        let without = resolver
            .find_recursive(&folders.host, KindFilter::POOLS, "inner", TraversalOptions::pools())
            .await
            .unwrap();
        assert!(without.is_none());

        let batch = resolver
            .resolve_path(&folders.host, "cluster-a/batch", KindFilter::POOL_PATH, TraversalOptions::pools())
            .await
            .unwrap();
        assert_eq!(batch.kind, ObjectKind::ResourcePool);
    }

    #[tokio::test]
    async fn test_list_paths() {
        let (inv, dc) = fixture();
        let resolver = PathResolver::new(&inv);
        let folders = inv.folders_of(&dc).unwrap();
        let paths: Vec<String> = resolver
            .list_paths(&folders.vm, KindFilter::FOLDERS, TraversalOptions::default())
            .await
            .unwrap()
            .into_iter()
            .map(|(p, _)| p)
            .collect();
        assert_eq!(paths, vec!["/prod".to_string(), "/prod/web".to_string()]);
    }
}
