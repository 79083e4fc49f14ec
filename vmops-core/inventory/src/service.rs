//! 清单服务接口
//!
//! 编排引擎只通过这个窄接口访问远程清单。每次调用都直接访问远程服务，
//! 实现方不得跨调用缓存子树。

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{
    ComputeResourceSummary, CustomizationSpecItem, DatacenterFolders, DatastoreSummary,
    EventFilter, GuestInfo, HostSummary, InventoryEvent, InventoryObject, ManagedObjectRef,
    NetworkSummary, SnapshotTree, TaskHandle, TaskOperation, TaskResult, VmConfigInfo,
    VmSummary,
};

/// 远程清单服务
#[async_trait]
pub trait InventoryService: Send + Sync {
    /// 获取根文件夹
    async fn root_folder(&self) -> Result<ManagedObjectRef>;

    /// 获取容器的直接子对象（每次调用都重新获取）
    async fn children(&self, parent: &ManagedObjectRef) -> Result<Vec<InventoryObject>>;

    /// 获取数据中心的四个根文件夹
    async fn datacenter_folders(&self, datacenter: &ManagedObjectRef)
        -> Result<DatacenterFolders>;

    /// 批量获取计算资源属性
    async fn compute_resources(
        &self,
        refs: &[ManagedObjectRef],
    ) -> Result<Vec<ComputeResourceSummary>>;

    /// 批量获取主机属性
    async fn hosts(&self, refs: &[ManagedObjectRef]) -> Result<Vec<HostSummary>>;

    /// 批量获取数据存储属性
    async fn datastores(&self, refs: &[ManagedObjectRef]) -> Result<Vec<DatastoreSummary>>;

    /// 批量获取网络属性
    async fn networks(&self, refs: &[ManagedObjectRef]) -> Result<Vec<NetworkSummary>>;

    /// 批量获取虚拟机列表属性
    async fn vms(&self, refs: &[ManagedObjectRef]) -> Result<Vec<VmSummary>>;

    /// 获取虚拟机配置（含设备列表）
    async fn vm_config(&self, vm: &ManagedObjectRef) -> Result<VmConfigInfo>;

    /// 获取客户机运行时信息
    async fn guest_info(&self, vm: &ManagedObjectRef) -> Result<GuestInfo>;

    /// 获取快照树
    async fn snapshot_tree(&self, vm: &ManagedObjectRef) -> Result<SnapshotTree>;

    /// 按名称获取定制规格条目
    async fn customization_spec(&self, name: &str) -> Result<Option<CustomizationSpecItem>>;

    /// 列出所有定制规格名称
    async fn customization_spec_names(&self) -> Result<Vec<String>>;

    /// 提交变更操作
    async fn submit(&self, operation: &TaskOperation) -> Result<TaskHandle>;

    /// 阻塞等待任务结束
    async fn wait_for_task(&self, task: &TaskHandle) -> Result<TaskResult>;

    /// 查询事件
    async fn query_events(&self, filter: &EventFilter) -> Result<Vec<InventoryEvent>>;
}
