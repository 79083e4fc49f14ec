//! VMOPS 清单服务模块
//!
//! 定义编排引擎访问远程虚拟化清单的窄接口，以及两个实现。
//!
//! # 功能
//!
//! - **服务接口** (`InventoryService`): 子对象遍历、批量属性查询、任务提交与等待、事件查询
//! - **网关客户端** (`RestInventory`): 通过 JSON over HTTP 网关访问远程服务
//! - **内存清单** (`MemoryInventory`): 测试夹具与离线模式，可从 JSON/YAML 快照加载
//!
//! # 示例
//!
//! ```ignore
//! use vmops_inventory::{InventoryService, RestConfig, RestInventory};
//!
//! let client = RestInventory::new("https://vcenter-gw:8443", RestConfig::default())?;
//! client.login("administrator", "password").await?;
//!
//! let root = client.root_folder().await?;
//! for child in client.children(&root).await? {
//!     println!("{} ({})", child.name, child.kind());
//! }
//! ```

pub mod client;
pub mod error;
pub mod memory;
pub mod models;
pub mod service;

pub use client::{RestConfig, RestInventory};
pub use error::{InventoryError, Result};
pub use memory::{InventorySnapshot, MemoryInventory, SnapshotEntry, VmSeed};
pub use service::InventoryService;

// 导出数据模型
pub use models::{
    // 对象引用
    DatacenterFolders, InventoryObject, ManagedObjectRef, ObjectKind,

    // 属性快照
    ComputeResourceSummary, DatastoreSummary, DvsInfo, GuestInfo, GuestNic, HostSummary,
    NetworkSummary, PowerState, SnapshotNode, SnapshotTree, VmConfigInfo, VmSummary,

    // 规格载荷
    AdapterMapping, ArrayUpdateOperation, CloneSpec, ConnectInfo, CustomizationIdentity,
    CustomizationSpec, CustomizationSpecItem, DeviceConfigSpec, DeviceInfo, DeviceOperation,
    DiskMoveType, DiskTransform, EthernetAdapter, FileOperation, GlobalIpSettings,
    GuiUnattended, Identification, IpAssignment, IpSettings, LinuxPrepIdentity, MacAddressType,
    NicBacking, Password, RelocateSpec, SysprepIdentity, UserData, VAppProperty,
    VAppPropertySpec, VirtualDevice, VmConfigSpec,

    // 任务与事件
    EventFilter, EventRecursion, EventType, FaultKind, InventoryEvent, MovePriority,
    RemoteFault, TaskHandle, TaskInfo, TaskOperation, TaskResult, TaskState,
};
