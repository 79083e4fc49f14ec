//! 清单数据模型
//!
//! **数据来源**: 远程清单服务（实时查询，无本地持久化）
//!
//! 所有对象都是远程可变清单中的引用。本模块中的快照类型只在一次命令调用期间有效，
//! 两次公开操作之间不做任何缓存：远程清单随时可能被其他客户端修改。

pub mod object;
pub mod spec;
pub mod summary;
pub mod task;

pub use object::{DatacenterFolders, InventoryObject, ManagedObjectRef, ObjectKind};
pub use spec::{
    AdapterMapping, ArrayUpdateOperation, CloneSpec, ConnectInfo, CustomizationIdentity,
    CustomizationSpec, CustomizationSpecItem, DeviceConfigSpec, DeviceInfo, DeviceOperation,
    DiskMoveType, DiskTransform, EthernetAdapter, FileOperation, GlobalIpSettings,
    GuiUnattended, Identification, IpAssignment, IpSettings, LinuxPrepIdentity, MacAddressType,
    NicBacking, Password, RelocateSpec, SysprepIdentity, UserData, VAppProperty,
    VAppPropertySpec, VirtualDevice, VmConfigSpec,
};
pub use summary::{
    ComputeResourceSummary, DatastoreSummary, DvsInfo, GuestInfo, GuestNic, HostSummary,
    NetworkSummary, PowerState, SnapshotNode, SnapshotTree, VmConfigInfo, VmSummary,
};
pub use task::{
    EventFilter, EventRecursion, EventType, FaultKind, InventoryEvent, MovePriority,
    RemoteFault, TaskHandle, TaskInfo, TaskOperation, TaskResult, TaskState,
};
