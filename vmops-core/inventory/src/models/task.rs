//! 远程任务与事件

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::object::ManagedObjectRef;
use super::spec::{CloneSpec, RelocateSpec, VmConfigSpec};

/// 迁移优先级
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovePriority {
    #[default]
    Default,
    High,
    Low,
}

/// 可提交的变更操作
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum TaskOperation {
    CloneVm {
        vm: ManagedObjectRef,
        folder: ManagedObjectRef,
        name: String,
        spec: Box<CloneSpec>,
    },
    Reconfigure {
        vm: ManagedObjectRef,
        spec: VmConfigSpec,
    },
    Relocate {
        vm: ManagedObjectRef,
        spec: RelocateSpec,
        priority: MovePriority,
    },
    PowerOn {
        vm: ManagedObjectRef,
    },
    PowerOff {
        vm: ManagedObjectRef,
    },
    Reset {
        vm: ManagedObjectRef,
    },
    Suspend {
        vm: ManagedObjectRef,
    },
    Rename {
        entity: ManagedObjectRef,
        new_name: String,
    },
    MoveIntoFolder {
        folder: ManagedObjectRef,
        entities: Vec<ManagedObjectRef>,
    },
    CreateSnapshot {
        vm: ManagedObjectRef,
        name: String,
        description: String,
        memory: bool,
        quiesce: bool,
    },
    RevertToSnapshot {
        snapshot: ManagedObjectRef,
    },
    RevertToCurrentSnapshot {
        vm: ManagedObjectRef,
    },
    RemoveSnapshot {
        snapshot: ManagedObjectRef,
        remove_children: bool,
    },
    Destroy {
        entity: ManagedObjectRef,
    },
}

impl TaskOperation {
    /// 操作名称（用于日志和任务标签）
    pub fn label(&self) -> &'static str {
        match self {
            TaskOperation::CloneVm { .. } => "CloneVM_Task",
            TaskOperation::Reconfigure { .. } => "ReconfigVM_Task",
            TaskOperation::Relocate { .. } => "RelocateVM_Task",
            TaskOperation::PowerOn { .. } => "PowerOnVM_Task",
            TaskOperation::PowerOff { .. } => "PowerOffVM_Task",
            TaskOperation::Reset { .. } => "ResetVM_Task",
            TaskOperation::Suspend { .. } => "SuspendVM_Task",
            TaskOperation::Rename { .. } => "Rename_Task",
            TaskOperation::MoveIntoFolder { .. } => "MoveIntoFolder_Task",
            TaskOperation::CreateSnapshot { .. } => "CreateSnapshot_Task",
            TaskOperation::RevertToSnapshot { .. } => "RevertToSnapshot_Task",
            TaskOperation::RevertToCurrentSnapshot { .. } => "RevertToCurrentSnapshot_Task",
            TaskOperation::RemoveSnapshot { .. } => "RemoveSnapshot_Task",
            TaskOperation::Destroy { .. } => "Destroy_Task",
        }
    }

    /// 操作作用的对象
    pub fn target(&self) -> &ManagedObjectRef {
        match self {
            TaskOperation::CloneVm { vm, .. }
            | TaskOperation::Reconfigure { vm, .. }
            | TaskOperation::Relocate { vm, .. }
            | TaskOperation::PowerOn { vm }
            | TaskOperation::PowerOff { vm }
            | TaskOperation::Reset { vm }
            | TaskOperation::Suspend { vm }
            | TaskOperation::CreateSnapshot { vm, .. }
            | TaskOperation::RevertToCurrentSnapshot { vm } => vm,
            TaskOperation::Rename { entity, .. } | TaskOperation::Destroy { entity } => entity,
            TaskOperation::MoveIntoFolder { folder, .. } => folder,
            TaskOperation::RevertToSnapshot { snapshot }
            | TaskOperation::RemoveSnapshot { snapshot, .. } => snapshot,
        }
    }
}

/// 进行中的远程任务
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskHandle {
    pub id: String,
    pub operation: String,
    pub target: ManagedObjectRef,
}

/// 远程任务状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Queued,
    Running,
    Success,
    Error,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Success | TaskState::Error)
    }
}

/// 远程故障类型
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FaultKind {
    /// 定制规格中的网卡映射数与虚拟机网卡数不一致
    NicSettingMismatch {
        num_copies_of_nic_mapping: u32,
        num_network_cards: u32,
    },
    /// 目标位置已存在同名对象
    DuplicateName {
        name: String,
        #[serde(default)]
        object: Option<ManagedObjectRef>,
    },
    /// 对象当前状态不允许该操作
    InvalidState,
    /// 其他故障
    Other { fault_type: String },
}

/// 远程任务故障
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFault {
    pub kind: FaultKind,
    pub message: String,
}

impl RemoteFault {
    pub fn new(kind: FaultKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn type_name(&self) -> &str {
        match &self.kind {
            FaultKind::NicSettingMismatch { .. } => "NicSettingMismatch",
            FaultKind::DuplicateName { .. } => "DuplicateName",
            FaultKind::InvalidState => "InvalidState",
            FaultKind::Other { fault_type } => fault_type,
        }
    }
}

impl fmt::Display for RemoteFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.type_name(), self.message)
    }
}

/// 远程任务的终态
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TaskResult {
    Succeeded {
        #[serde(default)]
        result: Option<ManagedObjectRef>,
    },
    Faulted(RemoteFault),
}

/// 远程任务信息（轮询接口返回）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskInfo {
    pub id: String,
    pub state: TaskState,

    #[serde(default)]
    pub progress: Option<u8>,

    #[serde(default)]
    pub result: Option<ManagedObjectRef>,

    #[serde(default)]
    pub fault: Option<RemoteFault>,
}

// ============================================
// 事件
// ============================================

/// 事件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    CustomizationStarted,
    CustomizationSucceeded,
    CustomizationFailed,
    VmPoweredOn,
    VmPoweredOff,
    Other,
}

/// 事件实体范围
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventRecursion {
    /// 仅对象本身
    SelfOnly,
    /// 对象及直接子对象
    Children,
    /// 对象及全部后代
    All,
}

/// 事件查询过滤条件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventFilter {
    pub entity: ManagedObjectRef,
    pub recursion: EventRecursion,
    pub event_types: Vec<EventType>,
}

/// 清单事件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryEvent {
    pub key: i64,
    pub event_type: EventType,
    pub entity: ManagedObjectRef,
    pub created_time: DateTime<Utc>,
    pub full_formatted_message: String,
}
