//! 编排引擎错误定义

use thiserror::Error;
use vmops_inventory::{InventoryError, RemoteFault};

/// 编排引擎错误类型
///
/// 校验与解析类错误（`ConstraintViolation`、`NotFound`）总是在任何远程变更之前发生；
/// `RemoteFault` 与 `CustomizationNicMismatch` 发生在变更之后，消息中会说明已产生的副作用。
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("{0}")]
    NotFound(String),

    #[error("路径 '{path}' 中的 '{segment}' 不存在")]
    PathNotFound { segment: String, path: String },

    #[error("参数冲突: {0}")]
    ConstraintViolation(String),

    #[error("不支持: {0}")]
    Unsupported(String),

    #[error("{operation} 失败: {fault}")]
    RemoteFault {
        operation: String,
        fault: RemoteFault,
    },

    #[error(
        "虚拟机 {vm_name} 已创建但未完成定制: 定制规格包含 {nic_mapping_count} 个网卡映射, \
         虚拟机有 {nic_count} 块网卡"
    )]
    CustomizationNicMismatch {
        vm_name: String,
        nic_mapping_count: u32,
        nic_count: u32,
    },

    #[error("等待{what}超时 ({timeout_secs}s)")]
    Timeout { what: String, timeout_secs: u64 },

    #[error("已取消: {0}")]
    Cancelled(String),

    #[error("清单服务错误: {0}")]
    Inventory(#[from] InventoryError),

    #[error("配置错误: {0}")]
    Config(String),
}

impl OrchestratorError {
    /// 按名称查找失败
    pub fn not_found(kind: &str, name: &str) -> Self {
        OrchestratorError::NotFound(format!("{} '{}' 不存在", kind, name))
    }

    /// 进程退出码，每类错误互不相同
    pub fn exit_code(&self) -> i32 {
        match self {
            OrchestratorError::ConstraintViolation(_) => 2,
            OrchestratorError::NotFound(_) | OrchestratorError::PathNotFound { .. } => 3,
            OrchestratorError::Unsupported(_) => 4,
            OrchestratorError::RemoteFault { .. } => 5,
            OrchestratorError::CustomizationNicMismatch { .. } => 6,
            OrchestratorError::Timeout { .. } => 7,
            OrchestratorError::Cancelled(_) => 8,
            OrchestratorError::Inventory(_) | OrchestratorError::Config(_) => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;
