//! 清单服务错误定义

use thiserror::Error;

/// 清单服务错误类型
///
/// 只描述与远程服务通信本身的失败；任务执行失败通过
/// [`TaskResult::Faulted`](crate::models::TaskResult) 以结构化故障返回。
#[derive(Error, Debug)]
pub enum InventoryError {
    #[error("HTTP 错误: {0}")]
    HttpError(String),

    #[error("认证错误: {0}")]
    AuthError(String),

    #[error("API 错误 [{0}]: {1}")]
    ApiError(u16, String),

    #[error("解析错误: {0}")]
    ParseError(String),

    #[error("配置错误: {0}")]
    ConfigError(String),

    #[error("超时错误: {0}")]
    Timeout(String),

    #[error("对象不存在: {0}")]
    ObjectNotFound(String),

    #[error("对象类型不匹配: 期望 {expected}, 实际 {actual}")]
    KindMismatch { expected: String, actual: String },

    #[error("任务不存在: {0}")]
    TaskNotFound(String),
}

/// 清单服务结果类型
pub type Result<T> = std::result::Result<T, InventoryError>;
