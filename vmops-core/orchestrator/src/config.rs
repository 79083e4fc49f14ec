//! 编排配置管理
//!
//! 支持从多个源加载配置:
//! - 环境变量 (优先级最高)
//! - 配置文件 (TOML/YAML/JSON)
//! - 默认值 (优先级最低)
//!
//! 配置文件搜索路径 (按优先级):
//! 1. `VMOPS_CONFIG` 环境变量指定的路径
//! 2. `./vmops.toml` / `./vmops.yaml` (当前目录)
//! 3. `~/.config/vmops/config.toml` (用户配置目录)
//! 4. `/etc/vmops/config.toml` (系统配置目录)
//!
//! 配置在每次命令调用时构造一次，以引用传入各操作，不存在全局配置对象。

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use vmops_inventory::RestConfig;

use crate::readiness::PollContext;

// ============================================
// 核心配置结构
// ============================================

/// 编排配置 (顶层)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// 清单网关连接
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// 命令默认值
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// 就绪等待
    #[serde(default)]
    pub readiness: ReadinessConfig,
}

/// 清单网关连接配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    #[serde(default)]
    pub base_url: String,

    #[serde(default)]
    pub username: String,

    #[serde(default, skip_serializing)]
    pub password: String,

    #[serde(default = "default_verify_ssl")]
    pub verify_ssl: bool,

    /// 连接超时 (秒)
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,

    /// 请求超时 (秒)
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,

    /// 任务轮询间隔 (毫秒)
    #[serde(default = "default_task_poll_interval_ms")]
    pub task_poll_interval_ms: u64,
}

/// 命令默认值
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// 默认数据中心
    #[serde(skip_serializing_if = "Option::is_none")]
    pub datacenter: Option<String>,

    /// 默认虚拟机文件夹 (相对 vm 根文件夹的路径)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub folder: Option<String>,
}

/// 就绪等待配置 (单位: 秒)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessConfig {
    #[serde(default = "default_customization_timeout")]
    pub customization_timeout: u64,

    #[serde(default = "default_customization_interval")]
    pub customization_interval: u64,

    #[serde(default = "default_ip_timeout")]
    pub ip_timeout: u64,

    #[serde(default = "default_ip_interval")]
    pub ip_interval: u64,

    #[serde(default = "default_port_timeout")]
    pub port_timeout: u64,

    #[serde(default = "default_port_interval")]
    pub port_interval: u64,

    /// 引导完成后探测的端口
    #[serde(default = "default_ssh_port")]
    pub ssh_port: u16,

    /// 瞬时网络错误后的额外等待 (毫秒)
    #[serde(default = "default_transient_backoff_ms")]
    pub transient_backoff_ms: u64,
}

// ============================================
// 默认值函数
// ============================================

fn default_verify_ssl() -> bool {
    true
}
fn default_connect_timeout() -> u64 {
    10
}
fn default_request_timeout() -> u64 {
    60
}
fn default_task_poll_interval_ms() -> u64 {
    1000
}
fn default_customization_timeout() -> u64 {
    1200
}
fn default_customization_interval() -> u64 {
    10
}
fn default_ip_timeout() -> u64 {
    300
}
fn default_ip_interval() -> u64 {
    5
}
fn default_port_timeout() -> u64 {
    300
}
fn default_port_interval() -> u64 {
    5
}
fn default_ssh_port() -> u16 {
    22
}
fn default_transient_backoff_ms() -> u64 {
    2000
}

// ============================================
// Default 实现
// ============================================

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            username: String::new(),
            password: String::new(),
            verify_ssl: default_verify_ssl(),
            connect_timeout: default_connect_timeout(),
            request_timeout: default_request_timeout(),
            task_poll_interval_ms: default_task_poll_interval_ms(),
        }
    }
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            customization_timeout: default_customization_timeout(),
            customization_interval: default_customization_interval(),
            ip_timeout: default_ip_timeout(),
            ip_interval: default_ip_interval(),
            port_timeout: default_port_timeout(),
            port_interval: default_port_interval(),
            ssh_port: default_ssh_port(),
            transient_backoff_ms: default_transient_backoff_ms(),
        }
    }
}

impl ConnectionConfig {
    /// 转换为网关客户端配置
    pub fn rest_config(&self) -> RestConfig {
        RestConfig {
            connect_timeout: self.connect_timeout,
            request_timeout: self.request_timeout,
            task_poll_interval_ms: self.task_poll_interval_ms,
            verify_ssl: self.verify_ssl,
        }
    }
}

impl ReadinessConfig {
    pub fn customization_context(&self, cancel: &CancellationToken) -> PollContext {
        PollContext::new(
            Duration::from_secs(self.customization_timeout),
            Duration::from_secs(self.customization_interval),
        )
        .with_cancel(cancel)
    }

    pub fn ip_context(&self, cancel: &CancellationToken) -> PollContext {
        PollContext::new(
            Duration::from_secs(self.ip_timeout),
            Duration::from_secs(self.ip_interval),
        )
        .with_cancel(cancel)
    }

    pub fn port_context(&self, cancel: &CancellationToken) -> PollContext {
        PollContext::new(
            Duration::from_secs(self.port_timeout),
            Duration::from_secs(self.port_interval),
        )
        .with_cancel(cancel)
    }

    pub fn transient_backoff(&self) -> Duration {
        Duration::from_millis(self.transient_backoff_ms)
    }
}

// ============================================
// 配置加载实现
// ============================================

impl OrchestratorConfig {
    /// 从多个源加载配置 (优先级: 环境变量 > 配置文件 > 默认值)
    pub fn load() -> Result<Self> {
        let mut config = match Self::find_config_file() {
            Some(path) => {
                tracing::debug!("加载配置文件: {:?}", path);
                Self::load_from_file(&path)?
            }
            None => {
                tracing::debug!("未找到配置文件，使用默认配置");
                Self::default()
            }
        };

        config.apply_env_vars()?;
        Ok(config)
    }

    /// 从指定文件加载，并应用环境变量覆盖
    pub fn load_with_override(path: &Path) -> Result<Self> {
        let mut config = Self::load_from_file(path)?;
        config.apply_env_vars()?;
        Ok(config)
    }

    /// 从指定文件加载配置
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("读取配置文件失败: {:?}", path))?;

        let config = match path.extension().and_then(|s| s.to_str()) {
            Some("toml") => toml::from_str(&content)
                .with_context(|| format!("解析 TOML 配置失败: {:?}", path))?,
            Some("yaml") | Some("yml") => serde_yaml::from_str(&content)
                .with_context(|| format!("解析 YAML 配置失败: {:?}", path))?,
            Some("json") => serde_json::from_str(&content)
                .with_context(|| format!("解析 JSON 配置失败: {:?}", path))?,
            _ => anyhow::bail!("不支持的配置文件格式: {:?}", path),
        };

        Ok(config)
    }

    /// 查找配置文件 (按优先级搜索)
    fn find_config_file() -> Option<PathBuf> {
        if let Ok(path) = env::var("VMOPS_CONFIG") {
            let p = PathBuf::from(path);
            if p.exists() {
                return Some(p);
            }
        }

        let mut paths = vec![
            PathBuf::from("./vmops.toml"),
            PathBuf::from("./vmops.yaml"),
            PathBuf::from("./vmops.json"),
        ];

        if let Some(config_dir) = dirs::home_dir().map(|h| h.join(".config/vmops")) {
            paths.push(config_dir.join("config.toml"));
            paths.push(config_dir.join("config.yaml"));
        }

        #[cfg(target_os = "linux")]
        {
            paths.push(PathBuf::from("/etc/vmops/config.toml"));
            paths.push(PathBuf::from("/etc/vmops/config.yaml"));
        }

        paths.into_iter().find(|p| p.exists())
    }

    /// 从环境变量覆盖配置
    fn apply_env_vars(&mut self) -> Result<()> {
        self.apply_vars(|key| env::var(key).ok())
    }

    fn apply_vars<F>(&mut self, var: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Connection
        if let Some(url) = var("VMOPS_URL") {
            self.connection.base_url = url;
        }
        if let Some(user) = var("VMOPS_USERNAME") {
            self.connection.username = user;
        }
        if let Some(password) = var("VMOPS_PASSWORD") {
            self.connection.password = password;
        }
        if let Some(verify) = var("VMOPS_VERIFY_SSL") {
            self.connection.verify_ssl = verify
                .parse()
                .context("VMOPS_VERIFY_SSL 取值无效")?;
        }

        // Defaults
        if let Some(dc) = var("VMOPS_DATACENTER") {
            self.defaults.datacenter = Some(dc);
        }
        if let Some(folder) = var("VMOPS_FOLDER") {
            self.defaults.folder = Some(folder);
        }

        // Readiness
        if let Some(timeout) = var("VMOPS_CUSTOMIZATION_TIMEOUT") {
            self.readiness.customization_timeout = timeout
                .parse()
                .context("VMOPS_CUSTOMIZATION_TIMEOUT 取值无效")?;
        }
        if let Some(timeout) = var("VMOPS_IP_TIMEOUT") {
            self.readiness.ip_timeout = timeout.parse().context("VMOPS_IP_TIMEOUT 取值无效")?;
        }
        if let Some(timeout) = var("VMOPS_PORT_TIMEOUT") {
            self.readiness.port_timeout = timeout
                .parse()
                .context("VMOPS_PORT_TIMEOUT 取值无效")?;
        }

        Ok(())
    }

    /// 验证配置
    pub fn validate(&self) -> Result<()> {
        if self.readiness.ip_interval == 0
            || self.readiness.port_interval == 0
            || self.readiness.customization_interval == 0
        {
            anyhow::bail!("轮询间隔必须大于 0");
        }
        Ok(())
    }

    /// 验证远程连接参数 (离线模式不需要)
    pub fn validate_connection(&self) -> Result<()> {
        if self.connection.base_url.is_empty() {
            anyhow::bail!("未配置清单网关地址 (connection.base_url 或 VMOPS_URL)");
        }
        if self.connection.username.is_empty() {
            anyhow::bail!("未配置用户名 (connection.username 或 VMOPS_USERNAME)");
        }
        Ok(())
    }
}
