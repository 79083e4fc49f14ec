//! 公共工具函数模块
//!
//! 提供各命令模块共享的功能，包括：
//! - 配置加载与清单服务创建（远程网关或离线快照）
//! - 中断信号到取消令牌的转换
//! - 进度指示

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use vmops_inventory::{InventoryService, MemoryInventory, RestInventory};
use vmops_orchestrator::{OrchestratorConfig, Session};

/// 命令使用的清单后端
enum Backend {
    Remote(RestInventory),
    Offline(MemoryInventory),
}

/// 单次命令调用的上下文
pub struct AppContext {
    pub config: OrchestratorConfig,
    backend: Backend,
    datacenter: Option<String>,
    pub cancel: CancellationToken,
}

impl AppContext {
    /// 加载配置并连接清单服务
    pub async fn init(
        config_path: Option<&str>,
        inventory_file: Option<&str>,
        datacenter: Option<String>,
    ) -> Result<Self> {
        let config = load_config(config_path)?;

        let backend = match inventory_file {
            Some(path) => {
                info!("使用离线清单: {}", path);
                let inventory = MemoryInventory::load_file(Path::new(path))
                    .with_context(|| format!("加载离线清单失败: {}", path))?;
                Backend::Offline(inventory)
            }
            None => Backend::Remote(create_rest_client(&config).await?),
        };

        Ok(Self {
            config,
            backend,
            datacenter,
            cancel: cancel_on_ctrl_c(),
        })
    }

    pub fn inventory(&self) -> &dyn InventoryService {
        match &self.backend {
            Backend::Remote(client) => client as &dyn InventoryService,
            Backend::Offline(inventory) => inventory,
        }
    }

    /// 打开数据中心会话
    pub async fn session(&self) -> Result<Session<'_>> {
        let session =
            Session::open(self.inventory(), &self.config, self.datacenter.as_deref()).await?;
        Ok(session)
    }

    /// 结束远程会话；离线模式下打印已记录的操作数
    pub async fn close(&self) {
        match &self.backend {
            Backend::Remote(client) => {
                if let Err(e) = client.logout().await {
                    warn!("注销会话失败: {}", e);
                }
            }
            Backend::Offline(inventory) => {
                info!("离线模式共记录 {} 个变更操作", inventory.submitted().len());
            }
        }
    }
}

fn load_config(path: Option<&str>) -> Result<OrchestratorConfig> {
    let config = match path {
        Some(path) => OrchestratorConfig::load_with_override(Path::new(path))
            .with_context(|| format!("加载配置失败: {}", path))?,
        None => OrchestratorConfig::load()?,
    };
    config.validate()?;
    Ok(config)
}

/// 创建并登录清单网关客户端
async fn create_rest_client(config: &OrchestratorConfig) -> Result<RestInventory> {
    config.validate_connection()?;
    let connection = &config.connection;

    let client = RestInventory::new(&connection.base_url, connection.rest_config())
        .context("创建清单网关客户端失败")?;
    client
        .login(&connection.username, &connection.password)
        .await
        .context("清单网关登录失败")?;

    Ok(client)
}

/// Ctrl-C 触发取消，正在进行的等待随即结束
fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("收到中断信号，停止等待");
            token.cancel();
        }
    });
    cancel
}

/// 创建带消息的进度指示器
pub fn spinner(message: impl Into<String>) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg} [{elapsed}]")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(message.into());
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}
