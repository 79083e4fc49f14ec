//! 清单网关客户端
//!
//! 通过 JSON over HTTP 网关访问远程清单服务。网关负责与虚拟化管理平台的原生协议交互，
//! 本客户端只做请求封装和认证。

use async_trait::async_trait;
use reqwest::{Client, Method};
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::{InventoryError, Result};
use crate::models::{
    ComputeResourceSummary, CustomizationSpecItem, DatacenterFolders, DatastoreSummary,
    EventFilter, GuestInfo, HostSummary, InventoryEvent, InventoryObject, ManagedObjectRef,
    NetworkSummary, SnapshotTree, TaskHandle, TaskInfo, TaskOperation, TaskResult, TaskState,
    VmConfigInfo, VmSummary,
};
use crate::service::InventoryService;

/// 网关客户端配置
#[derive(Debug, Clone)]
pub struct RestConfig {
    /// 连接超时（秒）
    pub connect_timeout: u64,

    /// 请求超时（秒）
    pub request_timeout: u64,

    /// 任务状态轮询间隔（毫秒）
    pub task_poll_interval_ms: u64,

    /// 是否验证 SSL 证书
    pub verify_ssl: bool,
}

impl Default for RestConfig {
    fn default() -> Self {
        Self {
            connect_timeout: 10,
            request_timeout: 60,
            task_poll_interval_ms: 1000,
            verify_ssl: true,
        }
    }
}

/// 清单网关客户端
pub struct RestInventory {
    /// API 基础 URL
    base_url: String,

    /// HTTP 客户端
    http_client: Client,

    /// 会话令牌
    session_token: Arc<RwLock<Option<String>>>,

    /// 配置
    config: RestConfig,
}

impl RestInventory {
    /// 创建新的网关客户端
    pub fn new(base_url: &str, config: RestConfig) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout))
            .connect_timeout(Duration::from_secs(config.connect_timeout))
            .danger_accept_invalid_certs(!config.verify_ssl)
            .build()
            .map_err(|e| InventoryError::HttpError(e.to_string()))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http_client,
            session_token: Arc::new(RwLock::new(None)),
            config,
        })
    }

    /// 认证登录
    pub async fn login(&self, username: &str, password: &str) -> Result<()> {
        info!("清单网关登录: {}", username);

        let login_url = format!("{}/api/session", self.base_url);
        let response = self
            .http_client
            .post(&login_url)
            .json(&serde_json::json!({
                "username": username,
                "password": password,
            }))
            .send()
            .await
            .map_err(|e| InventoryError::HttpError(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(InventoryError::AuthError(format!(
                "登录失败 [{}]: {}",
                status, text
            )));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| InventoryError::ParseError(e.to_string()))?;

        let token = body["token"]
            .as_str()
            .ok_or_else(|| InventoryError::AuthError("未获取到会话令牌".to_string()))?
            .to_string();

        *self.session_token.write().await = Some(token);

        info!("清单网关登录成功");
        Ok(())
    }

    /// 注销会话
    pub async fn logout(&self) -> Result<()> {
        info!("清单网关登出");
        let token = self.session_token.write().await.take();
        if token.is_some() {
            let _: serde_json::Value = self
                .request_with_token(Method::DELETE, "/api/session", None::<()>, token)
                .await
                .unwrap_or(serde_json::Value::Null);
        }
        Ok(())
    }

    /// 发送 HTTP 请求
    async fn request<T: Serialize, R: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<T>,
    ) -> Result<R> {
        let token = self.session_token.read().await.clone();
        self.request_with_token(method, path, body, token).await
    }

    async fn request_with_token<T: Serialize, R: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<T>,
        token: Option<String>,
    ) -> Result<R> {
        let url = format!("{}{}", self.base_url, path);
        debug!("清单 API 请求: {} {}", method, url);

        let token = token.ok_or_else(|| InventoryError::AuthError("未认证，请先登录".to_string()))?;

        let mut request = self
            .http_client
            .request(method, &url)
            .header("X-Session-Token", token)
            .header("Content-Type", "application/json");

        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| InventoryError::HttpError(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(InventoryError::ObjectNotFound(path.to_string()));
        }
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "无法读取错误响应".to_string());
            warn!("API 请求失败: {} - {}", status, error_text);
            return Err(InventoryError::ApiError(status.as_u16(), error_text));
        }

        response
            .json::<R>()
            .await
            .map_err(|e| InventoryError::ParseError(e.to_string()))
    }

    /// 批量属性查询
    async fn collect<R: DeserializeOwned>(
        &self,
        collection: &str,
        refs: &[ManagedObjectRef],
    ) -> Result<Vec<R>> {
        if refs.is_empty() {
            return Ok(Vec::new());
        }
        self.request(
            Method::POST,
            &format!("/api/properties/{}", collection),
            Some(serde_json::json!({ "objects": refs })),
        )
        .await
    }

    fn object_path(moref: &ManagedObjectRef) -> String {
        format!("/api/objects/{}/{}", moref.kind.type_name(), moref.id)
    }
}

#[async_trait]
impl InventoryService for RestInventory {
    async fn root_folder(&self) -> Result<ManagedObjectRef> {
        self.request(Method::GET, "/api/root", None::<()>).await
    }

    async fn children(&self, parent: &ManagedObjectRef) -> Result<Vec<InventoryObject>> {
        self.request(
            Method::GET,
            &format!("{}/children", Self::object_path(parent)),
            None::<()>,
        )
        .await
    }

    async fn datacenter_folders(
        &self,
        datacenter: &ManagedObjectRef,
    ) -> Result<DatacenterFolders> {
        self.request(
            Method::GET,
            &format!("{}/folders", Self::object_path(datacenter)),
            None::<()>,
        )
        .await
    }

    async fn compute_resources(
        &self,
        refs: &[ManagedObjectRef],
    ) -> Result<Vec<ComputeResourceSummary>> {
        self.collect("compute-resources", refs).await
    }

    async fn hosts(&self, refs: &[ManagedObjectRef]) -> Result<Vec<HostSummary>> {
        self.collect("hosts", refs).await
    }

    async fn datastores(&self, refs: &[ManagedObjectRef]) -> Result<Vec<DatastoreSummary>> {
        self.collect("datastores", refs).await
    }

    async fn networks(&self, refs: &[ManagedObjectRef]) -> Result<Vec<NetworkSummary>> {
        self.collect("networks", refs).await
    }

    async fn vms(&self, refs: &[ManagedObjectRef]) -> Result<Vec<VmSummary>> {
        self.collect("vms", refs).await
    }

    async fn vm_config(&self, vm: &ManagedObjectRef) -> Result<VmConfigInfo> {
        self.request(
            Method::GET,
            &format!("{}/config", Self::object_path(vm)),
            None::<()>,
        )
        .await
    }

    async fn guest_info(&self, vm: &ManagedObjectRef) -> Result<GuestInfo> {
        self.request(
            Method::GET,
            &format!("{}/guest", Self::object_path(vm)),
            None::<()>,
        )
        .await
    }

    async fn snapshot_tree(&self, vm: &ManagedObjectRef) -> Result<SnapshotTree> {
        self.request(
            Method::GET,
            &format!("{}/snapshots", Self::object_path(vm)),
            None::<()>,
        )
        .await
    }

    async fn customization_spec(&self, name: &str) -> Result<Option<CustomizationSpecItem>> {
        match self
            .request(
                Method::GET,
                &format!("/api/customization-specs/{}", name),
                None::<()>,
            )
            .await
        {
            Ok(item) => Ok(Some(item)),
            Err(InventoryError::ObjectNotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn customization_spec_names(&self) -> Result<Vec<String>> {
        self.request(Method::GET, "/api/customization-specs", None::<()>)
            .await
    }

    async fn submit(&self, operation: &TaskOperation) -> Result<TaskHandle> {
        info!("提交任务: {} -> {}", operation.label(), operation.target());
        self.request(Method::POST, "/api/tasks", Some(operation)).await
    }

    async fn wait_for_task(&self, task: &TaskHandle) -> Result<TaskResult> {
        let interval = Duration::from_millis(self.config.task_poll_interval_ms);
        loop {
            let info: TaskInfo = self
                .request(Method::GET, &format!("/api/tasks/{}", task.id), None::<()>)
                .await?;

            debug!(
                "任务 {} ({}) 状态: {:?}, 进度: {:?}",
                task.id, task.operation, info.state, info.progress
            );

            match info.state {
                TaskState::Success => return Ok(TaskResult::Succeeded { result: info.result }),
                TaskState::Error => {
                    let fault = info.fault.ok_or_else(|| {
                        InventoryError::ParseError(format!("任务 {} 失败但未返回故障信息", task.id))
                    })?;
                    return Ok(TaskResult::Faulted(fault));
                }
                TaskState::Queued | TaskState::Running => tokio::time::sleep(interval).await,
            }
        }
    }

    async fn query_events(&self, filter: &EventFilter) -> Result<Vec<InventoryEvent>> {
        self.request(Method::POST, "/api/events/query", Some(filter))
            .await
    }
}
