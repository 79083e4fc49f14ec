//! 克隆工作流
//!
//! 校验选项 → 解析模板、放置、网络、定制规格、目标文件夹 → 构建规格 → 提交克隆 →
//! （开机时）等待定制完成、IP、端口。

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;
use vmops_inventory::{CloneSpec, InventoryObject, ManagedObjectRef, TaskOperation};

use super::network::resolve_networks;
use super::Session;
use crate::error::{OrchestratorError, Result};
use crate::readiness::IpFamily;
use crate::resolver::{KindFilter, TraversalOptions};
use crate::spec::{build_clone_spec, CloneOptions, SpecInputs};
use crate::task::{FaultPolicy, TaskOutcome};

/// 克隆后的引导等待
#[derive(Debug, Clone, Default)]
pub struct BootstrapOptions {
    /// 等待客户机定制成功事件
    pub wait_customization: bool,

    /// 等待客户机 IP
    pub wait_ip: bool,

    pub ip_family: IpFamily,

    /// 等待该端口可连接（隐含等待 IP）
    pub port: Option<u16>,
}

impl BootstrapOptions {
    /// 定制 → IP → SSH 端口
    pub fn full(ssh_port: u16) -> Self {
        Self {
            wait_customization: true,
            wait_ip: true,
            ip_family: IpFamily::V4,
            port: Some(ssh_port),
        }
    }

    fn is_empty(&self) -> bool {
        !self.wait_customization && !self.wait_ip && self.port.is_none()
    }
}

/// 已解析完成、尚未提交的克隆
#[derive(Debug, Clone)]
pub struct ClonePlan {
    pub template: InventoryObject,
    pub folder: ManagedObjectRef,
    pub name: String,
    pub spec: CloneSpec,
}

/// 克隆结果
#[derive(Debug, Clone, Serialize)]
pub struct CloneReport {
    pub name: String,
    pub vm: Option<ManagedObjectRef>,

    /// 同名虚拟机已存在，未新建
    pub already_existed: bool,

    pub customization_messages: Vec<String>,
    pub ip_address: Option<String>,
    pub port_ready: Option<u16>,
}

/// 在名称后追加 8 位随机后缀
pub fn with_random_suffix(name: &str) -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("{}-{}", name, &id[..8])
}

/// 解析全部输入并构建克隆规格，不做任何变更
pub async fn plan_clone(session: &Session<'_>, options: &CloneOptions) -> Result<ClonePlan> {
    options.validate()?;

    let resolver = session.resolver();
    let template = session.find_vm(&options.template).await?;
    let template_config = session.inventory.vm_config(&template.moref).await?;
    info!("模板: {} ({})", template.name, template_config.guest_full_name);

    let placement = session
        .selector()
        .resolve_placement(session.dc(), &options.placement)
        .await?;

    let networks = resolve_networks(
        session,
        &options.placement.networks,
        &options.placement.switches,
    )
    .await?;

    let customization_item = match &options.customization_spec {
        Some(name) => Some(
            session
                .inventory
                .customization_spec(name)
                .await?
                .ok_or_else(|| OrchestratorError::not_found("定制规格", name))?,
        ),
        None => None,
    };

    let folder_path = options
        .folder
        .as_deref()
        .or(session.config.defaults.folder.as_deref())
        .unwrap_or("");
    let folder = resolver.find_folder(session.dc(), folder_path).await?;

    let spec = build_clone_spec(
        options,
        &SpecInputs {
            template: &template_config,
            placement: &placement,
            networks: &networks,
            customization_item: customization_item.as_ref(),
        },
    )?;

    Ok(ClonePlan {
        template,
        folder,
        name: options.name.clone(),
        spec,
    })
}

/// 执行克隆，开机时按 `bootstrap` 等待就绪
pub async fn clone_vm(
    session: &Session<'_>,
    options: &CloneOptions,
    bootstrap: &BootstrapOptions,
    cancel: &CancellationToken,
) -> Result<CloneReport> {
    let plan = plan_clone(session, options).await?;
    let customized = plan.spec.customization.is_some();
    let power_on = plan.spec.power_on;

    info!("从 {} 克隆虚拟机 {}", plan.template.name, plan.name);
    let op = TaskOperation::CloneVm {
        vm: plan.template.moref.clone(),
        folder: plan.folder.clone(),
        name: plan.name.clone(),
        spec: Box::new(plan.spec),
    };
    let outcome = session
        .driver()
        .submit_and_await(&op, FaultPolicy::for_clone())
        .await?;

    let (vm, already_existed) = match outcome {
        TaskOutcome::Completed { result: Some(vm) } => (Some(vm), false),
        TaskOutcome::Completed { result: None } => (
            find_in_folder(session, &plan.folder, &plan.name).await?,
            false,
        ),
        TaskOutcome::Recovered { fault } => {
            warn!("虚拟机 {} 已存在 ({}), 沿用现有虚拟机", plan.name, fault.message);
            (find_in_folder(session, &plan.folder, &plan.name).await?, true)
        }
    };

    let mut report = CloneReport {
        name: plan.name.clone(),
        vm: vm.clone(),
        already_existed,
        customization_messages: Vec::new(),
        ip_address: None,
        port_ready: None,
    };

    let Some(vm) = vm else {
        return Ok(report);
    };
    if !power_on || bootstrap.is_empty() {
        return Ok(report);
    }

    let readiness = &session.config.readiness;
    let poller = session.poller();

    if bootstrap.wait_customization && customized {
        report.customization_messages = poller
            .wait_for_customization(&vm, &readiness.customization_context(cancel))
            .await?;
    }

    if bootstrap.wait_ip || bootstrap.port.is_some() {
        let ip = poller
            .wait_for_ip(&vm, &readiness.ip_context(cancel), bootstrap.ip_family)
            .await?;
        if let Some(port) = bootstrap.port {
            poller
                .wait_for_port(&ip, port, &readiness.port_context(cancel))
                .await?;
            report.port_ready = Some(port);
        }
        report.ip_address = Some(ip);
    }

    info!("虚拟机 {} 已就绪", plan.name);
    Ok(report)
}

async fn find_in_folder(
    session: &Session<'_>,
    folder: &ManagedObjectRef,
    name: &str,
) -> Result<Option<ManagedObjectRef>> {
    Ok(session
        .resolver()
        .find_recursive(folder, KindFilter::VMS, name, TraversalOptions::default())
        .await?
        .map(|o| o.moref))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_suffix() {
        let a = with_random_suffix("web");
        let b = with_random_suffix("web");
        assert!(a.starts_with("web-"));
        assert_eq!(a.len(), "web-".len() + 8);
        assert_ne!(a, b);
    }
}
