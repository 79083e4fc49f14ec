//! 就绪轮询
//!
//! 克隆开机后等待客户机定制完成、获得 IP、端口可连接。所有等待都是固定间隔轮询：
//! 每轮检查一次，未就绪则休眠一个间隔；超时只在两次休眠之间判断，
//! 因此实际等待最多超出一个间隔。取消令牌可以随时结束等待。

use async_trait::async_trait;
use std::future::Future;
use std::io;
use std::net::IpAddr;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use vmops_inventory::{EventFilter, EventRecursion, EventType, InventoryService, ManagedObjectRef, PowerState};

use crate::error::{OrchestratorError, Result};

/// SSH 端口需要读到服务端标识才算就绪
pub const SSH_PORT: u16 = 22;

/// 单次连接超时
const PROBE_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// 轮询参数
#[derive(Debug, Clone)]
pub struct PollContext {
    pub timeout: Duration,
    pub interval: Duration,
    pub cancel: CancellationToken,
}

impl PollContext {
    pub fn new(timeout: Duration, interval: Duration) -> Self {
        Self {
            timeout,
            interval,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: &CancellationToken) -> Self {
        self.cancel = cancel.clone();
        self
    }
}

/// 期望的 IP 协议族
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum IpFamily {
    V4,
    V6,
    #[default]
    Any,
}

impl IpFamily {
    fn accepts(&self, address: &str) -> bool {
        let Ok(ip) = address.parse::<IpAddr>() else {
            return false;
        };
        match ip {
            IpAddr::V4(v4) => {
                matches!(self, IpFamily::V4 | IpFamily::Any) && !v4.is_unspecified() && !v4.is_link_local()
            }
            // fe80::/10 链路本地地址不可用于远程访问
            IpAddr::V6(v6) => {
                matches!(self, IpFamily::V6 | IpFamily::Any)
                    && !v6.is_unspecified()
                    && (v6.segments()[0] & 0xffc0) != 0xfe80
            }
        }
    }
}

/// 单次端口探测结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    Reachable,
    /// 瞬时网络错误（拒绝、重置、不可达），下一轮前额外等待
    Transient(io::ErrorKind),
    /// 尚未就绪（超时、权限等），不额外等待
    NotYet,
}

impl ProbeOutcome {
    /// 连接错误分类
    pub fn from_io_error(kind: io::ErrorKind) -> Self {
        match kind {
            io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::HostUnreachable
            | io::ErrorKind::NetworkUnreachable => ProbeOutcome::Transient(kind),
            _ => ProbeOutcome::NotYet,
        }
    }
}

/// 端口探测接口
#[async_trait]
pub trait PortProbe: Send + Sync {
    async fn probe(&self, host: &str, port: u16) -> ProbeOutcome;
}

/// TCP 端口探测
#[derive(Debug, Clone)]
pub struct TcpProbe {
    connect_timeout: Duration,
}

impl Default for TcpProbe {
    fn default() -> Self {
        Self {
            connect_timeout: PROBE_CONNECT_TIMEOUT,
        }
    }
}

impl TcpProbe {
    async fn read_banner(&self, stream: &mut TcpStream) -> ProbeOutcome {
        let mut buf = [0u8; 64];
        match tokio::time::timeout(self.connect_timeout, stream.read(&mut buf)).await {
            Ok(Ok(n)) if n > 0 => ProbeOutcome::Reachable,
            Ok(Ok(_)) => ProbeOutcome::NotYet,
            Ok(Err(e)) => ProbeOutcome::from_io_error(e.kind()),
            Err(_) => ProbeOutcome::NotYet,
        }
    }
}

#[async_trait]
impl PortProbe for TcpProbe {
    async fn probe(&self, host: &str, port: u16) -> ProbeOutcome {
        let mut stream =
            match tokio::time::timeout(self.connect_timeout, TcpStream::connect((host, port))).await {
                Ok(Ok(stream)) => stream,
                Ok(Err(e)) => return ProbeOutcome::from_io_error(e.kind()),
                Err(_) => return ProbeOutcome::NotYet,
            };

        if port == SSH_PORT {
            self.read_banner(&mut stream).await
        } else {
            ProbeOutcome::Reachable
        }
    }
}

/// 单轮检查结果
enum Check<T> {
    Ready(T),
    Pending,
    Transient,
}

/// 就绪轮询器
pub struct ReadinessPoller<'a> {
    inventory: &'a dyn InventoryService,
    probe: Box<dyn PortProbe>,
    transient_backoff: Duration,
}

impl<'a> ReadinessPoller<'a> {
    pub fn new(inventory: &'a dyn InventoryService) -> Self {
        Self {
            inventory,
            probe: Box::new(TcpProbe::default()),
            transient_backoff: Duration::from_secs(2),
        }
    }

    pub fn with_probe(mut self, probe: Box<dyn PortProbe>) -> Self {
        self.probe = probe;
        self
    }

    pub fn with_transient_backoff(mut self, backoff: Duration) -> Self {
        self.transient_backoff = backoff;
        self
    }

    /// 等待客户机报告指定协议族的 IP
    pub async fn wait_for_ip(
        &self,
        vm: &ManagedObjectRef,
        ctx: &PollContext,
        family: IpFamily,
    ) -> Result<String> {
        info!("等待虚拟机 {} 获取 IP", vm);
        let inventory = self.inventory;
        let ip = self
            .poll("虚拟机 IP", ctx, move || async move {
                let guest = inventory.guest_info(vm).await?;
                let found = guest
                    .ip_address
                    .iter()
                    .chain(guest.nets.iter().flat_map(|n| n.ip_addresses.iter()))
                    .find(|a| family.accepts(a))
                    .cloned();
                Ok::<_, OrchestratorError>(match found {
                    Some(ip) => Check::Ready(ip),
                    None => Check::Pending,
                })
            })
            .await?;
        info!("虚拟机 {} IP: {}", vm, ip);
        Ok(ip)
    }

    /// 等待定制成功事件，返回事件消息
    pub async fn wait_for_customization(
        &self,
        vm: &ManagedObjectRef,
        ctx: &PollContext,
    ) -> Result<Vec<String>> {
        info!("等待虚拟机 {} 完成客户机定制", vm);
        let inventory = self.inventory;
        let filter = EventFilter {
            entity: vm.clone(),
            recursion: EventRecursion::SelfOnly,
            event_types: vec![EventType::CustomizationSucceeded],
        };
        let filter = &filter;
        self.poll("客户机定制", ctx, move || async move {
            let events = inventory.query_events(filter).await?;
            Ok::<_, OrchestratorError>(if events.is_empty() {
                Check::Pending
            } else {
                Check::Ready(
                    events
                        .into_iter()
                        .map(|e| e.full_formatted_message)
                        .collect(),
                )
            })
        })
        .await
    }

    /// 等待端口可连接
    pub async fn wait_for_port(&self, host: &str, port: u16, ctx: &PollContext) -> Result<()> {
        info!("等待 {}:{} 可连接", host, port);
        let probe = self.probe.as_ref();
        self.poll(&format!("端口 {}:{}", host, port), ctx, move || async move {
            Ok::<_, OrchestratorError>(match probe.probe(host, port).await {
                ProbeOutcome::Reachable => Check::Ready(()),
                ProbeOutcome::Transient(kind) => {
                    debug!("{}:{} 暂不可达: {:?}", host, port, kind);
                    Check::Transient
                }
                ProbeOutcome::NotYet => Check::Pending,
            })
        })
        .await?;
        info!("{}:{} 已可连接", host, port);
        Ok(())
    }

    /// 等待虚拟机进入指定电源状态
    pub async fn wait_for_power_state(
        &self,
        vm: &ManagedObjectRef,
        wanted: PowerState,
        ctx: &PollContext,
    ) -> Result<()> {
        let inventory = self.inventory;
        let what = format!("电源状态 {}", wanted.display_name());
        self.poll(&what, ctx, move || async move {
            let summaries = inventory.vms(std::slice::from_ref(vm)).await?;
            let summary = summaries
                .first()
                .ok_or_else(|| OrchestratorError::not_found("虚拟机", &vm.to_string()))?;
            Ok::<_, OrchestratorError>(if summary.power_state == wanted {
                Check::Ready(())
            } else {
                Check::Pending
            })
        })
        .await
    }

    async fn poll<T, F, Fut>(&self, what: &str, ctx: &PollContext, mut check: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Check<T>>>,
    {
        let started = Instant::now();
        let mut attempt = 0u32;
        loop {
            if ctx.cancel.is_cancelled() {
                return Err(OrchestratorError::Cancelled(format!("等待{}", what)));
            }
            attempt += 1;
            debug!("检查{} (第 {} 次)", what, attempt);

            match check().await? {
                Check::Ready(value) => return Ok(value),
                Check::Transient => self.sleep(self.transient_backoff, ctx, what).await?,
                Check::Pending => {}
            }

            if started.elapsed() >= ctx.timeout {
                return Err(OrchestratorError::Timeout {
                    what: what.to_string(),
                    timeout_secs: ctx.timeout.as_secs(),
                });
            }
            self.sleep(ctx.interval, ctx, what).await?;
        }
    }

    async fn sleep(&self, duration: Duration, ctx: &PollContext, what: &str) -> Result<()> {
        tokio::select! {
            _ = ctx.cancel.cancelled() => Err(OrchestratorError::Cancelled(format!("等待{}", what))),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_error_classes() {
        assert_eq!(
            ProbeOutcome::from_io_error(io::ErrorKind::ConnectionRefused),
            ProbeOutcome::Transient(io::ErrorKind::ConnectionRefused)
        );
        assert_eq!(
            ProbeOutcome::from_io_error(io::ErrorKind::PermissionDenied),
            ProbeOutcome::NotYet
        );
        assert_eq!(
            ProbeOutcome::from_io_error(io::ErrorKind::TimedOut),
            ProbeOutcome::NotYet
        );
    }

    #[test]
    fn test_ip_family_filter() {
        assert!(IpFamily::V4.accepts("10.0.0.5"));
        assert!(!IpFamily::V4.accepts("2001:db8::1"));
        assert!(IpFamily::V6.accepts("2001:db8::1"));
        assert!(!IpFamily::Any.accepts("fe80::1"));
        assert!(!IpFamily::Any.accepts("169.254.1.1"));
        assert!(!IpFamily::Any.accepts("not-an-ip"));
    }

    #[tokio::test]
    async fn test_tcp_probe_accepts_plain_listener() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let accept = tokio::spawn(async move { listener.accept().await.map(|_| ()) });

        let outcome = TcpProbe::default().probe("127.0.0.1", port).await;
        assert_eq!(outcome, ProbeOutcome::Reachable);
        accept.await.unwrap().unwrap();
    }
}
