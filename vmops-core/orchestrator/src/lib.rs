//! VMOPS 编排引擎
//!
//! 针对远程层级清单执行虚拟机生命周期操作：在清单树中解析名称和路径，
//! 选择放置位置，构建一次性的克隆/重配置规格，提交并等待远程任务，
//! 然后轮询客户机就绪状态。
//!
//! # 组件
//!
//! - **路径解析** (`resolver`): 逐段路径解析与参数化深度优先遍历
//! - **放置选择** (`placement`): 按约束淘汰计算资源、解析资源池、数据存储集群决胜
//! - **规格构建** (`spec`): 网卡绑定、客户机定制、资源覆盖、vApp 属性
//! - **任务驱动** (`task`): 提交、等待与故障分类
//! - **就绪轮询** (`readiness`): IP、定制事件、端口探测
//! - **工作流** (`ops`): 克隆、迁移、网络、快照、磁盘、电源、列表
//!
//! 每个命令严格串行：任何时刻最多只有一个未完成的远程变更。
//!
//! # 示例
//!
//! ```ignore
//! use tokio_util::sync::CancellationToken;
//! use vmops_orchestrator::{clone_vm, BootstrapOptions, CloneOptions, OrchestratorConfig, Session};
//!
//! let config = OrchestratorConfig::load()?;
//! let session = Session::open(&inventory, &config, Some("dc1")).await?;
//!
//! let mut options = CloneOptions::new("golden-linux", "web-01");
//! options.placement.networks = vec!["app-net".to_string()];
//! options.power_on = true;
//!
//! let report = clone_vm(&session, &options, &BootstrapOptions::full(22), &CancellationToken::new()).await?;
//! println!("{:?}", report.ip_address);
//! ```

pub mod config;
pub mod error;
pub mod ops;
pub mod placement;
pub mod readiness;
pub mod resolver;
pub mod spec;
pub mod task;

pub use config::{ConnectionConfig, DefaultsConfig, OrchestratorConfig, ReadinessConfig};
pub use error::{OrchestratorError, Result};
pub use ops::clone::{clone_vm, plan_clone, with_random_suffix, BootstrapOptions, ClonePlan, CloneReport};
pub use ops::migrate::{migrate_vm, relocate_spec, MigrateOptions};
pub use ops::power::{PowerAction, PowerOutcome};
pub use ops::Session;
pub use placement::{pick_from_datastore_cluster, Placement, PlacementConstraints, PlacementSelector};
pub use readiness::{IpFamily, PollContext, PortProbe, ProbeOutcome, ReadinessPoller, TcpProbe};
pub use resolver::{KindFilter, PathResolver, TraversalOptions};
pub use spec::{build_clone_spec, CloneOptions, GuestFamily, SpecInputs};
pub use task::{classify, FaultPolicy, TaskDriver, TaskOutcome};
