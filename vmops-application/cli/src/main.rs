//! VMOPS CLI 应用

use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;
use vmops_orchestrator::OrchestratorError;

mod commands;

use commands::common::AppContext;

#[derive(Parser)]
#[command(name = "vmops")]
#[command(about = "VMOPS - 虚拟机放置解析与克隆编排工具", long_about = None)]
#[command(version)]
struct Cli {
    /// 日志级别 (未指定时读取 RUST_LOG)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// 配置文件路径 (TOML/YAML/JSON)
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// 离线清单快照文件，指定后不连接远程服务
    #[arg(long, global = true)]
    inventory_file: Option<String>,

    /// 数据中心名称
    #[arg(long, global = true)]
    datacenter: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 从模板克隆虚拟机
    Clone(CloneArgs),

    /// 迁移虚拟机
    Migrate(MigrateArgs),

    /// 网卡管理
    Network {
        #[command(subcommand)]
        action: NetworkAction,
    },

    /// 快照管理
    Snapshot {
        #[command(subcommand)]
        action: SnapshotAction,
    },

    /// 磁盘管理
    Disk {
        #[command(subcommand)]
        action: DiskAction,
    },

    /// 电源操作
    Power {
        /// 虚拟机名称
        vm: String,

        /// 动作
        #[arg(value_enum)]
        action: PowerArg,

        /// 等待电源状态生效
        #[arg(short, long)]
        wait: bool,

        /// 等待超时 (秒)
        #[arg(short, long, default_value = "120")]
        timeout: u64,
    },

    /// 列表与查找
    #[command(alias = "ls")]
    List {
        #[command(subcommand)]
        action: ListAction,
    },
}

#[derive(Args)]
pub struct CloneArgs {
    /// 模板名称
    pub template: String,

    /// 新虚拟机名称
    pub name: String,

    /// 目标文件夹路径
    #[arg(long)]
    pub folder: Option<String>,

    /// 目标主机
    #[arg(long)]
    pub host: Option<String>,

    /// 资源池路径或名称
    #[arg(long)]
    pub pool: Option<String>,

    /// 数据存储
    #[arg(long, conflicts_with = "datastore_cluster")]
    pub datastore: Option<String>,

    /// 数据存储集群
    #[arg(long)]
    pub datastore_cluster: Option<String>,

    /// 网络名称，按网卡顺序 (逗号分隔或重复指定)
    #[arg(long = "network", value_delimiter = ',')]
    pub networks: Vec<String>,

    /// 分布式交换机 UUID 或名称，与网络一一对应 (auto 表示不限)
    #[arg(long = "switch", value_delimiter = ',')]
    pub switches: Vec<String>,

    /// MAC 地址，按网卡顺序 (auto 表示自动分配)
    #[arg(long = "mac", value_delimiter = ',')]
    pub macs: Vec<String>,

    /// IP 设置，按网卡顺序: dhcp 或 a.b.c.d/prefix
    #[arg(long = "ip", value_delimiter = ',')]
    pub ips: Vec<String>,

    /// 网关 (单个时应用到所有固定 IP)
    #[arg(long = "gateway", value_delimiter = ',')]
    pub gateways: Vec<String>,

    /// DNS 服务器
    #[arg(long = "dns", value_delimiter = ',')]
    pub dns_servers: Vec<String>,

    /// DNS 搜索后缀
    #[arg(long = "dns-suffix", value_delimiter = ',')]
    pub dns_suffixes: Vec<String>,

    /// 客户机主机名 (默认与虚拟机名称相同)
    #[arg(long)]
    pub hostname: Option<String>,

    /// 客户机域名
    #[arg(long)]
    pub domain: Option<String>,

    /// 时区
    #[arg(long)]
    pub time_zone: Option<String>,

    /// 服务端保存的定制规格名称
    #[arg(long)]
    pub customization_spec: Option<String>,

    /// 不生成定制身份
    #[arg(long)]
    pub no_customization: bool,

    /// CPU 数
    #[arg(long)]
    pub cpus: Option<i32>,

    /// 每插槽核数
    #[arg(long)]
    pub cores_per_socket: Option<i32>,

    /// 内存 (GiB)
    #[arg(long)]
    pub memory: Option<f64>,

    /// 内存预留 (GiB)
    #[arg(long)]
    pub memory_reservation: Option<f64>,

    /// 备注
    #[arg(long)]
    pub annotation: Option<String>,

    /// vApp 属性 ID=VALUE (可重复)
    #[arg(long = "vapp-property")]
    pub vapp_properties: Vec<String>,

    /// 基于模板当前快照链接克隆
    #[arg(long)]
    pub linked: bool,

    /// 精简置备
    #[arg(long)]
    pub thin: bool,

    /// 克隆结果标记为模板
    #[arg(long)]
    pub as_template: bool,

    /// 克隆后开机
    #[arg(long)]
    pub power_on: bool,

    /// 名称追加随机后缀
    #[arg(long)]
    pub random_suffix: bool,

    /// 等待定制、IP 与 SSH 端口就绪 (隐含 --power-on)
    #[arg(long)]
    pub wait: bool,

    /// 只等待 IP
    #[arg(long)]
    pub wait_ip: bool,

    /// 等待指定端口可连接
    #[arg(long)]
    pub wait_port: Option<u16>,

    /// 期望的 IP 协议族
    #[arg(long, value_enum, default_value = "any")]
    pub ip_family: IpFamilyArg,

    /// 只解析并打印克隆规格，不提交
    #[arg(long)]
    pub dry_run: bool,

    /// 输出格式 (table/json)
    #[arg(short = 'f', long, default_value = "table")]
    pub format: String,
}

#[derive(Args)]
pub struct MigrateArgs {
    /// 虚拟机名称
    pub vm: String,

    /// 目标主机
    #[arg(long)]
    pub host: Option<String>,

    /// 目标资源池
    #[arg(long)]
    pub pool: Option<String>,

    /// 目标数据存储
    #[arg(long, conflicts_with = "datastore_cluster")]
    pub datastore: Option<String>,

    /// 目标数据存储集群
    #[arg(long)]
    pub datastore_cluster: Option<String>,

    /// 迁移优先级
    #[arg(long, value_enum, default_value = "default")]
    pub priority: PriorityArg,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum IpFamilyArg {
    V4,
    V6,
    Any,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum PriorityArg {
    Default,
    High,
    Low,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum PowerArg {
    On,
    Off,
    Reset,
    Suspend,
}

#[derive(Subcommand)]
pub enum NetworkAction {
    /// 列出网卡
    List {
        /// 虚拟机名称
        vm: String,
    },

    /// 修改网卡所连网络
    Set {
        /// 虚拟机名称
        vm: String,

        /// 网卡序号 (1 起始)
        #[arg(long, default_value = "1")]
        nic: usize,

        /// 网络名称
        #[arg(long)]
        network: String,

        /// 分布式交换机 UUID 或名称
        #[arg(long)]
        switch: Option<String>,
    },

    /// 连接网卡
    Connect {
        vm: String,
        #[arg(long, default_value = "1")]
        nic: usize,
    },

    /// 断开网卡
    Disconnect {
        vm: String,
        #[arg(long, default_value = "1")]
        nic: usize,
    },
}

#[derive(Subcommand)]
pub enum SnapshotAction {
    /// 创建快照
    Create {
        /// 虚拟机名称
        vm: String,

        /// 快照名称
        name: String,

        /// 描述
        #[arg(short, long, default_value = "")]
        description: String,

        /// 包含内存
        #[arg(long)]
        memory: bool,

        /// 静默文件系统
        #[arg(long)]
        quiesce: bool,
    },

    /// 列出快照树
    List {
        vm: String,

        /// 输出格式 (table/json/yaml)
        #[arg(short = 'f', long, default_value = "table")]
        format: String,
    },

    /// 恢复快照 (未指定名称时恢复到当前快照)
    Revert { vm: String, name: Option<String> },

    /// 删除快照
    Delete {
        vm: String,
        name: String,

        /// 同时删除子快照
        #[arg(long)]
        children: bool,
    },
}

#[derive(Subcommand)]
pub enum DiskAction {
    /// 列出磁盘
    List {
        vm: String,

        /// 输出格式 (table/json/yaml)
        #[arg(short = 'f', long, default_value = "table")]
        format: String,
    },

    /// 新增磁盘
    Add {
        vm: String,

        /// 大小 (GiB)
        #[arg(long)]
        size: f64,

        /// 精简置备
        #[arg(long)]
        thin: bool,

        /// 数据存储
        #[arg(long)]
        datastore: Option<String>,
    },

    /// 扩容磁盘
    Extend {
        vm: String,

        /// 磁盘序号 (1 起始)
        #[arg(long)]
        index: usize,

        /// 新大小 (GiB)
        #[arg(long)]
        size: f64,
    },

    /// 移除磁盘
    Remove {
        vm: String,

        #[arg(long)]
        index: usize,

        /// 保留磁盘文件
        #[arg(long)]
        keep_files: bool,
    },
}

/// 列表命令的公共参数
#[derive(Args)]
pub struct ListArgs {
    /// 名称过滤 (正则表达式)
    pub pattern: Option<String>,

    /// 输出格式 (table/json/yaml)
    #[arg(short = 'f', long, default_value = "table")]
    pub format: String,
}

#[derive(Subcommand)]
pub enum ListAction {
    /// 虚拟机
    Vms(ListArgs),
    /// 模板
    Templates(ListArgs),
    /// 主机
    Hosts(ListArgs),
    /// 数据存储
    Datastores(ListArgs),
    /// 可用空间最大的数据存储
    MaxFree(ListArgs),
    /// 数据存储集群
    DatastoreClusters(ListArgs),
    /// 网络
    Networks(ListArgs),
    /// 资源池
    Pools(ListArgs),
    /// 虚拟机文件夹
    Folders(ListArgs),
    /// 定制规格
    CustomizationSpecs(ListArgs),
}

fn init_tracing(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// 编排错误映射到各自的退出码，其余错误为 1
fn exit_code(err: &anyhow::Error) -> u8 {
    err.downcast_ref::<OrchestratorError>()
        .map(|e| u8::try_from(e.exit_code()).unwrap_or(1))
        .unwrap_or(1)
}

async fn run(cli: Cli) -> Result<()> {
    let app = AppContext::init(
        cli.config.as_deref(),
        cli.inventory_file.as_deref(),
        cli.datacenter,
    )
    .await?;

    let result = match cli.command {
        Commands::Clone(args) => commands::clone::handle(&app, args).await,
        Commands::Migrate(args) => commands::migrate::handle(&app, args).await,
        Commands::Network { action } => commands::network::handle(&app, action).await,
        Commands::Snapshot { action } => commands::snapshot::handle(&app, action).await,
        Commands::Disk { action } => commands::disk::handle(&app, action).await,
        Commands::Power {
            vm,
            action,
            wait,
            timeout,
        } => commands::power::handle(&app, &vm, action, wait.then_some(timeout)).await,
        Commands::List { action } => commands::list::handle(&app, action).await,
    };

    app.close().await;
    result
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref());
    debug!("VMOPS CLI 启动");

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {:#}", "✗".red().bold(), e);
            ExitCode::from(exit_code(&e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_clone_args_split_lists() {
        let cli = Cli::parse_from([
            "vmops",
            "clone",
            "golden-linux",
            "web-01",
            "--network",
            "app-net,db-net",
            "--ip",
            "10.0.0.5/24",
            "--ip",
            "dhcp",
        ]);
        match cli.command {
            Commands::Clone(args) => {
                assert_eq!(args.networks, vec!["app-net", "db-net"]);
                assert_eq!(args.ips, vec!["10.0.0.5/24", "dhcp"]);
            }
            _ => panic!("应解析为 clone 命令"),
        }
    }

    #[test]
    fn test_exit_code_downcast() {
        let err = anyhow::Error::new(OrchestratorError::CustomizationNicMismatch {
            vm_name: "web-01".into(),
            nic_mapping_count: 2,
            nic_count: 1,
        })
        .context("克隆失败");
        assert_eq!(exit_code(&err), 6);
        assert_eq!(exit_code(&anyhow::anyhow!("其他错误")), 1);
    }
}
