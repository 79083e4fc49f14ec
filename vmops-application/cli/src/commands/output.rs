//! CLI 通用输出格式化模块
//!
//! 提供 table/json/yaml 三种输出格式的通用实现

use anyhow::Result;
use serde::Serialize;
use vmops_inventory::{
    DatastoreSummary, DeviceInfo, HostSummary, InventoryObject, NetworkSummary, NicBacking,
    VirtualDevice, VmSummary,
};
use vmops_orchestrator::ops::disk::DiskInfo;
use vmops_orchestrator::ops::listing::DatastoreClusterInfo;
use vmops_orchestrator::ops::snapshot::SnapshotEntry;

/// 可输出为表格行的数据 trait
pub trait TableRow {
    /// 返回表格列标题
    fn headers() -> Vec<&'static str>;

    /// 返回该项的表格行数据
    fn row(&self) -> Vec<String>;
}

/// 表格格式输出，列宽取该列最长内容
pub fn print_table<T: TableRow>(items: &[T]) {
    let headers = T::headers();
    let rows: Vec<Vec<String>> = items.iter().map(TableRow::row).collect();

    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let format_line = |cells: Vec<String>| -> String {
        cells
            .iter()
            .zip(&widths)
            .map(|(c, w)| format!("{:<width$}", c, width = *w))
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    let header_line = format_line(headers.iter().map(|h| h.to_string()).collect());
    println!("{}", header_line);
    println!("{}", "-".repeat(header_line.chars().count()));
    for row in rows {
        println!("{}", format_line(row));
    }
}

/// JSON 格式输出
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// YAML 格式输出
pub fn print_yaml<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    print!("{}", serde_yaml::to_string(value)?);
    Ok(())
}

/// 根据格式参数选择输出方式
pub fn output_formatted<T: TableRow + Serialize>(items: &[T], format: &str) -> Result<()> {
    match format {
        "json" => print_json(items)?,
        "yaml" => print_yaml(items)?,
        _ => print_table(items),
    }
    Ok(())
}

fn gib(bytes: u64) -> String {
    format!("{:.1}", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
}

impl TableRow for VmSummary {
    fn headers() -> Vec<&'static str> {
        vec!["名称", "电源", "CPU", "内存(MB)", "IP", "操作系统"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.name.clone(),
            self.power_state.display_name().to_string(),
            self.num_cpu.to_string(),
            self.memory_mb.to_string(),
            self.ip_address.clone().unwrap_or_else(|| "-".to_string()),
            self.guest_full_name.clone().unwrap_or_default(),
        ]
    }
}

impl TableRow for HostSummary {
    fn headers() -> Vec<&'static str> {
        vec!["名称", "维护模式", "数据存储", "网络"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.name.clone(),
            if self.in_maintenance_mode { "是" } else { "否" }.to_string(),
            self.datastores.len().to_string(),
            self.networks.len().to_string(),
        ]
    }
}

impl TableRow for DatastoreSummary {
    fn headers() -> Vec<&'static str> {
        vec!["名称", "可用(GiB)", "容量(GiB)", "可访问"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.name.clone(),
            gib(self.free_space),
            gib(self.capacity),
            if self.accessible { "是" } else { "否" }.to_string(),
        ]
    }
}

impl TableRow for DatastoreClusterInfo {
    fn headers() -> Vec<&'static str> {
        vec!["名称", "成员", "可用(GiB)", "容量(GiB)"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.name.clone(),
            self.members
                .iter()
                .map(|m| m.name.as_str())
                .collect::<Vec<_>>()
                .join(","),
            gib(self.free_space),
            gib(self.capacity),
        ]
    }
}

impl TableRow for NetworkSummary {
    fn headers() -> Vec<&'static str> {
        vec!["名称", "分布式交换机", "端口组"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.name.clone(),
            self.dvs
                .as_ref()
                .map(|d| d.name.clone())
                .unwrap_or_else(|| "-".to_string()),
            self.portgroup_key.clone().unwrap_or_else(|| "-".to_string()),
        ]
    }
}

impl TableRow for SnapshotEntry {
    fn headers() -> Vec<&'static str> {
        vec!["名称", "创建时间", "状态", "描述"]
    }

    fn row(&self) -> Vec<String> {
        let marker = if self.current { " *" } else { "" };
        vec![
            format!("{}{}{}", "  ".repeat(self.depth), self.name, marker),
            self.created.clone(),
            self.state.display_name().to_string(),
            self.description.clone(),
        ]
    }
}

impl TableRow for DiskInfo {
    fn headers() -> Vec<&'static str> {
        vec!["序号", "标签", "容量(GiB)", "精简", "文件"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.index.to_string(),
            self.label.clone(),
            format!("{:.1}", self.capacity_gb),
            if self.thin { "是" } else { "否" }.to_string(),
            self.file_name.clone().unwrap_or_default(),
        ]
    }
}

/// 带路径的清单对象（资源池、文件夹）
#[derive(Debug, Serialize)]
pub struct PathRow {
    pub path: String,
    pub kind: String,
}

impl From<(String, InventoryObject)> for PathRow {
    fn from((path, object): (String, InventoryObject)) -> Self {
        Self {
            path,
            kind: object.kind().to_string(),
        }
    }
}

impl TableRow for PathRow {
    fn headers() -> Vec<&'static str> {
        vec!["路径", "类型"]
    }

    fn row(&self) -> Vec<String> {
        vec![self.path.clone(), self.kind.clone()]
    }
}

/// 单列名称
#[derive(Debug, Serialize)]
pub struct NameRow {
    pub name: String,
}

impl TableRow for NameRow {
    fn headers() -> Vec<&'static str> {
        vec!["名称"]
    }

    fn row(&self) -> Vec<String> {
        vec![self.name.clone()]
    }
}

/// 网卡列表中的一行
#[derive(Debug, Serialize)]
pub struct NicRow {
    pub index: usize,
    pub label: String,
    pub network: String,
    pub mac_address: String,
    pub connected: bool,
}

impl NicRow {
    pub fn from_device(index: usize, device: &VirtualDevice) -> Self {
        let (network, mac_address) = match &device.info {
            DeviceInfo::Ethernet {
                backing,
                mac_address,
                ..
            } => (
                match backing {
                    Some(NicBacking::Network { device_name, .. }) => device_name.clone(),
                    Some(NicBacking::DistributedPort { portgroup_key, .. }) => {
                        portgroup_key.clone()
                    }
                    None => "-".to_string(),
                },
                mac_address.clone().unwrap_or_default(),
            ),
            _ => ("-".to_string(), String::new()),
        };
        Self {
            index,
            label: device.label.clone(),
            network,
            mac_address,
            connected: device.connectable.map(|c| c.connected).unwrap_or(false),
        }
    }
}

impl TableRow for NicRow {
    fn headers() -> Vec<&'static str> {
        vec!["序号", "标签", "网络", "MAC", "已连接"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.index.to_string(),
            self.label.clone(),
            self.network.clone(),
            self.mac_address.clone(),
            if self.connected { "是" } else { "否" }.to_string(),
        ]
    }
}
