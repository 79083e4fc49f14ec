//! CLI 命令处理模块

pub mod clone;
pub mod common; // 公共工具函数
pub mod disk;
pub mod list;
pub mod migrate;
pub mod network;
pub mod output; // table/json/yaml 输出
pub mod power;
pub mod snapshot;
