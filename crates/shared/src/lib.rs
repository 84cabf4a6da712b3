//! 共享库
//!
//! 规则引擎与存储适配器共用的配置加载与可观测性初始化。

pub mod config;
pub mod observability;

pub use config::AppConfig;
