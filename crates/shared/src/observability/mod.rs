//! 统一可观测性模块
//!
//! 提供日志与指标的统一初始化。指标只通过 `metrics` 门面记录，
//! 导出器（recorder）由宿主程序决定是否安装。

pub mod metrics;
pub mod tracing;

use crate::config::ObservabilityConfig;
use anyhow::Result;

/// 初始化日志并注册指标描述
pub fn init(config: &ObservabilityConfig) -> Result<()> {
    tracing::init(config)?;
    metrics::describe_metrics();

    ::tracing::info!(
        log_level = %config.log_level,
        log_format = %config.log_format,
        "可观测性初始化完成"
    );

    Ok(())
}
