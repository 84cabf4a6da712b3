//! 指标记录
//!
//! 基于 metrics crate 门面记录指标；未安装 recorder 时记录操作为空操作。

/// 注册指标描述，出现在导出端的 HELP 注释中
pub fn describe_metrics() {
    metrics::describe_counter!("rule_evaluations_total", "Total number of rule evaluations");
    metrics::describe_histogram!(
        "rule_evaluation_duration_seconds",
        "Rule evaluation duration in seconds"
    );
    metrics::describe_counter!(
        "rule_storage_operations_total",
        "Total number of rule storage operations"
    );
}

/// 记录规则评估
#[inline]
pub fn record_rule_evaluation(outcome: &str, duration_secs: f64) {
    metrics::counter!(
        "rule_evaluations_total",
        "outcome" => outcome.to_string()
    )
    .increment(1);

    metrics::histogram!("rule_evaluation_duration_seconds").record(duration_secs);
}

/// 记录存储读写
#[inline]
pub fn record_storage_operation(format: &str, operation: &str, status: &str) {
    metrics::counter!(
        "rule_storage_operations_total",
        "format" => format.to_string(),
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}
