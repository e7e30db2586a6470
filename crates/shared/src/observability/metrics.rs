//! 指标模块
//!
//! 基于 metrics crate 的 facade 记录转账、连接池和主键冲突恢复指标。
//! 未安装 recorder 时所有记录函数都是空操作。

/// 注册指标描述
///
/// 这些描述会出现在导出端的 HELP 注释中
pub fn describe() {
    metrics::describe_counter!("member_transfers_total", "Total number of balance transfers");
    metrics::describe_histogram!(
        "member_transfer_duration_seconds",
        "Balance transfer duration in seconds"
    );
    metrics::describe_counter!(
        "db_pool_acquire_timeouts_total",
        "Total number of connection acquisitions that timed out"
    );
    metrics::describe_counter!(
        "db_transactions_total",
        "Total number of finished transactions by outcome"
    );
    metrics::describe_counter!(
        "member_duplicate_key_recoveries_total",
        "Total number of inserts recovered after a duplicate key"
    );
}

/// 记录转账
///
/// `mode` 为事务边界方式（manual / template），`status` 为 committed / rolled_back / rejected
#[inline]
pub fn record_transfer(mode: &str, status: &str, duration_secs: f64) {
    metrics::counter!(
        "member_transfers_total",
        "mode" => mode.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    metrics::histogram!(
        "member_transfer_duration_seconds",
        "mode" => mode.to_string()
    )
    .record(duration_secs);
}

/// 记录连接获取超时
#[inline]
pub fn record_pool_timeout() {
    metrics::counter!("db_pool_acquire_timeouts_total").increment(1);
}

/// 记录事务结束
#[inline]
pub fn record_transaction(outcome: &str) {
    metrics::counter!(
        "db_transactions_total",
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// 记录主键冲突恢复
#[inline]
pub fn record_duplicate_recovery(recovered: bool) {
    metrics::counter!(
        "member_duplicate_key_recoveries_total",
        "recovered" => recovered.to_string()
    )
    .increment(1);
}
