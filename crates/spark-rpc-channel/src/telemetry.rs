//! 日志订阅器装配。
//!
//! 库代码只发出 `tracing` 事件，不安装订阅器；二进制入口调用 [`init`] 组装
//! `EnvFilter + fmt` 并设为全局订阅器。过滤规则读取 `RUST_LOG`，缺省为 `info`。

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// 安装全局订阅器，返回本次调用是否完成安装。
///
/// 已有全局订阅器时返回 `false` 且不做任何修改，重复调用安全。
pub fn init() -> bool {
    tracing_subscriber::registry()
        .with(build_env_filter())
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .is_ok()
}

fn build_env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

