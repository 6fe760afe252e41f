//! 通道选项。
//!
//! ### 设计目标（Why）
//! - 将连接超时、截止时间上报策略等与单个目标无关的行为显式化，既能在代码中经
//!   [`ChannelBuilder`](crate::channel::ChannelBuilder) 设置，也能从 TOML 文本加载；
//! - 未出现的字段取默认值，便于调用方只声明关心的部分。
//!
//! ### 配置示例（What）
//! ```toml
//! connect_timeout_ms = 5000
//! timeout_reporting = "same_state"
//! ```

use std::time::Duration;

use serde::Deserialize;

use crate::error::{ChannelError, Result};

/// 观测请求在截止时间到达且状态未变化时的上报方式。
///
/// - `DistinctMarker`：回调收到 [`WatchOutcome::DeadlineExceeded`](crate::watcher::WatchOutcome::DeadlineExceeded)；
/// - `SameState`：回调收到 [`WatchOutcome::Changed`](crate::watcher::WatchOutcome::Changed)，
///   携带的仍是当前（未变化的）状态，调用方需自行比较。
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutReporting {
    SameState,
    #[default]
    DistinctMarker,
}

/// 默认连接超时。
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(20);

/// 通道行为选项。
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ChannelOptions {
    /// 单次连接尝试的超时（毫秒）。参数键 `spark.connect_timeout_ms` 可逐通道覆盖。
    pub connect_timeout_ms: u64,
    pub timeout_reporting: TimeoutReporting,
}

impl Default for ChannelOptions {
    fn default() -> Self {
        Self {
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT.as_millis() as u64,
            timeout_reporting: TimeoutReporting::default(),
        }
    }
}

impl ChannelOptions {
    /// 从 TOML 文本解析选项，解析后执行 [`validate`](Self::validate)。
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let options: Self = toml::from_str(text).map_err(|err| ChannelError::InvalidConfiguration {
            detail: err.to_string(),
        })?;
        options.validate()?;
        Ok(options)
    }

    /// 校验取值范围：连接超时必须为正，与参数键 `spark.connect_timeout_ms` 的约束一致。
    pub fn validate(&self) -> Result<()> {
        if self.connect_timeout_ms == 0 {
            return Err(ChannelError::InvalidConfiguration {
                detail: "connect_timeout_ms must be positive".to_owned(),
            });
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_timeout_reporting(mut self, reporting: TimeoutReporting) -> Self {
        self.timeout_reporting = reporting;
        self
    }
}
