//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 为通道构造、连通性读取与观测注册提供集中定义的错误语义；
//! - 每个变体附带稳定错误码（`spark.rpc.channel.*`）与处置分类，便于日志与告警按码聚合。
//!
//! ## 设计要求（What）
//! - 输入校验类错误在调用边界同步返回，绝不部分生效；
//! - 异步解析阶段的错误只经由观测回调的错误槽位送达，不会同步抛出；
//! - `close` 永不失败，因此不存在对应变体。

use thiserror::Error;

/// 错误的主要处置策略。
///
/// - **意图 (Why)**：让调用方无需解析错误码即可区分“修正输入”“通道已关闭”“资源/运行时故障”；
/// - **契约 (What)**：由 [`ChannelError::category`] 给出，与错误码一一对应，不随上下文变化。
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ErrorCategory {
    /// 调用方传入了错误种类或取值的参数，修正输入后可重试。
    InvalidInput,
    /// 通道已经关闭，后续状态读取或观测均不可用。
    Closed,
    /// 原生资源或运行时不可用。
    Resource,
    /// 内部或传输故障，仅出现在异步解析路径。
    Internal,
}

/// 通道管理核心错误域。
///
/// # 教案式说明
/// - **意图 (Why)**：聚合构造、读取与观测三条路径上的失败，统一暴露 `thiserror` 风格的诊断信息；
/// - **契约 (What)**：
///   - 所有变体均为 `Send + Sync + 'static`，可随回调跨线程传递；
///   - [`code`](Self::code) 返回稳定错误码，[`category`](Self::category) 返回处置分类；
/// - **设计权衡 (Trade-offs)**：使用 `String` 携带上下文，牺牲少量分配换取可读性；
///   错误路径不在热点上。
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum ChannelError {
    /// 参数种类错误：目标不是文本、参数表不是对象、观测参数无法解释等。
    #[error("invalid argument type: {detail}")]
    InvalidArgumentType { detail: String },

    /// 凭据参数既不是凭据对象也不是缺省值。
    #[error("invalid credentials: {detail}")]
    InvalidCredentialsType { detail: String },

    /// 参数表中的某个取值既不是 32 位整数也不是文本。
    ///
    /// - **契约 (What)**：`key` 为第一个非法条目的键，`kind` 为其实际取值种类；
    ///   出现该错误时不会有任何已编组条目逃逸。
    #[error("channel argument `{key}` must be a 32-bit integer or a string, got {kind}")]
    InvalidArgumentValue { key: String, kind: &'static str },

    /// 配置文本无法解析为 [`ChannelOptions`](crate::config::ChannelOptions)。
    #[error("invalid channel configuration: {detail}")]
    InvalidConfiguration { detail: String },

    /// 原生通道创建失败，构造调用整体失败且无通道对象返回。
    #[error("failed to create native channel for `{target}`: {detail}")]
    NativeCreation { target: String, detail: String },

    /// 在已关闭的通道上读取目标、状态或注册观测。
    #[error("channel has already been closed")]
    ChannelClosed,

    /// 当前线程不处于异步运行时上下文，无法注册异步观测。
    #[error("no async runtime available: {detail}")]
    NoRuntime { detail: String },

    /// 完成队列在请求解析之前已关闭。
    #[error("completion queue shut down before the request resolved")]
    QueueShutdown,

    /// 内部或传输故障。
    #[error("internal channel failure: {detail}")]
    Internal { detail: String },
}

impl ChannelError {
    pub(crate) fn invalid_type(detail: impl Into<String>) -> Self {
        ChannelError::InvalidArgumentType {
            detail: detail.into(),
        }
    }

    pub(crate) fn internal(detail: impl Into<String>) -> Self {
        ChannelError::Internal {
            detail: detail.into(),
        }
    }

    /// 稳定错误码，遵循 `<域>.<语义>` 命名。
    pub fn code(&self) -> &'static str {
        match self {
            ChannelError::InvalidArgumentType { .. } => "spark.rpc.channel.invalid_argument_type",
            ChannelError::InvalidCredentialsType { .. } => {
                "spark.rpc.channel.invalid_credentials_type"
            }
            ChannelError::InvalidArgumentValue { .. } => {
                "spark.rpc.channel.invalid_argument_value"
            }
            ChannelError::InvalidConfiguration { .. } => "spark.rpc.channel.invalid_configuration",
            ChannelError::NativeCreation { .. } => "spark.rpc.channel.native_creation_failed",
            ChannelError::ChannelClosed => "spark.rpc.channel.closed",
            ChannelError::NoRuntime { .. } => "spark.rpc.channel.no_runtime",
            ChannelError::QueueShutdown => "spark.rpc.channel.queue_shutdown",
            ChannelError::Internal { .. } => "spark.rpc.channel.internal",
        }
    }

    /// 错误的处置分类。
    pub fn category(&self) -> ErrorCategory {
        match self {
            ChannelError::InvalidArgumentType { .. }
            | ChannelError::InvalidCredentialsType { .. }
            | ChannelError::InvalidArgumentValue { .. }
            | ChannelError::InvalidConfiguration { .. } => ErrorCategory::InvalidInput,
            ChannelError::ChannelClosed => ErrorCategory::Closed,
            ChannelError::NativeCreation { .. } | ChannelError::NoRuntime { .. } => {
                ErrorCategory::Resource
            }
            ChannelError::QueueShutdown | ChannelError::Internal { .. } => ErrorCategory::Internal,
        }
    }
}

/// crate 内统一的结果别名。
pub type Result<T, E = ChannelError> = core::result::Result<T, E>;
