//! # 原生通道接缝
//!
//! ## 角色定位（Why）
//! - 通道句柄只管理“恰好一个原生通道”的生命周期；线协议、解析、握手等属于原生实现；
//! - [`NativeChannelFactory`] 负责按安全与否创建原生通道，[`NativeChannel`] 暴露通道句柄所需的
//!   最小能力：目标、状态探测、状态观测与关闭。
//!
//! ## 内置实现（What）
//! - [`ConnectivityCell`]：基于 `tokio::sync::watch` 的状态单元，封装状态跃迁约束与观测等待逻辑，
//!   自定义原生实现可直接复用；
//! - [`TcpChannelFactory`]：以 Tokio TCP 建连驱动状态机的默认实现。

mod state;
mod tcp;

pub use state::ConnectivityCell;
pub use tcp::{
    ARG_CONNECT_TIMEOUT_MS, ARG_DEFAULT_AUTHORITY, ARG_PRIMARY_USER_AGENT,
    ARG_SSL_TARGET_NAME_OVERRIDE, Endpoint, TcpChannelFactory,
};

use core::fmt;

use tokio::runtime::Handle;

use crate::{
    args::ChannelArgs,
    completion_queue::CompletionSink,
    connectivity::ConnectivityState,
    credentials::NativeCredentials,
    deadline::Deadline,
    error::Result,
};

/// 原生通道能力。
///
/// # 教案式说明
/// - **契约 (What)**：
///   - `target`：创建时的目标文本；
///   - `check_connectivity_state`：同步、非阻塞地返回当前状态；`try_to_connect` 为真且通道空闲或
///     失败时额外发起一次连接尝试，返回值为发起前的状态；
///   - `watch_connectivity_state`：在 `runtime` 上挂载观测，状态离开 `last_observed` 或截止时间
///     到达时通过 `sink` 恰好完成一次；
///   - `shutdown`：由通道句柄在关闭时恰好调用一次，之后状态固定为 `Shutdown`，未决观测随之解析；
///     实现不应在析构中再次调用，句柄的“取出并清空”已覆盖析构路径。
/// - **前置条件**：所有方法都不得阻塞调用线程。
pub trait NativeChannel: Send + Sync + fmt::Debug {
    fn target(&self) -> String;

    fn check_connectivity_state(&self, try_to_connect: bool) -> ConnectivityState;

    fn watch_connectivity_state(
        &self,
        runtime: &Handle,
        last_observed: ConnectivityState,
        deadline: Deadline,
        sink: CompletionSink,
    );

    fn shutdown(&self);
}

/// 原生通道工厂。
///
/// - **契约 (What)**：`args` 仅在调用期间有效，实现需复制所需内容；失败时返回
///   [`ChannelError::NativeCreation`](crate::error::ChannelError::NativeCreation)。
pub trait NativeChannelFactory: Send + Sync + fmt::Debug {
    fn create_insecure(&self, target: &str, args: &ChannelArgs) -> Result<Box<dyn NativeChannel>>;

    fn create_secure(
        &self,
        credentials: &NativeCredentials,
        target: &str,
        args: &ChannelArgs,
    ) -> Result<Box<dyn NativeChannel>>;
}
