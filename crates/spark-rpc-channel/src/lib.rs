//! # spark-rpc-channel
//!
//! ## 设计动机（Why）
//! - 为动态类型宿主提供客户端 RPC 通道的管理面：按目标、凭据与参数表创建原生通道，
//!   读取目标与连通性状态，并以异步回调观测状态变化；
//! - 线协议、名称解析与握手留给原生实现，本 crate 只负责生命周期、参数编组与完成事件分发。
//!
//! ## 模块划分（What）
//! - [`args`]：宿主参数表 → 有序、带类型标签的参数列表；
//! - [`channel`]：通道句柄与构造器，独占持有原生通道；
//! - [`watcher`] 与 [`completion_queue`]：单次观测请求及其完成分发；
//! - [`native`]：原生通道接缝与默认的 TCP 实现；
//! - [`host`] 与 [`value`]：动态类型调用面；
//! - [`config`]、[`telemetry`]：选项加载与日志订阅器装配。
//!
//! ## 使用方式（How）
//! ```no_run
//! use spark_rpc_channel::{Channel, ConnectivityState, Deadline, WatchOutcome};
//! use std::time::Duration;
//!
//! # async fn demo() -> spark_rpc_channel::Result<()> {
//! let channel = Channel::new("localhost:50051", None, None)?;
//! let state = channel.connectivity_state(true)?;
//! let outcome = channel
//!     .watch_connectivity_state_async(state, Deadline::after(Duration::from_secs(5)))?
//!     .await?;
//! if let WatchOutcome::Changed(next) = outcome {
//!     assert_ne!(next, ConnectivityState::Idle);
//! }
//! channel.close();
//! # Ok(())
//! # }
//! ```

pub mod args;
pub mod channel;
pub mod completion_queue;
pub mod config;
pub mod connectivity;
pub mod credentials;
pub mod deadline;
pub mod error;
pub mod host;
pub mod native;
pub mod telemetry;
pub mod value;
pub mod watcher;

pub use args::{ArgType, ArgValue, ChannelArg, ChannelArgs};
pub use channel::{Channel, ChannelBuilder, ChannelSecurity};
pub use completion_queue::{CompletionQueue, CompletionSink, Tag};
pub use config::{ChannelOptions, TimeoutReporting};
pub use connectivity::ConnectivityState;
pub use credentials::{ChannelCredentials, InsecureCredentials, NativeCredentials, SslCredentials};
pub use deadline::Deadline;
pub use error::{ChannelError, ErrorCategory, Result};
pub use value::{ConfigMap, HostFunction, HostValue};
pub use watcher::{WatchCallback, WatchFuture, WatchOutcome, WatchRequest};
