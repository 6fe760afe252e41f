//! # 连通性观测（Connectivity Watcher）
//!
//! ## 核心意图（Why）
//! - 提供“当状态离开 `last_observed` 或截止时间到达时通知我”的异步请求，调用线程注册后立即返回；
//! - 以单次槽位的 [`WatchRequest`] 替代“回调 + 不透明标签”的松散关联，由完成队列按标签取回并
//!   恰好调用一次。
//!
//! ## 行为契约（What）
//! - 注册前完成全部校验：运行时可用、通道未关闭；任何失败都同步返回且不触碰原生层；
//! - 注册顺序：完成队列登记请求 → 原生层挂载观测 → 推进完成队列一步；
//! - 解析由完成队列执行：成功时送达 [`WatchOutcome`]，仅内部/传输故障送达错误；
//! - 截止时间到达属于正常结局，按 [`TimeoutReporting`] 选择上报形态。
//!
//! ## 风险提示（Trade-offs）
//! - 不提供显式取消，截止时间是请求唯一的上界；`Deadline::Infinite` 的请求只会在状态变化或
//!   完成队列关闭时解析。

use core::{
    fmt,
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use tokio::{runtime::Handle, sync::oneshot};
use tracing::{debug, trace};

use crate::{
    completion_queue::CompletionQueue,
    config::TimeoutReporting,
    connectivity::ConnectivityState,
    deadline::Deadline,
    error::{ChannelError, Result},
    native::NativeChannel,
};

/// 观测请求的成功结局。
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum WatchOutcome {
    /// 状态已离开上次观测值，携带新状态。
    Changed(ConnectivityState),
    /// 截止时间到达时状态仍未变化，携带当前状态。
    DeadlineExceeded(ConnectivityState),
}

impl WatchOutcome {
    pub fn state(&self) -> ConnectivityState {
        match *self {
            WatchOutcome::Changed(state) | WatchOutcome::DeadlineExceeded(state) => state,
        }
    }

    pub fn is_deadline_exceeded(&self) -> bool {
        matches!(self, WatchOutcome::DeadlineExceeded(_))
    }
}

/// 观测回调：只能被调用一次。
pub type WatchCallback = Box<dyn FnOnce(Result<WatchOutcome>) + Send + 'static>;

/// 单次观测请求。
///
/// # 教案式说明
/// - **意图 (Why)**：把回调与其解析策略绑定在一起，登记到完成队列后由队列独占持有；
/// - **契约 (What)**：[`resolve`](Self::resolve) 按值消费请求，类型系统保证回调至多调用一次；
///   完成队列保证每个已登记请求最终被解析（状态变化、截止、关闭三者之一）。
pub struct WatchRequest {
    last_observed: ConnectivityState,
    deadline: Deadline,
    reporting: TimeoutReporting,
    callback: WatchCallback,
}

impl WatchRequest {
    pub fn new(
        last_observed: ConnectivityState,
        deadline: Deadline,
        reporting: TimeoutReporting,
        callback: WatchCallback,
    ) -> Self {
        Self {
            last_observed,
            deadline,
            reporting,
            callback,
        }
    }

    pub fn last_observed(&self) -> ConnectivityState {
        self.last_observed
    }

    pub fn deadline(&self) -> Deadline {
        self.deadline
    }

    /// 以最终结果解析请求并调用回调。
    pub fn resolve(self, result: Result<WatchOutcome>) {
        let result = result.map(|outcome| match (self.reporting, outcome) {
            (TimeoutReporting::SameState, WatchOutcome::DeadlineExceeded(state)) => {
                WatchOutcome::Changed(state)
            }
            (_, outcome) => outcome,
        });
        trace!(last_observed = %self.last_observed, ?result, "resolving connectivity watch");
        (self.callback)(result);
    }
}

impl fmt::Debug for WatchRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchRequest")
            .field("last_observed", &self.last_observed)
            .field("deadline", &self.deadline)
            .field("reporting", &self.reporting)
            .finish_non_exhaustive()
    }
}

/// 以 Future 形式等待观测结果。
///
/// 内部以 `oneshot` 通道包装回调；若请求在送达前被丢弃（完成队列已销毁），
/// 返回 [`ChannelError::QueueShutdown`]。
#[derive(Debug)]
#[must_use = "futures do nothing unless polled"]
pub struct WatchFuture {
    receiver: oneshot::Receiver<Result<WatchOutcome>>,
}

impl WatchFuture {
    pub(crate) fn channel() -> (WatchCallback, Self) {
        let (sender, receiver) = oneshot::channel();
        let callback: WatchCallback = Box::new(move |result| {
            // 接收端已放弃等待时结果无人消费，直接丢弃。
            let _ = sender.send(result);
        });
        (callback, Self { receiver })
    }
}

impl Future for WatchFuture {
    type Output = Result<WatchOutcome>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(ChannelError::QueueShutdown)))
    }
}

/// 获取当前异步运行时句柄，观测注册前调用。
pub(crate) fn current_runtime() -> Result<Handle> {
    Handle::try_current().map_err(|err| ChannelError::NoRuntime {
        detail: err.to_string(),
    })
}

/// 在原生通道上注册一次观测。
///
/// # 教案式注释
/// - **前置条件**：调用方持有通道槽位锁并已确认原生句柄存在，`runtime` 来自
///   [`current_runtime`]；
/// - **后置条件**：返回 `Ok` 时请求已登记且完成队列已推进一步，回调将在稍后恰好调用一次；
///   返回 `Err` 时回调未登记、永不调用。
pub(crate) fn register_watch(
    native: &dyn NativeChannel,
    queue: &CompletionQueue,
    runtime: &Handle,
    request: WatchRequest,
) -> Result<()> {
    let last_observed = request.last_observed();
    let deadline = request.deadline();
    let sink = queue.register(request)?;
    let tag = sink.tag();
    native.watch_connectivity_state(runtime, last_observed, deadline, sink);
    queue.advance_on(runtime, tag);
    debug!(
        tag = tag.get(),
        last_observed = %last_observed,
        remaining = ?deadline.remaining(),
        "connectivity watch registered"
    );
    Ok(())
}
