//! # CompletionQueue：完成队列
//!
//! ## 核心意图（Why）
//! - 承担“原生异步操作完成 → 找到登记的请求 → 调用回调”的事件分发职责，是进程级共享资源；
//! - 通道从不自行构造该资源之外的调度设施，只持有注入的队列句柄（默认 [`CompletionQueue::global`]）。
//!
//! ## 行为契约（What）
//! - [`register`](CompletionQueue::register)：以新标签登记单次请求，返回只能完成一次的 [`CompletionSink`]；
//! - [`advance`](CompletionQueue::advance)：在当前运行时上为指定标签调度一步分发：等待该标签的完成事件，
//!   移除请求并调用；
//! - 每个登记请求恰好解析一次：原生侧完成、原生侧未完成即丢弃 sink（内部错误）、分发步骤所在运行时
//!   先行关闭（内部错误），或队列关闭（[`ChannelError::QueueShutdown`]）；
//! - 请求已解析后才到达的完成事件记录告警后丢弃。
//!
//! ## 风险提示（Trade-offs）
//! - 每个标签拥有独立的完成槽位与分发步骤，某个运行时的关闭只影响在其上调度的请求；
//! - 回调在分发任务中执行，阻塞回调会占用运行时工作线程。

use core::fmt;
use std::{
    collections::HashMap,
    sync::{
        Arc, OnceLock,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};

use parking_lot::Mutex;
use tokio::{runtime::Handle, sync::oneshot};
use tracing::{debug, warn};

use crate::{
    error::{ChannelError, Result},
    watcher::{WatchOutcome, WatchRequest, current_runtime},
};

/// 完成队列上的不透明关联标签。
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Tag(u64);

impl Tag {
    pub fn get(self) -> u64 {
        self.0
    }
}

type CompletionSlot = oneshot::Sender<Result<WatchOutcome>>;

/// 原生侧持有的单次完成凭证。
///
/// # 教案式说明
/// - **意图 (Why)**：原生观测任务结束时通过它把结果投递回完成队列；
/// - **契约 (What)**：[`complete`](Self::complete) 按值消费；若未调用就被丢弃，
///   自动投递 [`ChannelError::Internal`]，保证登记的请求不会悬挂。
pub struct CompletionSink {
    tag: Tag,
    slot: Option<CompletionSlot>,
}

impl CompletionSink {
    pub fn tag(&self) -> Tag {
        self.tag
    }

    pub fn complete(mut self, result: Result<WatchOutcome>) {
        self.deliver(result);
    }

    fn deliver(&mut self, result: Result<WatchOutcome>) {
        let Some(slot) = self.slot.take() else {
            return;
        };
        if slot.send(result).is_err() {
            debug!(tag = self.tag.get(), "completion slot closed, dropping completion");
        }
    }
}

impl Drop for CompletionSink {
    fn drop(&mut self) {
        if self.slot.is_some() {
            warn!(tag = self.tag.get(), "native watch dropped without completing");
            self.deliver(Err(ChannelError::internal(
                "native watch dropped without completing",
            )));
        }
    }
}

impl fmt::Debug for CompletionSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionSink")
            .field("tag", &self.tag)
            .field("completed", &self.slot.is_none())
            .finish()
    }
}

struct QueueInner {
    pending: Mutex<HashMap<Tag, WatchRequest>>,
    slots: Mutex<HashMap<Tag, oneshot::Receiver<Result<WatchOutcome>>>>,
    next_tag: AtomicU64,
    closed: AtomicBool,
}

impl QueueInner {
    fn finish(&self, tag: Tag, result: Result<WatchOutcome>) {
        let request = self.pending.lock().remove(&tag);
        match request {
            Some(request) => {
                debug!(tag = tag.get(), "dispatching completion");
                request.resolve(result);
            }
            None => warn!(tag = tag.get(), "completion for resolved tag dropped"),
        }
    }

    fn drain_pending(&self) -> Vec<WatchRequest> {
        self.slots.lock().clear();
        self.pending.lock().drain().map(|(_, request)| request).collect()
    }
}

impl Drop for QueueInner {
    fn drop(&mut self) {
        for request in self.drain_pending() {
            request.resolve(Err(ChannelError::QueueShutdown));
        }
    }
}

/// 分发步骤在收到完成事件前被丢弃（所在运行时关闭）时，以内部错误解析请求。
///
/// 步骤在派生前同步创建，任务即使从未被轮询就随运行时丢弃，也会经由析构解析请求。
struct DispatchStep {
    inner: Arc<QueueInner>,
    tag: Tag,
    armed: bool,
}

impl DispatchStep {
    async fn run(mut self, slot: oneshot::Receiver<Result<WatchOutcome>>) {
        let result = slot.await.unwrap_or_else(|_| {
            Err(ChannelError::internal(
                "native watch dropped without completing",
            ))
        });
        self.armed = false;
        self.inner.finish(self.tag, result);
    }
}

impl Drop for DispatchStep {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let request = self.inner.pending.lock().remove(&self.tag);
        if let Some(request) = request {
            warn!(tag = self.tag.get(), "dispatch step dropped before completion");
            request.resolve(Err(ChannelError::internal(
                "dispatch runtime shut down before the watch completed",
            )));
        }
    }
}

/// 完成队列句柄，克隆后共享同一队列。
#[derive(Clone)]
pub struct CompletionQueue {
    inner: Arc<QueueInner>,
}

impl CompletionQueue {
    /// 创建独立的队列实例，通常仅用于测试或隔离的宿主。
    pub fn new() -> Self {
        Self {
            inner: Arc::new(QueueInner {
                pending: Mutex::new(HashMap::new()),
                slots: Mutex::new(HashMap::new()),
                next_tag: AtomicU64::new(1),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// 进程级共享实例，首次访问时创建。
    pub fn global() -> &'static CompletionQueue {
        static GLOBAL: OnceLock<CompletionQueue> = OnceLock::new();
        GLOBAL.get_or_init(CompletionQueue::new)
    }

    /// 登记单次请求。
    ///
    /// # 契约（What）
    /// - 成功时请求由队列独占持有，返回的 sink 交给原生侧；
    /// - 队列已关闭时返回 [`ChannelError::QueueShutdown`]，请求随之丢弃且回调不会被调用。
    pub fn register(&self, request: WatchRequest) -> Result<CompletionSink> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(ChannelError::QueueShutdown);
        }
        let tag = Tag(self.inner.next_tag.fetch_add(1, Ordering::Relaxed));
        let (slot, receiver) = oneshot::channel();
        self.inner.pending.lock().insert(tag, request);
        self.inner.slots.lock().insert(tag, receiver);
        Ok(CompletionSink {
            tag,
            slot: Some(slot),
        })
    }

    /// 在当前运行时上为 `tag` 推进一步分发。
    pub fn advance(&self, tag: Tag) -> Result<()> {
        let runtime = current_runtime()?;
        self.advance_on(&runtime, tag);
        Ok(())
    }

    pub(crate) fn advance_on(&self, runtime: &Handle, tag: Tag) {
        let slot = self.inner.slots.lock().remove(&tag);
        let Some(slot) = slot else {
            warn!(tag = tag.get(), "no completion slot for tag, dispatch skipped");
            return;
        };
        let step = DispatchStep {
            inner: Arc::clone(&self.inner),
            tag,
            armed: true,
        };
        runtime.spawn(step.run(slot));
    }

    /// 关闭队列：拒绝新的登记，并以 [`ChannelError::QueueShutdown`] 解析所有未决请求。
    pub fn shutdown(&self) {
        self.inner.closed.store(true, Ordering::Release);
        let drained = self.inner.drain_pending();
        if !drained.is_empty() {
            debug!(count = drained.len(), "resolving pending requests on shutdown");
        }
        for request in drained {
            request.resolve(Err(ChannelError::QueueShutdown));
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// 尚未解析的请求数量。
    pub fn pending_len(&self) -> usize {
        self.inner.pending.lock().len()
    }
}

impl Default for CompletionQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CompletionQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionQueue")
            .field("pending", &self.pending_len())
            .field("closed", &self.is_shutdown())
            .finish()
    }
}
