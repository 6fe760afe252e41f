use std::future::pending;

use tokio::{runtime::Handle, sync::watch, time::Instant as TokioInstant};

use crate::{
    completion_queue::CompletionSink,
    connectivity::ConnectivityState,
    deadline::Deadline,
    error::{ChannelError, Result},
    watcher::WatchOutcome,
};

/// 连通性状态单元。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 原生实现普遍需要“保存当前状态 + 通知等待者”，以 `watch` 通道承载可避免每个观测请求各自轮询；
/// - `Shutdown` 为终态的约束集中在此处执行，实现方无需重复判断。
///
/// ## 契约 (What)
/// - `set`：写入新状态，终态之后或与当前值相同时返回 `false` 且不通知；
/// - `transition`：仅当当前状态满足谓词时写入，作为“检查并设置”的原子操作；
/// - `shutdown`：强制进入 `Shutdown`，唤醒全部观测；
/// - `watch`：在运行时上挂载观测任务，状态离开 `last_observed` 时以 `Changed` 完成，
///   截止时间先到则以 `DeadlineExceeded` 完成。已过期的截止时间仍会先检查一次状态。
///
/// ## 注意事项 (Trade-offs)
/// - 观测任务只关心最新值：一次观测期间的多次跃迁会被合并，回调看到的是解析时刻的状态。
#[derive(Debug)]
pub struct ConnectivityCell {
    sender: watch::Sender<ConnectivityState>,
}

impl ConnectivityCell {
    pub fn new(initial: ConnectivityState) -> Self {
        let (sender, _receiver) = watch::channel(initial);
        Self { sender }
    }

    pub fn get(&self) -> ConnectivityState {
        *self.sender.borrow()
    }

    pub fn set(&self, next: ConnectivityState) -> bool {
        self.transition(|_| true, next)
    }

    pub fn transition(
        &self,
        allowed: impl FnOnce(ConnectivityState) -> bool,
        next: ConnectivityState,
    ) -> bool {
        self.sender.send_if_modified(|current| {
            if current.is_terminal() || *current == next || !allowed(*current) {
                return false;
            }
            *current = next;
            true
        })
    }

    pub fn shutdown(&self) -> bool {
        self.set(ConnectivityState::Shutdown)
    }

    pub fn watch(
        &self,
        runtime: &Handle,
        last_observed: ConnectivityState,
        deadline: Deadline,
        sink: CompletionSink,
    ) {
        let receiver = self.sender.subscribe();
        runtime.spawn(async move {
            let result = wait_for_change(receiver, last_observed, deadline).await;
            sink.complete(result);
        });
    }
}

async fn wait_for_change(
    mut receiver: watch::Receiver<ConnectivityState>,
    last_observed: ConnectivityState,
    deadline: Deadline,
) -> Result<WatchOutcome> {
    let Some(at) = deadline.instant() else {
        return changed_from(&mut receiver, last_observed, deadline).await;
    };
    let at = TokioInstant::from_std(at);
    let waited =
        tokio::time::timeout_at(at, changed_from(&mut receiver, last_observed, deadline)).await;
    match waited {
        Ok(result) => result,
        Err(_elapsed) => Ok(WatchOutcome::DeadlineExceeded(*receiver.borrow())),
    }
}

async fn changed_from(
    receiver: &mut watch::Receiver<ConnectivityState>,
    last_observed: ConnectivityState,
    deadline: Deadline,
) -> Result<WatchOutcome> {
    loop {
        let current = *receiver.borrow_and_update();
        if current != last_observed {
            return Ok(WatchOutcome::Changed(current));
        }
        if receiver.changed().await.is_err() {
            // 状态源已销毁且状态未变：有限截止时间交由超时解析，无限截止时间视为内部故障。
            if deadline.instant().is_some() {
                pending::<()>().await;
            }
            return Err(ChannelError::internal(
                "connectivity state source dropped while watching",
            ));
        }
    }
}
