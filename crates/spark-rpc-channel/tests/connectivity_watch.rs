//! 连通性观测的集成测试：状态变化、截止时间、关闭与完成队列关闭四种结局，每个请求恰好解析一次。

mod support;

use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::{Duration, Instant, SystemTime},
};

use spark_rpc_channel::{
    ChannelError, ChannelOptions, ConnectivityState, Deadline, HostFunction, Result,
    TimeoutReporting, WatchOutcome, host, value::HostValue,
};
use support::{Probe, scripted_builder};
use tokio::sync::oneshot;

const RESOLVE_WITHIN: Duration = Duration::from_secs(2);

fn counted_callback(
    calls: &Arc<AtomicUsize>,
) -> (
    impl FnOnce(Result<WatchOutcome>) + Send + 'static,
    oneshot::Receiver<Result<WatchOutcome>>,
) {
    let (tx, rx) = oneshot::channel();
    let calls = Arc::clone(calls);
    let callback = move |result: Result<WatchOutcome>| {
        calls.fetch_add(1, Ordering::SeqCst);
        let _ = tx.send(result);
    };
    (callback, rx)
}

async fn resolved(rx: oneshot::Receiver<Result<WatchOutcome>>) -> Result<WatchOutcome> {
    tokio::time::timeout(RESOLVE_WITHIN, rx)
        .await
        .expect("观测应在期限内解析")
        .expect("回调已执行")
}

/// 让迟到的完成事件有机会被分发，用于断言“没有第二次调用”。
async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn state_change_resolves_exactly_once() {
    let probe = Arc::new(Probe::default());
    let channel = scripted_builder("localhost:50051", &probe)
        .build()
        .expect("构造成功");
    let calls = Arc::new(AtomicUsize::new(0));
    let (callback, rx) = counted_callback(&calls);

    channel
        .watch_connectivity_state(ConnectivityState::Idle, Deadline::Infinite, callback)
        .expect("注册成功");
    assert!(probe.set_state(ConnectivityState::Connecting));
    assert!(probe.set_state(ConnectivityState::Ready));

    let outcome = resolved(rx).await.expect("正常结局");
    assert!(matches!(outcome, WatchOutcome::Changed(state) if state != ConnectivityState::Idle));
    settle().await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(channel.completion_queue().pending_len(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn already_diverged_state_resolves_immediately() {
    let probe = Arc::new(Probe::default());
    let channel = scripted_builder("localhost:50051", &probe)
        .build()
        .expect("构造成功");
    probe.set_state(ConnectivityState::TransientFailure);

    let outcome = channel
        .watch_connectivity_state_async(ConnectivityState::Idle, Deadline::Infinite)
        .expect("注册成功")
        .await;
    assert_eq!(
        outcome,
        Ok(WatchOutcome::Changed(ConnectivityState::TransientFailure))
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn past_deadline_reports_distinct_marker_by_default() {
    let probe = Arc::new(Probe::default());
    let channel = scripted_builder("localhost:50051", &probe)
        .build()
        .expect("构造成功");
    let calls = Arc::new(AtomicUsize::new(0));
    let (callback, rx) = counted_callback(&calls);

    channel
        .watch_connectivity_state(
            ConnectivityState::Idle,
            Deadline::from_system_time(SystemTime::UNIX_EPOCH),
            callback,
        )
        .expect("注册成功");

    assert_eq!(
        resolved(rx).await,
        Ok(WatchOutcome::DeadlineExceeded(ConnectivityState::Idle))
    );
    settle().await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn same_state_reporting_folds_deadline_into_changed() {
    let probe = Arc::new(Probe::default());
    let channel = scripted_builder("localhost:50051", &probe)
        .options(ChannelOptions::default().with_timeout_reporting(TimeoutReporting::SameState))
        .build()
        .expect("构造成功");

    let outcome = channel
        .watch_connectivity_state_async(
            ConnectivityState::Idle,
            Deadline::after(Duration::from_millis(20)),
        )
        .expect("注册成功")
        .await;
    assert_eq!(outcome, Ok(WatchOutcome::Changed(ConnectivityState::Idle)));
}

#[tokio::test(flavor = "multi_thread")]
async fn closing_resolves_outstanding_watches_with_shutdown() {
    let probe = Arc::new(Probe::default());
    let channel = scripted_builder("localhost:50051", &probe)
        .build()
        .expect("构造成功");
    let calls = Arc::new(AtomicUsize::new(0));
    let receivers: Vec<_> = (0..3)
        .map(|_| {
            let (callback, rx) = counted_callback(&calls);
            channel
                .watch_connectivity_state(ConnectivityState::Idle, Deadline::Infinite, callback)
                .expect("注册成功");
            rx
        })
        .collect();

    channel.close();
    for rx in receivers {
        assert_eq!(
            resolved(rx).await,
            Ok(WatchOutcome::Changed(ConnectivityState::Shutdown))
        );
    }
    settle().await;
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(probe.shutdowns(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn queue_shutdown_resolves_pending_once() {
    let probe = Arc::new(Probe::default());
    let channel = scripted_builder("localhost:50051", &probe)
        .build()
        .expect("构造成功");
    let calls = Arc::new(AtomicUsize::new(0));
    let (callback, rx) = counted_callback(&calls);
    channel
        .watch_connectivity_state(ConnectivityState::Idle, Deadline::Infinite, callback)
        .expect("注册成功");

    channel.completion_queue().shutdown();
    assert_eq!(resolved(rx).await, Err(ChannelError::QueueShutdown));

    // 原生侧随后完成，标签已不存在，不会二次调用。
    channel.close();
    settle().await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let err = channel.watch_connectivity_state_async(ConnectivityState::Idle, Deadline::Infinite);
    assert_eq!(err.err(), Some(ChannelError::ChannelClosed));
}

#[tokio::test(flavor = "multi_thread")]
async fn independent_watches_each_resolve() {
    let probe = Arc::new(Probe::default());
    let channel = scripted_builder("localhost:50051", &probe)
        .build()
        .expect("构造成功");

    let short = channel
        .watch_connectivity_state_async(
            ConnectivityState::Idle,
            Deadline::from(Instant::now() + Duration::from_millis(10)),
        )
        .expect("注册成功");
    let long = channel
        .watch_connectivity_state_async(ConnectivityState::Idle, Deadline::Infinite)
        .expect("注册成功");

    assert_eq!(
        short.await,
        Ok(WatchOutcome::DeadlineExceeded(ConnectivityState::Idle))
    );
    probe.set_state(ConnectivityState::Connecting);
    assert_eq!(
        long.await,
        Ok(WatchOutcome::Changed(ConnectivityState::Connecting))
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn host_watch_validates_then_registers() {
    let probe = Arc::new(Probe::default());
    let channel = scripted_builder("localhost:50051", &probe)
        .build()
        .expect("构造成功");

    let err = host::watch_connectivity_state(
        &channel,
        &HostValue::Number(0.0),
        &HostValue::Number(0.0),
        &HostValue::from("not callable"),
    )
    .expect_err("回调必须是函数");
    assert!(matches!(err, ChannelError::InvalidArgumentType { .. }));
    assert_eq!(channel.completion_queue().pending_len(), 0);

    let err = host::watch_connectivity_state(
        &channel,
        &HostValue::Number(9.0),
        &HostValue::Number(0.0),
        &HostValue::Function(HostFunction::new(|_| panic!("不应注册"))),
    )
    .expect_err("未定义的状态码");
    assert!(matches!(err, ChannelError::InvalidArgumentType { .. }));

    let (tx, rx) = oneshot::channel();
    let tx = parking_lot::Mutex::new(Some(tx));
    host::watch_connectivity_state(
        &channel,
        &HostValue::Number(0.0),
        &HostValue::Number(0.0),
        &HostValue::Function(HostFunction::new(move |result| {
            if let Some(tx) = tx.lock().take() {
                let _ = tx.send(result);
            }
        })),
    )
    .expect("注册成功");
    assert_eq!(
        resolved(rx).await,
        Ok(WatchOutcome::DeadlineExceeded(ConnectivityState::Idle))
    );
}

fn single_worker_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()
        .expect("构建运行时")
}

#[test]
fn watch_on_a_dropped_runtime_does_not_block_later_watches() {
    let probe = Arc::new(Probe::default());
    let channel = scripted_builder("localhost:50051", &probe)
        .build()
        .expect("构造成功");
    let calls = Arc::new(AtomicUsize::new(0));

    let first_runtime = single_worker_runtime();
    let (callback, first_rx) = counted_callback(&calls);
    first_runtime.block_on(async {
        channel
            .watch_connectivity_state(ConnectivityState::Idle, Deadline::Infinite, callback)
            .expect("注册成功");
    });
    drop(first_runtime);
    assert!(matches!(
        first_rx.blocking_recv(),
        Ok(Err(ChannelError::Internal { .. }))
    ));

    let second_runtime = single_worker_runtime();
    let outcome = second_runtime.block_on(async {
        let pending = channel
            .watch_connectivity_state_async(
                ConnectivityState::Idle,
                Deadline::after(Duration::ZERO),
            )
            .expect("注册成功");
        tokio::time::timeout(RESOLVE_WITHIN, pending)
            .await
            .expect("后续观测应在期限内解析")
    });
    assert_eq!(
        outcome,
        Ok(WatchOutcome::DeadlineExceeded(ConnectivityState::Idle))
    );
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(channel.completion_queue().pending_len(), 0);
    channel.close();
}
