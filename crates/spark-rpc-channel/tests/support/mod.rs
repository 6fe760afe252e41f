//! 集成测试共用的脚本化原生后端。
//!
//! - `Probe` 记录工厂与原生通道收到的每一次调用，测试可随时断言计数；
//! - 状态由测试经 [`Probe::set_state`] 手动驱动，不涉及真实 I/O，跃迁顺序完全确定。
#![allow(dead_code)]

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use parking_lot::Mutex;
use spark_rpc_channel::{
    ChannelArgs, ChannelBuilder, ChannelError, CompletionSink, ConnectivityState, Deadline,
    NativeCredentials, Result,
    native::{ConnectivityCell, NativeChannel, NativeChannelFactory},
};
use tokio::runtime::Handle;

#[derive(Debug, Default)]
pub struct Probe {
    shutdowns: AtomicUsize,
    nudges: AtomicUsize,
    secure: Mutex<Option<bool>>,
    args: Mutex<Option<ChannelArgs>>,
    cell: Mutex<Option<Arc<ConnectivityCell>>>,
}

impl Probe {
    pub fn shutdowns(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }

    pub fn nudges(&self) -> usize {
        self.nudges.load(Ordering::SeqCst)
    }

    /// 工厂走过的路径：`None` 表示尚未被调用。
    pub fn secure(&self) -> Option<bool> {
        *self.secure.lock()
    }

    pub fn args(&self) -> Option<ChannelArgs> {
        self.args.lock().clone()
    }

    pub fn set_state(&self, next: ConnectivityState) -> bool {
        self.cell
            .lock()
            .as_ref()
            .is_some_and(|cell| cell.set(next))
    }
}

/// 可选地以给定错误拒绝创建的脚本化工厂。
#[derive(Debug)]
pub struct ScriptedFactory {
    probe: Arc<Probe>,
    failure: Option<ChannelError>,
}

impl ScriptedFactory {
    pub fn new(probe: Arc<Probe>) -> Self {
        Self {
            probe,
            failure: None,
        }
    }

    pub fn failing(probe: Arc<Probe>, failure: ChannelError) -> Self {
        Self {
            probe,
            failure: Some(failure),
        }
    }

    fn create(&self, secure: bool, target: &str, args: &ChannelArgs) -> Result<Box<dyn NativeChannel>> {
        *self.probe.secure.lock() = Some(secure);
        *self.probe.args.lock() = Some(args.clone());
        if let Some(failure) = &self.failure {
            return Err(failure.clone());
        }
        let cell = Arc::new(ConnectivityCell::new(ConnectivityState::Idle));
        *self.probe.cell.lock() = Some(Arc::clone(&cell));
        Ok(Box::new(ScriptedChannel {
            target: target.to_owned(),
            cell,
            probe: Arc::clone(&self.probe),
        }))
    }
}

impl NativeChannelFactory for ScriptedFactory {
    fn create_insecure(&self, target: &str, args: &ChannelArgs) -> Result<Box<dyn NativeChannel>> {
        self.create(false, target, args)
    }

    fn create_secure(
        &self,
        _credentials: &NativeCredentials,
        target: &str,
        args: &ChannelArgs,
    ) -> Result<Box<dyn NativeChannel>> {
        self.create(true, target, args)
    }
}

#[derive(Debug)]
struct ScriptedChannel {
    target: String,
    cell: Arc<ConnectivityCell>,
    probe: Arc<Probe>,
}

impl NativeChannel for ScriptedChannel {
    fn target(&self) -> String {
        self.target.clone()
    }

    fn check_connectivity_state(&self, try_to_connect: bool) -> ConnectivityState {
        if try_to_connect {
            self.probe.nudges.fetch_add(1, Ordering::SeqCst);
        }
        self.cell.get()
    }

    fn watch_connectivity_state(
        &self,
        runtime: &Handle,
        last_observed: ConnectivityState,
        deadline: Deadline,
        sink: CompletionSink,
    ) {
        self.cell.watch(runtime, last_observed, deadline, sink);
    }

    fn shutdown(&self) {
        self.probe.shutdowns.fetch_add(1, Ordering::SeqCst);
        self.cell.shutdown();
    }
}

/// 注入脚本化工厂与独立完成队列的构造器。
pub fn scripted_builder(target: &str, probe: &Arc<Probe>) -> ChannelBuilder {
    ChannelBuilder::new(target)
        .factory(Arc::new(ScriptedFactory::new(Arc::clone(probe))))
        .completion_queue(spark_rpc_channel::CompletionQueue::new())
}
