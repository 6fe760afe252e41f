//! # Channel：通道句柄
//!
//! ## 角色定位（Why）
//! - 独占持有恰好一个原生通道，对外暴露构造、关闭、目标读取、状态读取与状态观测；
//! - 生命周期为 `未初始化 → 打开 → 关闭`，关闭为终态。构造失败时不会产生任何通道对象。
//!
//! ## 行为契约（What）
//! - 构造顺序：参数编组 → 解析凭据 → 按安全与否调用原生工厂；任一步失败整体失败；
//! - [`Channel::close`] 以“取出并清空”完成，重复调用与析构共享同一路径，原生关闭恰好执行一次；
//! - 关闭后 [`Channel::target`]、[`Channel::connectivity_state`] 与观测注册均返回
//!   [`ChannelError::ChannelClosed`]。
//!
//! ## 风险提示（Trade-offs）
//! - 槽位锁在状态读取与观测注册期间持有，原生实现的这两个方法必须非阻塞，否则会拖慢并发的关闭。

use core::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::{
    args::marshal,
    completion_queue::CompletionQueue,
    config::{ChannelOptions, TimeoutReporting},
    connectivity::ConnectivityState,
    credentials::{ChannelCredentials, NativeCredentials},
    deadline::Deadline,
    error::{ChannelError, Result},
    native::{NativeChannel, NativeChannelFactory, TcpChannelFactory},
    value::ConfigMap,
    watcher::{
        WatchCallback, WatchFuture, WatchOutcome, WatchRequest, current_runtime, register_watch,
    },
};

/// 通道构造时选择的传输安全路径。
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ChannelSecurity {
    /// 明文传输：未提供凭据，或凭据声明不需要传输安全。
    Insecure,
    /// TLS 传输。
    Tls {
        custom_roots: bool,
        client_identity: bool,
    },
}

impl ChannelSecurity {
    fn from_native(credentials: &NativeCredentials) -> Self {
        ChannelSecurity::Tls {
            custom_roots: credentials.root_certificates().is_some(),
            client_identity: credentials.identity().is_some(),
        }
    }

    pub fn is_secure(&self) -> bool {
        matches!(self, ChannelSecurity::Tls { .. })
    }
}

impl fmt::Display for ChannelSecurity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelSecurity::Insecure => f.write_str("insecure"),
            ChannelSecurity::Tls { .. } => f.write_str("tls"),
        }
    }
}

/// 通道构造器。
///
/// # 教案式说明
/// - **意图 (Why)**：在 [`Channel::new`] 的三个宿主参数之外，集中承载选项、原生工厂与完成队列的注入；
/// - **契约 (What)**：未注入工厂时使用以 `options.connect_timeout` 构造的 [`TcpChannelFactory`]；
///   未注入队列时使用 [`CompletionQueue::global`]；
/// - **示例**：
/// ```
/// use spark_rpc_channel::{ChannelBuilder, ChannelSecurity, ConfigMap};
///
/// let channel = ChannelBuilder::new("localhost:50051")
///     .args(ConfigMap::new().with("grpc.max_receive_message_length", 4 * 1024 * 1024))
///     .build()
///     .expect("参数合法");
/// assert_eq!(channel.security(), ChannelSecurity::Insecure);
/// assert_eq!(channel.target().as_deref(), Ok("localhost:50051"));
/// ```
#[derive(Debug)]
pub struct ChannelBuilder {
    target: String,
    credentials: Option<Arc<dyn ChannelCredentials>>,
    args: Option<ConfigMap>,
    options: ChannelOptions,
    factory: Option<Arc<dyn NativeChannelFactory>>,
    queue: Option<CompletionQueue>,
}

impl ChannelBuilder {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            credentials: None,
            args: None,
            options: ChannelOptions::default(),
            factory: None,
            queue: None,
        }
    }

    pub fn credentials(mut self, credentials: Arc<dyn ChannelCredentials>) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn args(mut self, args: ConfigMap) -> Self {
        self.args = Some(args);
        self
    }

    pub fn options(mut self, options: ChannelOptions) -> Self {
        self.options = options;
        self
    }

    pub fn factory(mut self, factory: Arc<dyn NativeChannelFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    pub fn completion_queue(mut self, queue: CompletionQueue) -> Self {
        self.queue = Some(queue);
        self
    }

    /// 构造通道。
    ///
    /// # 契约（What）
    /// - 选项越界（如零连接超时）返回 [`ChannelError::InvalidConfiguration`]；
    /// - 参数编组错误原样返回，此时原生工厂不会被调用；
    /// - 原生工厂的任何失败都归一为 [`ChannelError::NativeCreation`]。
    pub fn build(self) -> Result<Channel> {
        self.options.validate()?;
        let args = marshal(self.args.as_ref())?;
        let native_credentials = self
            .credentials
            .as_ref()
            .and_then(|credentials| credentials.native_credentials());
        let factory = self.factory.unwrap_or_else(|| {
            Arc::new(TcpChannelFactory::new(self.options.connect_timeout()))
        });

        let (created, security) = match native_credentials {
            None => (
                factory.create_insecure(&self.target, &args),
                ChannelSecurity::Insecure,
            ),
            Some(credentials) => (
                factory.create_secure(&credentials, &self.target, &args),
                ChannelSecurity::from_native(&credentials),
            ),
        };
        let native = created.map_err(|err| match err {
            ChannelError::NativeCreation { .. } => err,
            other => ChannelError::NativeCreation {
                target: self.target.clone(),
                detail: other.to_string(),
            },
        })?;

        info!(
            endpoint = %self.target,
            security = %security,
            arg_count = args.len(),
            "channel created"
        );
        Ok(Channel {
            native: Mutex::new(Some(native)),
            security,
            queue: self
                .queue
                .unwrap_or_else(|| CompletionQueue::global().clone()),
            reporting: self.options.timeout_reporting,
        })
    }
}

/// 通道句柄。
pub struct Channel {
    native: Mutex<Option<Box<dyn NativeChannel>>>,
    security: ChannelSecurity,
    queue: CompletionQueue,
    reporting: TimeoutReporting,
}

impl Channel {
    /// 以默认选项构造通道，等价于 [`ChannelBuilder`] 只设置目标、凭据与参数表。
    pub fn new(
        target: impl Into<String>,
        credentials: Option<Arc<dyn ChannelCredentials>>,
        args: Option<&ConfigMap>,
    ) -> Result<Self> {
        let mut builder = ChannelBuilder::new(target);
        if let Some(credentials) = credentials {
            builder = builder.credentials(credentials);
        }
        if let Some(args) = args {
            builder = builder.args(args.clone());
        }
        builder.build()
    }

    pub fn builder(target: impl Into<String>) -> ChannelBuilder {
        ChannelBuilder::new(target)
    }

    /// 关闭通道，永不失败。
    ///
    /// - **契约 (What)**：首次调用取出原生句柄并执行原生关闭，后续调用为空操作；
    ///   内置后端会以 `Changed(SHUTDOWN)` 解析所有未决观测。
    pub fn close(&self) {
        let native = self.native.lock().take();
        if let Some(native) = native {
            native.shutdown();
            info!(endpoint = %native.target(), "channel closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.native.lock().is_none()
    }

    /// 创建时传入的目标文本。
    pub fn target(&self) -> Result<String> {
        self.with_native(|native| native.target())
    }

    /// 同步读取当前连通性状态；`try_to_connect` 为真时在空闲或失败状态下发起一次连接尝试。
    pub fn connectivity_state(&self, try_to_connect: bool) -> Result<ConnectivityState> {
        let state = self.with_native(|native| native.check_connectivity_state(try_to_connect))?;
        debug!(state = %state, try_to_connect, "connectivity state read");
        Ok(state)
    }

    /// 注册一次连通性观测，立即返回。
    ///
    /// # 教案式注释
    /// - **前置条件**：调用线程处于 Tokio 运行时上下文，否则返回 [`ChannelError::NoRuntime`]；
    /// - **后置条件**：返回 `Ok` 时 `callback` 稍后恰好被调用一次；返回 `Err` 时永不调用；
    /// - **边界**：已过期的截止时间仍会先检查一次状态，状态已与 `last_observed` 不同则报告变化。
    pub fn watch_connectivity_state<F>(
        &self,
        last_observed: ConnectivityState,
        deadline: Deadline,
        callback: F,
    ) -> Result<()>
    where
        F: FnOnce(Result<WatchOutcome>) + Send + 'static,
    {
        self.register(last_observed, deadline, Box::new(callback))
    }

    /// 以 Future 形式等待一次连通性观测。
    pub fn watch_connectivity_state_async(
        &self,
        last_observed: ConnectivityState,
        deadline: Deadline,
    ) -> Result<WatchFuture> {
        let (callback, future) = WatchFuture::channel();
        self.register(last_observed, deadline, callback)?;
        Ok(future)
    }

    pub fn security(&self) -> ChannelSecurity {
        self.security
    }

    pub fn completion_queue(&self) -> &CompletionQueue {
        &self.queue
    }

    fn register(
        &self,
        last_observed: ConnectivityState,
        deadline: Deadline,
        callback: WatchCallback,
    ) -> Result<()> {
        let runtime = current_runtime()?;
        let slot = self.native.lock();
        let native = slot.as_deref().ok_or(ChannelError::ChannelClosed)?;
        let request = WatchRequest::new(last_observed, deadline, self.reporting, callback);
        register_watch(native, &self.queue, &runtime, request)
    }

    fn with_native<T>(&self, f: impl FnOnce(&dyn NativeChannel) -> T) -> Result<T> {
        let slot = self.native.lock();
        slot.as_deref().map(f).ok_or(ChannelError::ChannelClosed)
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("security", &self.security)
            .field("closed", &self.is_closed())
            .field("reporting", &self.reporting)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::{InsecureCredentials, SslCredentials};
    use std::time::Duration;
    use tokio::{net::TcpListener, time::timeout};
    use tracing_test::traced_test;

    #[test]
    fn closed_channel_rejects_reads_and_close_is_idempotent() {
        let channel = Channel::new("localhost:50051", None, None).expect("构造成功");
        assert!(!channel.is_closed());
        channel.close();
        channel.close();
        assert!(channel.is_closed());
        assert_eq!(channel.target(), Err(ChannelError::ChannelClosed));
        assert_eq!(
            channel.connectivity_state(false),
            Err(ChannelError::ChannelClosed)
        );
    }

    #[test]
    fn credentials_select_security_path() {
        let plain = Channel::new(
            "localhost:50051",
            Some(Arc::new(InsecureCredentials)),
            None,
        )
        .expect("构造成功");
        assert_eq!(plain.security(), ChannelSecurity::Insecure);

        let tls = Channel::new(
            "example.com",
            Some(Arc::new(SslCredentials::new().with_root_certificates(b"pem".to_vec()))),
            None,
        )
        .expect("构造成功");
        assert_eq!(
            tls.security(),
            ChannelSecurity::Tls {
                custom_roots: true,
                client_identity: false
            }
        );
        assert!(tls.security().is_secure());
    }

    #[test]
    fn invalid_argument_value_fails_construction() {
        let args = ConfigMap::new().with("key", ConfigMap::new());
        let err = Channel::new("localhost:50051", None, Some(&args)).expect_err("对象取值非法");
        assert_eq!(
            err,
            ChannelError::InvalidArgumentValue {
                key: "key".to_owned(),
                kind: "object"
            }
        );
    }

    #[test]
    fn malformed_target_is_native_creation_error() {
        let err = Channel::new("localhost:notaport", None, None).expect_err("端口非法");
        assert!(matches!(err, ChannelError::NativeCreation { .. }));
    }

    #[test]
    fn fresh_channel_is_idle() {
        let channel = Channel::new("localhost:50051", None, None).expect("构造成功");
        assert_eq!(channel.connectivity_state(false), Ok(ConnectivityState::Idle));
        assert_eq!(channel.connectivity_state(false), Ok(ConnectivityState::Idle));
    }

    #[test]
    fn watch_outside_runtime_fails_synchronously() {
        let channel = Channel::new("localhost:50051", None, None).expect("构造成功");
        let err = channel
            .watch_connectivity_state(ConnectivityState::Idle, Deadline::Infinite, |_| {
                panic!("注册失败时回调不可被调用")
            })
            .expect_err("无运行时");
        assert!(matches!(err, ChannelError::NoRuntime { .. }));
    }

    #[test]
    #[traced_test]
    fn lifecycle_events_are_logged() {
        let channel = Channel::new("localhost:50051", None, None).expect("构造成功");
        channel.close();
        assert!(logs_contain("channel created"));
        assert!(logs_contain("channel closed"));
    }

    #[test]
    #[traced_test]
    fn native_shutdown_runs_once_across_close_and_drop() {
        let channel = Channel::new("localhost:50051", None, None).expect("构造成功");
        channel.close();
        channel.close();
        drop(channel);
        logs_assert(|lines: &[&str]| {
            match lines
                .iter()
                .filter(|line| line.contains("native channel shut down"))
                .count()
            {
                1 => Ok(()),
                n => Err(format!("原生关闭执行了 {n} 次")),
            }
        });
    }

    #[test]
    fn zero_connect_timeout_fails_construction() {
        let err = Channel::builder("localhost:50051")
            .options(ChannelOptions::default().with_connect_timeout(Duration::ZERO))
            .build()
            .expect_err("零超时");
        assert!(matches!(err, ChannelError::InvalidConfiguration { .. }));
    }

    /// 默认路径：全局完成队列加内置 TCP 后端。
    #[tokio::test(flavor = "multi_thread")]
    async fn default_backend_watches_resolve_through_global_queue() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("绑定本地端口");
        let addr = listener.local_addr().expect("本地地址");
        let channel = Channel::new(addr.to_string(), None, None).expect("构造成功");

        let mut last = ConnectivityState::Idle;
        let mut pending = channel
            .watch_connectivity_state_async(last, Deadline::after(Duration::from_secs(5)))
            .expect("注册观测");
        assert_eq!(channel.connectivity_state(true), Ok(ConnectivityState::Idle));

        let mut observed = Vec::new();
        loop {
            let outcome = timeout(Duration::from_secs(5), pending)
                .await
                .expect("观测应在期限内解析")
                .expect("观测成功");
            let WatchOutcome::Changed(state) = outcome else {
                panic!("未到达 Ready 便超时：{outcome:?}");
            };
            observed.push(state);
            if state == ConnectivityState::Ready {
                break;
            }
            last = state;
            pending = channel
                .watch_connectivity_state_async(last, Deadline::after(Duration::from_secs(5)))
                .expect("注册观测");
        }
        assert!(
            observed == [ConnectivityState::Connecting, ConnectivityState::Ready]
                || observed == [ConnectivityState::Ready],
            "状态跃迁顺序异常：{observed:?}"
        );

        let closing = channel
            .watch_connectivity_state_async(ConnectivityState::Ready, Deadline::Infinite)
            .expect("注册观测");
        channel.close();
        let outcome = timeout(Duration::from_secs(2), closing)
            .await
            .expect("关闭应解析未决观测")
            .expect("观测成功");
        assert_eq!(outcome, WatchOutcome::Changed(ConnectivityState::Shutdown));
        drop(listener);
    }
}
