//! 基于 Tokio TCP 的默认原生通道。
//!
//! ## 实现策略（How）
//! - 目标文本解析为 [`Endpoint`]，接受 `dns:///`、`dns:`、`ipv4:`、`ipv6:` 前缀与 `[v6]:port` 形式；
//!   未给出端口时安全通道默认 443、非安全通道默认 80；
//! - `try_to_connect` 从 `Idle`/`TransientFailure` 发起一次受连接超时约束的 TCP 建连：
//!   `Connecting → Ready | TransientFailure`，不做自动重试；
//! - 建连成功后持有套接字直至关闭，关闭时中止进行中的尝试并进入 `Shutdown`。
//!
//! ## 风险与考量（Trade-offs）
//! - 传输安全握手由调用层在既有连接上完成，本实现只记录服务器名与凭据摘要；
//! - 就绪后对端主动断开不会被感知，状态保持 `Ready` 直到下一次调用层读写失败。

use core::fmt;
use std::{sync::Arc, time::Duration};

use parking_lot::Mutex;
use tokio::{net::TcpStream, runtime::Handle, task::JoinHandle};
use tracing::{debug, warn};

use super::{ConnectivityCell, NativeChannel, NativeChannelFactory};
use crate::{
    args::ChannelArgs,
    completion_queue::CompletionSink,
    config::DEFAULT_CONNECT_TIMEOUT,
    connectivity::ConnectivityState,
    credentials::NativeCredentials,
    deadline::Deadline,
    error::{ChannelError, Result},
};

/// 主用户代理，随连接日志输出。
pub const ARG_PRIMARY_USER_AGENT: &str = "grpc.primary_user_agent";
/// 覆盖默认的 `:authority`。
pub const ARG_DEFAULT_AUTHORITY: &str = "grpc.default_authority";
/// 覆盖 TLS 校验使用的服务器名。
pub const ARG_SSL_TARGET_NAME_OVERRIDE: &str = "grpc.ssl_target_name_override";
/// 逐通道覆盖连接超时（毫秒，须为正数）。
pub const ARG_CONNECT_TIMEOUT_MS: &str = "spark.connect_timeout_ms";

const DEFAULT_INSECURE_PORT: u16 = 80;
const DEFAULT_SECURE_PORT: u16 = 443;
const SCHEME_PREFIXES: [&str; 4] = ["dns:///", "dns:", "ipv4:", "ipv6:"];

/// 解析后的连接端点。
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    /// 解析目标文本；失败时返回可读的原因描述。
    pub fn parse(target: &str, default_port: u16) -> core::result::Result<Self, String> {
        let trimmed = target.trim();
        let rest = SCHEME_PREFIXES
            .iter()
            .find_map(|prefix| trimmed.strip_prefix(prefix))
            .unwrap_or(trimmed);
        if rest.is_empty() {
            return Err("target is empty".to_owned());
        }

        if let Some(bracketed) = rest.strip_prefix('[') {
            let (host, tail) = bracketed
                .split_once(']')
                .ok_or_else(|| "unterminated IPv6 literal".to_owned())?;
            let port = match tail {
                "" => default_port,
                tail => {
                    let digits = tail
                        .strip_prefix(':')
                        .ok_or_else(|| format!("unexpected `{tail}` after IPv6 literal"))?;
                    parse_port(digits)?
                }
            };
            return Ok(Self {
                host: host.to_owned(),
                port,
            });
        }

        match rest.rsplit_once(':') {
            // 未加括号的 IPv6 字面量：整体视为主机。
            Some((host, _)) if host.contains(':') => Ok(Self {
                host: rest.to_owned(),
                port: default_port,
            }),
            Some(("", _)) => Err(format!("target `{target}` has no host")),
            Some((host, port)) => Ok(Self {
                host: host.to_owned(),
                port: parse_port(port)?,
            }),
            None => Ok(Self {
                host: rest.to_owned(),
                port: default_port,
            }),
        }
    }
}

fn parse_port(text: &str) -> core::result::Result<u16, String> {
    text.parse::<u16>()
        .map_err(|_| format!("`{text}` is not a valid port"))
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// 默认原生通道工厂。
#[derive(Clone, Debug)]
pub struct TcpChannelFactory {
    connect_timeout: Duration,
}

impl TcpChannelFactory {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }

    fn build(
        &self,
        target: &str,
        args: &ChannelArgs,
        credentials: Option<&NativeCredentials>,
    ) -> Result<TcpNativeChannel> {
        let default_port = if credentials.is_some() {
            DEFAULT_SECURE_PORT
        } else {
            DEFAULT_INSECURE_PORT
        };
        let endpoint =
            Endpoint::parse(target, default_port).map_err(|detail| ChannelError::NativeCreation {
                target: target.to_owned(),
                detail,
            })?;
        let connect_timeout = args
            .get_integer(ARG_CONNECT_TIMEOUT_MS)
            .filter(|millis| *millis > 0)
            .map_or(self.connect_timeout, |millis| {
                Duration::from_millis(u64::from(millis.unsigned_abs()))
            });
        let authority = args
            .get_text(ARG_DEFAULT_AUTHORITY)
            .map_or_else(|| endpoint.to_string(), str::to_owned);
        let tls = credentials.map(|credentials| TlsSettings {
            server_name: args
                .get_text(ARG_SSL_TARGET_NAME_OVERRIDE)
                .map_or_else(|| endpoint.host.clone(), str::to_owned),
            credentials: credentials.clone(),
        });

        Ok(TcpNativeChannel {
            target: target.to_owned(),
            endpoint,
            authority,
            user_agent: args.get_text(ARG_PRIMARY_USER_AGENT).map(str::to_owned),
            tls,
            connect_timeout,
            cell: Arc::new(ConnectivityCell::new(ConnectivityState::Idle)),
            attempt: Mutex::new(None),
            connection: Arc::new(Mutex::new(None)),
        })
    }
}

impl Default for TcpChannelFactory {
    fn default() -> Self {
        Self::new(DEFAULT_CONNECT_TIMEOUT)
    }
}

impl NativeChannelFactory for TcpChannelFactory {
    fn create_insecure(&self, target: &str, args: &ChannelArgs) -> Result<Box<dyn NativeChannel>> {
        Ok(Box::new(self.build(target, args, None)?))
    }

    fn create_secure(
        &self,
        credentials: &NativeCredentials,
        target: &str,
        args: &ChannelArgs,
    ) -> Result<Box<dyn NativeChannel>> {
        Ok(Box::new(self.build(target, args, Some(credentials))?))
    }
}

#[derive(Debug)]
struct TlsSettings {
    server_name: String,
    credentials: NativeCredentials,
}

#[derive(Debug)]
struct TcpNativeChannel {
    target: String,
    endpoint: Endpoint,
    authority: String,
    user_agent: Option<String>,
    tls: Option<TlsSettings>,
    connect_timeout: Duration,
    cell: Arc<ConnectivityCell>,
    attempt: Mutex<Option<JoinHandle<()>>>,
    connection: Arc<Mutex<Option<TcpStream>>>,
}

impl TcpNativeChannel {
    fn start_connect(&self) {
        let Ok(runtime) = Handle::try_current() else {
            warn!(endpoint = %self.endpoint, "no async runtime, connection attempt skipped");
            return;
        };
        if !self.cell.transition(
            ConnectivityState::accepts_connect_attempt,
            ConnectivityState::Connecting,
        ) {
            return;
        }
        debug!(
            endpoint = %self.endpoint,
            authority = %self.authority,
            user_agent = self.user_agent.as_deref(),
            tls_server_name = self.tls.as_ref().map(|tls| tls.server_name.as_str()),
            custom_roots = self
                .tls
                .as_ref()
                .is_some_and(|tls| tls.credentials.root_certificates().is_some()),
            "starting connection attempt"
        );

        let cell = Arc::clone(&self.cell);
        let connection = Arc::clone(&self.connection);
        let endpoint = self.endpoint.clone();
        let timeout = self.connect_timeout;
        let handle = runtime.spawn(async move {
            let attempt = tokio::time::timeout(
                timeout,
                TcpStream::connect((endpoint.host.as_str(), endpoint.port)),
            )
            .await;
            let next = match attempt {
                Ok(Ok(stream)) => {
                    debug!(endpoint = %endpoint, "connection established");
                    *connection.lock() = Some(stream);
                    ConnectivityState::Ready
                }
                Ok(Err(err)) => {
                    debug!(endpoint = %endpoint, error = %err, "connection attempt failed");
                    ConnectivityState::TransientFailure
                }
                Err(_elapsed) => {
                    debug!(endpoint = %endpoint, ?timeout, "connection attempt timed out");
                    ConnectivityState::TransientFailure
                }
            };
            if !cell.transition(|current| current == ConnectivityState::Connecting, next) {
                // 尝试期间通道已关闭。
                connection.lock().take();
            }
        });
        *self.attempt.lock() = Some(handle);
    }
}

impl NativeChannel for TcpNativeChannel {
    fn target(&self) -> String {
        self.target.clone()
    }

    fn check_connectivity_state(&self, try_to_connect: bool) -> ConnectivityState {
        let current = self.cell.get();
        if try_to_connect && current.accepts_connect_attempt() {
            self.start_connect();
        }
        current
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
        self.cell.shutdown();
        if let Some(attempt) = self.attempt.lock().take() {
            attempt.abort();
        }
        self.connection.lock().take();
        debug!(endpoint = %self.endpoint, "native channel shut down");
    }
}
