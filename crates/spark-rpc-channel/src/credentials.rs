//! 凭据能力（Credentials capability）。
//!
//! 通道构造只关心一件事：凭据能否产出原生传输安全句柄。返回 `None` 表示明文传输，
//! 此时构造走非安全通道路径。

use core::fmt;
use std::sync::Arc;

/// 原生传输安全材料。
///
/// - **契约 (What)**：`root_certificates` 缺省时由原生层使用系统信任根；
///   `identity` 为可选的客户端私钥与证书链（均为 PEM 字节）。
#[derive(Clone, Default, Eq, PartialEq)]
pub struct NativeCredentials {
    root_certificates: Option<Arc<[u8]>>,
    identity: Option<KeyCertPair>,
}

/// 客户端身份：私钥与证书链。
#[derive(Clone, Eq, PartialEq)]
pub struct KeyCertPair {
    pub private_key: Arc<[u8]>,
    pub cert_chain: Arc<[u8]>,
}

impl NativeCredentials {
    pub fn root_certificates(&self) -> Option<&[u8]> {
        self.root_certificates.as_deref()
    }

    pub fn identity(&self) -> Option<&KeyCertPair> {
        self.identity.as_ref()
    }
}

// 证书与私钥内容不进入日志。
impl fmt::Debug for NativeCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeCredentials")
            .field("custom_roots", &self.root_certificates.is_some())
            .field("client_identity", &self.identity.is_some())
            .finish()
    }
}

impl fmt::Debug for KeyCertPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyCertPair").finish_non_exhaustive()
    }
}

/// 凭据能力契约。
///
/// # 教案式说明
/// - **意图 (Why)**：凭据的具体构造（文件加载、密钥管理器等）属于外部协作方，
///   通道只通过该窄接口取得原生句柄；
/// - **契约 (What)**：[`native_credentials`](Self::native_credentials) 返回 `None` 表示
///   “无传输安全”，返回 `Some` 时通道以其构造安全通道；调用可能发生多次，实现应无副作用；
/// - **风险 (Trade-offs)**：返回值按值克隆，证书内容以 `Arc<[u8]>` 共享以避免复制。
pub trait ChannelCredentials: Send + Sync + fmt::Debug {
    fn native_credentials(&self) -> Option<NativeCredentials>;
}

/// 明文传输凭据。
#[derive(Clone, Copy, Debug, Default)]
pub struct InsecureCredentials;

impl ChannelCredentials for InsecureCredentials {
    fn native_credentials(&self) -> Option<NativeCredentials> {
        None
    }
}

/// TLS 凭据。
///
/// ```
/// use spark_rpc_channel::credentials::{ChannelCredentials, SslCredentials};
///
/// let creds = SslCredentials::new().with_root_certificates(b"-----BEGIN CERTIFICATE-----".to_vec());
/// let native = creds.native_credentials().expect("TLS 凭据总是产出原生句柄");
/// assert!(native.root_certificates().is_some());
/// assert!(native.identity().is_none());
/// ```
#[derive(Clone, Debug, Default)]
pub struct SslCredentials {
    native: NativeCredentials,
}

impl SslCredentials {
    /// 使用系统信任根、无客户端身份的 TLS 凭据。
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_root_certificates(mut self, pem: impl Into<Vec<u8>>) -> Self {
        self.native.root_certificates = Some(Arc::from(pem.into()));
        self
    }

    pub fn with_identity(
        mut self,
        private_key: impl Into<Vec<u8>>,
        cert_chain: impl Into<Vec<u8>>,
    ) -> Self {
        self.native.identity = Some(KeyCertPair {
            private_key: Arc::from(private_key.into()),
            cert_chain: Arc::from(cert_chain.into()),
        });
        self
    }
}

impl ChannelCredentials for SslCredentials {
    fn native_credentials(&self) -> Option<NativeCredentials> {
        Some(self.native.clone())
    }
}
