//! 通道连通性状态。
//!
//! 状态按“接近可用连接”的进度排列：`Idle → Connecting → Ready → TransientFailure → Shutdown`，
//! 其中 `Shutdown` 为终态。数值编码与宿主侧可见的表示保持一致。

use core::fmt;

use crate::error::ChannelError;

/// 通道连通性状态。
///
/// # 教案式说明
/// - **意图 (Why)**：以粗粒度信号描述通道健康度，供观测协议比较“上次观测值”与当前值；
/// - **契约 (What)**：`#[repr(u32)]` 固定数值编码（0..=4），[`TryFrom<u32>`] 拒绝其余取值；
/// - **风险 (Trade-offs)**：新增状态会改变宿主可见编码，需要同步更新 [`ConnectivityState::ALL`]。
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[repr(u32)]
pub enum ConnectivityState {
    /// 通道空闲，尚未尝试建立连接。
    Idle = 0,
    /// 正在建立连接。
    Connecting = 1,
    /// 连接可用。
    Ready = 2,
    /// 最近一次连接尝试失败。
    TransientFailure = 3,
    /// 通道已关闭，不会再发生任何跃迁。
    Shutdown = 4,
}

impl ConnectivityState {
    /// 全部状态，按数值编码升序排列。
    pub const ALL: [ConnectivityState; 5] = [
        ConnectivityState::Idle,
        ConnectivityState::Connecting,
        ConnectivityState::Ready,
        ConnectivityState::TransientFailure,
        ConnectivityState::Shutdown,
    ];

    /// 宿主可见的数值编码。
    pub fn code(self) -> u32 {
        self as u32
    }

    /// 是否为终态。
    pub fn is_terminal(self) -> bool {
        matches!(self, ConnectivityState::Shutdown)
    }

    /// 是否允许通过“尝试连接”离开当前状态。
    pub fn accepts_connect_attempt(self) -> bool {
        matches!(
            self,
            ConnectivityState::Idle | ConnectivityState::TransientFailure
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ConnectivityState::Idle => "IDLE",
            ConnectivityState::Connecting => "CONNECTING",
            ConnectivityState::Ready => "READY",
            ConnectivityState::TransientFailure => "TRANSIENT_FAILURE",
            ConnectivityState::Shutdown => "SHUTDOWN",
        }
    }
}

impl TryFrom<u32> for ConnectivityState {
    type Error = ChannelError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        ConnectivityState::ALL
            .into_iter()
            .find(|state| state.code() == value)
            .ok_or_else(|| {
                ChannelError::invalid_type(format!("{value} is not a connectivity state"))
            })
    }
}

impl fmt::Display for ConnectivityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
