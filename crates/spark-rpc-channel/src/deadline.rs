//! 观测请求的绝对截止时间。
//!
//! 宿主以“自 Unix 纪元起的毫秒数”或日期表达截止时间，原生层需要单调时钟上的绝对时刻。
//! 转换在调用时刻以一次 `SystemTime::now()` / `Instant::now()` 采样完成，之后墙钟跳变不影响已注册的请求。

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use crate::error::{ChannelError, Result};

/// 单调时钟上的绝对截止时间。
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Deadline {
    /// 永不过期。
    Infinite,
    /// 在给定时刻过期。
    At(Instant),
}

impl Deadline {
    /// 从当前时刻起经过 `timeout` 后过期；溢出时视为永不过期。
    pub fn after(timeout: Duration) -> Self {
        Instant::now()
            .checked_add(timeout)
            .map_or(Deadline::Infinite, Deadline::At)
    }

    /// 将墙钟时间换算为单调时刻。早于当前的时间点映射为“已过期”。
    pub fn from_system_time(at: SystemTime) -> Self {
        let wall_now = SystemTime::now();
        let now = Instant::now();
        match at.duration_since(wall_now) {
            Ok(ahead) => now
                .checked_add(ahead)
                .map_or(Deadline::Infinite, Deadline::At),
            Err(behind) => Deadline::At(now.checked_sub(behind.duration()).unwrap_or(now)),
        }
    }

    /// 解析宿主数值形式的截止时间（Unix 毫秒）。
    ///
    /// # 契约（What）
    /// - `+∞` 表示永不过期，`-∞` 表示已过期；
    /// - `NaN` 无法解释为时间点，返回 [`ChannelError::InvalidArgumentType`]；
    /// - 超出可表示范围的未来时间视为永不过期，过去时间视为已过期。
    pub fn from_unix_millis(millis: f64) -> Result<Self> {
        if millis.is_nan() {
            return Err(ChannelError::invalid_type(
                "deadline must be a date or a number of milliseconds, got NaN",
            ));
        }
        if millis == f64::INFINITY {
            return Ok(Deadline::Infinite);
        }
        if millis == f64::NEG_INFINITY {
            return Ok(Deadline::At(Instant::now()));
        }
        let offset = Duration::try_from_secs_f64(millis.abs() / 1000.0).ok();
        let wall = if millis >= 0.0 {
            match offset.and_then(|offset| UNIX_EPOCH.checked_add(offset)) {
                Some(wall) => wall,
                None => return Ok(Deadline::Infinite),
            }
        } else {
            match offset.and_then(|offset| UNIX_EPOCH.checked_sub(offset)) {
                Some(wall) => wall,
                None => return Ok(Deadline::At(Instant::now())),
            }
        };
        Ok(Deadline::from_system_time(wall))
    }

    pub fn instant(&self) -> Option<Instant> {
        match self {
            Deadline::Infinite => None,
            Deadline::At(instant) => Some(*instant),
        }
    }

    pub fn is_expired(&self) -> bool {
        self.instant().is_some_and(|at| at <= Instant::now())
    }

    /// 距离过期的剩余时长；永不过期时返回 `None`。
    pub fn remaining(&self) -> Option<Duration> {
        self.instant()
            .map(|at| at.saturating_duration_since(Instant::now()))
    }
}

impl From<Instant> for Deadline {
    fn from(at: Instant) -> Self {
        Deadline::At(at)
    }
}
