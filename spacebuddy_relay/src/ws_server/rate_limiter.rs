// spacebuddy_relay/src/ws_server/rate_limiter.rs

//! 单连接最小消息间隔限流。
//!
//! 策略本身是无状态的纯函数：给定当前时间和该连接上一次被接受的时间，判断是否放行。
//! 状态（上次接受时间、计数）保存在 `ClientSession` 中，由会话在放行后更新。
//! 被拒绝的帧直接丢弃，不回任何响应，也不排队。

use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimiter {
    min_interval: Duration,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self { min_interval }
    }

    pub fn from_millis(min_interval_ms: u64) -> Self {
        Self::new(Duration::from_millis(min_interval_ms))
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// `last_accepted_at` 为 `None` 表示该连接还没有任何被接受的帧，第一帧总是放行。
    pub fn allows(&self, now: Instant, last_accepted_at: Option<Instant>) -> bool {
        match last_accepted_at {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.min_interval(),
        }
    }
}
