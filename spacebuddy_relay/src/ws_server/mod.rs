// spacebuddy_relay/src/ws_server/mod.rs

//! WebSocket 服务端逻辑模块。
//!
//! 数据流：传输层收到一帧 → 限流 (`rate_limiter`) → 校验 (`message_validator`)
//! → 首次合法帧时登记到配对组 (`connection_manager`) → 按动作分支：
//! 转发给同组其他成员 (`message_router`) 或安排延迟自回显 (`test_echo_scheduler`)。

pub mod client_session;
pub mod connection_manager;
pub mod message_router;
pub mod message_validator;
pub mod rate_limiter;
pub mod service;
pub mod test_echo_scheduler;

/// 日志中只输出配对码的前三个字符，其余以 `***` 代替。
pub fn mask_code(code: &str) -> String {
    let prefix: String = code.chars().take(3).collect();
    format!("{}***", prefix)
}
