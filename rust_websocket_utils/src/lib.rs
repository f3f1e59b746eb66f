//! `rust_websocket_utils` 是一个提供 WebSocket 通信实用功能的 Rust Crate。
//! 它封装了 `tokio-tungstenite` 的监听、握手和收发细节，让上层服务只面对文本帧。
//!
//! 主要模块包括：
//! - `message`: 定义 `WsFrame`（一条原样保留文本内容的 WebSocket 文本帧）。
//! - `error`: 定义库中使用的统一错误类型 `WsError`。
//! - `server`: 提供 WebSocket 服务器端传输层（监听、握手、帧大小上限）。
//! - `client`: 提供 WebSocket 客户端传输层，主要供测试和调试工具使用。

pub mod client;
pub mod error;
pub mod message;
pub mod server;

pub use error::WsError;
pub use message::WsFrame;
