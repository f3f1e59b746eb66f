// rust_websocket_utils/src/client/mod.rs

//! WebSocket 客户端模块。
//!
//! 提供连接到 WebSocket 服务器并收发文本帧的最小封装，主要供集成测试和调试工具使用。

pub mod transport;
