//! `spacebuddy_relay` 服务端核心库。
//!
//! 按配对码把 WebSocket 连接分组，并在组内原样转发消息。
//!
//! 主要模块包括：
//! - `config`: 管理应用的配置信息加载与校验。
//! - `error`: 定义应用特定的错误类型。
//! - `health`: 健康检查 HTTP 接口。
//! - `ws_server`: 实现 WebSocket 服务端，处理客户端连接、限流、校验和组内转发。

pub mod config;
pub mod error;
pub mod health;
pub mod ws_server;
