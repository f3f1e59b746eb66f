use rust_websocket_utils::error::WsError;
use thiserror::Error;

/// 中继服务的主要错误类型
///
/// 单个连接内的错误（JSON 非法、配对码非法、对端断开）都在连接任务内部消化，
/// 不会以 `AppError` 的形式向上传播；这里只覆盖启动和监听层面的失败。
#[derive(Error, Debug)]
pub enum AppError {
    #[error("WebSocket 服务错误: {0}")]
    WebSocketService(String),

    #[error("配置错误: {0}")]
    ConfigError(String),

    #[error("传输层错误: {0}")]
    Transport(#[from] WsError),

    #[error("健康检查服务错误: {0}")]
    Health(String),

    #[error("I/O 错误: {0}")]
    Io(#[from] std::io::Error),
}
