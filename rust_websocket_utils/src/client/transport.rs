// rust_websocket_utils/src/client/transport.rs

//! 客户端 WebSocket 传输层核心逻辑。
//!
//! 中继服务转发的是原始文本，因此客户端这里同样以文本帧为单位收发，
//! 不对内容做任何包装。

use futures_util::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use log::{debug, error, info};
use serde::Serialize;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message, MaybeTlsStream, WebSocketStream};
use url::Url;

use crate::error::WsError;
use crate::message::{self, WsFrame};

/// `ClientWsStream` 类型别名，代表一个可能经过 TLS 加密的 TCP WebSocket 流。
pub type ClientWsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// `ClientConnection` 结构体代表一个活动的客户端 WebSocket 连接。
pub struct ClientConnection {
    /// 用于向服务器发送消息的写端。
    pub ws_sender: SplitSink<ClientWsStream, Message>,
    /// 用于从服务器接收消息的读端。
    pub ws_receiver: SplitStream<ClientWsStream>,
}

impl ClientConnection {
    /// 原样发送一段文本。
    pub async fn send_text(&mut self, text: impl Into<String>) -> Result<(), WsError> {
        let text: String = text.into();
        debug!("客户端：准备发送文本帧，长度: {} 字节", text.len());
        self.ws_sender.send(Message::Text(text)).await?;
        Ok(())
    }

    /// 发送一条已构造好的帧。
    pub async fn send_frame(&mut self, frame: &WsFrame) -> Result<(), WsError> {
        self.ws_sender.send(frame.to_message()).await?;
        Ok(())
    }

    /// 将负载序列化为 JSON 后发送。
    pub async fn send_payload<T: Serialize>(&mut self, payload: &T) -> Result<(), WsError> {
        let frame = WsFrame::from_payload(payload)?;
        self.send_frame(&frame).await
    }

    /// 接收下一条文本帧；连接关闭时返回 `None`。
    pub async fn receive_frame(&mut self) -> Option<Result<WsFrame, WsError>> {
        message::next_frame(&mut self.ws_receiver).await
    }

    /// 主动关闭连接。
    pub async fn close(&mut self) -> Result<(), WsError> {
        self.ws_sender.close().await?;
        info!("客户端：连接已关闭。");
        Ok(())
    }
}

/// 异步连接到指定的 WebSocket 服务器。
///
/// # Arguments
/// * `url_str` - WebSocket 服务器的完整 URL 字符串 (例如 "ws://127.0.0.1:8080")。
///
/// # Returns
/// * `Result<ClientConnection, WsError>` - URL 解析失败返回 `WsError::InvalidUrl`，
///   连接或握手失败返回 `WsError::WebSocketProtocolError`。
pub async fn connect_client(url_str: &str) -> Result<ClientConnection, WsError> {
    info!("客户端：开始尝试连接到 WebSocket 服务器，URL: {}", url_str);
    let parsed_url = Url::parse(url_str)
        .map_err(|e| WsError::InvalidUrl(format!("无效的 WebSocket URL '{}': {}", url_str, e)))?;
    if parsed_url.scheme() != "ws" && parsed_url.scheme() != "wss" {
        return Err(WsError::InvalidUrl(format!("不支持的 URL 协议: '{}'", parsed_url.scheme())));
    }

    match connect_async(parsed_url.as_str()).await {
        Ok((ws_stream, response)) => {
            info!("客户端：已成功连接到 {} (HTTP 状态码: {})", url_str, response.status());
            let (ws_sender, ws_receiver) = ws_stream.split();
            Ok(ClientConnection { ws_sender, ws_receiver })
        }
        Err(e) => {
            error!("客户端：连接到 {} 失败，错误: {}", url_str, e);
            Err(WsError::WebSocketProtocolError(e))
        }
    }
}
