// rust_websocket_utils/src/message.rs

//! 定义 WebSocket 通信中使用的帧结构。
//!
//! 中继服务要求把收到的文本原封不动地转发出去，因此 `WsFrame` 不做任何解析，
//! 只保存原始文本。服务端主动生成的帧通过 `WsFrame::from_payload` 从可序列化的结构体构造。

use std::fmt;
use std::sync::Arc;

use futures_util::{Stream, StreamExt};
use log::{debug, error};
use serde::{de::DeserializeOwned, Serialize};
use tokio_tungstenite::tungstenite::{protocol::Message, Error as TungsteniteError};

use crate::error::WsError;

/// 一条 WebSocket 文本帧。
///
/// 内部使用 `Arc<str>`，向同组多个成员扇出时克隆只增加引用计数。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WsFrame {
    text: Arc<str>,
}

impl WsFrame {
    /// 用原始文本构造帧，内容不做任何修改。
    pub fn text(raw: impl Into<String>) -> Self {
        let raw: String = raw.into();
        Self { text: Arc::from(raw) }
    }

    /// 将可序列化的负载编码为 JSON 文本帧。
    pub fn from_payload<T: Serialize>(payload: &T) -> Result<Self, WsError> {
        let json = serde_json::to_string(payload)
            .map_err(|e| WsError::SerializationError(format!("序列化帧负载失败: {}", e)))?;
        Ok(Self::text(json))
    }

    /// 将帧文本反序列化为指定类型，主要供客户端和测试读取服务端产生的帧。
    pub fn deserialize_payload<T: DeserializeOwned>(&self) -> Result<T, WsError> {
        serde_json::from_str(&self.text).map_err(|e| {
            WsError::DeserializationError(format!("帧文本反序列化失败: {}, 原始文本: '{}'", e, self.text))
        })
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// 帧文本的字节长度。
    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub(crate) fn to_message(&self) -> Message {
        Message::Text(self.text.to_string())
    }
}

impl fmt::Display for WsFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// 从 WebSocket 读取流中取出下一条业务帧。
///
/// 服务端与客户端共用此逻辑：
/// - 文本帧原样返回；
/// - 二进制帧按 UTF-8 有损解码后返回（非法字节会在上层 JSON 解析时失败）；
/// - Ping/Pong/原始 Frame 由底层库处理，这里跳过；
/// - 收到 Close 帧、流结束或连接已关闭时返回 `None`；
/// - 其他底层错误（包括帧超过大小上限）返回 `Some(Err(..))`。
pub(crate) async fn next_frame<S>(ws_receiver: &mut S) -> Option<Result<WsFrame, WsError>>
where
    S: Stream<Item = Result<Message, TungsteniteError>> + Unpin,
{
    loop {
        match ws_receiver.next().await {
            Some(Ok(Message::Text(text))) => {
                debug!("收到文本帧，长度: {} 字节", text.len());
                break Some(Ok(WsFrame::text(text)));
            }
            Some(Ok(Message::Binary(bin))) => {
                debug!("收到二进制帧，长度: {} 字节，按 UTF-8 解码处理", bin.len());
                break Some(Ok(WsFrame::text(String::from_utf8_lossy(&bin).into_owned())));
            }
            Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) | Some(Ok(Message::Frame(_))) => {
                continue;
            }
            Some(Ok(Message::Close(close_frame))) => {
                debug!("收到 Close 控制帧: {:?}", close_frame);
                break None;
            }
            Some(Err(TungsteniteError::ConnectionClosed)) | Some(Err(TungsteniteError::AlreadyClosed)) => {
                debug!("连接已关闭 (ConnectionClosed / AlreadyClosed)。");
                break None;
            }
            Some(Err(e)) => {
                error!("从 WebSocket 流接收帧时发生底层错误: {}", e);
                break Some(Err(WsError::WebSocketProtocolError(e)));
            }
            None => {
                debug!("WebSocket 接收流已结束。");
                break None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common_models::ws_payloads::{ErrorResponsePayload, SpacePushedPayload};
    use futures_util::stream;
    use tokio_tungstenite::tungstenite::error::CapacityError;

    #[test]
    fn test_text_frame_keeps_raw_bytes() {
        // 空格、字段顺序和非 ASCII 字符都不能被改动
        let raw = "{ \"code\":\"abc123\",  \"x\":1, \"名字\":\"空格键\" }";
        let frame = WsFrame::text(raw);
        assert_eq!(frame.as_str(), raw);
        assert_eq!(frame.len(), raw.len());
        assert_eq!(frame.to_message(), Message::Text(raw.to_string()));
    }

    #[test]
    fn test_from_payload_produces_compact_json() {
        let frame = WsFrame::from_payload(&SpacePushedPayload::new("abc123")).unwrap();
        assert_eq!(frame.as_str(), r#"{"action":"SPACEPUSHED","code":"abc123"}"#);

        let back: SpacePushedPayload = frame.deserialize_payload().unwrap();
        assert_eq!(back, SpacePushedPayload::new("abc123"));
    }

    #[test]
    fn test_deserialize_payload_to_mismatched_type_error_handling() {
        let frame = WsFrame::from_payload(&ErrorResponsePayload::invalid_code()).unwrap();
        match frame.deserialize_payload::<SpacePushedPayload>() {
            Err(WsError::DeserializationError(details)) => assert!(details.contains("Invalid code")),
            other => panic!("预期 DeserializationError，实际得到: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_next_frame_skips_control_frames_and_decodes_binary() {
        let mut incoming = stream::iter(vec![
            Ok(Message::Ping(vec![1, 2])),
            Ok(Message::Pong(vec![])),
            Ok(Message::Binary(b"{\"code\":\"k\"}".to_vec())),
            Ok(Message::Text("second".to_string())),
            Ok(Message::Close(None)),
            Ok(Message::Text("never read".to_string())),
        ]);

        let first = next_frame(&mut incoming).await.unwrap().unwrap();
        assert_eq!(first.as_str(), "{\"code\":\"k\"}");
        let second = next_frame(&mut incoming).await.unwrap().unwrap();
        assert_eq!(second.as_str(), "second");
        assert!(next_frame(&mut incoming).await.is_none(), "Close 帧之后应返回 None");
    }

    #[tokio::test]
    async fn test_next_frame_reports_capacity_error() {
        let mut incoming = stream::iter(vec![Err(TungsteniteError::Capacity(
            CapacityError::MessageTooLong { size: 2048, max_size: 1024 },
        ))]);
        match next_frame(&mut incoming).await {
            Some(Err(WsError::WebSocketProtocolError(TungsteniteError::Capacity(_)))) => {}
            other => panic!("预期容量错误，实际得到: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_next_frame_treats_connection_closed_as_end() {
        let mut incoming = stream::iter(vec![Err::<Message, _>(TungsteniteError::ConnectionClosed)]);
        assert!(next_frame(&mut incoming).await.is_none());
    }
}
