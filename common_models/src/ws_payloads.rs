// common_models/src/ws_payloads.rs

//! 服务端自己产生的 WebSocket 消息负载。
//!
//! 中继转发的帧原样透传，不经过这里的任何结构体；这里只定义服务端主动发出的三种帧。

use serde::{Deserialize, Serialize};

use crate::enums::RelayAction;

/// 收到的文本无法解析为 JSON 时返回给发送方的错误文本。
pub const INVALID_JSON_ERROR: &str = "Invalid JSON format";
/// 配对码缺失、不是字符串或长度越界时返回给发送方的错误文本。
pub const INVALID_CODE_ERROR: &str = "Invalid code";

/// 错误响应，线上格式为 `{"error":"..."}`。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ErrorResponsePayload {
    pub error: String,
}

impl ErrorResponsePayload {
    pub fn invalid_json() -> Self {
        Self { error: INVALID_JSON_ERROR.to_string() }
    }

    pub fn invalid_code() -> Self {
        Self { error: INVALID_CODE_ERROR.to_string() }
    }
}

/// `TEST` 动作触发的延迟自回显，线上格式为 `{"action":"SPACEPUSHED","code":"..."}`。
///
/// 字段顺序即序列化顺序，客户端按这个顺序比对文本。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SpacePushedPayload {
    pub action: RelayAction,
    pub code: String,
}

impl SpacePushedPayload {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            action: RelayAction::SpacePushed,
            code: code.into(),
        }
    }
}
