// spacebuddy_relay/src/ws_server/message_validator.rs

//! 入站帧校验。
//!
//! 帧对中继来说是不透明的，只读取两个路由字段：`code`（别名 `key`）和可选的 `action`。
//! 校验结果分三种拒绝：
//! - JSON 非法、配对码非法：回给发送方一条错误帧；
//! - 动作不在词汇表内：静默丢弃，不回任何响应。

use common_models::ws_payloads::ErrorResponsePayload;
use common_models::RelayAction;
use serde_json::{Map, Value};

/// 通过校验的帧中与路由有关的字段。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedFrame {
    pub code: String,
    pub action: Option<RelayAction>,
}

/// 校验失败的原因。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// 文本不是合法 JSON。
    InvalidJson,
    /// 配对码缺失、不是字符串或长度越界。
    InvalidCode,
    /// `action` 存在但不是已知动作；携带原始值，仅用于日志。
    UnknownAction(String),
}

impl Rejection {
    /// 需要回给发送方的错误负载；静默丢弃的情况返回 `None`。
    pub fn error_response(&self) -> Option<ErrorResponsePayload> {
        match self {
            Rejection::InvalidJson => Some(ErrorResponsePayload::invalid_json()),
            Rejection::InvalidCode => Some(ErrorResponsePayload::invalid_code()),
            Rejection::UnknownAction(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageValidator {
    min_code_len: usize,
    max_code_len: usize,
}

impl MessageValidator {
    pub fn new(min_code_len: usize, max_code_len: usize) -> Self {
        Self { min_code_len, max_code_len }
    }

    /// 校验一帧原始文本。
    ///
    /// 配对码取 `code` 字段，`code` 缺失或为空值（`null`、`""`、`false`、`0`）时改取 `key`。
    /// 长度按 UTF-16 码元计数，与浏览器和 Qt 客户端计算字符串长度的方式一致。
    /// 顶层不是 JSON 对象（数组、数字、字符串、`null`）时没有可读的配对码，按 `InvalidCode` 处理。
    pub fn validate(&self, raw: &str) -> Result<ValidatedFrame, Rejection> {
        let parsed: Value = serde_json::from_str(raw).map_err(|_| Rejection::InvalidJson)?;
        let fields = parsed.as_object().ok_or(Rejection::InvalidCode)?;

        let code = match routing_field(fields, "code").or_else(|| routing_field(fields, "key")) {
            Some(Value::String(code)) => code,
            _ => return Err(Rejection::InvalidCode),
        };
        let code_len = code.encode_utf16().count();
        if code_len < self.min_code_len || code_len > self.max_code_len {
            return Err(Rejection::InvalidCode);
        }

        let action = match routing_field(fields, "action") {
            None => None,
            Some(Value::String(name)) => match RelayAction::from_wire(name) {
                Some(action) => Some(action),
                None => return Err(Rejection::UnknownAction(name.clone())),
            },
            Some(other) => return Err(Rejection::UnknownAction(other.to_string())),
        };

        Ok(ValidatedFrame { code: code.clone(), action })
    }
}

/// 取出一个路由字段；值为空值时视为不存在。
fn routing_field<'a>(fields: &'a Map<String, Value>, name: &str) -> Option<&'a Value> {
    fields.get(name).filter(|value| !is_blank(value))
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(flag) => !flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n == 0.0),
        Value::String(text) => text.is_empty(),
        Value::Array(_) | Value::Object(_) => false,
    }
}
