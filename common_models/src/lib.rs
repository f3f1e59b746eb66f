//! `common_models` 公共模型库 crate。
//!
//! 本 crate 集中定义了 SpaceBuddy 中继服务与其客户端之间共享的线上词汇：
//! - **通用枚举 (`enums`)**: 中继可识别的动作 `RelayAction`（`SPACEPUSHED` / `TEST` / `REGISTER`）。
//! - **WebSocket 消息负载 (`ws_payloads`)**: 服务端自己产生的帧（错误响应、测试回显）。
//!
//! 中继转发的帧对服务端来说是不透明的，这里只描述服务端需要读取或生成的那一小部分字段。

pub mod enums;
pub mod ws_payloads;

pub use enums::RelayAction;
