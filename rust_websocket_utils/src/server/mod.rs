// rust_websocket_utils/src/server/mod.rs

//! WebSocket 服务端模块。
//!
//! 主要职责包括：
//! - **服务器启动与监听**: 在指定地址上绑定监听器，直到关闭信号到来。
//! - **握手与帧大小上限**: 为每个新连接完成 WebSocket 握手，并限制单条消息/单帧的最大字节数，
//!   超限的连接只影响自身，不会拖垮监听循环或其他连接。
//! - **收发拆分**: 握手成功后把连接拆为写端 `ConnectionHandler` 与读端 `FrameReceiver`，交给上层回调。

pub mod transport;
