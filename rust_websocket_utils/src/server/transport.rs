// rust_websocket_utils/src/server/transport.rs

//! 包含服务端 WebSocket 监听、接受连接和通信逻辑。

use std::future::Future;
use std::net::SocketAddr;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::protocol::{Message, WebSocketConfig};
use tokio_tungstenite::{accept_async_with_config, WebSocketStream};

use crate::error::WsError;
use crate::message::{self, WsFrame};

/// `WsStream` 是一个类型别名，代表经过 WebSocket 握手后的 TCP 流。
pub type WsStream = WebSocketStream<TcpStream>;

/// 连接的读端。
pub type FrameReceiver = SplitStream<WsStream>;

/// 单个客户端连接的写端。
///
/// 由服务端在握手成功后创建，连同读端一起交给 `on_connect` 回调。
/// 上层通常把它移入一个专门的发送任务中。
pub struct ConnectionHandler {
    ws_sender: SplitSink<WsStream, Message>,
    peer_addr: SocketAddr,
}

impl ConnectionHandler {
    /// 对端地址。
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// 向客户端写出一条文本帧。
    pub async fn send_frame(&mut self, frame: &WsFrame) -> Result<(), WsError> {
        self.ws_sender.send(frame.to_message()).await?;
        debug!("[ServerTransport] 已向 {} 发送 {} 字节", self.peer_addr, frame.len());
        Ok(())
    }

    /// 发送 Close 帧并冲刷写端。对端已断开时返回的错误可以忽略。
    pub async fn close(&mut self) -> Result<(), WsError> {
        self.ws_sender.close().await?;
        Ok(())
    }
}

/// 从连接读端异步接收下一条文本帧。
///
/// 返回 `None` 表示连接已正常关闭；返回 `Some(Err(..))` 表示底层出错，
/// 其中包括帧超过握手时设定的大小上限。
pub async fn receive_frame(ws_receiver: &mut FrameReceiver) -> Option<Result<WsFrame, WsError>> {
    message::next_frame(ws_receiver).await
}

/// `ServerTransport` 结构体负责处理 WebSocket 服务端的监听和连接接受。
pub struct ServerTransport {
    listener: TcpListener,
    ws_config: WebSocketConfig,
}

impl ServerTransport {
    /// 绑定监听地址。
    ///
    /// `max_message_size` 同时作为单条消息和单个帧的字节上限，超过上限的连接会在读端收到错误。
    /// 传入 `127.0.0.1:0` 可以让系统分配端口，再通过 [`ServerTransport::local_addr`] 取得实际地址。
    pub async fn bind(addr: &str, max_message_size: usize) -> Result<Self, WsError> {
        let listener = TcpListener::bind(addr).await?;
        let mut ws_config = WebSocketConfig::default();
        ws_config.max_message_size = Some(max_message_size);
        ws_config.max_frame_size = Some(max_message_size);
        info!(
            "[ServerTransport] 已绑定监听地址: {}，单条消息上限: {} 字节",
            listener.local_addr()?,
            max_message_size
        );
        Ok(Self { listener, ws_config })
    }

    /// 实际绑定的本地地址。
    pub fn local_addr(&self) -> Result<SocketAddr, WsError> {
        Ok(self.listener.local_addr()?)
    }

    /// 持续接受新连接，直到 `shutdown` 完成。
    ///
    /// 每个 TCP 连接在独立的 Tokio 任务中完成握手，成功后调用 `on_connect`。
    /// 接受失败和握手失败只记录日志，监听循环继续运行。
    /// `shutdown` 完成后停止接受新连接；已经建立的连接任务不受影响。
    pub async fn serve<F, Fut, S>(self, on_connect: F, shutdown: S) -> Result<(), WsError>
    where
        F: Fn(ConnectionHandler, FrameReceiver) -> Fut + Send + Sync + Clone + 'static,
        Fut: Future<Output = ()> + Send + 'static,
        S: Future<Output = ()> + Send,
    {
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("[ServerTransport] 收到关闭信号，停止接受新连接。");
                    break;
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((tcp_stream, peer_addr)) => {
                        debug!("[ServerTransport] 从 {} 接受了新的 TCP 连接", peer_addr);
                        let on_connect_callback = on_connect.clone();
                        let ws_config = self.ws_config.clone();
                        tokio::spawn(async move {
                            match accept_async_with_config(tcp_stream, Some(ws_config)).await {
                                Ok(ws_stream) => {
                                    debug!("[ServerTransport] 与 {} 的 WebSocket 握手成功", peer_addr);
                                    let (ws_sender, ws_receiver) = ws_stream.split();
                                    let handler = ConnectionHandler { ws_sender, peer_addr };
                                    on_connect_callback(handler, ws_receiver).await;
                                }
                                Err(e) => {
                                    warn!("[ServerTransport] 与 {} 的 WebSocket 握手失败: {}", peer_addr, e);
                                }
                            }
                        });
                    }
                    Err(e) => {
                        error!("[ServerTransport] 接受 TCP 连接失败: {}。服务器将继续运行。", e);
                    }
                }
            }
        }
        Ok(())
    }
}
