// spacebuddy_relay/src/ws_server/service.rs

//! WebSocket 中继服务：绑定监听、为每个连接建立会话、收发循环以及断开清理。

use std::future::Future;
use std::sync::Arc;

use log::{debug, error, info, warn};
use rust_websocket_utils::error::WsError;
use rust_websocket_utils::message::WsFrame;
use rust_websocket_utils::server::transport::{receive_frame, ConnectionHandler, FrameReceiver, ServerTransport};
use tokio::sync::{mpsc, oneshot};

use crate::config::AppConfig;
use crate::error::AppError;
use crate::ws_server::client_session::ClientSession;
use crate::ws_server::connection_manager::ConnectionManager;
use crate::ws_server::message_router::{MessageRouter, RouteOutcome};

/// WebSocket 服务结构体，封装了配置、连接管理器和消息路由器。
#[derive(Clone)]
pub struct WsService {
    config: AppConfig,
    connection_manager: Arc<ConnectionManager>,
    router: Arc<MessageRouter>,
}

impl WsService {
    /// 创建一个新的 WsService 实例。
    pub fn new(config: AppConfig, connection_manager: Arc<ConnectionManager>) -> Self {
        let router = Arc::new(MessageRouter::new(Arc::clone(&connection_manager), &config.relay));
        info!("[WsService] 新实例已创建。");
        Self {
            config,
            connection_manager,
            router,
        }
    }

    pub fn connection_manager(&self) -> &Arc<ConnectionManager> {
        &self.connection_manager
    }

    /// 按配置绑定监听地址，单条消息上限取 `websocket.max_message_bytes`。
    pub async fn bind(&self) -> Result<ServerTransport, AppError> {
        let listen_addr = self.config.websocket.listen_addr();
        info!(
            "[WsService] 正在绑定 {}，限流间隔 {} ms，TEST 回显延迟 {} ms",
            listen_addr, self.config.relay.rate_limit_ms, self.config.relay.test_echo_delay_ms
        );
        ServerTransport::bind(&listen_addr, self.config.websocket.max_message_bytes)
            .await
            .map_err(|e| AppError::WebSocketService(format!("无法绑定 {}: {}", listen_addr, e)))
    }

    /// 在已绑定的传输层上运行服务，直到 `shutdown` 完成。
    pub async fn serve<S>(self, transport: ServerTransport, shutdown: S) -> Result<(), AppError>
    where
        S: Future<Output = ()> + Send,
    {
        let on_connect = move |handler: ConnectionHandler, receiver: FrameReceiver| {
            let service = self.clone();
            async move { service.handle_connection(handler, receiver).await }
        };
        transport.serve(on_connect, shutdown).await?;
        info!("[WsService] 监听循环已停止。");
        Ok(())
    }

    /// 绑定并运行服务。
    pub async fn start<S>(self, shutdown: S) -> Result<(), AppError>
    where
        S: Future<Output = ()> + Send,
    {
        let transport = self.bind().await?;
        self.serve(transport, shutdown).await
    }

    /// 单个连接的完整生命周期。
    ///
    /// 读循环逐帧顺序处理；出站帧经有界队列交给独立的发送任务写出，
    /// 因此一个慢连接不会阻塞其他连接的转发。
    pub async fn handle_connection(&self, handler: ConnectionHandler, mut receiver: FrameReceiver) {
        let (tx, rx) = mpsc::channel::<WsFrame>(self.config.relay.outbound_queue_capacity);
        let client_session = self.connection_manager.add_client(handler.peer_addr(), tx);
        info!(
            "[WsService] 新客户端已连接: SessionID={}, Addr={}",
            client_session.client_id, client_session.addr
        );

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let sender_task = tokio::spawn(run_sender(handler, rx, stop_rx, Arc::clone(&client_session)));

        loop {
            match receive_frame(&mut receiver).await {
                Some(Ok(frame)) => {
                    let outcome = self.router.handle_frame(&client_session, frame);
                    if let RouteOutcome::Relayed { recipients } = outcome {
                        debug!(
                            "[WsService] SessionID {}: 帧已转发给 {} 个客户端。",
                            client_session.client_id, recipients
                        );
                    }
                }
                Some(Err(WsError::WebSocketProtocolError(e))) => {
                    warn!(
                        "[WsService] SessionID {}: WebSocket 协议错误: {}。断开连接。",
                        client_session.client_id, e
                    );
                    break;
                }
                Some(Err(e)) => {
                    error!(
                        "[WsService] SessionID {}: 接收消息失败: {}。断开连接。",
                        client_session.client_id, e
                    );
                    break;
                }
                None => {
                    info!("[WsService] SessionID {}: 客户端已关闭连接。", client_session.client_id);
                    break;
                }
            }
        }

        self.connection_manager.cleanup(&client_session);
        let _ = stop_tx.send(());
        if let Err(e) = sender_task.await {
            error!(
                "[WsService] SessionID {}: 发送任务异常结束: {:?}",
                client_session.client_id, e
            );
        }
        info!(
            "[WsService] SessionID {} (Addr: {}) 清理完成，共处理 {} 条消息。",
            client_session.client_id,
            client_session.addr,
            client_session.message_count()
        );
    }
}

/// 发送任务：把出站队列里的帧逐条写出，直到收到停止信号、队列关闭或写出失败。
async fn run_sender(
    mut handler: ConnectionHandler,
    mut rx: mpsc::Receiver<WsFrame>,
    mut stop_rx: oneshot::Receiver<()>,
    client_session: Arc<ClientSession>,
) {
    let client_id = client_session.client_id;
    loop {
        tokio::select! {
            biased;
            _ = &mut stop_rx => {
                debug!("[SenderTask {}] 收到停止信号。", client_id);
                break;
            }
            maybe_frame = rx.recv() => match maybe_frame {
                Some(frame) => {
                    if let Err(e) = handler.send_frame(&frame).await {
                        warn!("[SenderTask {}] 写出失败，视为连接已断开: {}", client_id, e);
                        client_session.mark_closed();
                        break;
                    }
                }
                None => {
                    debug!("[SenderTask {}] 出站队列已关闭。", client_id);
                    break;
                }
            }
        }
    }
    let _ = handler.close().await;
    debug!("[SenderTask {}] 发送任务结束。", client_id);
}
