// spacebuddy_relay/src/ws_server/test_echo_scheduler.rs

//! `TEST` 动作的延迟自回显。
//!
//! 收到 `TEST` 后，在固定延迟之后只向发送方本人回送一条 `SPACEPUSHED`，用于探测往返链路。
//! 每次请求派生一个独立的一次性任务，不阻塞该连接或其他连接的消息处理。
//! 任务只持有会话的弱引用，连接提前断开时不会延长会话的生命周期；
//! 触发时发现连接已关闭则静默结束，不发送也不报错。

use std::sync::{Arc, Weak};
use std::time::Duration;

use common_models::ws_payloads::SpacePushedPayload;
use log::{debug, error, info};
use rust_websocket_utils::message::WsFrame;
use tokio::task::JoinHandle;

use super::client_session::ClientSession;
use super::mask_code;

#[derive(Debug, Clone, Copy)]
pub struct TestEchoScheduler {
    delay: Duration,
}

impl TestEchoScheduler {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    pub fn from_millis(delay_ms: u64) -> Self {
        Self::new(Duration::from_millis(delay_ms))
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// 安排一次延迟回显。配对码在安排时按值捕获。
    ///
    /// 返回的句柄完成时给出是否真的发出了回显；调用方通常直接丢弃句柄。
    pub fn schedule(&self, session: &Arc<ClientSession>, code: &str) -> JoinHandle<bool> {
        let delay = self.delay();
        let target: Weak<ClientSession> = Arc::downgrade(session);
        let client_id = session.client_id;
        let code = code.to_string();
        info!(
            "[TestEcho] 客户端 {} 请求测试回显 (配对码 {})，将在 {:?} 后回送。",
            client_id,
            mask_code(&code),
            delay
        );

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            let Some(session) = target.upgrade().filter(|session| session.is_open()) else {
                debug!("[TestEcho] 客户端 {} 已断开，取消测试回显。", client_id);
                return false;
            };
            let frame = match WsFrame::from_payload(&SpacePushedPayload::new(code)) {
                Ok(frame) => frame,
                Err(e) => {
                    error!("[TestEcho] 构造测试回显帧失败: {}", e);
                    return false;
                }
            };
            let delivered = session.send(frame);
            if delivered {
                info!("[TestEcho] 已向客户端 {} 发送测试回显。", client_id);
            }
            delivered
        })
    }
}
