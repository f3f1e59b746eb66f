// spacebuddy_relay/src/ws_server/message_router.rs

//! 负责处理从客户端接收到的每一帧：限流、校验、登记配对组，然后转发或安排测试回显。

use std::sync::Arc;

use common_models::RelayAction;
use log::{debug, error, warn};
use rust_websocket_utils::message::WsFrame;
use serde::Serialize;
use tokio::time::Instant;

use super::client_session::ClientSession;
use super::connection_manager::ConnectionManager;
use super::mask_code;
use super::message_validator::{MessageValidator, Rejection};
use super::rate_limiter::RateLimiter;
use super::test_echo_scheduler::TestEchoScheduler;
use crate::config::RelayConfig;

/// 一帧的处理结果，主要供日志和测试使用。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// 距上一条被接受的帧太近，静默丢弃。
    RateLimited,
    /// 校验未通过；JSON/配对码错误已回复发送方，未知动作静默丢弃。
    Rejected(Rejection),
    /// 已转发给同组其他可写成员，`recipients` 为实际入队的成员数。
    Relayed { recipients: usize },
    /// `TEST` 动作，已安排延迟自回显，不转发。
    TestEchoScheduled,
}

pub struct MessageRouter {
    connection_manager: Arc<ConnectionManager>,
    rate_limiter: RateLimiter,
    validator: MessageValidator,
    test_echo: TestEchoScheduler,
}

impl MessageRouter {
    pub fn new(connection_manager: Arc<ConnectionManager>, relay_config: &RelayConfig) -> Self {
        Self {
            connection_manager,
            rate_limiter: RateLimiter::from_millis(relay_config.rate_limit_ms),
            validator: MessageValidator::new(relay_config.min_code_len, relay_config.max_code_len),
            test_echo: TestEchoScheduler::from_millis(relay_config.test_echo_delay_ms),
        }
    }

    /// 处理发送方 `client_session` 的一帧。
    ///
    /// 同一连接的帧由调用方按到达顺序逐条调用；本方法不等待任何 I/O。
    pub fn handle_frame(&self, client_session: &Arc<ClientSession>, frame: WsFrame) -> RouteOutcome {
        if !client_session.try_accept(&self.rate_limiter, Instant::now()) {
            debug!("[MessageRouter] 客户端 {}: 超出频率限制，丢弃一帧。", client_session.client_id);
            return RouteOutcome::RateLimited;
        }

        let validated = match self.validator.validate(frame.as_str()) {
            Ok(validated) => validated,
            Err(rejection) => {
                match rejection.error_response() {
                    Some(payload) => {
                        warn!(
                            "[MessageRouter] 客户端 {}: 校验失败 ({})，已回复错误。",
                            client_session.client_id, payload.error
                        );
                        send_to(client_session, &payload);
                    }
                    None => {
                        warn!(
                            "[MessageRouter] 客户端 {}: 未知动作 {:?}，静默丢弃。",
                            client_session.client_id, rejection
                        );
                    }
                }
                return RouteOutcome::Rejected(rejection);
            }
        };

        // 第一条合法帧决定会话的配对码；之后帧里携带的其他配对码一律忽略
        if client_session.assign_code(&validated.code) {
            self.connection_manager.register(&validated.code, client_session);
        }
        let Some(code) = client_session.code() else {
            error!("[MessageRouter] 客户端 {}: 配对码分配后仍为空。", client_session.client_id);
            return RouteOutcome::Rejected(Rejection::InvalidCode);
        };

        if validated.action == Some(RelayAction::Test) {
            self.test_echo.schedule(client_session, code);
            return RouteOutcome::TestEchoScheduled;
        }

        let recipients = self.relay_frame(client_session, code, &frame);
        RouteOutcome::Relayed { recipients }
    }

    /// 把原始帧转发给 `code` 组内除发送方以外的所有可写成员，返回实际入队的成员数。
    ///
    /// 帧文本不做任何修改；不可写的成员静默跳过，没有重试。
    pub fn relay_frame(&self, sender: &ClientSession, code: &str, frame: &WsFrame) -> usize {
        let recipients = self
            .connection_manager
            .snapshot(code)
            .into_iter()
            .filter(|member| member.client_id != sender.client_id)
            .filter(|member| member.send(frame.clone()))
            .count();
        if recipients > 0 {
            debug!(
                "[MessageRouter] 客户端 {}: 帧已转发给配对码 {} 组内 {} 个客户端。",
                sender.client_id,
                mask_code(code),
                recipients
            );
        }
        recipients
    }
}

/// 辅助函数：向单个客户端发送一条服务端生成的帧。
fn send_to<T: Serialize>(client_session: &ClientSession, payload: &T) {
    match WsFrame::from_payload(payload) {
        Ok(frame) => {
            if !client_session.send(frame) {
                debug!("[MessageRouter] 客户端 {}: 响应未能入队，已跳过。", client_session.client_id);
            }
        }
        Err(e) => {
            error!("[MessageRouter] 客户端 {}: 创建响应帧失败: {}", client_session.client_id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use std::time::Duration;
    use tokio::sync::mpsc;

    struct Peer {
        session: Arc<ClientSession>,
        rx: mpsc::Receiver<WsFrame>,
    }

    impl Peer {
        fn drain(&mut self) -> Vec<String> {
            let mut frames = Vec::new();
            while let Ok(frame) = self.rx.try_recv() {
                frames.push(frame.as_str().to_string());
            }
            frames
        }
    }

    fn setup() -> (Arc<ConnectionManager>, MessageRouter) {
        let manager = Arc::new(ConnectionManager::new());
        let router = MessageRouter::new(Arc::clone(&manager), &RelayConfig::default());
        (manager, router)
    }

    fn connect(manager: &ConnectionManager) -> Peer {
        let (tx, rx) = mpsc::channel(16);
        let addr: SocketAddr = "127.0.0.1:45000".parse().unwrap();
        Peer { session: manager.add_client(addr, tx), rx }
    }

    async fn step() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    /// 发送一帧并等待一个限流间隔，便于同一连接连续发送。
    async fn send(router: &MessageRouter, peer: &Peer, text: &str) -> RouteOutcome {
        let outcome = router.handle_frame(&peer.session, WsFrame::text(text));
        step().await;
        outcome
    }

    #[tokio::test(start_paused = true)]
    async fn test_relays_verbatim_to_other_members_only() {
        let (manager, router) = setup();
        let mut a = connect(&manager);
        let mut b = connect(&manager);
        let mut c = connect(&manager);
        let mut outsider = connect(&manager);

        send(&router, &a, r#"{"code":"abc123","action":"REGISTER"}"#).await;
        send(&router, &b, r#"{"code":"abc123","action":"REGISTER"}"#).await;
        send(&router, &c, r#"{"key":"abc123"}"#).await;
        send(&router, &outsider, r#"{"code":"zzz"}"#).await;
        a.drain();
        b.drain();
        c.drain();

        let raw = r#"{"code":"abc123","action":"SPACEPUSHED","x":1,  "nested":{"k":[1,2]}}"#;
        assert_eq!(send(&router, &a, raw).await, RouteOutcome::Relayed { recipients: 2 });
        assert_eq!(b.drain(), vec![raw.to_string()]);
        assert_eq!(c.drain(), vec![raw.to_string()]);
        assert!(a.drain().is_empty(), "发送方不应收到自己的帧");
        assert!(outsider.drain().is_empty(), "其他配对码的连接不应收到帧");
    }

    #[tokio::test(start_paused = true)]
    async fn test_register_frame_is_relayed_like_any_other() {
        let (manager, router) = setup();
        let mut a = connect(&manager);
        let b = connect(&manager);

        send(&router, &a, r#"{"code":"abc123"}"#).await;
        let register = r#"{"code":"abc123","action":"REGISTER"}"#;
        assert_eq!(send(&router, &b, register).await, RouteOutcome::Relayed { recipients: 1 });
        assert_eq!(a.drain(), vec![register.to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_drops_silently() {
        let (manager, router) = setup();
        let mut a = connect(&manager);
        let mut b = connect(&manager);
        send(&router, &b, r#"{"code":"abc123"}"#).await;

        let first = r#"{"code":"abc123","n":1}"#;
        let second = r#"{"code":"abc123","n":2}"#;
        let third = r#"{"code":"abc123","n":3}"#;
        assert_eq!(router.handle_frame(&a.session, WsFrame::text(first)), RouteOutcome::Relayed { recipients: 1 });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(router.handle_frame(&a.session, WsFrame::text(second)), RouteOutcome::RateLimited);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(router.handle_frame(&a.session, WsFrame::text(third)), RouteOutcome::Relayed { recipients: 1 });

        assert_eq!(b.drain(), vec![first.to_string(), third.to_string()]);
        assert!(a.drain().is_empty(), "被限流的帧不应产生任何响应");
        assert_eq!(a.session.message_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_applies_before_validation() {
        let (manager, router) = setup();
        let mut a = connect(&manager);

        router.handle_frame(&a.session, WsFrame::text("garbage"));
        assert_eq!(router.handle_frame(&a.session, WsFrame::text("garbage")), RouteOutcome::RateLimited);
        assert_eq!(a.drain(), vec![r#"{"error":"Invalid JSON format"}"#.to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_json_and_code_reply_to_sender_only() {
        let (manager, router) = setup();
        let mut a = connect(&manager);
        let mut b = connect(&manager);
        send(&router, &b, r#"{"code":"abc123"}"#).await;

        assert_eq!(send(&router, &a, "not json").await, RouteOutcome::Rejected(Rejection::InvalidJson));
        assert_eq!(a.drain(), vec![r#"{"error":"Invalid JSON format"}"#.to_string()]);

        assert_eq!(send(&router, &a, r#"{"code":""}"#).await, RouteOutcome::Rejected(Rejection::InvalidCode));
        let long = format!(r#"{{"code":"{}"}}"#, "x".repeat(51));
        assert_eq!(send(&router, &a, &long).await, RouteOutcome::Rejected(Rejection::InvalidCode));
        assert_eq!(a.drain(), vec![r#"{"error":"Invalid code"}"#.to_string(); 2]);

        assert!(b.drain().is_empty());
        assert_eq!(a.session.code(), None, "校验失败的帧不能分配配对码");
        assert_eq!(manager.group_size("abc123"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_action_is_silent_and_connection_stays_usable() {
        let (manager, router) = setup();
        let mut a = connect(&manager);
        let mut b = connect(&manager);
        send(&router, &b, r#"{"code":"abc123"}"#).await;

        let outcome = send(&router, &a, r#"{"code":"abc123","action":"BOGUS"}"#).await;
        assert_eq!(outcome, RouteOutcome::Rejected(Rejection::UnknownAction("BOGUS".into())));
        assert!(a.drain().is_empty());
        assert!(b.drain().is_empty());
        assert_eq!(a.session.code(), None, "未知动作的帧不产生分组副作用");

        let valid = r#"{"code":"abc123","action":"SPACEPUSHED"}"#;
        assert_eq!(send(&router, &a, valid).await, RouteOutcome::Relayed { recipients: 1 });
        assert_eq!(b.drain(), vec![valid.to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_group_membership_fixed_by_first_valid_frame() {
        let (manager, router) = setup();
        let a = connect(&manager);
        let mut b = connect(&manager);
        let mut c = connect(&manager);
        send(&router, &b, r#"{"code":"first"}"#).await;
        send(&router, &c, r#"{"code":"second"}"#).await;

        send(&router, &a, r#"{"code":"first"}"#).await;
        b.drain();
        let switched = r#"{"code":"second","action":"SPACEPUSHED"}"#;
        send(&router, &a, switched).await;

        assert_eq!(a.session.code(), Some("first"));
        assert_eq!(b.drain(), vec![switched.to_string()], "仍按首次配对码转发");
        assert!(c.drain().is_empty());
        assert_eq!(manager.group_size("second"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_test_action_echoes_to_sender_only_after_delay() {
        let (manager, router) = setup();
        let mut a = connect(&manager);
        let mut b = connect(&manager);
        send(&router, &b, r#"{"code":"abc123"}"#).await;

        let outcome = router.handle_frame(&a.session, WsFrame::text(r#"{"code":"abc123","action":"TEST"}"#));
        assert_eq!(outcome, RouteOutcome::TestEchoScheduled);
        assert_eq!(manager.group_size("abc123"), 2, "TEST 帧同样完成登记");

        tokio::time::sleep(Duration::from_millis(3900)).await;
        assert!(a.drain().is_empty());
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(a.drain(), vec![r#"{"action":"SPACEPUSHED","code":"abc123"}"#.to_string()]);
        assert!(b.drain().is_empty(), "TEST 帧不转发给组内其他成员");
    }

    #[tokio::test(start_paused = true)]
    async fn test_test_echo_skipped_when_sender_disconnects() {
        let (manager, router) = setup();
        let mut a = connect(&manager);

        router.handle_frame(&a.session, WsFrame::text(r#"{"code":"abc123","action":"TEST"}"#));
        manager.cleanup(&a.session);
        tokio::time::sleep(Duration::from_millis(4100)).await;
        assert!(a.drain().is_empty());
        assert_eq!(manager.group_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_members_are_skipped() {
        let (manager, router) = setup();
        let a = connect(&manager);
        let mut b = connect(&manager);
        let mut c = connect(&manager);
        send(&router, &b, r#"{"code":"abc123"}"#).await;
        send(&router, &c, r#"{"code":"abc123"}"#).await;
        b.drain();
        c.session.mark_closed();

        let raw = r#"{"code":"abc123","action":"SPACEPUSHED"}"#;
        assert_eq!(send(&router, &a, raw).await, RouteOutcome::Relayed { recipients: 1 });
        assert_eq!(b.drain(), vec![raw.to_string()]);
        assert!(c.drain().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_emptied_group_has_no_residual_state() {
        let (manager, router) = setup();
        let a = connect(&manager);
        let b = connect(&manager);
        send(&router, &a, r#"{"code":"abc123"}"#).await;
        send(&router, &b, r#"{"code":"abc123"}"#).await;
        manager.cleanup(&a.session);
        manager.cleanup(&b.session);
        assert_eq!(manager.group_count(), 0);

        let mut fresh = connect(&manager);
        send(&router, &fresh, r#"{"code":"abc123"}"#).await;
        assert!(fresh.drain().is_empty());
        assert_eq!(manager.group_size("abc123"), 1);
    }
}
