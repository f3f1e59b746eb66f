use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock, PoisonError};

use chrono::{DateTime, Utc};
use log::{debug, warn};
use rust_websocket_utils::message::WsFrame;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::Instant;
use uuid::Uuid;

use super::rate_limiter::RateLimiter;

/// 代表一个已连接到服务器的 WebSocket 客户端的会话状态及相关句柄。
///
/// 每个成功建立的 WebSocket 连接都会在服务端对应一个 `ClientSession` 实例。
/// 连接上的可变状态（配对码、限流时间戳、消息计数、是否可写）都由会话自己持有，
/// 不依附在传输层句柄上。
#[derive(Debug)]
pub struct ClientSession {
    /// 由服务端在此会话创建时生成的唯一客户端标识符 (UUID v4)。
    pub client_id: Uuid,

    /// 客户端连接的源网络地址。
    pub addr: SocketAddr,

    /// 此客户端会话在服务端被创建的时间戳 (UTC)。
    pub creation_time: DateTime<Utc>,

    /// 出站队列的发送端，由该连接的发送任务负责真正写出。
    sender: mpsc::Sender<WsFrame>,

    /// 第一条合法帧携带的配对码；一经设置永不改变。
    code: OnceLock<String>,

    /// 最近一次被限流器放行的时间，`None` 表示还没有放行过任何帧。
    last_accepted_at: Mutex<Option<Instant>>,

    /// 被放行的帧数，仅用于诊断。
    message_count: AtomicU64,

    /// 底层连接是否仍然可写。
    is_open: AtomicBool,

    /// 断开清理是否已经执行过，保证清理只发生一次。
    cleaned_up: AtomicBool,
}

impl ClientSession {
    /// 创建一个新的 `ClientSession` 实例。
    ///
    /// # 参数
    /// * `addr`: 新连接客户端的网络源地址。
    /// * `sender`: 该连接出站队列的发送端。
    pub fn new(addr: SocketAddr, sender: mpsc::Sender<WsFrame>) -> Self {
        Self {
            client_id: Uuid::new_v4(),
            addr,
            creation_time: Utc::now(),
            sender,
            code: OnceLock::new(),
            last_accepted_at: Mutex::new(None),
            message_count: AtomicU64::new(0),
            is_open: AtomicBool::new(true),
            cleaned_up: AtomicBool::new(false),
        }
    }

    /// 已分配的配对码；尚未收到合法帧时为 `None`。
    pub fn code(&self) -> Option<&str> {
        self.code.get().map(String::as_str)
    }

    /// 尝试固定配对码。只有第一次调用会生效，返回 `true` 表示本次完成了分配。
    pub fn assign_code(&self, code: &str) -> bool {
        self.code.set(code.to_string()).is_ok()
    }

    /// 限流闸门：放行时更新上次接受时间并把计数加一。
    ///
    /// 检查与更新在同一把锁内完成，同一连接上不会出现两帧同时被放行。
    pub fn try_accept(&self, limiter: &RateLimiter, now: Instant) -> bool {
        let mut last_accepted_at = self.last_accepted_at.lock().unwrap_or_else(PoisonError::into_inner);
        if !limiter.allows(now, *last_accepted_at) {
            return false;
        }
        *last_accepted_at = Some(now);
        self.message_count.fetch_add(1, Ordering::Relaxed);
        true
    }

    pub fn message_count(&self) -> u64 {
        self.message_count.load(Ordering::Relaxed)
    }

    pub fn is_open(&self) -> bool {
        self.is_open.load(Ordering::SeqCst)
    }

    pub fn mark_closed(&self) {
        self.is_open.store(false, Ordering::SeqCst);
    }

    /// 第一次调用返回 `true`，之后都返回 `false`。
    pub(crate) fn begin_cleanup(&self) -> bool {
        !self.cleaned_up.swap(true, Ordering::SeqCst)
    }

    /// 把一帧放入出站队列，不等待。
    ///
    /// 连接已关闭、队列已满或发送任务已退出时都视为“当前不可写”，直接跳过并返回 `false`。
    pub fn send(&self, frame: WsFrame) -> bool {
        if !self.is_open() {
            return false;
        }
        match self.sender.try_send(frame) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!("[ClientSession] 客户端 {} 出站队列已满，丢弃一帧。", self.client_id);
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!("[ClientSession] 客户端 {} 发送任务已结束，丢弃一帧。", self.client_id);
                false
            }
        }
    }
}
