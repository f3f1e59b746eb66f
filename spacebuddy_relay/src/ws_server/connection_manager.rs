// spacebuddy_relay/src/ws_server/connection_manager.rs

//! WebSocket 连接管理：全部活动会话，以及按配对码分组的成员关系。

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use log::{debug, info, warn};
use rust_websocket_utils::message::WsFrame;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::client_session::ClientSession;
use super::mask_code;

/// 一个配对组的成员，按 `client_id` 索引。
type GroupMembers = HashMap<Uuid, Arc<ClientSession>>;

/// 管理所有活动的 WebSocket 客户端会话及其所属配对组。
///
/// 两张表都使用 `DashMap`：对同一个配对码的增删在同一把分片锁内完成，
/// 读取快照时不会看到更新到一半的组。组内没有成员时条目立即删除，不保留空组。
#[derive(Debug, Clone, Default)]
pub struct ConnectionManager {
    /// Key: client_id，Value: 会话
    clients: Arc<DashMap<Uuid, Arc<ClientSession>>>,
    /// Key: 配对码，Value: 组成员
    groups: Arc<DashMap<String, GroupMembers>>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// 为新接受的连接创建会话并加入活动列表。此时会话尚未属于任何组。
    pub fn add_client(&self, addr: SocketAddr, sender: mpsc::Sender<WsFrame>) -> Arc<ClientSession> {
        let client_session = Arc::new(ClientSession::new(addr, sender));
        self.clients.insert(client_session.client_id, Arc::clone(&client_session));
        info!(
            "[ConnectionManager] 新客户端连接: id={}, addr={}",
            client_session.client_id, client_session.addr
        );
        debug!("[ConnectionManager] 当前活动客户端总数: {}", self.clients.len());
        client_session
    }

    pub fn get_client(&self, client_id: &Uuid) -> Option<Arc<ClientSession>> {
        self.clients.get(client_id).map(|entry| Arc::clone(entry.value()))
    }

    /// 从活动列表中移除会话。不处理组成员关系，断开清理请使用 [`ConnectionManager::cleanup`]。
    pub fn remove_client(&self, client_id: &Uuid) -> Option<Arc<ClientSession>> {
        match self.clients.remove(client_id) {
            Some((_id, session)) => {
                let connected_for = Utc::now().signed_duration_since(session.creation_time);
                info!(
                    "[ConnectionManager] 客户端断开连接: id={}, addr={}, 已接受消息数={}, 连接时长={}ms",
                    session.client_id,
                    session.addr,
                    session.message_count(),
                    connected_for.num_milliseconds()
                );
                Some(session)
            }
            None => {
                warn!("[ConnectionManager] 尝试移除不存在的客户端: id={}", client_id);
                None
            }
        }
    }

    /// 把会话加入 `code` 对应的组，组不存在时创建。重复登记同一会话不产生任何变化。
    pub fn register(&self, code: &str, session: &Arc<ClientSession>) {
        let mut members = self.groups.entry(code.to_string()).or_default();
        if members.insert(session.client_id, Arc::clone(session)).is_none() {
            info!(
                "[ConnectionManager] 客户端 {} 登记到配对码 {}，组内成员数: {}",
                session.client_id,
                mask_code(code),
                members.len()
            );
        }
    }

    /// 把会话移出其所属的组；组因此变空时删除组条目。
    ///
    /// 会话从未分配配对码或已不在组内时什么也不做。返回是否真的移除了成员。
    pub fn unregister(&self, session: &ClientSession) -> bool {
        let Some(code) = session.code() else {
            return false;
        };
        // 移除成员与删除空组在同一把分片锁内完成，并发读取看不到空组
        match self.groups.entry(code.to_string()) {
            Entry::Occupied(mut group) => {
                let removed = group.get_mut().remove(&session.client_id).is_some();
                if group.get().is_empty() {
                    group.remove();
                    debug!("[ConnectionManager] 配对码 {} 的组已清空并删除。", mask_code(code));
                }
                removed
            }
            Entry::Vacant(_) => false,
        }
    }

    /// 返回 `code` 对应组当前成员的副本，可在不持有任何锁的情况下遍历。
    pub fn snapshot(&self, code: &str) -> Vec<Arc<ClientSession>> {
        self.groups
            .get(code)
            .map(|members| members.values().cloned().collect())
            .unwrap_or_default()
    }

    /// 连接关闭或出错时的清理：标记不可写、退出配对组、移出活动列表。
    ///
    /// 无论调用多少次，只有第一次生效。
    pub fn cleanup(&self, session: &ClientSession) {
        if !session.begin_cleanup() {
            debug!("[ConnectionManager] 客户端 {} 已清理过，忽略重复调用。", session.client_id);
            return;
        }
        session.mark_closed();
        self.unregister(session);
        self.remove_client(&session.client_id);
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// 组内成员数；组不存在时为 0。
    pub fn group_size(&self, code: &str) -> usize {
        self.groups.get(code).map(|members| members.len()).unwrap_or(0)
    }
}
