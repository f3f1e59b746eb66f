// spacebuddy_relay/src/health.rs

//! 健康检查 HTTP 接口。
//!
//! 只提供一个 `GET /health`，返回当前连接数、配对组数和运行时长，供部署环境探活使用。

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use log::info;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::config::HealthConfig;
use crate::error::AppError;
use crate::ws_server::connection_manager::ConnectionManager;

#[derive(Clone)]
pub struct HealthState {
    connection_manager: Arc<ConnectionManager>,
    started_at: Instant,
}

impl HealthState {
    pub fn new(connection_manager: Arc<ConnectionManager>) -> Self {
        Self {
            connection_manager,
            started_at: Instant::now(),
        }
    }
}

/// `GET /health` 的响应体
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct HealthReport {
    pub status: String,
    pub connections: usize,
    pub groups: usize,
    pub uptime_secs: u64,
}

pub fn router(state: HealthState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn health_handler(State(state): State<HealthState>) -> Json<HealthReport> {
    Json(HealthReport {
        status: "ok".to_string(),
        connections: state.connection_manager.client_count(),
        groups: state.connection_manager.group_count(),
        uptime_secs: state.started_at.elapsed().as_secs(),
    })
}

/// 绑定 `config` 中的地址并提供健康检查接口，直到 `shutdown` 完成。
pub async fn serve_health<S>(config: &HealthConfig, connection_manager: Arc<ConnectionManager>, shutdown: S) -> Result<(), AppError>
where
    S: Future<Output = ()> + Send + 'static,
{
    let listen_addr = config.listen_addr();
    let listener = TcpListener::bind(&listen_addr)
        .await
        .map_err(|e| AppError::Health(format!("无法绑定 {}: {}", listen_addr, e)))?;
    serve_on(listener, HealthState::new(connection_manager), shutdown).await
}

/// 在已绑定的监听器上提供健康检查接口。
pub async fn serve_on<S>(listener: TcpListener, state: HealthState, shutdown: S) -> Result<(), AppError>
where
    S: Future<Output = ()> + Send + 'static,
{
    info!("[HealthService] 健康检查接口已启动: http://{}/health", listener.local_addr()?);
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| AppError::Health(e.to_string()))?;
    info!("[HealthService] 健康检查接口已停止。");
    Ok(())
}
