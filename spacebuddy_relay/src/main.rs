use std::sync::Arc;

use anyhow::Context;
use log::{error, info, LevelFilter};
use spacebuddy_relay::config::AppConfig;
use spacebuddy_relay::health::serve_health;
use spacebuddy_relay::ws_server::connection_manager::ConnectionManager;
use spacebuddy_relay::ws_server::service::WsService;
use tokio::sync::watch;
use tokio::task::JoinHandle;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志记录器，RUST_LOG 可覆盖默认级别
    env_logger::Builder::new()
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .format_timestamp_millis()
        .init();
    info!("[主程序] 日志系统已成功初始化 (env_logger)，默认级别: Info。");

    let app_config = AppConfig::load().context("加载配置失败")?;
    info!(
        "[主程序] 应用配置已加载 (mode={})。WebSocket 地址: {}",
        app_config.mode,
        app_config.websocket.listen_addr()
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("[主程序] 收到退出信号，开始关闭服务...");
        let _ = shutdown_tx.send(true);
    });

    let connection_manager = Arc::new(ConnectionManager::new());
    info!("[主程序] WebSocket 连接管理器 (ConnectionManager) 已创建。");

    let health_task = if app_config.health.enabled {
        let health_config = app_config.health.clone();
        let manager = Arc::clone(&connection_manager);
        let rx = shutdown_rx.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = serve_health(&health_config, manager, wait_for_shutdown(rx)).await {
                error!("[主程序] 健康检查接口异常退出: {}", e);
            }
        }))
    } else {
        info!("[主程序] 健康检查接口已禁用。");
        None
    };

    let ws_service = WsService::new(app_config, connection_manager);
    info!("[主程序] 正在启动 WebSocket 服务...");
    ws_service
        .start(wait_for_shutdown(shutdown_rx))
        .await
        .context("WebSocket 服务运行失败")?;

    if let Some(task) = health_task {
        join_background_task("健康检查", task).await;
    }
    info!("[主程序] 服务已退出。");
    Ok(())
}

/// 等待后台任务结束；任务 panic 或被取消时记录错误。返回任务是否正常结束。
async fn join_background_task(name: &str, task: JoinHandle<()>) -> bool {
    match task.await {
        Ok(()) => true,
        Err(e) => {
            error!("[主程序] {}任务异常结束: {:?}", name, e);
            false
        }
    }
}

/// 等待 Ctrl+C，Unix 平台上同时等待 SIGTERM。
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("[主程序] 无法监听 Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("[主程序] 无法监听 SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

async fn wait_for_shutdown(mut rx: watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            // 发送端已丢弃，视为不再会有退出信号
            std::future::pending::<()>().await;
        }
    }
}
