//! 中继服务配置模块。
//!
//! 加载顺序：内置默认值 → 可选的 JSON 配置文件 → 环境变量覆盖。
//! 配置文件不存在不算错误；文件内容损坏时记录警告并继续使用默认值；
//! 环境变量取值无法解析时视为配置错误，启动直接失败。

use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::AppError;

/// WebSocket 服务的默认主机地址
pub const DEFAULT_WS_HOST: &str = "0.0.0.0";
/// WebSocket 服务的默认端口号
pub const DEFAULT_WS_PORT: u16 = 8080;
/// 单条 WebSocket 消息的默认字节上限
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 1024;
/// 同一连接两条被接受消息之间的最小间隔（毫秒）
pub const DEFAULT_RATE_LIMIT_MS: u64 = 50;
/// 配对码长度下限（含）
pub const DEFAULT_MIN_CODE_LEN: usize = 1;
/// 配对码长度上限（含）
pub const DEFAULT_MAX_CODE_LEN: usize = 50;
/// `TEST` 动作自回显的延迟（毫秒）
pub const DEFAULT_TEST_ECHO_DELAY_MS: u64 = 4000;
/// 每个连接出站队列的容量
pub const DEFAULT_OUTBOUND_QUEUE_CAPACITY: usize = 32;
/// 健康检查 HTTP 接口的默认端口号
pub const DEFAULT_HEALTH_PORT: u16 = 8081;
/// 未指定路径时在当前目录查找的配置文件名
pub const DEFAULT_CONFIG_FILE: &str = "app_settings.json";

/// WebSocket 服务端详细配置结构体
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct WebSocketConfig {
    /// WebSocket 服务绑定的主机地址
    pub host: String,
    /// WebSocket 服务监听的端口号
    pub port: u16,
    /// 单条消息（以及单帧）的最大字节数，超出的连接由传输层拒绝
    pub max_message_bytes: usize,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_WS_HOST.to_string(),
            port: DEFAULT_WS_PORT,
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
        }
    }
}

impl WebSocketConfig {
    /// `host:port` 形式的监听地址。
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// 中继行为相关的参数
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct RelayConfig {
    pub rate_limit_ms: u64,
    pub min_code_len: usize,
    pub max_code_len: usize,
    pub test_echo_delay_ms: u64,
    pub outbound_queue_capacity: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            rate_limit_ms: DEFAULT_RATE_LIMIT_MS,
            min_code_len: DEFAULT_MIN_CODE_LEN,
            max_code_len: DEFAULT_MAX_CODE_LEN,
            test_echo_delay_ms: DEFAULT_TEST_ECHO_DELAY_MS,
            outbound_queue_capacity: DEFAULT_OUTBOUND_QUEUE_CAPACITY,
        }
    }
}

/// 健康检查接口配置
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct HealthConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: DEFAULT_WS_HOST.to_string(),
            port: DEFAULT_HEALTH_PORT,
        }
    }
}

impl HealthConfig {
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// 应用的主配置结构体
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// 运行模式，仅用于启动日志（例如 `development`、`production`）
    pub mode: String,
    /// WebSocket 服务的相关配置
    pub websocket: WebSocketConfig,
    /// 中继行为配置
    pub relay: RelayConfig,
    /// 健康检查接口配置
    pub health: HealthConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            mode: "development".to_string(),
            websocket: WebSocketConfig::default(),
            relay: RelayConfig::default(),
            health: HealthConfig::default(),
        }
    }
}

impl AppConfig {
    /// 按 默认值 → 配置文件 → 环境变量 的顺序加载并校验配置。
    pub fn load() -> Result<Self, AppError> {
        let config_file_path = get_config_file_path();
        let mut config = load_from_file(&config_file_path);
        config.apply_env_overrides(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// 用 `lookup` 提供的环境变量覆盖当前配置。
    ///
    /// `lookup` 通常是 `std::env::var`，测试中传入一个固定的映射。
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = parse_env(&lookup, "PORT")? {
            self.websocket.port = port;
        }
        if let Some(host) = lookup("HOST").filter(|v| !v.trim().is_empty()) {
            self.websocket.host = host.trim().to_string();
        }
        if let Some(port) = parse_env(&lookup, "HEALTH_PORT")? {
            self.health.port = port;
        }
        if let Some(enabled) = parse_env(&lookup, "HEALTH_ENABLED")? {
            self.health.enabled = enabled;
        }
        if let Some(ms) = parse_env(&lookup, "RATE_LIMIT_MS")? {
            self.relay.rate_limit_ms = ms;
        }
        if let Some(ms) = parse_env(&lookup, "TEST_ECHO_DELAY_MS")? {
            self.relay.test_echo_delay_ms = ms;
        }
        // RELAY_MODE 优先于 NODE_ENV，后者保留给沿用旧部署脚本的环境
        if let Some(mode) = lookup("RELAY_MODE").or_else(|| lookup("NODE_ENV")).filter(|v| !v.trim().is_empty()) {
            self.mode = mode.trim().to_string();
        }
        Ok(())
    }

    /// 检查配置项之间的约束。
    pub fn validate(&self) -> Result<(), AppError> {
        if self.relay.min_code_len == 0 {
            return Err(AppError::ConfigError("relay.min_code_len 必须至少为 1".to_string()));
        }
        if self.relay.min_code_len > self.relay.max_code_len {
            return Err(AppError::ConfigError(format!(
                "relay.min_code_len ({}) 不能大于 relay.max_code_len ({})",
                self.relay.min_code_len, self.relay.max_code_len
            )));
        }
        if self.websocket.max_message_bytes == 0 {
            return Err(AppError::ConfigError("websocket.max_message_bytes 必须大于 0".to_string()));
        }
        if self.relay.outbound_queue_capacity == 0 {
            return Err(AppError::ConfigError("relay.outbound_queue_capacity 必须大于 0".to_string()));
        }
        Ok(())
    }
}

fn parse_env<F, T>(lookup: &F, key: &str) -> Result<Option<T>, AppError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| AppError::ConfigError(format!("环境变量 {}='{}' 无法解析: {}", key, raw, e))),
    }
}

/// 获取配置文件路径：`RELAY_CONFIG` 指定的路径优先，否则为当前目录下的 `app_settings.json`。
fn get_config_file_path() -> PathBuf {
    if let Ok(path) = env::var("RELAY_CONFIG") {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }
    let current_dir = env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    current_dir.join(DEFAULT_CONFIG_FILE)
}

/// 读取配置文件；文件缺失或损坏时回退为默认配置。
fn load_from_file(config_file_path: &Path) -> AppConfig {
    match fs::read_to_string(config_file_path) {
        Ok(content) => match serde_json::from_str::<AppConfig>(&content) {
            Ok(config) => {
                info!("[配置模块] 已成功从配置文件 {:?} 加载应用配置。", config_file_path);
                config
            }
            Err(e) => {
                warn!(
                    "[配置模块] 警告：从 {:?} 反序列化配置失败: {}。文件可能已损坏，将使用默认配置。",
                    config_file_path, e
                );
                AppConfig::default()
            }
        },
        Err(_) => {
            info!("[配置模块] 未在 {:?} 找到配置文件，使用默认配置。", config_file_path);
            AppConfig::default()
        }
    }
}
