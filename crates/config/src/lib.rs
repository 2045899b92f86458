//! 客户端配置中心
//!
//! 提供客户端的全局配置管理，包括：
//! - 消息服务器地址
//! - 会话调度器通道容量与回显策略
//! - 日志过滤

use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// 配置文件路径环境变量
pub const CONFIG_FILE_ENV: &str = "CHAT_CONFIG_FILE";
/// 环境变量前缀
pub const ENV_PREFIX: &str = "CHAT_";

/// 全局客户端配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate, Default)]
pub struct ClientConfig {
    /// 服务器配置
    #[serde(default)]
    #[validate(nested)]
    pub server: ServerConfig,
    /// 会话配置
    #[serde(default)]
    #[validate(nested)]
    pub session: SessionConfig,
    /// 日志配置
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// 消息服务器配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct ServerConfig {
    /// WebSocket 基础地址，例如 `ws://127.0.0.1:8080`
    #[validate(url)]
    pub base_url: String,
    /// 连接路径模板，`{identity}` 会被替换为当前用户ID
    pub ws_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: "ws://127.0.0.1:8080".into(),
            ws_path: "/ws/{identity}".into(),
        }
    }
}

impl ServerConfig {
    /// 生成指定用户的连接地址
    pub fn connect_url(&self, identity: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        let path = self.ws_path.replace("{identity}", identity);
        if path.starts_with('/') {
            format!("{base}{path}")
        } else {
            format!("{base}/{path}")
        }
    }
}

/// 服务端是否把发送者自己的消息回显给发送者
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EchoPolicy {
    /// 只投递给接收方，入站消息一律追加
    #[default]
    RecipientOnly,
    /// 也回显给发送方，按客户端消息ID去重
    EchoToSender,
}

/// 会话配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct SessionConfig {
    /// 表现层命令通道容量
    #[validate(range(min = 1, max = 65536))]
    pub command_buffer: usize,
    /// 状态更新广播容量
    #[validate(range(min = 1, max = 65536))]
    pub update_buffer: usize,
    /// 回显策略
    #[serde(default)]
    pub echo_policy: EchoPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            command_buffer: 32,
            update_buffer: 256,
            echo_policy: EchoPolicy::default(),
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// 未设置 RUST_LOG 时使用的过滤表达式
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".into(),
        }
    }
}

impl ClientConfig {
    /// 加载配置，优先级：默认值 -> 可选配置文件 (CHAT_CONFIG_FILE) -> 环境变量 (CHAT_*)
    pub fn load() -> Result<Self, ConfigError> {
        let mut fig = Figment::new().merge(Serialized::defaults(ClientConfig::default()));
        if let Ok(path) = std::env::var(CONFIG_FILE_ENV) {
            fig = merge_file(fig, &path);
        }
        Self::extract(fig.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    /// 从指定文件加载配置（不读取环境变量）
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let fig = Figment::new().merge(Serialized::defaults(ClientConfig::default()));
        Self::extract(merge_file(fig, path))
    }

    fn extract(fig: Figment) -> Result<Self, ConfigError> {
        let cfg: ClientConfig = fig.extract().map_err(Box::new)?;
        cfg.check()?;
        Ok(cfg)
    }

    /// 校验配置有效性
    pub fn check(&self) -> Result<(), ConfigError> {
        self.validate()?;

        let url = &self.server.base_url;
        if !(url.starts_with("ws://") || url.starts_with("wss://")) {
            return Err(ConfigError::InvalidServer(format!(
                "base_url must use ws:// or wss://, got {url}"
            )));
        }
        if !self.server.ws_path.contains("{identity}") {
            return Err(ConfigError::InvalidServer(
                "ws_path must contain the {identity} placeholder".to_string(),
            ));
        }
        Ok(())
    }
}

fn merge_file(fig: Figment, path: &str) -> Figment {
    if path.ends_with(".yml") || path.ends_with(".yaml") {
        fig.merge(Yaml::file(path))
    } else if path.ends_with(".json") {
        fig.merge(Json::file(path))
    } else {
        fig.merge(Toml::file(path))
    }
}

/// 配置错误类型
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),
    #[error("invalid configuration: {0}")]
    Invalid(#[from] validator::ValidationErrors),
    #[error("invalid server configuration: {0}")]
    InvalidServer(String),
}
