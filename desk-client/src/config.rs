//! Client configuration

use std::time::Duration;

/// Client configuration for connecting to the desk backend
///
/// # 环境变量
///
/// | 环境变量 | 默认值 | 说明 |
/// |----------|--------|------|
/// | DESK_API_URL | http://localhost:8080/api | REST base URL |
/// | DESK_WS_URL | derived from DESK_API_URL | push channel endpoint |
/// | DESK_REQUEST_TIMEOUT_SECS | 30 | REST timeout |
/// | DESK_RECONNECT_DELAY_MS | 5000 | fixed reconnect backoff |
/// | DESK_HEARTBEAT_SECS | 10 | STOMP heart-beat (0 disables) |
/// | DESK_ALERT_SOUND | /sounds/notification.mp3 | alert audio asset |
/// | LOG_LEVEL | info | tracing level |
/// | LOG_DIR | (none) | daily rolling log directory |
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// REST base URL (e.g., "http://localhost:8080/api")
    pub base_url: String,

    /// Push channel URL; derived from `base_url` when not set
    pub ws_url: Option<String>,

    /// Request timeout
    pub timeout: Duration,

    /// Fixed delay between reconnect attempts
    pub reconnect_delay: Duration,

    /// Time allowed for the STOMP CONNECT / CONNECTED exchange
    pub connect_timeout: Duration,

    /// Outgoing heart-beat interval (zero disables)
    pub heartbeat_interval: Duration,

    /// Audio asset played on personal alerts
    pub alert_sound: String,

    /// Log level for `logger::init_logger_with_file`
    pub log_level: String,

    /// Log directory (daily rolling files)
    pub log_dir: Option<String>,
}

impl ClientConfig {
    /// Create a new client configuration with defaults
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            ws_url: None,
            timeout: Duration::from_secs(30),
            reconnect_delay: Duration::from_millis(5000),
            connect_timeout: Duration::from_secs(10),
            heartbeat_interval: Duration::from_secs(10),
            alert_sound: "/sounds/notification.mp3".to_string(),
            log_level: "info".to_string(),
            log_dir: None,
        }
    }

    /// 从环境变量加载配置
    ///
    /// 如果环境变量未设置，使用默认值
    pub fn from_env() -> Self {
        let mut config = Self::new(
            std::env::var("DESK_API_URL").unwrap_or_else(|_| "http://localhost:8080/api".into()),
        );
        config.ws_url = std::env::var("DESK_WS_URL").ok();
        if let Some(secs) = env_parse::<u64>("DESK_REQUEST_TIMEOUT_SECS") {
            config.timeout = Duration::from_secs(secs);
        }
        if let Some(ms) = env_parse::<u64>("DESK_RECONNECT_DELAY_MS") {
            config.reconnect_delay = Duration::from_millis(ms);
        }
        if let Some(secs) = env_parse::<u64>("DESK_HEARTBEAT_SECS") {
            config.heartbeat_interval = Duration::from_secs(secs);
        }
        if let Ok(sound) = std::env::var("DESK_ALERT_SOUND") {
            config.alert_sound = sound;
        }
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            config.log_level = level;
        }
        config.log_dir = std::env::var("LOG_DIR").ok();
        config
    }

    /// Set the push channel URL
    pub fn with_ws_url(mut self, url: impl Into<String>) -> Self {
        self.ws_url = Some(url.into());
        self
    }

    /// Set the request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the reconnect delay
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Set the CONNECT handshake timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the heart-beat interval (zero disables)
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Set the alert sound asset
    pub fn with_alert_sound(mut self, asset: impl Into<String>) -> Self {
        self.alert_sound = asset.into();
        self
    }

    /// Push channel endpoint
    ///
    /// `http(s)://host/api` becomes `ws(s)://host/api/ws` unless set explicitly.
    pub fn channel_url(&self) -> String {
        if let Some(url) = &self.ws_url {
            return url.clone();
        }
        let ws = self
            .base_url
            .replacen("https://", "wss://", 1)
            .replacen("http://", "ws://", 1);
        format!("{ws}/ws")
    }

    /// STOMP heart-beat header value (`<outgoing>,<incoming>` in ms)
    pub fn heartbeat_header(&self) -> String {
        let ms = self.heartbeat_interval.as_millis();
        format!("{ms},{ms}")
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new("http://localhost:8080/api")
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}
