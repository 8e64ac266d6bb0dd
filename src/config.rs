use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub host: String,
    pub headless: bool,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub start_url: String,
    /// How long the playback loop waits for a step's element before skipping it.
    pub element_timeout_ms: u64,
    pub poll_interval_ms: u64,
    /// Grace period after a reload before resumed playback touches the page.
    pub settle_delay_ms: u64,
    pub launch_timeout_secs: u64,
    /// Overrides the platform data directory for the SQLite store.
    pub store_path: Option<PathBuf>,
    pub allowed_origins: Vec<String>,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            port: env::var("REENACT_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8790),
            host: env::var("REENACT_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            headless: env::var("REENACT_HEADLESS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(false),
            viewport_width: env::var("REENACT_VIEWPORT_WIDTH")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(1280),
            viewport_height: env::var("REENACT_VIEWPORT_HEIGHT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(720),
            start_url: env::var("REENACT_START_URL")
                .unwrap_or_else(|_| "about:blank".to_string()),
            element_timeout_ms: env::var("REENACT_ELEMENT_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5000),
            poll_interval_ms: env::var("REENACT_POLL_INTERVAL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(100),
            settle_delay_ms: env::var("REENACT_SETTLE_DELAY_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(1000),
            launch_timeout_secs: env::var("REENACT_LAUNCH_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),
            store_path: env::var("REENACT_STORE_PATH").ok().map(PathBuf::from),
            allowed_origins: env::var("REENACT_ALLOWED_ORIGINS")
                .ok()
                .map(|v| v.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or_else(default_origins),
        }
    }
}

fn default_origins() -> Vec<String> {
    vec![
        "http://localhost:8790".to_string(),
        "http://127.0.0.1:8790".to_string(),
        "http://localhost:5173".to_string(),
        "http://127.0.0.1:5173".to_string(),
    ]
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8790,
            host: "127.0.0.1".to_string(),
            headless: false,
            viewport_width: 1280,
            viewport_height: 720,
            start_url: "about:blank".to_string(),
            element_timeout_ms: 5000,
            poll_interval_ms: 100,
            settle_delay_ms: 1000,
            launch_timeout_secs: 30,
            store_path: None,
            allowed_origins: default_origins(),
        }
    }
}
