use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    pub db_path: PathBuf,
    pub log_level: String,
    pub mock_min_ms: u64,
    pub mock_max_ms: u64,
    pub max_test_count: u32,
    pub max_body_bytes: u64,
    pub cancel_on_disconnect: bool,
    pub report_stream_errors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 8000)),
            db_path: PathBuf::from("./flowtest.db"),
            log_level: "info".to_string(),
            mock_min_ms: 100,
            mock_max_ms: 1000,
            max_test_count: flowtest_core::validate::MAX_TEST_COUNT,
            max_body_bytes: 1_000_000,
            cancel_on_disconnect: false,
            report_stream_errors: false,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Applies overrides from `lookup`; unparsable values keep the default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut cfg = Self::default();
        if let Some(v) = lookup("FLOWTEST_BIND") {
            if let Ok(addr) = v.parse() {
                cfg.bind = addr;
            }
        }
        if let Some(v) = lookup("FLOWTEST_DB") {
            cfg.db_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("FLOWTEST_LOG") {
            cfg.log_level = v;
        }
        if let Some(v) = lookup("FLOWTEST_MOCK_MIN_MS") {
            if let Ok(n) = v.parse() {
                cfg.mock_min_ms = n;
            }
        }
        if let Some(v) = lookup("FLOWTEST_MOCK_MAX_MS") {
            if let Ok(n) = v.parse() {
                cfg.mock_max_ms = n;
            }
        }
        if let Some(v) = lookup("FLOWTEST_MAX_TEST_COUNT") {
            if let Ok(n) = v.parse::<u32>() {
                cfg.max_test_count = n.max(1);
            }
        }
        if let Some(v) = lookup("FLOWTEST_MAX_BODY_BYTES") {
            if let Ok(n) = v.parse() {
                cfg.max_body_bytes = n;
            }
        }
        if let Some(v) = lookup("FLOWTEST_CANCEL_ON_DISCONNECT") {
            if let Some(b) = parse_flag(&v) {
                cfg.cancel_on_disconnect = b;
            }
        }
        if let Some(v) = lookup("FLOWTEST_REPORT_STREAM_ERRORS") {
            if let Some(b) = parse_flag(&v) {
                cfg.report_stream_errors = b;
            }
        }
        cfg
    }
}

fn parse_flag(v: &str) -> Option<bool> {
    match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
