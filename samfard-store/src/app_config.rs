use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub engine: EngineRules,
    #[serde(default)]
    pub guard: GuardConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default = "default_op_timeout_ms")]
    pub op_timeout_ms: u64,
    #[serde(default = "default_feed_buffer")]
    pub feed_buffer: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EngineRules {
    #[serde(default = "default_retry_attempts")]
    pub retry_max_attempts: u32,
    #[serde(default = "default_retry_base_ms")]
    pub retry_base_delay_ms: u64,
    #[serde(default = "default_retry_max_ms")]
    pub retry_max_delay_ms: u64,
    #[serde(default = "default_report_window_hours")]
    pub report_window_hours: i64,
    #[serde(default = "default_countdown_tick_seconds")]
    pub countdown_tick_seconds: u64,
    #[serde(default = "default_support_address")]
    pub support_address: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GuardConfig {
    #[serde(default = "default_warning_seconds")]
    pub warning_display_seconds: u64,
}

fn default_op_timeout_ms() -> u64 {
    2_000
}
fn default_feed_buffer() -> usize {
    256
}
fn default_retry_attempts() -> u32 {
    3
}
fn default_retry_base_ms() -> u64 {
    25
}
fn default_retry_max_ms() -> u64 {
    400
}
fn default_report_window_hours() -> i64 {
    48
}
fn default_countdown_tick_seconds() -> u64 {
    60
}
fn default_warning_seconds() -> u64 {
    8
}
fn default_support_address() -> String {
    "support@samfard.example".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            op_timeout_ms: default_op_timeout_ms(),
            feed_buffer: default_feed_buffer(),
        }
    }
}

impl Default for EngineRules {
    fn default() -> Self {
        Self {
            retry_max_attempts: default_retry_attempts(),
            retry_base_delay_ms: default_retry_base_ms(),
            retry_max_delay_ms: default_retry_max_ms(),
            report_window_hours: default_report_window_hours(),
            countdown_tick_seconds: default_countdown_tick_seconds(),
            support_address: default_support_address(),
        }
    }
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            warning_display_seconds: default_warning_seconds(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            // Environment-specific overrides, then an uncommitted local file
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            .add_source(config::File::with_name("config/local").required(false))
            // Eg. `SAMFARD__ENGINE__REPORT_WINDOW_HOURS=24`
            .add_source(config::Environment::with_prefix("SAMFARD").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
