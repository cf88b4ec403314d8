/// Configuration default values
///
/// This module contains all the default values for configuration options,
/// making them easily changeable in one central location.
// Web server defaults
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8000;

// Channel pool defaults
pub const DEFAULT_START_CHANNEL: u32 = 1;
pub const DEFAULT_NUM_CHANNELS: u32 = 200;
pub const DEFAULT_LINEAR_CHANNELS_ENABLED: bool = false;
pub const DEFAULT_PROXY_SEGMENTS: bool = false;
pub const DEFAULT_XMLTV_PADDING: bool = true;
pub const DEFAULT_CHANNEL_NAME_PREFIX: &str = "Sports Tuner";

// Timer defaults
pub const DEFAULT_REBUILD_INTERVAL: &str = "4h";
pub const DEFAULT_TOKEN_REFRESH_INTERVAL: &str = "30m";
pub const DEFAULT_REAP_INTERVAL: &str = "1m";
pub const DEFAULT_IDLE_TIMEOUT: &str = "2m";
pub const DEFAULT_UPSTREAM_TIMEOUT: &str = "30s";
pub const DEFAULT_CHUNKLIST_MAX_AGE: &str = "2s";

// Configuration sources
pub const DEFAULT_CONFIG_FILE: &str = "config.toml";
pub const ENV_PREFIX: &str = "TUNER_";
