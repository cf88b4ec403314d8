use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

use crate::errors::{AppError, AppResult};

pub mod defaults;
pub mod duration_serde;

use defaults::*;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub web: WebConfig,
    #[serde(default)]
    pub channels: ChannelConfig,
    #[serde(default)]
    pub filters: FilterConfig,
    #[serde(default)]
    pub timers: TimerConfig,
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
    /// Read-only lineup binding provider sub-channels to fixed channel numbers
    #[serde(default)]
    pub linear_lineup: Vec<LinearChannelConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Public base URL written into playlists. Derived from the request when unset.
    #[serde(default)]
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    #[serde(default = "default_start_channel")]
    pub start_channel: u32,
    #[serde(default = "default_num_channels")]
    pub num_channels: u32,
    #[serde(default = "default_linear_channels_enabled")]
    pub linear_channels_enabled: bool,
    /// Route media segments through this server instead of pointing clients upstream
    #[serde(default = "default_proxy_segments")]
    pub proxy_segments: bool,
    /// Extend guide entries past the scheduled end to catch overruns
    #[serde(default = "default_xmltv_padding")]
    pub xmltv_padding: bool,
    #[serde(default = "default_channel_name_prefix")]
    pub channel_name_prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FilterConfig {
    /// When non-empty, an event must carry at least one of these categories
    #[serde(default)]
    pub category_filter: Vec<String>,
    /// Events whose title matches this regex are excluded
    #[serde(default)]
    pub title_filter: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimerConfig {
    #[serde(with = "duration_serde::duration", default = "default_rebuild_interval")]
    pub rebuild_interval: Duration,
    #[serde(with = "duration_serde::duration", default = "default_token_refresh_interval")]
    pub token_refresh_interval: Duration,
    #[serde(with = "duration_serde::duration", default = "default_reap_interval")]
    pub reap_interval: Duration,
    #[serde(with = "duration_serde::duration", default = "default_idle_timeout")]
    pub idle_timeout: Duration,
    #[serde(with = "duration_serde::duration", default = "default_upstream_timeout")]
    pub upstream_timeout: Duration,
    #[serde(with = "duration_serde::duration", default = "default_chunklist_max_age")]
    pub chunklist_max_age: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// JSON schedule feed
    pub schedule_url: String,
    /// Optional endpoint returning `{ "token": "..." }`
    #[serde(default)]
    pub token_url: Option<String>,
    /// Extra headers sent with every schedule and stream request
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LinearChannelConfig {
    pub provider: String,
    pub sub_channel: String,
    pub number: u32,
    pub name: String,
}

// Web defaults
fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

// Channel defaults
fn default_start_channel() -> u32 {
    DEFAULT_START_CHANNEL
}

fn default_num_channels() -> u32 {
    DEFAULT_NUM_CHANNELS
}

fn default_linear_channels_enabled() -> bool {
    DEFAULT_LINEAR_CHANNELS_ENABLED
}

fn default_proxy_segments() -> bool {
    DEFAULT_PROXY_SEGMENTS
}

fn default_xmltv_padding() -> bool {
    DEFAULT_XMLTV_PADDING
}

fn default_channel_name_prefix() -> String {
    DEFAULT_CHANNEL_NAME_PREFIX.to_string()
}

fn default_true() -> bool {
    true
}

// Timer defaults
fn parse_default(value: &str) -> Duration {
    humantime::parse_duration(value).unwrap_or(Duration::from_secs(60))
}

fn default_rebuild_interval() -> Duration {
    parse_default(DEFAULT_REBUILD_INTERVAL)
}

fn default_token_refresh_interval() -> Duration {
    parse_default(DEFAULT_TOKEN_REFRESH_INTERVAL)
}

fn default_reap_interval() -> Duration {
    parse_default(DEFAULT_REAP_INTERVAL)
}

fn default_idle_timeout() -> Duration {
    parse_default(DEFAULT_IDLE_TIMEOUT)
}

fn default_upstream_timeout() -> Duration {
    parse_default(DEFAULT_UPSTREAM_TIMEOUT)
}

fn default_chunklist_max_age() -> Duration {
    parse_default(DEFAULT_CHUNKLIST_MAX_AGE)
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            base_url: None,
        }
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            start_channel: default_start_channel(),
            num_channels: default_num_channels(),
            linear_channels_enabled: default_linear_channels_enabled(),
            proxy_segments: default_proxy_segments(),
            xmltv_padding: default_xmltv_padding(),
            channel_name_prefix: default_channel_name_prefix(),
        }
    }
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            rebuild_interval: default_rebuild_interval(),
            token_refresh_interval: default_token_refresh_interval(),
            reap_interval: default_reap_interval(),
            idle_timeout: default_idle_timeout(),
            upstream_timeout: default_upstream_timeout(),
            chunklist_max_age: default_chunklist_max_age(),
        }
    }
}

impl ChannelConfig {
    /// Last pool channel number (inclusive)
    pub fn end_channel(&self) -> u32 {
        self.start_channel + self.num_channels.saturating_sub(1)
    }

    pub fn is_pool_channel(&self, number: u32) -> bool {
        number >= self.start_channel && number <= self.end_channel()
    }

    pub fn pool_channels(&self) -> std::ops::RangeInclusive<u32> {
        self.start_channel..=self.end_channel()
    }
}

impl Config {
    /// Load configuration layering defaults, the TOML file and `TUNER_` environment variables.
    pub fn load_from_file(config_file: &str) -> AppResult<Self> {
        if !Path::new(config_file).exists() {
            warn!(
                "Config file {} not found, using defaults and environment",
                config_file
            );
        }

        let config: Config = Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(config_file))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(|e| AppError::configuration(e.to_string()))?;

        config.validate()?;
        info!(
            "Configuration loaded: pool channels {}-{}, {} provider(s), {} linear channel(s)",
            config.channels.start_channel,
            config.channels.end_channel(),
            config.providers.len(),
            config.linear_lineup.len()
        );
        Ok(config)
    }

    /// Check invariants the scheduler relies on
    pub fn validate(&self) -> AppResult<()> {
        if self.channels.num_channels == 0 {
            return Err(AppError::configuration("num_channels must be greater than 0"));
        }
        if self
            .channels
            .start_channel
            .checked_add(self.channels.num_channels)
            .is_none()
        {
            return Err(AppError::configuration("channel range overflows"));
        }

        let mut numbers = HashSet::new();
        let mut sub_channels = HashSet::new();
        for linear in &self.linear_lineup {
            if self.channels.is_pool_channel(linear.number) {
                return Err(AppError::configuration(format!(
                    "linear channel {} ({}) collides with the pool range {}-{}",
                    linear.number,
                    linear.name,
                    self.channels.start_channel,
                    self.channels.end_channel()
                )));
            }
            if !numbers.insert(linear.number) {
                return Err(AppError::configuration(format!(
                    "linear channel number {} is declared twice",
                    linear.number
                )));
            }
            if !sub_channels.insert((linear.provider.as_str(), linear.sub_channel.as_str())) {
                return Err(AppError::configuration(format!(
                    "linear sub-channel {}/{} is declared twice",
                    linear.provider, linear.sub_channel
                )));
            }
        }

        if let Some(pattern) = &self.filters.title_filter {
            regex::Regex::new(pattern).map_err(|e| {
                AppError::configuration(format!("invalid title_filter '{pattern}': {e}"))
            })?;
        }

        let mut names = HashSet::new();
        for provider in &self.providers {
            if !names.insert(provider.name.as_str()) {
                return Err(AppError::configuration(format!(
                    "provider '{}' is declared twice",
                    provider.name
                )));
            }
        }

        Ok(())
    }
}
