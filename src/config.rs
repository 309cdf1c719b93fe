use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;

use crate::audio::{AudioBackendConfig, DisplayBehavior, MixerConfig, SyntheticConfig};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub devices: DeviceConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_service_name")]
    pub name: String,
    #[serde(default)]
    pub http: HttpConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            http: HttpConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 8787,
        }
    }
}

/// Capture pipeline settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Interval between chunk deliveries
    pub chunk_interval_ms: u64,
    pub sample_rate: u32,
    pub channels: u16,
    /// Device frame cadence
    pub frame_duration_ms: u64,
    /// Lag tolerated between mixer inputs
    pub max_buffer_delay_ms: u64,
    /// Upper bound on each device request (none = wait for the user)
    pub acquisition_timeout_ms: Option<u64>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            chunk_interval_ms: 2000,
            sample_rate: 16000,
            channels: 1,
            frame_duration_ms: 100,
            max_buffer_delay_ms: 200,
            acquisition_timeout_ms: None,
        }
    }
}

impl CaptureConfig {
    pub fn chunk_interval(&self) -> Duration {
        Duration::from_millis(self.chunk_interval_ms.max(1))
    }

    pub fn acquisition_timeout(&self) -> Option<Duration> {
        self.acquisition_timeout_ms.map(Duration::from_millis)
    }

    pub fn backend_config(&self) -> AudioBackendConfig {
        AudioBackendConfig {
            target_sample_rate: self.sample_rate,
            target_channels: self.channels,
            buffer_duration_ms: self.frame_duration_ms.max(1),
        }
    }

    pub fn mixer_config(&self) -> MixerConfig {
        MixerConfig {
            sample_rate: self.sample_rate,
            channels: self.channels,
            max_buffer_delay_ms: self.max_buffer_delay_ms,
        }
    }
}

/// Behaviour of the synthetic devices used by the CLI and server
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub microphone_available: bool,
    pub display: DisplayBehavior,
    /// Simulated permission prompt latency
    pub prompt_delay_ms: u64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            microphone_available: true,
            display: DisplayBehavior::Audio,
            prompt_delay_ms: 0,
        }
    }
}

impl DeviceConfig {
    pub fn synthetic_config(&self) -> SyntheticConfig {
        let prompt = Duration::from_millis(self.prompt_delay_ms);
        SyntheticConfig {
            microphone_available: self.microphone_available,
            display: self.display,
            microphone_prompt: prompt,
            display_prompt: prompt,
            ..SyntheticConfig::default()
        }
    }
}

fn default_service_name() -> String {
    "capture-session".to_string()
}

impl Config {
    /// Load from a config file (extension optional)
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .build()
            .with_context(|| format!("Failed to load config from {}", path))?;

        settings
            .try_deserialize()
            .context("Failed to parse configuration")
    }
}
