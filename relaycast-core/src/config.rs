use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub signaling: SignalingConfig,
    pub webrtc: WebRTCConfig,
    pub media: MediaConfig,
    pub transcode: TranscodeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub http_port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            http_port: 8080,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String, // "json" or "pretty"
    pub file_path: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file_path: None,
        }
    }
}

/// Control channel settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalingConfig {
    /// Query parameter carrying the client identifier on connect
    pub client_id_param: String,
    /// Maximum inbound WebSocket message size in bytes
    pub max_message_size: usize,
    /// Capacity of each client's outbound message queue
    pub outbound_buffer: usize,
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self {
            client_id_param: "clientId".to_string(),
            max_message_size: 256 * 1024,
            outbound_buffer: 256,
        }
    }
}

/// WebRTC configuration for server-terminated sessions
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebRTCConfig {
    /// STUN server URLs handed to every peer connection
    pub stun_servers: Vec<String>,
}

impl Default for WebRTCConfig {
    fn default() -> Self {
        Self {
            stun_servers: vec!["stun:stun.l.google.com:19302".to_string()],
        }
    }
}

/// Media capture configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    /// Root directory for per-client capture files
    pub capture_dir: String,
    /// Delay between the first video track and the transcode attempt
    pub warmup_delay_ms: u64,
    /// RTP payload types also written to the timestamped container stream
    pub timestamped_payload_types: Vec<u8>,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            capture_dir: "./captures".to_string(),
            warmup_delay_ms: 5000,
            // webrtc-rs default media engine: 96 = VP8, 98 = VP9
            timestamped_payload_types: vec![96, 98],
        }
    }
}

impl MediaConfig {
    #[must_use]
    pub const fn warmup_delay(&self) -> Duration {
        Duration::from_millis(self.warmup_delay_ms)
    }
}

/// External encoder configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscodeConfig {
    pub ffmpeg_path: String,
    /// Directory holding the published playlist and its segments
    pub output_dir: String,
    pub playlist_name: String,
    pub segment_seconds: u32,
    pub playlist_size: u32,
    pub video_codec: String,
    pub video_preset: String,
    pub audio_codec: String,
    pub audio_bitrate: String,
    /// Time allowed between SIGTERM and a forced kill
    pub terminate_grace_ms: u64,
}

impl Default for TranscodeConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            output_dir: "./public/hls".to_string(),
            playlist_name: "stream.m3u8".to_string(),
            segment_seconds: 2,
            playlist_size: 5,
            video_codec: "libx264".to_string(),
            video_preset: "ultrafast".to_string(),
            audio_codec: "aac".to_string(),
            audio_bitrate: "128k".to_string(),
            terminate_grace_ms: 3000,
        }
    }
}

impl TranscodeConfig {
    #[must_use]
    pub fn playlist_path(&self) -> PathBuf {
        Path::new(&self.output_dir).join(&self.playlist_name)
    }

    #[must_use]
    pub const fn terminate_grace(&self) -> Duration {
        Duration::from_millis(self.terminate_grace_ms)
    }
}

impl Config {
    /// Load configuration from multiple sources with priority:
    /// 1. Environment variables (highest priority)
    /// 2. Config file (if provided)
    /// 3. Defaults (lowest priority)
    pub fn load(config_file: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_file {
            if Path::new(path).exists() {
                builder = builder.add_source(File::with_name(path));
            }
        }

        // RELAYCAST_SERVER__HTTP_PORT=9000, RELAYCAST_WEBRTC__STUN_SERVERS=stun:a,stun:b
        builder = builder.add_source(
            Environment::with_prefix("RELAYCAST")
                .prefix_separator("_")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("webrtc.stun_servers")
                .with_list_parse_key("media.timestamped_payload_types")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Load from environment variables only (for Docker/K8s)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(None)
    }

    /// Load from file path
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        Self::load(Some(path))
    }

    /// Get HTTP address
    #[must_use]
    pub fn http_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.http_port)
    }

    /// Check the configuration, returning every problem found
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.server.http_port == 0 {
            errors.push("server.http_port must be non-zero".to_string());
        }

        if !matches!(
            self.logging.level.to_lowercase().as_str(),
            "trace" | "debug" | "info" | "warn" | "warning" | "error"
        ) {
            errors.push(format!("logging.level '{}' is not a log level", self.logging.level));
        }
        if !matches!(self.logging.format.as_str(), "json" | "pretty") {
            errors.push(format!(
                "logging.format must be 'json' or 'pretty', got '{}'",
                self.logging.format
            ));
        }

        if self.signaling.client_id_param.trim().is_empty() {
            errors.push("signaling.client_id_param must not be empty".to_string());
        }
        if self.signaling.max_message_size < 4 * 1024 {
            errors.push("signaling.max_message_size must be at least 4096 bytes".to_string());
        }
        if self.signaling.outbound_buffer == 0 {
            errors.push("signaling.outbound_buffer must be non-zero".to_string());
        }

        if self.media.capture_dir.trim().is_empty() {
            errors.push("media.capture_dir must not be empty".to_string());
        }

        if self.transcode.ffmpeg_path.trim().is_empty() {
            errors.push("transcode.ffmpeg_path must not be empty".to_string());
        }
        if self.transcode.output_dir.trim().is_empty() {
            errors.push("transcode.output_dir must not be empty".to_string());
        }
        if self.transcode.playlist_name.trim().is_empty() {
            errors.push("transcode.playlist_name must not be empty".to_string());
        }
        if self.transcode.segment_seconds == 0 {
            errors.push("transcode.segment_seconds must be non-zero".to_string());
        }
        if self.transcode.playlist_size == 0 {
            errors.push("transcode.playlist_size must be non-zero".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
