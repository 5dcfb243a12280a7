//! Configuration for the mirroring sender.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use mirror_core::handshake::ClientIdentity;
use mirror_core::{MirrorGeometry, SessionConfig};

/// Default receiver port when an address carries none.
pub const DEFAULT_PORT: u16 = 7100;

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SenderConfig {
    pub network: NetworkConfig,
    pub stream: StreamConfig,
    pub capture: CaptureConfig,
    pub geometry: GeometryConfig,
    pub handshake: HandshakeConfig,
    pub logging: LoggingConfig,
}

/// Receivers to connect to.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// `host[:port]` entries, in fan-out order.
    pub destinations: Vec<String>,
    /// Port used when an entry has none.
    pub default_port: u16,
    /// TCP connect timeout in milliseconds.
    pub connect_timeout_ms: u64,
}

/// What to stream and where else to write it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Annex B H.264 input: a file path, or "-" for stdin.
    pub input: String,
    /// Target frames per second.
    pub fps: u32,
    /// Recording path. Empty disables the file destination.
    pub file: String,
    /// Also write the stream to stdout.
    pub stdout: bool,
    /// Keep-alive interval in milliseconds. 0 disables.
    pub heartbeat_interval_ms: u64,
    /// Stats log interval in seconds.
    pub stats_interval_secs: u64,
}

/// Settings handed to the capture / encode process upstream.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Output (monitor) index.
    pub output: u32,
    /// Include the cursor in captured frames.
    pub cursor: bool,
    /// VAAPI render node for hardware encoding. Empty for software.
    pub vaapi_device: String,
}

/// Geometry advertised in every header, in pixels.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeometryConfig {
    pub source_width: f32,
    pub source_height: f32,
    pub display_width: f32,
    pub display_height: f32,
    pub center_x: f32,
    pub center_y: f32,
    pub supported_width: f32,
    pub supported_height: f32,
}

/// The stream request sent before mirroring starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HandshakeConfig {
    /// Binary plist sent as the request body.
    pub plist: PathBuf,
    pub user_agent: String,
    pub device_id: String,
    pub client_name: String,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            destinations: Vec::new(),
            default_port: DEFAULT_PORT,
            connect_timeout_ms: 3000,
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            input: "-".into(),
            fps: mirror_core::session::DEFAULT_FPS,
            file: String::new(),
            stdout: false,
            heartbeat_interval_ms: 0,
            stats_interval_secs: 5,
        }
    }
}

impl Default for GeometryConfig {
    fn default() -> Self {
        let g = MirrorGeometry::default();
        Self {
            source_width: g.source_width,
            source_height: g.source_height,
            display_width: g.display_width,
            display_height: g.display_height,
            center_x: g.center_x,
            center_y: g.center_y,
            supported_width: g.supported_width,
            supported_height: g.supported_height,
        }
    }
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        let id = ClientIdentity::default();
        Self {
            plist: PathBuf::from(mirror_core::DEFAULT_CAPABILITIES_FILE),
            user_agent: id.user_agent,
            device_id: id.device_id,
            client_name: id.client_name,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

// ── Command-line overrides ───────────────────────────────────────

/// Values given on the command line. Set fields replace the file's.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub destinations: Vec<String>,
    pub input: Option<String>,
    pub fps: Option<u32>,
    pub file: Option<PathBuf>,
    pub stdout: bool,
    pub vaapi_device: Option<String>,
    pub output: Option<u32>,
    pub cursor: bool,
    pub plist: Option<PathBuf>,
}

// ── Loading ──────────────────────────────────────────────────────

/// Result of reading a config file.
#[derive(Debug)]
pub enum LoadOutcome {
    Loaded(SenderConfig),
    /// No file at the path; defaults apply.
    Missing,
    /// The file did not parse; defaults apply.
    Invalid(String),
}

impl LoadOutcome {
    pub fn into_config(self) -> SenderConfig {
        match self {
            LoadOutcome::Loaded(config) => config,
            LoadOutcome::Missing | LoadOutcome::Invalid(_) => SenderConfig::default(),
        }
    }

    pub fn log(&self, path: &Path) {
        match self {
            LoadOutcome::Loaded(_) => tracing::info!("config loaded from {}", path.display()),
            LoadOutcome::Missing => {
                tracing::info!("no config at {}; using defaults", path.display())
            }
            LoadOutcome::Invalid(e) => {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display())
            }
        }
    }
}

impl SenderConfig {
    /// Load configuration from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        let outcome = Self::read(path);
        outcome.log(path);
        outcome.into_config()
    }

    /// Read the file without logging, so the caller can report the
    /// outcome once logging is set up.
    pub fn read(path: &Path) -> LoadOutcome {
        match std::fs::read_to_string(path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => LoadOutcome::Loaded(config),
                Err(e) => LoadOutcome::Invalid(e.to_string()),
            },
            Err(_) => LoadOutcome::Missing,
        }
    }

    /// Apply command-line values on top of the file.
    pub fn apply(&mut self, overrides: Overrides) {
        if !overrides.destinations.is_empty() {
            self.network.destinations = overrides.destinations;
        }
        if let Some(input) = overrides.input {
            self.stream.input = input;
        }
        if let Some(fps) = overrides.fps {
            self.stream.fps = fps;
        }
        if let Some(file) = overrides.file {
            self.stream.file = file.display().to_string();
        }
        self.stream.stdout |= overrides.stdout;
        if let Some(device) = overrides.vaapi_device {
            self.capture.vaapi_device = device;
        }
        if let Some(output) = overrides.output {
            self.capture.output = output;
        }
        self.capture.cursor |= overrides.cursor;
        if let Some(plist) = overrides.plist {
            self.handshake.plist = plist;
        }
    }

    pub fn geometry(&self) -> MirrorGeometry {
        let g = &self.geometry;
        MirrorGeometry {
            source_width: g.source_width,
            source_height: g.source_height,
            display_width: g.display_width,
            display_height: g.display_height,
            center_x: g.center_x,
            center_y: g.center_y,
            supported_width: g.supported_width,
            supported_height: g.supported_height,
        }
    }

    pub fn identity(&self) -> ClientIdentity {
        ClientIdentity {
            user_agent: self.handshake.user_agent.clone(),
            device_id: self.handshake.device_id.clone(),
            client_name: self.handshake.client_name.clone(),
            ..ClientIdentity::default()
        }
    }

    /// Convert stream settings into a `SessionConfig`.
    pub fn to_session_config(&self) -> SessionConfig {
        let heartbeat = self.stream.heartbeat_interval_ms;
        SessionConfig {
            fps: self.stream.fps.clamp(1, 120),
            geometry: self.geometry(),
            heartbeat_interval: (heartbeat > 0).then(|| Duration::from_millis(heartbeat)),
            stats_interval: Duration::from_secs(self.stream.stats_interval_secs.max(1)),
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.network.connect_timeout_ms)
    }

    /// Recording path, if one is configured.
    pub fn recording_path(&self) -> Option<&Path> {
        (!self.stream.file.is_empty()).then(|| Path::new(&self.stream.file))
    }
}

// ── Tests ────────────────────────────────────────────────────────
