//! Centralized configuration for MiniBit.
//!
//! All tunable parameters and settings are defined here to avoid
//! hard-coded values scattered throughout the codebase.

use std::path::PathBuf;
use std::time::Duration;

use crate::retry::RetryPolicy;
use crate::selection::MAX_FIXED_UNCHOKED;
use crate::storage::seeding::DEFAULT_PIECE_SIZE;

/// Central configuration for all MiniBit components.
///
/// Groups tracker and agent settings into separate sections.
/// Supports environment variable overrides for runtime customization.
#[derive(Debug, Clone, Default)]
pub struct SwarmConfig {
    pub tracker: TrackerConfig,
    pub agent: AgentConfig,
}

/// Tracker process configuration.
///
/// Controls where the tracker listens and how large discovery answers are.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Address the tracker binds to
    pub bind_address: String,
    /// Maximum peers returned by one discovery query
    pub sample_size: usize,
    /// Maximum globally-rarest pieces suggested by one discovery query
    pub suggestion_count: usize,
    /// Read/write timeout for one tracker connection
    pub io_timeout: Duration,
    /// Registrations older than this are dropped (None = keep forever)
    pub peer_ttl: Option<Duration>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:5000".to_string(),
            sample_size: 5,
            suggestion_count: 5,
            io_timeout: Duration::from_secs(5),
            peer_ttl: None,
        }
    }
}

/// Peer agent configuration.
///
/// Controls identity, storage location, loop intervals and the bounded
/// timeouts carried by every socket operation.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Agent identity; also selects the listen port and storage directory
    pub peer_id: u16,
    /// Host the transfer server binds to and advertises
    pub host: String,
    /// Listen port is `port_base + peer_id`; 0 picks an ephemeral port
    pub port_base: u16,
    /// Tracker address to register with
    pub tracker_address: String,
    /// Root directory holding per-peer stores and the piece-count descriptor
    pub storage_root: PathBuf,
    /// Whether this agent originates the content set
    pub origin: bool,
    /// Source payload the origin splits at startup
    pub source: Option<PathBuf>,
    /// Piece size used when splitting the source payload
    pub piece_size: usize,
    /// Attempts when loading local pieces or waiting for the descriptor
    pub bootstrap_attempts: u32,
    /// Delay between bootstrap attempts
    pub bootstrap_delay: Duration,
    /// Interval between choke scheduling rounds
    pub choke_interval: Duration,
    /// Maximum peers unchoked by score in one round
    pub max_fixed_unchoked: usize,
    /// Timeout for one tracker exchange
    pub tracker_timeout: Duration,
    /// Timeout for one piece-listing refresh query
    pub refresh_timeout: Duration,
    /// Timeout for possession and transfer queries
    pub transfer_timeout: Duration,
    /// Timeout for serving one inbound connection
    pub serve_timeout: Duration,
    /// Pause between acquisition cycles
    pub cycle_delay: Duration,
    /// Pause after a failed registration or an empty peer set
    pub retry_delay: Duration,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            peer_id: 0,
            host: "127.0.0.1".to_string(),
            port_base: 6000,
            tracker_address: "127.0.0.1:5000".to_string(),
            storage_root: PathBuf::from("swarm"),
            origin: false,
            source: None,
            piece_size: DEFAULT_PIECE_SIZE,
            bootstrap_attempts: 10,
            bootstrap_delay: Duration::from_secs(3),
            choke_interval: Duration::from_secs(10),
            max_fixed_unchoked: MAX_FIXED_UNCHOKED,
            tracker_timeout: Duration::from_secs(5),
            refresh_timeout: Duration::from_secs(2),
            transfer_timeout: Duration::from_secs(3),
            serve_timeout: Duration::from_secs(5),
            cycle_delay: Duration::from_secs(3),
            retry_delay: Duration::from_secs(5),
        }
    }
}

impl AgentConfig {
    /// Port the transfer server listens on.
    pub fn listen_port(&self) -> u16 {
        if self.port_base == 0 {
            0
        } else {
            self.port_base.saturating_add(self.peer_id)
        }
    }

    /// Retry policy for loading pieces and polling the descriptor.
    pub fn bootstrap_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.bootstrap_attempts, self.bootstrap_delay)
    }

    /// Path of the shared piece-count descriptor.
    pub fn descriptor_path(&self) -> PathBuf {
        self.storage_root.join("piece_count")
    }

    /// Creates a configuration for the given identity with shortened delays.
    ///
    /// Binds an ephemeral port so several agents can run inside one test.
    pub fn for_testing(peer_id: u16, storage_root: PathBuf, tracker_address: String) -> Self {
        Self {
            peer_id,
            port_base: 0,
            tracker_address,
            storage_root,
            origin: peer_id == 0,
            bootstrap_attempts: 3,
            bootstrap_delay: Duration::from_millis(20),
            choke_interval: Duration::from_millis(100),
            tracker_timeout: Duration::from_secs(2),
            refresh_timeout: Duration::from_millis(500),
            transfer_timeout: Duration::from_secs(2),
            serve_timeout: Duration::from_secs(2),
            cycle_delay: Duration::from_millis(20),
            retry_delay: Duration::from_millis(50),
            ..Default::default()
        }
    }
}

impl SwarmConfig {
    /// Creates configuration with environment variable overrides.
    ///
    /// Allows runtime configuration via environment variables while
    /// maintaining sensible defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(address) = std::env::var("MINIBIT_TRACKER_ADDRESS") {
            config.tracker.bind_address = address.clone();
            config.agent.tracker_address = address;
        }

        if let Ok(base) = std::env::var("MINIBIT_PORT_BASE")
            && let Ok(port) = base.parse::<u16>()
        {
            config.agent.port_base = port;
        }

        if let Ok(root) = std::env::var("MINIBIT_STORAGE_ROOT") {
            config.agent.storage_root = PathBuf::from(root);
        }

        if let Ok(interval) = std::env::var("MINIBIT_CHOKE_INTERVAL")
            && let Ok(seconds) = interval.parse::<u64>()
        {
            config.agent.choke_interval = Duration::from_secs(seconds);
        }

        config
    }
}
