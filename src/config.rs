//! Daemon configuration

use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the bridge daemon
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Path of the Unix domain socket clients connect to
    pub socket_path: PathBuf,
    /// RFCOMM channel used when opening peripheral connections
    pub rfcomm_channel: u8,
    /// Bounded duration of one device inquiry
    pub inquiry_duration: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            rfcomm_channel: crate::bluetooth::DEFAULT_RFCOMM_CHANNEL,
            inquiry_duration: Duration::from_secs(30),
        }
    }
}

impl BridgeConfig {
    /// Build a config from environment overrides on top of the defaults
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(path) = std::env::var("BRICKBRIDGE_SOCKET") {
            config.socket_path = PathBuf::from(path);
        }
        if let Ok(Ok(channel)) = std::env::var("BRICKBRIDGE_RFCOMM_CHANNEL").map(|v| v.parse()) {
            config.rfcomm_channel = channel;
        }
        if let Ok(Ok(secs)) = std::env::var("BRICKBRIDGE_INQUIRY_SECS").map(|v| v.parse()) {
            config.inquiry_duration = Duration::from_secs(secs);
        }

        config
    }
}

/// Default socket location under the user's runtime directory
fn default_socket_path() -> PathBuf {
    std::env::var("XDG_RUNTIME_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
        .join("brickbridge.sock")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BridgeConfig::default();
        assert_eq!(config.rfcomm_channel, crate::bluetooth::DEFAULT_RFCOMM_CHANNEL);
        assert_eq!(config.inquiry_duration, Duration::from_secs(30));
        assert!(config.socket_path.ends_with("brickbridge.sock"));
    }
}
