//! Platform Bluetooth collaborators
//!
//! This module holds:
//! - The trait seams the session core depends on (directory, channel, factory)
//! - The BlueZ-backed device directory (classic inquiry with class filtering)
//! - The RFCOMM serial channel implementation

pub mod directory;
pub mod rfcomm;
pub mod traits;

pub use directory::BluezDirectory;
pub use rfcomm::{RfcommChannelFactory, DEFAULT_RFCOMM_CHANNEL, RFCOMM_MTU};
pub use traits::{ChannelFactory, DeviceDirectory, DiscoveredDevice, SerialChannel, SessionEvent};
