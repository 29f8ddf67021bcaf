
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/netconfig.toml";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
pub struct Config {
    #[serde(default)]
    pub paths: PathConfig,

    #[serde(default)]
    pub registry: RegistryConfig,

    #[serde(default)]
    pub netlink: NetlinkConfig,
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(file: P) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(file)?;
        Self::from_str(&content)
    }

    pub fn from_str(content: &str) -> Result<Self, std::io::Error> {
        toml::from_str(content).map_err(|e| std::io::Error::other(e))
    }

    /// Loads the file if it can be read, otherwise falls back to defaults.
    pub fn load_or_default<P: AsRef<Path>>(file: P) -> Self {
        let file = file.as_ref();
        match Self::from_file(file) {
            Ok(config) => {
                log::debug!("Configuration loaded from {}", file.display());
                config
            }
            Err(e) => {
                log::warn!("Failed to load configuration from {}: {}", file.display(), e);
                Self::default()
            }
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct PathConfig {
    /// interfaces(5) file holding the persisted stanzas
    pub interfaces: PathBuf,

    /// name resolver file
    pub resolv_conf: PathBuf,

    /// lease-state file written by the lease client
    pub leases: PathBuf,

    /// lease client executable
    pub dhclient: PathBuf,

    /// kernel interface statistics listing
    pub net_dev: PathBuf,
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            interfaces: PathBuf::from("/etc/network/interfaces"),
            resolv_conf: PathBuf::from("/etc/resolv.conf"),
            leases: PathBuf::from("/var/lib/dhcp/dhclient.leases"),
            dhclient: PathBuf::from("/sbin/dhclient"),
            net_dev: PathBuf::from("/proc/net/dev"),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
pub struct RegistryConfig {
    /// Upper bound on registry entries. Unbounded when absent.
    #[serde(default)]
    pub max_interfaces: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct NetlinkConfig {
    /// bytes read per receive call on the routing socket
    pub receive_buffer: usize,
}

impl Default for NetlinkConfig {
    fn default() -> Self {
        Self { receive_buffer: 8192 }
    }
}
