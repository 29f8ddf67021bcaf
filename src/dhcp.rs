
use crate::error::{Error, Result};

use std::io::BufRead;
use std::path::Path;
use std::path::PathBuf;
use std::process::Command;

/// Hands lease acquisition to an external DHCP client.
#[derive(Debug, Clone)]
pub struct DhcpDelegate {
    leases: PathBuf,
    client: PathBuf,
}

impl DhcpDelegate {
    pub fn new<P: AsRef<Path>, Q: AsRef<Path>>(leases: P, client: Q) -> Self {
        Self {
            leases: leases.as_ref().to_path_buf(),
            client: client.as_ref().to_path_buf(),
        }
    }

    /// Whether the lease client has recorded a lease for `if_name`.
    ///
    /// An unreadable lease file means no lease.
    pub fn is_dynamic(&self, if_name: &str) -> bool {
        let file = match std::fs::File::open(&self.leases) {
            Ok(file) => file,
            Err(e) => {
                log::debug!("cannot open lease file {}: {}", self.leases.display(), e);
                return false;
            }
        };
        std::io::BufReader::new(file)
            .lines()
            .map_while(|line| line.ok())
            .any(|line| mentions_interface(&line, if_name))
    }

    /// Runs the lease client for `if_name` and waits for it to exit.
    pub fn acquire_lease(&self, if_name: &str) -> Result<()> {
        log::info!("running {} {}", self.client.display(), if_name);
        let status = Command::new(&self.client).arg(if_name).status().map_err(|e| Error::DelegateFailure {
            interface: if_name.to_owned(),
            reason: format!("cannot spawn {}: {}", self.client.display(), e),
        })?;

        if !status.success() {
            return Err(Error::DelegateFailure {
                interface: if_name.to_owned(),
                reason: format!("{} exited with {}", self.client.display(), status),
            });
        }
        log::debug!("lease client for {} exited cleanly", if_name);
        Ok(())
    }
}

/// `interface "eth0";` style lines, quoted or bare.
fn mentions_interface(line: &str, if_name: &str) -> bool {
    let mut words = line.split(|c: char| c.is_whitespace() || c == '"' || c == ';').filter(|w| !w.is_empty());
    if !words.any(|w| w == "interface") {
        return false;
    }
    words.any(|w| w == if_name)
}
