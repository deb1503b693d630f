use std::path::PathBuf;
use std::time::Duration;

use crate::utils::gate::Capacity;

/// Settings for one run, resolved from the command line.
#[derive(Debug, Clone)]
pub struct Config {
    pub destination: PathBuf,
    pub capacity: Capacity,
    /// Deadline for a whole transfer, body included. `None` waits forever.
    pub timeout: Option<Duration>,
    pub connect_timeout: Option<Duration>,
    pub user_agent: String,
}

impl Config {
    pub fn new(destination: PathBuf) -> Self {
        Self {
            destination,
            capacity: Capacity::detect(),
            timeout: None,
            connect_timeout: None,
            user_agent: default_user_agent(),
        }
    }
}

pub fn default_user_agent() -> String {
    format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
}
