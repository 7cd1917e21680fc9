//! HTTP response models

use serde::{Deserialize, Serialize};

/// Request headers of the package protocol
pub mod headers {
    pub const FILENAME: &str = "filename";
    pub const EMAIL: &str = "email";
    pub const DISTRO: &str = "distro";
    pub const TIME: &str = "time";
    pub const PKGSIGN: &str = "pkgsign";
    pub const METASIGN: &str = "metasign";
    pub const TARGET: &str = "target";
    pub const ARCH: &str = "arch";
    pub const VERSION: &str = "version";
}

/// Service status response
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusResponse {
    pub name: String,
    pub version: String,
    pub uptime_seconds: u64,
}
