// Hostforge
// Copyright (C) 2024 - hostforge contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// long with this program.  If not, see <http://www.gnu.org/licenses/>.

use std::error::Error as StdError;
use std::fmt;
use std::io;

/// Main error type for hostforge operations
#[derive(Debug)]
pub enum ForgeError {
    /// Configuration errors (bad config file, missing/contradictory flags)
    Config(String),

    /// Validation pipeline errors (invalid IP, unknown subnet, bad sizing)
    Validation(String),

    /// IPAM registry errors
    Ipam(String),

    /// Hypervisor control plane errors
    Vsphere(String),

    /// Config-management / inventory registry errors
    Cm(String),

    /// Monitoring system errors
    Monitoring(String),

    /// Notification (SMTP) errors
    Notify(String),

    /// IO errors
    Io(io::Error),

    /// YAML parsing errors
    Yaml(serde_yaml::Error),

    /// Other errors
    Other(String),
}

impl fmt::Display for ForgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ForgeError::Config(msg) => write!(f, "Configuration error: {}", msg),
            ForgeError::Validation(msg) => write!(f, "Validation error: {}", msg),
            ForgeError::Ipam(msg) => write!(f, "IPAM error: {}", msg),
            ForgeError::Vsphere(msg) => write!(f, "vSphere error: {}", msg),
            ForgeError::Cm(msg) => write!(f, "Config-management error: {}", msg),
            ForgeError::Monitoring(msg) => write!(f, "Monitoring error: {}", msg),
            ForgeError::Notify(msg) => write!(f, "Notification error: {}", msg),
            ForgeError::Io(err) => write!(f, "IO error: {}", err),
            ForgeError::Yaml(err) => write!(f, "YAML error: {}", err),
            ForgeError::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl StdError for ForgeError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            ForgeError::Io(err) => Some(err),
            ForgeError::Yaml(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for ForgeError {
    fn from(err: io::Error) -> Self {
        ForgeError::Io(err)
    }
}

impl From<serde_yaml::Error> for ForgeError {
    fn from(err: serde_yaml::Error) -> Self {
        ForgeError::Yaml(err)
    }
}

impl From<String> for ForgeError {
    fn from(err: String) -> Self {
        ForgeError::Other(err)
    }
}

impl From<&str> for ForgeError {
    fn from(err: &str) -> Self {
        ForgeError::Other(err.to_string())
    }
}

/// Result type alias for hostforge operations
pub type Result<T> = std::result::Result<T, ForgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_prefixes() {
        let e = ForgeError::Config("bad yaml".to_string());
        assert_eq!(e.to_string(), "Configuration error: bad yaml");
        let e = ForgeError::Ipam("no free addresses".to_string());
        assert_eq!(e.to_string(), "IPAM error: no free addresses");
    }

    #[test]
    fn test_from_string() {
        let e: ForgeError = "boom".into();
        assert_eq!(e.to_string(), "Error: boom");
    }
}
