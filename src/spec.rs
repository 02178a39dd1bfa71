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

//! The frozen host description handed to the provisioning executor.
//!
//! Built from the Options record only after the validation pipeline has
//! succeeded; every accessor here is infallible because construction fails
//! closed on any missing or malformed key.

use crate::error::{ForgeError, Result};
use crate::options::Options;

/// How the target datastore is chosen: an exact name, or a regex resolved
/// against free space at provisioning time.
#[derive(Debug, Clone, PartialEq)]
pub enum DatastoreChoice {
    Named(String),
    Pattern(String),
}

#[derive(Debug, Clone)]
pub struct HostSpec {
    pub hostname: String,
    pub short_hostname: String,
    pub fqdn: String,
    pub cpus: i64,
    pub memory_mib: i64,
    pub sda_kib: i64,
    /// Optional second disk: size in KiB and mount point.
    pub sdb: Option<(i64, String)>,
    pub network: String,
    pub ip: String,
    pub gateway: String,
    pub netmask: String,
    pub dns: Vec<String>,
    pub domain: Option<String>,
    pub datacenter: String,
    pub cluster: String,
    pub folder: Option<String>,
    pub datastore: DatastoreChoice,
    /// Source VM to clone from; `None` means create from scratch.
    pub source_vm: Option<String>,
    pub power_on: bool,
    pub guest_ip_timeout: u64,
    pub owner: String,
}

fn required_str(options: &Options, key: &str) -> Result<String> {
    options
        .get_str(key)
        .ok_or_else(|| ForgeError::Validation(format!("missing {} after validation", key)))
}

fn required_i64(options: &Options, key: &str) -> Result<i64> {
    options
        .get_i64(key)
        .ok_or_else(|| ForgeError::Validation(format!("missing {} after validation", key)))
}

impl HostSpec {
    pub fn from_options(options: &Options) -> Result<Self> {
        let datastore = match (options.get_str("datastore"), options.get_str("ds_regex")) {
            (Some(name), _) => DatastoreChoice::Named(name),
            (None, Some(pattern)) => DatastoreChoice::Pattern(pattern),
            (None, None) => {
                return Err(ForgeError::Validation(
                    "missing datastore selection after validation".to_string(),
                ))
            }
        };

        let sdb = match options.get_i64("sdb") {
            Some(size) => {
                let mount = options
                    .get_str("sdb_path")
                    .unwrap_or_else(|| "/pub".to_string());
                Some((size, mount))
            }
            None => None,
        };

        let dns = options
            .get_str("dns")
            .map(|list| {
                list.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            hostname: required_str(options, "hostname")?,
            short_hostname: required_str(options, "short_hostname")?,
            fqdn: required_str(options, "fqdn")?,
            cpus: required_i64(options, "cpu")?,
            memory_mib: required_i64(options, "mem")?,
            sda_kib: required_i64(options, "sda")?,
            sdb,
            network: required_str(options, "vlan")?,
            ip: required_str(options, "ip")?,
            gateway: required_str(options, "gateway")?,
            netmask: required_str(options, "netmask")?,
            dns,
            domain: options.get_str("domain"),
            datacenter: required_str(options, "dc")?,
            cluster: required_str(options, "cluster")?,
            folder: options.get_str("folder"),
            datastore,
            source_vm: options.get_str("source_vm"),
            power_on: options.get_bool("power_on").unwrap_or(true),
            guest_ip_timeout: options.get_i64("guest_ip_timeout").unwrap_or(300) as u64,
            owner: required_str(options, "username")?,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn validated_options() -> Options {
        let mut options = Options::new();
        options.set_str("hostname", "app3");
        options.set_str("short_hostname", "app3");
        options.set_str("fqdn", "app3.example.com");
        options.set_i64("cpu", 2);
        options.set_i64("mem", 2048);
        options.set_i64("sda", 15728640);
        options.set_str("vlan", "Production");
        options.set_str("ip", "10.1.2.50");
        options.set_str("gateway", "10.1.2.1");
        options.set_str("netmask", "255.255.255.0");
        options.set_str("dns", "10.1.0.2, 10.1.0.3");
        options.set_str("domain", "example.com");
        options.set_str("dc", "Primary");
        options.set_str("cluster", "Production");
        options.set_str("datastore", "fastsan01");
        options.set_str("username", "smerrill");
        options
    }

    #[test]
    fn test_builds_from_validated_options() {
        let spec = HostSpec::from_options(&validated_options()).unwrap();
        assert_eq!(spec.fqdn, "app3.example.com");
        assert_eq!(spec.cpus, 2);
        assert_eq!(spec.datastore, DatastoreChoice::Named("fastsan01".to_string()));
        assert_eq!(spec.dns, vec!["10.1.0.2", "10.1.0.3"]);
        assert!(spec.sdb.is_none());
        assert!(spec.power_on);
        assert_eq!(spec.guest_ip_timeout, 300);
    }

    #[test]
    fn test_regex_datastore_choice() {
        let mut options = validated_options();
        options.remove("datastore");
        options.set_str("ds_regex", "^encrypted");
        let spec = HostSpec::from_options(&options).unwrap();
        assert_eq!(spec.datastore, DatastoreChoice::Pattern("^encrypted".to_string()));
    }

    #[test]
    fn test_sdb_carried_with_mount() {
        let mut options = validated_options();
        options.set_i64("sdb", 10485760);
        options.set_str("sdb_path", "/data");
        let spec = HostSpec::from_options(&options).unwrap();
        assert_eq!(spec.sdb, Some((10485760, "/data".to_string())));
    }

    #[test]
    fn test_missing_key_fails_closed() {
        let mut options = validated_options();
        options.remove("ip");
        let err = HostSpec::from_options(&options).unwrap_err();
        assert!(err.to_string().contains("ip"));
    }
}
