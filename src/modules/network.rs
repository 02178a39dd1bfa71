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

//! Network placement: maps the requested subnet to a logical network name
//! through the user-configured `network` map, defaulting the subnet from the
//! application-environment tag when none was given explicitly.

use crate::error::{ForgeError, Result};
use crate::options::Options;
use crate::output::Output;
use crate::pipeline::{FlagDef, Stage};
use serde_yaml::Value;

const NETWORK_MAP_HELP: &str = "To configure the network interface you need a `network` map \
in ~/.hostforge.yaml. The map goes from subnet to logical network name, e.g.\n\
network:\n  '192.168.20.0':\n    name: 'Production'\n  '192.168.30.0':\n    name: 'DMZ'";

/// Subnet actually in effect: the explicit `subnet` key, or the one mapped
/// from `app_env` through the `environments` map. Plugins that allocate
/// addresses use this before core validation runs.
pub fn effective_subnet(options: &Options) -> Option<String> {
    if let Some(subnet) = options.get_str("subnet") {
        return Some(subnet);
    }
    let app_env = options.get_str("app_env")?;
    let environments = options.get_map("environments")?;
    environments
        .get(Value::String(app_env))
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

/// Render a subnet and dotted-quad netmask as CIDR notation, the form the
/// address registry searches by.
pub fn cidr(subnet: &str, netmask: &str) -> Result<String> {
    let mut prefix = 0u32;
    let octets: Vec<&str> = netmask.split('.').collect();
    if octets.len() != 4 {
        return Err(ForgeError::Validation(format!("bad netmask {}", netmask)));
    }
    for octet in octets {
        let value = octet
            .parse::<u8>()
            .map_err(|_| ForgeError::Validation(format!("bad netmask {}", netmask)))?;
        prefix += value.count_ones();
    }
    Ok(format!("{}/{}", subnet, prefix))
}

pub struct NetworkModule;

impl Stage for NetworkModule {
    fn name(&self) -> &'static str {
        "network"
    }

    fn defaults(&self) -> Options {
        let mut options = Options::new();
        options.set_str("netmask", "255.255.255.0");
        options
    }

    fn flags(&self) -> Vec<FlagDef> {
        vec![
            FlagDef {
                long: "netmask",
                key: "netmask",
                value_name: "NETMASK",
                help: "Subnet mask (255.255.255.0)",
            },
            FlagDef {
                long: "dns",
                key: "dns",
                value_name: "DNS1{,DNS2,...}",
                help: "DNS server(s) to use",
            },
            FlagDef {
                long: "app-env",
                key: "app_env",
                value_name: "APP_ENV",
                help: "Application environment tag; also defaults the subnet",
            },
        ]
    }

    fn validate(&self, options: &mut Options, out: &Output) -> Result<()> {
        let subnet = match effective_subnet(options) {
            Some(s) => s,
            None => {
                return Err(ForgeError::Validation(
                    "no subnet supplied and none derivable from app_env".to_string(),
                ))
            }
        };
        options.set_str("subnet", &subnet);

        let network_map = options
            .get_map("network")
            .ok_or_else(|| ForgeError::Validation(NETWORK_MAP_HELP.to_string()))?;

        let vlan = network_map
            .get(Value::String(subnet.clone()))
            .and_then(|entry| entry.get(Value::String("name".to_string())))
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| {
                ForgeError::Validation(format!(
                    "invalid subnet {} - validate your subnet configuration",
                    subnet
                ))
            })?;

        out.debug(&format!("subnet {} -> network {}", subnet, vlan));
        options.set_str("vlan", &vlan);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_yaml::Mapping;

    fn with_network_map(extra: &str) -> Options {
        let yaml = format!(
            "network:\n  '192.168.20.0':\n    name: 'Production'\n  '192.168.30.0':\n    name: 'DMZ'\n{}",
            extra
        );
        let mapping: Mapping = serde_yaml::from_str(&yaml).unwrap();
        Options::from_mapping(&mapping).unwrap()
    }

    #[test]
    fn test_cidr_from_netmask() {
        assert_eq!(cidr("192.168.20.0", "255.255.255.0").unwrap(), "192.168.20.0/24");
        assert_eq!(cidr("10.0.0.0", "255.255.0.0").unwrap(), "10.0.0.0/16");
        assert!(cidr("10.0.0.0", "255.255.255").is_err());
    }

    #[test]
    fn test_subnet_maps_to_logical_network() {
        let mut options = with_network_map("subnet: '192.168.20.0'");
        NetworkModule.validate(&mut options, &Output::quiet()).unwrap();
        assert_eq!(options.get_str("vlan").unwrap(), "Production");
    }

    #[test]
    fn test_subnet_defaults_from_app_env() {
        let mut options = with_network_map(
            "app_env: production\nenvironments:\n  production: '192.168.20.0'\n  staging: '192.168.30.0'",
        );
        NetworkModule.validate(&mut options, &Output::quiet()).unwrap();
        assert_eq!(options.get_str("subnet").unwrap(), "192.168.20.0");
        assert_eq!(options.get_str("vlan").unwrap(), "Production");
    }

    #[test]
    fn test_explicit_subnet_beats_app_env() {
        let mut options = with_network_map(
            "subnet: '192.168.30.0'\napp_env: production\nenvironments:\n  production: '192.168.20.0'",
        );
        NetworkModule.validate(&mut options, &Output::quiet()).unwrap();
        assert_eq!(options.get_str("vlan").unwrap(), "DMZ");
    }

    #[test]
    fn test_unknown_subnet_is_fatal() {
        let mut options = with_network_map("subnet: '10.9.9.0'");
        assert!(NetworkModule.validate(&mut options, &Output::quiet()).is_err());
    }

    #[test]
    fn test_missing_network_map_is_fatal() {
        let mut options = Options::new();
        options.set_str("subnet", "192.168.20.0");
        assert!(NetworkModule.validate(&mut options, &Output::quiet()).is_err());
    }

    #[test]
    fn test_no_subnet_no_app_env_is_fatal() {
        let mut options = with_network_map("");
        assert!(NetworkModule.validate(&mut options, &Output::quiet()).is_err());
    }
}
