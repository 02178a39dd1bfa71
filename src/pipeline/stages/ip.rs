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

//! Static addressing checks. Pre-validation derives the gateway from the
//! address when none was given, by swapping the last octet for
//! `gateway_octet`; an explicit gateway is never overwritten.
//! Post-validation runs after core normalization and fails the run on any
//! inconsistent address configuration.

use crate::error::{ForgeError, Result};
use crate::options::Options;
use crate::output::Output;
use crate::pipeline::{FlagDef, Stage};
use std::net::Ipv4Addr;

fn parse_addr(what: &str, value: &str) -> Result<Ipv4Addr> {
    value
        .parse::<Ipv4Addr>()
        .map_err(|_| ForgeError::Validation(format!("invalid {} {}", what, value)))
}

/// Contiguous-ones check: 255.255.254.0 is a mask, 255.0.255.0 is not.
fn valid_netmask(netmask: &str) -> bool {
    match netmask.parse::<Ipv4Addr>() {
        Ok(addr) => {
            let bits = u32::from(addr);
            bits != 0 && bits.leading_ones() == bits.count_ones()
        }
        Err(_) => false,
    }
}

pub struct IpStage;

impl Stage for IpStage {
    fn name(&self) -> &'static str {
        "ip"
    }

    fn flags(&self) -> Vec<FlagDef> {
        vec![
            FlagDef {
                long: "ip",
                key: "ip",
                value_name: "X.X.X.X",
                help: "IP address for the VM",
            },
            FlagDef {
                long: "gateway",
                key: "gateway",
                value_name: "X.X.X.X",
                help: "Default gateway; derived from the IP when omitted",
            },
            FlagDef {
                long: "subnet",
                key: "subnet",
                value_name: "SUBNET",
                help: "Subnet the VM lives in (network address)",
            },
        ]
    }

    fn pre_validate(&self, options: &mut Options, out: &Output) -> Result<()> {
        if options.contains("gateway") {
            return Ok(());
        }
        let ip = match options.get_str("ip") {
            Some(ip) => ip,
            None => return Ok(()),
        };
        let octet = options
            .get_str("gateway_octet")
            .unwrap_or_else(|| "1".to_string());
        let mut pieces: Vec<&str> = ip.split('.').collect();
        if pieces.len() != 4 {
            // malformed ip is post_validate's problem
            return Ok(());
        }
        pieces[3] = &octet;
        let gateway = pieces.join(".");
        out.debug(&format!("derived gateway {} from {}", gateway, ip));
        options.set_str("gateway", &gateway);
        Ok(())
    }

    fn post_validate(&self, options: &mut Options, _out: &Output) -> Result<()> {
        let ip = options
            .get_str("ip")
            .ok_or_else(|| ForgeError::Validation("no IP address configured".to_string()))?;
        let ip_addr = parse_addr("IP address", &ip)?;

        if let Some(netmask) = options.get_str("netmask") {
            if !valid_netmask(&netmask) {
                return Err(ForgeError::Validation(format!("invalid netmask {}", netmask)));
            }
        }

        let gateway = options
            .get_str("gateway")
            .ok_or_else(|| ForgeError::Validation("no gateway configured".to_string()))?;
        let gateway_addr = parse_addr("gateway", &gateway)?;

        if ip_addr == gateway_addr {
            return Err(ForgeError::Validation(format!(
                "IP address and gateway are both {}",
                ip
            )));
        }
        Ok(())
    }
}
