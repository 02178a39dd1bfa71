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

//! Automatic address allocation. When enabled and no `ip` was supplied,
//! this stage asks the address registry for the first free address in the
//! effective subnet and injects it into the Options record, before core
//! validation runs. An explicit `ip` always wins: the stage backs off
//! rather than double-allocate.

use crate::error::{ForgeError, Result};
use crate::ipam::IpamClient;
use crate::modules::network;
use crate::options::Options;
use crate::output::Output;
use crate::pipeline::Stage;

/// Seam between the stage and the address registry, so pipeline behavior is
/// testable without a live server.
pub trait IpAllocator {
    fn allocate(&self, options: &Options, cidr: &str, hostname: &str) -> Result<String>;
}

/// Production allocator: a fresh IPAM session per allocation.
struct RegistryAllocator;

impl IpAllocator for RegistryAllocator {
    fn allocate(&self, options: &Options, cidr: &str, hostname: &str) -> Result<String> {
        let mut client = IpamClient::from_options(options)?;
        client.allocate(cidr, hostname)
    }
}

pub struct AutoipStage {
    allocator: Box<dyn IpAllocator>,
}

impl AutoipStage {
    pub fn new() -> Self {
        Self { allocator: Box::new(RegistryAllocator) }
    }

    pub fn with_allocator(allocator: Box<dyn IpAllocator>) -> Self {
        Self { allocator }
    }
}

impl Default for AutoipStage {
    fn default() -> Self {
        Self::new()
    }
}

impl Stage for AutoipStage {
    fn name(&self) -> &'static str {
        "autoip"
    }

    fn pre_validate(&self, options: &mut Options, out: &Output) -> Result<()> {
        if !options.get_bool("autoip").unwrap_or(false) {
            return Ok(());
        }
        if options.contains("ip") {
            out.debug("autoip: ip already set, leaving it alone");
            return Ok(());
        }

        let subnet = network::effective_subnet(options).ok_or_else(|| {
            ForgeError::Validation(
                "autoip needs a subnet, via --subnet or app_env".to_string(),
            )
        })?;
        let netmask = options
            .get_str("netmask")
            .unwrap_or_else(|| "255.255.255.0".to_string());
        let cidr = network::cidr(&subnet, &netmask)?;
        let hostname = options
            .get_str("hostname")
            .ok_or_else(|| ForgeError::Validation("autoip needs a hostname".to_string()))?;

        let ip = self.allocator.allocate(options, &cidr, &hostname)?;
        out.info(&format!("allocated {} for {}", ip, hostname));
        options.set_str("ip", &ip);
        Ok(())
    }
}
