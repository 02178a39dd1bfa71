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

//! Host identity: hostname normalization and FQDN derivation.
//!
//! The FQDN rule is deliberately asymmetric: a dotless hostname with a
//! configured domain becomes `host.domain`, while a dotted name is used
//! literally whether or not a domain is set. The short name is always the
//! first label.

use crate::error::{ForgeError, Result};
use crate::options::Options;
use crate::output::Output;
use crate::pipeline::{FlagDef, Stage};

pub struct IdentityModule;

impl Stage for IdentityModule {
    fn name(&self) -> &'static str {
        "identity"
    }

    fn flags(&self) -> Vec<FlagDef> {
        vec![FlagDef {
            long: "domain",
            key: "domain",
            value_name: "DOMAIN",
            help: "DNS domain to append to the hostname",
        }]
    }

    fn validate(&self, options: &mut Options, _out: &Output) -> Result<()> {
        let hostname = options
            .get_str("hostname")
            .ok_or_else(|| ForgeError::Validation("missing hostname".to_string()))?
            .to_lowercase();

        let short = hostname.split('.').next().unwrap_or(&hostname).to_string();
        let fqdn = if !hostname.contains('.') {
            match options.get_str("domain") {
                Some(domain) => format!("{}.{}", hostname, domain),
                None => hostname.clone(),
            }
        } else {
            hostname.clone()
        };

        options.set_str("hostname", &hostname);
        options.set_str("short_hostname", &short);
        options.set_str("fqdn", &fqdn);
        Ok(())
    }
}
