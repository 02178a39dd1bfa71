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

//! Hypervisor placement targets: datacenter, cluster, folder, and the
//! datastore selection (exact name, or regex resolved later against free
//! space). An explicit datastore wins when both are given.

use crate::error::{ForgeError, Result};
use crate::options::Options;
use crate::output::Output;
use crate::pipeline::{FlagDef, Stage};

pub struct PlacementModule;

impl Stage for PlacementModule {
    fn name(&self) -> &'static str {
        "placement"
    }

    fn flags(&self) -> Vec<FlagDef> {
        vec![
            FlagDef {
                long: "dc",
                key: "dc",
                value_name: "DATACENTER",
                help: "vSphere data center",
            },
            FlagDef {
                long: "cluster",
                key: "cluster",
                value_name: "CLUSTER",
                help: "vSphere cluster",
            },
            FlagDef {
                long: "folder",
                key: "folder",
                value_name: "FOLDER",
                help: "vSphere VM folder",
            },
            FlagDef {
                long: "datastore",
                key: "datastore",
                value_name: "DATASTORE",
                help: "vSphere datastore to use (exact name)",
            },
            FlagDef {
                long: "dsregex",
                key: "ds_regex",
                value_name: "REGEX",
                help: "vSphere datastore regex; most free space wins",
            },
            FlagDef {
                long: "sourcevm",
                key: "source_vm",
                value_name: "SOURCEVM",
                help: "Source VM from which to clone the new VM",
            },
        ]
    }

    fn validate(&self, options: &mut Options, _out: &Output) -> Result<()> {
        if options.get_str("dc").is_none() {
            return Err(ForgeError::Validation("--dc is required".to_string()));
        }
        if options.get_str("cluster").is_none() {
            return Err(ForgeError::Validation("--cluster is required".to_string()));
        }
        if options.get_str("datastore").is_none() && options.get_str("ds_regex").is_none() {
            return Err(ForgeError::Validation(
                "either --datastore or --dsregex is required".to_string(),
            ));
        }
        if let Some(pattern) = options.get_str("ds_regex") {
            regex::Regex::new(&pattern).map_err(|e| {
                ForgeError::Validation(format!("bad datastore regex {}: {}", pattern, e))
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Options {
        let mut options = Options::new();
        options.set_str("dc", "Primary");
        options.set_str("cluster", "Production");
        options
    }

    #[test]
    fn test_explicit_datastore_accepted() {
        let mut options = base();
        options.set_str("datastore", "fastsan01");
        PlacementModule.validate(&mut options, &Output::quiet()).unwrap();
    }

    #[test]
    fn test_regex_accepted() {
        let mut options = base();
        options.set_str("ds_regex", "^encrypted");
        PlacementModule.validate(&mut options, &Output::quiet()).unwrap();
    }

    #[test]
    fn test_datastore_or_regex_required() {
        let mut options = base();
        assert!(PlacementModule.validate(&mut options, &Output::quiet()).is_err());
    }

    #[test]
    fn test_bad_regex_is_fatal() {
        let mut options = base();
        options.set_str("ds_regex", "([unclosed");
        assert!(PlacementModule.validate(&mut options, &Output::quiet()).is_err());
    }

    #[test]
    fn test_cluster_required() {
        let mut options = Options::new();
        options.set_str("dc", "Primary");
        options.set_str("datastore", "fastsan01");
        assert!(PlacementModule.validate(&mut options, &Output::quiet()).is_err());
    }
}
