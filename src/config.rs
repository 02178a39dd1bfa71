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

//! Configuration merging. One Options record is produced from, in increasing
//! precedence: baseline defaults, core-module defaults, plugin defaults, the
//! user configuration file, and parsed CLI flags. Unknown config keys pass
//! through untouched so newer stages can read them from older files.

use crate::error::{ForgeError, Result};
use crate::options::Options;
use crate::pipeline::StageRegistry;
use serde_yaml::Mapping;
use std::fs;
use std::path::{Path, PathBuf};

pub const USER_CONFIG_PATH: &str = "~/.hostforge.yaml";

/// Hard-coded baseline, below every other source.
pub fn baseline_defaults() -> Options {
    let mut options = Options::new();
    if let Ok(user) = std::env::var("USER") {
        options.set_str("username", &user);
    }
    options.set_bool("insecure", true);
    options.set_bool("make_vm", true);
    options.set_bool("power_on", true);
    options.set_bool("clone", false);
    options.set_str("gateway_octet", "1");
    options.set_i64("guest_ip_timeout", 300);
    options
}

/// Default location of the user configuration file.
pub fn user_config_path() -> Option<PathBuf> {
    expanduser::expanduser(USER_CONFIG_PATH).ok()
}

/// Load the user configuration file. A missing file is fine (empty record);
/// a malformed one is fatal before any external call is made.
pub fn load_user_config(path: &Path) -> Result<Options> {
    if !path.exists() {
        return Ok(Options::new());
    }
    let text = fs::read_to_string(path)
        .map_err(|e| ForgeError::Config(format!("unable to read {}: {}", path.display(), e)))?;
    let mapping: Mapping = serde_yaml::from_str(&text)
        .map_err(|e| ForgeError::Config(format!("malformed config {}: {}", path.display(), e)))?;
    Options::from_mapping(&mapping).map_err(ForgeError::Config)
}

/// Apply the documented precedence order and produce the working record.
pub fn build_options(
    registry: &StageRegistry,
    user_config: &Options,
    cli_flags: &Options,
) -> Options {
    let mut options = baseline_defaults();
    options.merge(&registry.stage_defaults());
    options.merge(user_config);
    options.merge(cli_flags);
    options
}
