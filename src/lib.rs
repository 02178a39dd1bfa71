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

//! Hostforge: VM lifecycle orchestration.
//!
//! A staged validation pipeline turns configuration and CLI flags into a
//! frozen host description, a provisioning executor materializes it on the
//! hypervisor, and a decommission workflow tears hosts down across every
//! system of record that knows about them.

pub mod cli;
pub mod cm;
pub mod config;
pub mod decommission;
pub mod drs;
pub mod error;
pub mod ipam;
pub mod modules;
pub mod monitoring;
pub mod notify;
pub mod options;
pub mod output;
pub mod pipeline;
pub mod provision;
pub mod spec;
pub mod vsphere;

pub use error::{ForgeError, Result};
pub use options::Options;
pub use output::Output;
pub use pipeline::{FlagDef, Stage, StageRegistry};
pub use spec::HostSpec;
