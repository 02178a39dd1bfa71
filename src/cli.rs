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

//! Command-line surface. Stage-declared `FlagDef`s are materialized as
//! value-taking long options on the `provision` subcommand, so adding a
//! stage extends the CLI without touching this file.

use crate::options::Options;
use crate::pipeline::StageRegistry;
use clap::{Arg, ArgAction, ArgMatches, Command};

/// Which decommission subsystems the user switched off.
#[derive(Debug, Default, Clone)]
pub struct DisabledSubsystems {
    pub vm: bool,
    pub cm: bool,
    pub ipam: bool,
    pub email: bool,
    pub downtime: bool,
}

#[derive(Debug)]
pub enum Action {
    Provision { hostname: String },
    Decommission { fqdn: String, disabled: DisabledSubsystems },
    Rename { source: String, new_name: String },
    Template { source: String, template_name: String },
}

pub struct ParsedCli {
    pub action: Action,
    /// Stage-flag values, merged above the config file.
    pub flags: Options,
    pub verbosity: u32,
}

fn connection_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("username")
                .long("username")
                .short('u')
                .value_name("USERNAME")
                .help("User to authenticate as")
                .num_args(1),
        )
        .arg(
            Arg::new("password")
                .long("password")
                .short('p')
                .value_name("PASSWORD")
                .help("Password; prompted with echo off when omitted")
                .num_args(1),
        )
        .arg(
            Arg::new("insecure")
                .long("no-insecure")
                .action(ArgAction::SetTrue)
                .help("Validate TLS certificates"),
        )
}

pub fn command(registry: &StageRegistry) -> Command {
    let mut provision = Command::new("provision")
        .about("Validate a host description and create the VM")
        .arg(Arg::new("hostname").value_name("HOSTNAME").required(true).num_args(1))
        .arg(
            Arg::new("autoip")
                .long("autoip")
                .action(ArgAction::SetTrue)
                .help("Allocate the IP address from the address registry"),
        )
        .arg(
            Arg::new("no-power-on")
                .long("no-power-on")
                .action(ArgAction::SetTrue)
                .help("Leave the VM powered off after creation"),
        )
        .arg(
            Arg::new("no-make-vm")
                .long("no-make-vm")
                .action(ArgAction::SetTrue)
                .help("Stop after validation without creating anything"),
        );
    for flag in registry.flags() {
        provision = provision.arg(
            Arg::new(flag.key)
                .long(flag.long)
                .value_name(flag.value_name)
                .help(flag.help)
                .num_args(1),
        );
    }
    provision = connection_args(provision);

    let mut decommission = Command::new("decommission")
        .about("Power off and destroy a VM and clean up its records")
        .arg(Arg::new("fqdn").value_name("FQDN").required(true).num_args(1));
    for (id, help) in [
        ("no-vm", "Skip the hypervisor"),
        ("no-cm", "Skip config-management deregistration"),
        ("no-ipam", "Skip the address registry release"),
        ("no-email", "Skip the notification email"),
        ("no-downtime", "Skip monitoring downtime"),
    ] {
        decommission =
            decommission.arg(Arg::new(id).long(id).action(ArgAction::SetTrue).help(help));
    }
    decommission = connection_args(decommission);

    let rename = connection_args(
        Command::new("rename")
            .about("Rename a VM")
            .arg(
                Arg::new("source")
                    .long("source")
                    .short('s')
                    .value_name("HOSTNAME")
                    .required(true)
                    .num_args(1)
                    .help("VM to rename"),
            )
            .arg(
                Arg::new("newname")
                    .long("newname")
                    .short('n')
                    .value_name("HOSTNAME")
                    .required(true)
                    .num_args(1)
                    .help("New name"),
            ),
    );

    let template = connection_args(
        Command::new("template")
            .about("Clone a VM into a template")
            .arg(
                Arg::new("source")
                    .long("source")
                    .short('s')
                    .value_name("HOSTNAME")
                    .required(true)
                    .num_args(1)
                    .help("VM to clone from"),
            )
            .arg(
                Arg::new("template-name")
                    .long("template-name")
                    .short('t')
                    .value_name("NAME")
                    .required(true)
                    .num_args(1)
                    .help("Name of the template to create"),
            ),
    );

    Command::new("hostforge")
        .version(env!("CARGO_PKG_VERSION"))
        .about("VM lifecycle orchestration")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .action(ArgAction::Count)
                .global(true)
                .help("Increase verbosity (-vv for debug)"),
        )
        .subcommand(provision)
        .subcommand(decommission)
        .subcommand(rename)
        .subcommand(template)
}

/// Lift matched values into an Options record keyed the way the stages
/// expect, applying the `--no-*` inversions.
fn flag_options(registry: &StageRegistry, matches: &ArgMatches) -> Options {
    let mut flags = Options::new();
    for flag in registry.flags() {
        if let Some(value) = matches.get_one::<String>(flag.key) {
            flags.set_str(flag.key, value);
        }
    }
    if let Some(value) = matches.get_one::<String>("username") {
        flags.set_str("username", value);
    }
    if let Some(value) = matches.get_one::<String>("password") {
        flags.set_str("password", value);
    }
    if matches.get_flag("autoip") {
        flags.set_bool("autoip", true);
    }
    if matches.get_flag("no-power-on") {
        flags.set_bool("power_on", false);
    }
    if matches.get_flag("no-make-vm") {
        flags.set_bool("make_vm", false);
    }
    if matches.get_flag("insecure") {
        flags.set_bool("insecure", false);
    }
    flags
}

fn connection_options(matches: &ArgMatches) -> Options {
    let mut flags = Options::new();
    if let Some(value) = matches.get_one::<String>("username") {
        flags.set_str("username", value);
    }
    if let Some(value) = matches.get_one::<String>("password") {
        flags.set_str("password", value);
    }
    if matches.get_flag("insecure") {
        flags.set_bool("insecure", false);
    }
    flags
}

pub fn parse(registry: &StageRegistry, matches: &ArgMatches) -> ParsedCli {
    let verbosity = matches.get_count("verbose") as u32;
    match matches.subcommand() {
        Some(("provision", sub)) => ParsedCli {
            action: Action::Provision {
                hostname: sub.get_one::<String>("hostname").cloned().unwrap_or_default(),
            },
            flags: flag_options(registry, sub),
            verbosity,
        },
        Some(("decommission", sub)) => {
            let disabled = DisabledSubsystems {
                vm: sub.get_flag("no-vm"),
                cm: sub.get_flag("no-cm"),
                ipam: sub.get_flag("no-ipam"),
                email: sub.get_flag("no-email"),
                downtime: sub.get_flag("no-downtime"),
            };
            ParsedCli {
                action: Action::Decommission {
                    fqdn: sub
                        .get_one::<String>("fqdn")
                        .cloned()
                        .unwrap_or_default()
                        .to_lowercase(),
                    disabled,
                },
                flags: connection_options(sub),
                verbosity,
            }
        }
        Some(("rename", sub)) => ParsedCli {
            action: Action::Rename {
                source: sub.get_one::<String>("source").cloned().unwrap_or_default(),
                new_name: sub.get_one::<String>("newname").cloned().unwrap_or_default(),
            },
            flags: connection_options(sub),
            verbosity,
        },
        Some(("template", sub)) => ParsedCli {
            action: Action::Template {
                source: sub.get_one::<String>("source").cloned().unwrap_or_default(),
                template_name: sub
                    .get_one::<String>("template-name")
                    .cloned()
                    .unwrap_or_default(),
            },
            flags: connection_options(sub),
            verbosity,
        },
        // subcommand_required makes this unreachable in practice
        _ => ParsedCli {
            action: Action::Provision { hostname: String::new() },
            flags: Options::new(),
            verbosity,
        },
    }
}
