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

use hostforge::cli::{self, Action, DisabledSubsystems};
use hostforge::cm::CmClient;
use hostforge::config;
use hostforge::decommission::{failed_count, Workflow};
use hostforge::ipam::IpamClient;
use hostforge::monitoring::MonitoringClient;
use hostforge::notify::Notifier;
use hostforge::provision::Executor;
use hostforge::vsphere::rest::VsphereRest;
use hostforge::vsphere::VsphereClient;
use hostforge::{ForgeError, HostSpec, Options, Output, Result, StageRegistry};
use std::process;

fn main() {
    process::exit(match liftoff() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}", e);
            1
        }
    });
}

fn liftoff() -> Result<i32> {
    let registry = StageRegistry::standard();
    let matches = cli::command(&registry).get_matches();
    let parsed = cli::parse(&registry, &matches);
    let out = Output::new(parsed.verbosity);

    let user_config = match config::user_config_path() {
        Some(path) => config::load_user_config(&path)?,
        None => Options::new(),
    };

    match parsed.action {
        Action::Provision { hostname } => {
            run_provision(&registry, &user_config, parsed.flags, &hostname, &out)
        }
        Action::Decommission { fqdn, disabled } => {
            run_decommission(&registry, &user_config, parsed.flags, &fqdn, &disabled, &out)
        }
        Action::Rename { source, new_name } => {
            run_rename(&registry, &user_config, parsed.flags, &source, &new_name)
        }
        Action::Template { source, template_name } => {
            run_template(&registry, &user_config, parsed.flags, &source, &template_name)
        }
    }
}

/// Prompt with echo off unless a password was already supplied.
fn ensure_password(options: &mut Options) -> Result<()> {
    if options.get_str("password").is_none() {
        let password = rpassword::prompt_password("Password: ")
            .map_err(|e| ForgeError::Config(format!("reading password: {}", e)))?;
        options.set_str("password", &password);
    }
    Ok(())
}

fn run_provision(
    registry: &StageRegistry,
    user_config: &Options,
    mut flags: Options,
    hostname: &str,
    out: &Output,
) -> Result<i32> {
    flags.set_str("hostname", hostname);
    let mut options = config::build_options(registry, user_config, &flags);

    let make_vm = options.get_bool("make_vm").unwrap_or(true);
    if make_vm || options.get_bool("autoip").unwrap_or(false) {
        ensure_password(&mut options)?;
    }

    registry.run_validation(&mut options, out)?;

    if !make_vm {
        println!("{} validates, skipping creation", hostname);
        return Ok(0);
    }

    let host = HostSpec::from_options(&options)?;
    let client = VsphereRest::from_options(&options)?;

    registry.run_pre_action(&mut options, out)?;
    Executor::new(&client, out).provision(&host)?;
    registry.run_post_action(&mut options, out)?;

    println!("{} created", host.fqdn);
    Ok(0)
}

/// Only the hypervisor and a configured address registry use the prompted
/// password; config management authenticates with its own key pair.
fn decommission_needs_password(disabled: &DisabledSubsystems, options: &Options) -> bool {
    !disabled.vm || (!disabled.ipam && options.get_str("ipam_url").is_some())
}

fn run_decommission(
    registry: &StageRegistry,
    user_config: &Options,
    flags: Options,
    fqdn: &str,
    disabled: &DisabledSubsystems,
    out: &Output,
) -> Result<i32> {
    let mut options = config::build_options(registry, user_config, &flags);
    if decommission_needs_password(disabled, &options) {
        ensure_password(&mut options)?;
    }

    let vsphere = if disabled.vm {
        None
    } else {
        Some(VsphereRest::from_options(&options)?)
    };
    let cm = if disabled.cm { None } else { CmClient::from_options(&options) };
    let mut ipam = if disabled.ipam {
        None
    } else {
        // unconfigured IPAM is a skip, not an error
        IpamClient::from_options(&options).ok()
    };
    let notifier =
        if disabled.email { None } else { Some(Notifier::from_options(&options)) };
    let monitoring =
        if disabled.downtime { None } else { MonitoringClient::from_options(&options) };

    let mut workflow = Workflow {
        vm: vsphere.as_ref().map(|c| c as &dyn VsphereClient),
        cm: cm.as_ref().map(|c| c as &dyn hostforge::decommission::Deregister),
        ipam: ipam
            .as_mut()
            .map(|c| c as &mut dyn hostforge::decommission::AddressRelease),
        email: notifier
            .as_ref()
            .map(|c| c as &dyn hostforge::decommission::DecommissionNotifier),
        downtime: monitoring
            .as_ref()
            .map(|c| c as &dyn hostforge::decommission::DowntimeScheduler),
    };
    let outcomes = workflow.run(fqdn, out);

    let failures = failed_count(&outcomes);
    if failures == 0 {
        println!("{} decommissioned", fqdn);
    }
    Ok(failures as i32)
}

fn run_rename(
    registry: &StageRegistry,
    user_config: &Options,
    flags: Options,
    source: &str,
    new_name: &str,
) -> Result<i32> {
    let mut options = config::build_options(registry, user_config, &flags);
    ensure_password(&mut options)?;
    let client = VsphereRest::from_options(&options)?;
    let vm = client
        .find_vm(source)?
        .ok_or_else(|| ForgeError::Vsphere(format!("{} not found", source)))?;
    client.rename(&vm, new_name)?;
    println!("{} renamed to {}", source, new_name);
    Ok(0)
}

fn run_template(
    registry: &StageRegistry,
    user_config: &Options,
    flags: Options,
    source: &str,
    template_name: &str,
) -> Result<i32> {
    let mut options = config::build_options(registry, user_config, &flags);
    ensure_password(&mut options)?;
    let client = VsphereRest::from_options(&options)?;
    let vm = client
        .find_vm(source)?
        .ok_or_else(|| ForgeError::Vsphere(format!("{} not found", source)))?;
    client.clone_to_template(&vm, template_name)?;
    println!("{} cloned to template {}", source, template_name);
    Ok(0)
}
