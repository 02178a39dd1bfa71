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

//! The provisioning executor: datastore selection, VM materialization
//! (clone or create), power-on, guest-IP wait, and the best-effort
//! anti-affinity follow-up. Never reached unless the validation pipeline
//! succeeded.

use crate::drs;
use crate::error::{ForgeError, Result};
use crate::output::Output;
use crate::spec::{DatastoreChoice, HostSpec};
use crate::vsphere::{vm_spec, VsphereClient};
use std::thread;
use std::time::Duration;

/// Seconds between guest-IP polls.
pub const GUEST_IP_POLL_INTERVAL: u64 = 10;

/// Resolve the datastore to deploy onto. An exact name is taken as-is; a
/// pattern is matched against the datacenter's datastores and the match with
/// the most free space wins, first match winning ties.
pub fn select_datastore(client: &dyn VsphereClient, host: &HostSpec) -> Result<String> {
    match &host.datastore {
        DatastoreChoice::Named(name) => Ok(name.clone()),
        DatastoreChoice::Pattern(pattern) => {
            let re = regex::Regex::new(pattern).map_err(|e| {
                ForgeError::Validation(format!("bad datastore regex {}: {}", pattern, e))
            })?;
            let mut best: Option<(String, u64)> = None;
            for ds in client.datastores(&host.datacenter)? {
                if !re.is_match(&ds.name) {
                    continue;
                }
                // strictly-greater keeps the first of equals
                match &best {
                    Some((_, free)) if ds.free_bytes <= *free => {}
                    _ => best = Some((ds.name, ds.free_bytes)),
                }
            }
            best.map(|(name, _)| name).ok_or_else(|| {
                ForgeError::Vsphere(format!("no datastore matches {}", pattern))
            })
        }
    }
}

/// Poll for the guest-reported IP until the deadline. Not getting one in
/// time is a warning; the VM was still provisioned.
pub fn wait_for_guest_ip(
    client: &dyn VsphereClient,
    vm: &str,
    timeout_secs: u64,
    interval_secs: u64,
    out: &Output,
) -> Result<Option<String>> {
    let mut elapsed = 0u64;
    loop {
        if let Some(ip) = client.guest_ip(vm)? {
            out.info(&format!("{} reports {}", vm, ip));
            return Ok(Some(ip));
        }
        if elapsed >= timeout_secs {
            out.warning(&format!(
                "{} did not report an IP within {} seconds",
                vm, timeout_secs
            ));
            return Ok(None);
        }
        thread::sleep(Duration::from_secs(interval_secs));
        elapsed += interval_secs;
    }
}

pub struct Executor<'a> {
    client: &'a dyn VsphereClient,
    out: &'a Output,
}

impl<'a> Executor<'a> {
    pub fn new(client: &'a dyn VsphereClient, out: &'a Output) -> Self {
        Self { client, out }
    }

    pub fn provision(&self, host: &HostSpec) -> Result<()> {
        self.provision_with_interval(host, GUEST_IP_POLL_INTERVAL)
    }

    pub(crate) fn provision_with_interval(&self, host: &HostSpec, interval: u64) -> Result<()> {
        let datastore = select_datastore(self.client, host)?;
        self.out.debug(&format!("datastore: {}", datastore));
        let spec = vm_spec(host, &datastore);

        let vm = match &host.source_vm {
            Some(source) => {
                let source_id = self.client.find_vm(source)?.ok_or_else(|| {
                    ForgeError::Vsphere(format!("source VM {} not found", source))
                })?;
                self.out.info(&format!("cloning {} to {}", source, spec.name));
                self.client.clone_vm(&source_id, &spec)?
            }
            None => {
                self.out.info(&format!("creating {}", spec.name));
                self.client.create_vm(&spec)?
            }
        };

        if host.power_on {
            self.client.power_on(&vm)?;
            wait_for_guest_ip(self.client, &vm, host.guest_ip_timeout, interval, self.out)?;
        }

        // last step, and best effort: the VM exists whatever happens here
        if let Err(e) = drs::reconcile(
            self.client,
            &host.cluster,
            &host.short_hostname,
            host.domain.as_deref(),
            self.out,
        ) {
            self.out.warning(&format!("anti-affinity reconciliation failed: {}", e));
        }
        Ok(())
    }
}
