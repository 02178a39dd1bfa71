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

//! Hypervisor boundary. Everything the executor, decommission workflow,
//! and anti-affinity reconciler need from vSphere goes through the
//! `VsphereClient` trait; the REST implementation lives in `rest.rs` and
//! tests substitute a scripted mock.

pub mod rest;

use crate::error::Result;
use crate::spec::HostSpec;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PowerState {
    PoweredOn,
    PoweredOff,
    Suspended,
    Other(String),
}

impl PowerState {
    pub fn from_wire(value: &str) -> Self {
        match value {
            "poweredOn" | "POWERED_ON" => PowerState::PoweredOn,
            "poweredOff" | "POWERED_OFF" => PowerState::PoweredOff,
            "suspended" | "SUSPENDED" => PowerState::Suspended,
            other => PowerState::Other(other.to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Datastore {
    pub name: String,
    pub free_bytes: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AffinityRule {
    pub name: String,
    pub members: Vec<String>,
}

/// Guest OS customization applied during clone/create.
#[derive(Debug, Clone)]
pub struct Customization {
    pub short_hostname: String,
    pub domain: Option<String>,
    pub ip: String,
    pub gateway: String,
    pub netmask: String,
    pub dns: Vec<String>,
}

/// A disk to attach: size plus the mount point the guest gives it.
#[derive(Debug, Clone, PartialEq)]
pub struct DiskSpec {
    pub size_kib: i64,
    pub mount: Option<String>,
}

/// Everything the hypervisor needs to materialize one VM. Built by the
/// executor from a `HostSpec` plus the resolved datastore.
#[derive(Debug, Clone)]
pub struct VmSpec {
    pub name: String,
    pub cpus: i64,
    pub memory_mib: i64,
    pub disks: Vec<DiskSpec>,
    pub network: String,
    pub datacenter: String,
    pub cluster: String,
    pub folder: Option<String>,
    pub datastore: String,
    pub annotation: String,
    pub customization: Customization,
}

pub trait VsphereClient {
    /// Resolve a VM name to its identifier, `None` when absent.
    fn find_vm(&self, name: &str) -> Result<Option<String>>;
    fn power_state(&self, vm: &str) -> Result<PowerState>;
    fn power_on(&self, vm: &str) -> Result<()>;
    fn power_off(&self, vm: &str) -> Result<()>;
    fn destroy(&self, vm: &str) -> Result<()>;
    fn rename(&self, vm: &str, new_name: &str) -> Result<()>;
    fn clone_vm(&self, source: &str, spec: &VmSpec) -> Result<String>;
    fn create_vm(&self, spec: &VmSpec) -> Result<String>;
    /// Clone a powered-off copy of `source` and mark it as a template.
    fn clone_to_template(&self, source: &str, template_name: &str) -> Result<()>;
    /// Current guest-reported IP address, `None` until tools report one.
    fn guest_ip(&self, vm: &str) -> Result<Option<String>>;
    fn datastores(&self, datacenter: &str) -> Result<Vec<Datastore>>;
    fn affinity_rules(&self, cluster: &str) -> Result<Vec<AffinityRule>>;
    fn create_affinity_rule(&self, cluster: &str, name: &str, members: &[String]) -> Result<()>;
    fn delete_affinity_rule(&self, cluster: &str, name: &str) -> Result<()>;
}

/// Annotation stamped onto every VM hostforge creates.
pub fn creation_annotation(owner: &str) -> String {
    let now = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
    format!("Created by {} on {}", owner, now)
}

/// Build the hypervisor-facing spec from a validated host description and
/// the datastore the executor settled on.
pub fn vm_spec(host: &HostSpec, datastore: &str) -> VmSpec {
    let mut disks = vec![DiskSpec { size_kib: host.sda_kib, mount: None }];
    if let Some((size, mount)) = &host.sdb {
        disks.push(DiskSpec { size_kib: *size, mount: Some(mount.clone()) });
    }
    VmSpec {
        name: host.short_hostname.clone(),
        cpus: host.cpus,
        memory_mib: host.memory_mib,
        disks,
        network: host.network.clone(),
        datacenter: host.datacenter.clone(),
        cluster: host.cluster.clone(),
        folder: host.folder.clone(),
        datastore: datastore.to_string(),
        annotation: creation_annotation(&host.owner),
        customization: Customization {
            short_hostname: host.short_hostname.clone(),
            domain: host.domain.clone(),
            ip: host.ip.clone(),
            gateway: host.gateway.clone(),
            netmask: host.netmask.clone(),
            dns: host.dns.clone(),
        },
    }
}

#[cfg(test)]
pub(crate) mod mock {
    use super::*;
    use crate::error::ForgeError;
    use std::cell::RefCell;
    use std::collections::HashMap;

    /// Scripted in-memory hypervisor for unit tests. Call order is recorded
    /// as readable strings; state tables drive the responses.
    pub struct MockVsphere {
        pub calls: RefCell<Vec<String>>,
        pub vms: RefCell<HashMap<String, PowerState>>,
        pub guest_ips: RefCell<HashMap<String, String>>,
        pub datastores: Vec<Datastore>,
        pub rules: RefCell<Vec<AffinityRule>>,
        pub fail_power_off: bool,
        pub fail_destroy: bool,
        pub fail_create_rule: bool,
        pub fail_affinity_rules: bool,
    }

    impl MockVsphere {
        pub fn new() -> Self {
            Self {
                calls: RefCell::new(Vec::new()),
                vms: RefCell::new(HashMap::new()),
                guest_ips: RefCell::new(HashMap::new()),
                datastores: Vec::new(),
                rules: RefCell::new(Vec::new()),
                fail_power_off: false,
                fail_destroy: false,
                fail_create_rule: false,
                fail_affinity_rules: false,
            }
        }

        pub fn with_vm(self, name: &str, state: PowerState) -> Self {
            self.vms.borrow_mut().insert(name.to_string(), state);
            self
        }

        pub fn record(&self, call: String) {
            self.calls.borrow_mut().push(call);
        }

        pub fn call_log(&self) -> Vec<String> {
            self.calls.borrow().clone()
        }
    }

    impl VsphereClient for MockVsphere {
        fn find_vm(&self, name: &str) -> Result<Option<String>> {
            self.record(format!("find_vm {}", name));
            Ok(self.vms.borrow().contains_key(name).then(|| name.to_string()))
        }

        fn power_state(&self, vm: &str) -> Result<PowerState> {
            self.record(format!("power_state {}", vm));
            self.vms
                .borrow()
                .get(vm)
                .cloned()
                .ok_or_else(|| ForgeError::Vsphere(format!("no such VM {}", vm)))
        }

        fn power_on(&self, vm: &str) -> Result<()> {
            self.record(format!("power_on {}", vm));
            self.vms.borrow_mut().insert(vm.to_string(), PowerState::PoweredOn);
            Ok(())
        }

        fn power_off(&self, vm: &str) -> Result<()> {
            self.record(format!("power_off {}", vm));
            if self.fail_power_off {
                return Err(ForgeError::Vsphere("power off refused".to_string()));
            }
            self.vms.borrow_mut().insert(vm.to_string(), PowerState::PoweredOff);
            Ok(())
        }

        fn destroy(&self, vm: &str) -> Result<()> {
            self.record(format!("destroy {}", vm));
            if self.fail_destroy {
                return Err(ForgeError::Vsphere("destroy refused".to_string()));
            }
            self.vms.borrow_mut().remove(vm);
            Ok(())
        }

        fn rename(&self, vm: &str, new_name: &str) -> Result<()> {
            self.record(format!("rename {} -> {}", vm, new_name));
            let state = self.vms.borrow_mut().remove(vm);
            if let Some(state) = state {
                self.vms.borrow_mut().insert(new_name.to_string(), state);
            }
            Ok(())
        }

        fn clone_vm(&self, source: &str, spec: &VmSpec) -> Result<String> {
            self.record(format!("clone_vm {} -> {}", source, spec.name));
            self.vms
                .borrow_mut()
                .insert(spec.name.clone(), PowerState::PoweredOff);
            Ok(spec.name.clone())
        }

        fn create_vm(&self, spec: &VmSpec) -> Result<String> {
            self.record(format!("create_vm {}", spec.name));
            self.vms
                .borrow_mut()
                .insert(spec.name.clone(), PowerState::PoweredOff);
            Ok(spec.name.clone())
        }

        fn clone_to_template(&self, source: &str, template_name: &str) -> Result<()> {
            self.record(format!("clone_to_template {} -> {}", source, template_name));
            Ok(())
        }

        fn guest_ip(&self, vm: &str) -> Result<Option<String>> {
            self.record(format!("guest_ip {}", vm));
            Ok(self.guest_ips.borrow().get(vm).cloned())
        }

        fn datastores(&self, datacenter: &str) -> Result<Vec<Datastore>> {
            self.record(format!("datastores {}", datacenter));
            Ok(self.datastores.clone())
        }

        fn affinity_rules(&self, cluster: &str) -> Result<Vec<AffinityRule>> {
            self.record(format!("affinity_rules {}", cluster));
            if self.fail_affinity_rules {
                return Err(ForgeError::Vsphere("rules endpoint down".to_string()));
            }
            Ok(self.rules.borrow().clone())
        }

        fn create_affinity_rule(
            &self,
            cluster: &str,
            name: &str,
            members: &[String],
        ) -> Result<()> {
            self.record(format!(
                "create_affinity_rule {} {} [{}]",
                cluster,
                name,
                members.join(",")
            ));
            if self.fail_create_rule {
                return Err(ForgeError::Vsphere("rule creation refused".to_string()));
            }
            self.rules.borrow_mut().push(AffinityRule {
                name: name.to_string(),
                members: members.to_vec(),
            });
            Ok(())
        }

        fn delete_affinity_rule(&self, cluster: &str, name: &str) -> Result<()> {
            self.record(format!("delete_affinity_rule {} {}", cluster, name));
            self.rules.borrow_mut().retain(|r| r.name != name);
            Ok(())
        }
    }
}
