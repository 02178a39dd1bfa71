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

//! Decommission workflow.
//!
//! Five independently guarded subsystems run in a fixed order: hypervisor,
//! config management, address registry, email, monitoring downtime. A
//! failure in one never stops the others; outcomes accumulate and the
//! process exit status is the number of failures. Subsystems run
//! sequentially today; nothing in the outcome contract depends on that, so
//! they could fan out later.

use crate::cm::CmClient;
use crate::error::{ForgeError, Result};
use crate::ipam::IpamClient;
use crate::monitoring::MonitoringClient;
use crate::notify::{Notifier, NotifyStatus};
use crate::output::Output;
use crate::vsphere::{PowerState, VsphereClient};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubsystemOutcome {
    Success,
    Skipped,
    Failed(String),
}

/// Config-management deregistration seam.
pub trait Deregister {
    fn deregister(&self, hostname: &str, out: &Output) -> Result<()>;
}

impl Deregister for CmClient {
    fn deregister(&self, hostname: &str, out: &Output) -> Result<()> {
        CmClient::deregister(self, hostname, out)
    }
}

/// Address-registry release seam.
pub trait AddressRelease {
    fn release(&mut self, hostname: &str) -> Result<()>;
}

impl AddressRelease for IpamClient {
    fn release(&mut self, hostname: &str) -> Result<()> {
        IpamClient::release(self, hostname)
    }
}

/// Monitoring downtime seam.
pub trait DowntimeScheduler {
    fn schedule(&self, host: &str, comment: &str, out: &Output) -> Result<()>;
}

impl DowntimeScheduler for MonitoringClient {
    fn schedule(&self, host: &str, comment: &str, out: &Output) -> Result<()> {
        self.schedule_downtime(host, comment, out)
    }
}

/// Email notification seam.
pub trait DecommissionNotifier {
    fn notify(&self, fqdn: &str) -> Result<NotifyStatus>;
}

impl DecommissionNotifier for Notifier {
    fn notify(&self, fqdn: &str) -> Result<NotifyStatus> {
        self.send_decommissioned(fqdn)
    }
}

/// Power state machine: a running VM is powered off first, a stopped one
/// destroyed directly, anything else refuses.
fn remove_vm(client: &dyn VsphereClient, fqdn: &str, out: &Output) -> Result<()> {
    let vm = client
        .find_vm(fqdn)?
        .ok_or_else(|| ForgeError::Vsphere(format!("{} not found", fqdn)))?;
    match client.power_state(&vm)? {
        PowerState::PoweredOn => {
            out.info(&format!("powering off {}", fqdn));
            client.power_off(&vm)?;
        }
        PowerState::PoweredOff => {
            out.debug(&format!("{} is already powered off", fqdn));
        }
        other => {
            return Err(ForgeError::Vsphere(format!(
                "{} is in state {:?}, refusing to destroy",
                fqdn, other
            )));
        }
    }
    out.info(&format!("destroying {}", fqdn));
    client.destroy(&vm)
}

/// A disabled or unconfigured subsystem is `None` and records `Skipped`.
pub struct Workflow<'a> {
    pub vm: Option<&'a dyn VsphereClient>,
    pub cm: Option<&'a dyn Deregister>,
    pub ipam: Option<&'a mut dyn AddressRelease>,
    pub email: Option<&'a dyn DecommissionNotifier>,
    pub downtime: Option<&'a dyn DowntimeScheduler>,
}

impl<'a> Workflow<'a> {
    pub fn run(&mut self, fqdn: &str, out: &Output) -> Vec<(&'static str, SubsystemOutcome)> {
        let mut outcomes = Vec::new();

        let vm_outcome = match self.vm {
            Some(client) => outcome_of(remove_vm(client, fqdn, out)),
            None => SubsystemOutcome::Skipped,
        };
        outcomes.push(("vm", vm_outcome));

        let cm_outcome = match self.cm {
            Some(cm) => outcome_of(cm.deregister(fqdn, out)),
            None => SubsystemOutcome::Skipped,
        };
        outcomes.push(("cm", cm_outcome));

        let ipam_outcome = match self.ipam.as_deref_mut() {
            Some(ipam) => outcome_of(ipam.release(fqdn)),
            None => SubsystemOutcome::Skipped,
        };
        outcomes.push(("ipam", ipam_outcome));

        let email_outcome = match self.email {
            Some(notifier) => match notifier.notify(fqdn) {
                Ok(NotifyStatus::Sent) => SubsystemOutcome::Success,
                Ok(NotifyStatus::Suppressed) => SubsystemOutcome::Skipped,
                Err(e) => SubsystemOutcome::Failed(e.to_string()),
            },
            None => SubsystemOutcome::Skipped,
        };
        outcomes.push(("email", email_outcome));

        let downtime_outcome = match self.downtime {
            Some(scheduler) => {
                outcome_of(scheduler.schedule(fqdn, &format!("{} decommissioned", fqdn), out))
            }
            None => SubsystemOutcome::Skipped,
        };
        outcomes.push(("downtime", downtime_outcome));

        for (name, outcome) in &outcomes {
            match outcome {
                SubsystemOutcome::Success => out.info(&format!("{}: done", name)),
                SubsystemOutcome::Skipped => out.debug(&format!("{}: skipped", name)),
                SubsystemOutcome::Failed(reason) => {
                    out.error(&format!("{}: {}", name, reason))
                }
            }
        }
        outcomes
    }
}

fn outcome_of(result: Result<()>) -> SubsystemOutcome {
    match result {
        Ok(()) => SubsystemOutcome::Success,
        Err(e) => SubsystemOutcome::Failed(e.to_string()),
    }
}

/// The process exit status for a decommission run.
pub fn failed_count(outcomes: &[(&'static str, SubsystemOutcome)]) -> usize {
    outcomes
        .iter()
        .filter(|(_, o)| matches!(o, SubsystemOutcome::Failed(_)))
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vsphere::mock::MockVsphere;
    use std::cell::RefCell;

    struct FakeDeregister {
        fail: bool,
        attempted: RefCell<bool>,
    }

    impl FakeDeregister {
        fn new(fail: bool) -> Self {
            Self { fail, attempted: RefCell::new(false) }
        }
    }

    impl Deregister for FakeDeregister {
        fn deregister(&self, _hostname: &str, _out: &Output) -> Result<()> {
            *self.attempted.borrow_mut() = true;
            if self.fail {
                Err(ForgeError::Cm("deregistration refused".to_string()))
            } else {
                Ok(())
            }
        }
    }

    struct FakeRelease {
        fail: bool,
        attempted: bool,
    }

    impl AddressRelease for FakeRelease {
        fn release(&mut self, _hostname: &str) -> Result<()> {
            self.attempted = true;
            if self.fail {
                Err(ForgeError::Ipam("release refused".to_string()))
            } else {
                Ok(())
            }
        }
    }

    struct FakeScheduler {
        attempted: RefCell<bool>,
    }

    impl DowntimeScheduler for FakeScheduler {
        fn schedule(&self, _host: &str, _comment: &str, _out: &Output) -> Result<()> {
            *self.attempted.borrow_mut() = true;
            Ok(())
        }
    }

    struct FakeNotifier {
        status: NotifyStatus,
    }

    impl DecommissionNotifier for FakeNotifier {
        fn notify(&self, _fqdn: &str) -> Result<NotifyStatus> {
            match self.status {
                NotifyStatus::Sent => Ok(NotifyStatus::Sent),
                NotifyStatus::Suppressed => Ok(NotifyStatus::Suppressed),
            }
        }
    }

    fn outcome(outcomes: &[(&'static str, SubsystemOutcome)], name: &str) -> SubsystemOutcome {
        outcomes.iter().find(|(n, _)| *n == name).unwrap().1.clone()
    }

    #[test]
    fn test_running_vm_powered_off_then_destroyed() {
        let client = MockVsphere::new().with_vm("app3.example.com", PowerState::PoweredOn);
        remove_vm(&client, "app3.example.com", &Output::quiet()).unwrap();
        let log = client.call_log();
        let off = log.iter().position(|c| c.starts_with("power_off")).unwrap();
        let destroy = log.iter().position(|c| c.starts_with("destroy")).unwrap();
        assert!(off < destroy);
    }

    #[test]
    fn test_stopped_vm_destroyed_without_power_off() {
        let client = MockVsphere::new().with_vm("app3.example.com", PowerState::PoweredOff);
        remove_vm(&client, "app3.example.com", &Output::quiet()).unwrap();
        assert!(!client.call_log().iter().any(|c| c.starts_with("power_off")));
        assert!(client.call_log().iter().any(|c| c.starts_with("destroy")));
    }

    #[test]
    fn test_suspended_vm_refused() {
        let client = MockVsphere::new().with_vm("app3.example.com", PowerState::Suspended);
        let err = remove_vm(&client, "app3.example.com", &Output::quiet()).unwrap_err();
        assert!(err.to_string().contains("refusing"));
        assert!(!client.call_log().iter().any(|c| c.starts_with("destroy")));
    }

    #[test]
    fn test_missing_vm_fails_subsystem() {
        let client = MockVsphere::new();
        assert!(remove_vm(&client, "ghost.example.com", &Output::quiet()).is_err());
    }

    #[test]
    fn test_one_failure_does_not_stop_the_rest() {
        let mut client = MockVsphere::new().with_vm("app3.example.com", PowerState::PoweredOn);
        client.fail_destroy = true;
        let cm = FakeDeregister::new(false);
        let mut ipam = FakeRelease { fail: true, attempted: false };
        let downtime = FakeScheduler { attempted: RefCell::new(false) };

        let mut workflow = Workflow {
            vm: Some(&client),
            cm: Some(&cm),
            ipam: Some(&mut ipam),
            email: None,
            downtime: Some(&downtime),
        };
        let outcomes = workflow.run("app3.example.com", &Output::quiet());

        assert!(matches!(outcome(&outcomes, "vm"), SubsystemOutcome::Failed(_)));
        assert_eq!(outcome(&outcomes, "cm"), SubsystemOutcome::Success);
        assert!(matches!(outcome(&outcomes, "ipam"), SubsystemOutcome::Failed(_)));
        assert_eq!(outcome(&outcomes, "downtime"), SubsystemOutcome::Success);

        // everything after the first failure was still attempted
        assert!(*cm.attempted.borrow());
        assert!(ipam.attempted);
        assert!(*downtime.attempted.borrow());
        assert_eq!(failed_count(&outcomes), 2);
    }

    #[test]
    fn test_disabled_subsystems_record_skipped() {
        let client = MockVsphere::new().with_vm("app3.example.com", PowerState::PoweredOff);
        let mut workflow = Workflow {
            vm: Some(&client),
            cm: None,
            ipam: None,
            email: None,
            downtime: None,
        };
        let outcomes = workflow.run("app3.example.com", &Output::quiet());
        assert_eq!(outcome(&outcomes, "vm"), SubsystemOutcome::Success);
        for name in ["cm", "ipam", "email", "downtime"] {
            assert_eq!(outcome(&outcomes, name), SubsystemOutcome::Skipped);
        }
        assert_eq!(failed_count(&outcomes), 0);
    }

    #[test]
    fn test_suppressed_email_is_skipped_not_failed() {
        let client = MockVsphere::new().with_vm("app3.example.com", PowerState::PoweredOff);
        let notifier = FakeNotifier { status: NotifyStatus::Suppressed };
        let mut workflow = Workflow {
            vm: Some(&client),
            cm: None,
            ipam: None,
            email: Some(&notifier),
            downtime: None,
        };
        let outcomes = workflow.run("app3.example.com", &Output::quiet());
        assert_eq!(outcome(&outcomes, "email"), SubsystemOutcome::Skipped);
    }

    #[test]
    fn test_fixed_subsystem_order() {
        let mut workflow =
            Workflow { vm: None, cm: None, ipam: None, email: None, downtime: None };
        let outcomes = workflow.run("app3.example.com", &Output::quiet());
        let names: Vec<&str> = outcomes.iter().map(|(n, _)| *n).collect();
        assert_eq!(names, vec!["vm", "cm", "ipam", "email", "downtime"]);
    }
}
