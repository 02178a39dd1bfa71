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

//! Anti-affinity reconciliation.
//!
//! Hosts named `<prefix><n>` with a trailing digit of 2-9 form a role group
//! of `n` members. After provisioning such a host we rebuild the cluster
//! rule `anti_affinity_<prefix>X` from scratch: delete any existing rule of
//! that name, search for every member by short name and by FQDN, and create
//! a mandatory, enabled rule over the members that resolve. Rule creation is
//! best-effort; a refusal is a warning, not a provisioning failure.

use crate::error::Result;
use crate::output::Output;
use crate::vsphere::VsphereClient;

/// The role group a hostname implies: `("app", 3)` for `app3`. Trailing
/// digits 0 and 1 mean no group, as does any non-digit ending.
pub fn role_group(short_hostname: &str) -> Option<(String, u32)> {
    let last = short_hostname.chars().last()?;
    let count = last.to_digit(10)?;
    if count < 2 {
        return None;
    }
    let prefix = &short_hostname[..short_hostname.len() - last.len_utf8()];
    if prefix.is_empty() {
        return None;
    }
    Some((prefix.to_string(), count))
}

pub fn rule_name(prefix: &str) -> String {
    format!("anti_affinity_{}X", prefix)
}

/// Rebuild the anti-affinity rule for the role group `short_hostname`
/// belongs to, if any.
pub fn reconcile(
    client: &dyn VsphereClient,
    cluster: &str,
    short_hostname: &str,
    domain: Option<&str>,
    out: &Output,
) -> Result<()> {
    let (prefix, count) = match role_group(short_hostname) {
        Some(group) => group,
        None => return Ok(()),
    };

    let mut members = Vec::new();
    for n in 1..=count {
        let short = format!("{}{}", prefix, n);
        let mut found = client.find_vm(&short)?;
        if found.is_none() {
            if let Some(domain) = domain {
                found = client.find_vm(&format!("{}.{}", short, domain))?;
            }
        }
        match found {
            Some(id) => members.push(id),
            None => out.debug(&format!("affinity member {} not found, skipping", short)),
        }
    }

    let name = rule_name(&prefix);
    let existing = client.affinity_rules(cluster)?;
    if existing.iter().any(|rule| rule.name == name) {
        client.delete_affinity_rule(cluster, &name)?;
    }

    if members.len() < 2 {
        out.warning(&format!(
            "only {} member(s) of role group {} found, not creating {}",
            members.len(),
            prefix,
            name
        ));
        return Ok(());
    }

    if let Err(e) = client.create_affinity_rule(cluster, &name, &members) {
        out.warning(&format!("could not create {}: {}", name, e));
    } else {
        out.info(&format!("rule {} covers {}", name, members.join(", ")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vsphere::mock::MockVsphere;
    use crate::vsphere::{AffinityRule, PowerState};

    #[test]
    fn test_role_group_parsing() {
        assert_eq!(role_group("app3"), Some(("app".to_string(), 3)));
        assert_eq!(role_group("web9"), Some(("web".to_string(), 9)));
        assert_eq!(role_group("app1"), None);
        assert_eq!(role_group("app0"), None);
        assert_eq!(role_group("db"), None);
        assert_eq!(role_group("3"), None);
    }

    #[test]
    fn test_rule_rebuilt_for_full_group() {
        let client = MockVsphere::new()
            .with_vm("app1", PowerState::PoweredOn)
            .with_vm("app2", PowerState::PoweredOn)
            .with_vm("app3", PowerState::PoweredOn);
        reconcile(&client, "Production", "app3", Some("example.com"), &Output::quiet()).unwrap();
        let rules = client.rules.borrow().clone();
        assert_eq!(
            rules,
            vec![AffinityRule {
                name: "anti_affinity_appX".to_string(),
                members: vec!["app1".to_string(), "app2".to_string(), "app3".to_string()],
            }]
        );
    }

    #[test]
    fn test_existing_rule_deleted_before_recreate() {
        let client = MockVsphere::new()
            .with_vm("app1", PowerState::PoweredOn)
            .with_vm("app2", PowerState::PoweredOn);
        client.rules.borrow_mut().push(AffinityRule {
            name: "anti_affinity_appX".to_string(),
            members: vec!["stale".to_string()],
        });
        reconcile(&client, "Production", "app2", None, &Output::quiet()).unwrap();
        let log = client.call_log();
        let delete_at = log
            .iter()
            .position(|c| c.starts_with("delete_affinity_rule"))
            .unwrap();
        let create_at = log
            .iter()
            .position(|c| c.starts_with("create_affinity_rule"))
            .unwrap();
        assert!(delete_at < create_at);
        assert_eq!(client.rules.borrow().len(), 1);
        assert_eq!(client.rules.borrow()[0].members, vec!["app1", "app2"]);
    }

    #[test]
    fn test_missing_member_found_by_fqdn() {
        let client = MockVsphere::new()
            .with_vm("app1", PowerState::PoweredOn)
            .with_vm("app2.example.com", PowerState::PoweredOn)
            .with_vm("app3", PowerState::PoweredOn);
        reconcile(&client, "Production", "app3", Some("example.com"), &Output::quiet()).unwrap();
        let rules = client.rules.borrow().clone();
        assert_eq!(
            rules[0].members,
            vec!["app1", "app2.example.com", "app3"]
        );
    }

    #[test]
    fn test_unresolved_members_skipped() {
        // three-member group, only two exist
        let client = MockVsphere::new()
            .with_vm("app1", PowerState::PoweredOn)
            .with_vm("app3", PowerState::PoweredOn);
        reconcile(&client, "Production", "app3", None, &Output::quiet()).unwrap();
        assert_eq!(client.rules.borrow()[0].members, vec!["app1", "app3"]);
    }

    #[test]
    fn test_single_member_creates_nothing() {
        let client = MockVsphere::new().with_vm("app2", PowerState::PoweredOn);
        reconcile(&client, "Production", "app2", None, &Output::quiet()).unwrap();
        assert!(client.rules.borrow().is_empty());
    }

    #[test]
    fn test_non_group_hostname_is_noop() {
        let client = MockVsphere::new().with_vm("db", PowerState::PoweredOn);
        reconcile(&client, "Production", "db", None, &Output::quiet()).unwrap();
        assert!(client.call_log().is_empty());
    }

    #[test]
    fn test_rule_creation_failure_is_warning() {
        let mut client = MockVsphere::new()
            .with_vm("app1", PowerState::PoweredOn)
            .with_vm("app2", PowerState::PoweredOn);
        client.fail_create_rule = true;
        // still Ok: best effort
        reconcile(&client, "Production", "app2", None, &Output::quiet()).unwrap();
    }
}
