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

//! vCenter-style REST implementation of the hypervisor boundary.
//!
//! Session auth: `POST /rest/com/vmware/cis/session` with basic auth returns
//! a token carried on every later call in the `vmware-api-session-id`
//! header. Responses wrap payloads in `{"value": ...}`.

use crate::error::{ForgeError, Result};
use crate::options::Options;
use crate::vsphere::{AffinityRule, Datastore, PowerState, VmSpec, VsphereClient};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct ValueWrapper<T> {
    value: T,
}

#[derive(Debug, Deserialize)]
struct VmSummary {
    vm: String,
    #[allow(dead_code)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PowerInfo {
    state: String,
}

#[derive(Debug, Deserialize)]
struct GuestIdentity {
    ip_address: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DatastoreSummary {
    name: String,
    free_space: u64,
}

#[derive(Debug, Deserialize)]
struct RuleSummary {
    name: String,
    #[serde(default)]
    members: Vec<String>,
}

#[derive(Debug, Serialize)]
struct DiskBody {
    capacity_kib: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    mount: Option<String>,
}

#[derive(Debug, Serialize)]
struct CustomizationBody {
    hostname: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    domain: Option<String>,
    ip: String,
    gateway: String,
    netmask: String,
    dns: Vec<String>,
}

#[derive(Debug, Serialize)]
struct VmBody {
    name: String,
    cpu_count: i64,
    memory_mib: i64,
    disks: Vec<DiskBody>,
    network: String,
    datacenter: String,
    cluster: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    folder: Option<String>,
    datastore: String,
    annotation: String,
    customization: CustomizationBody,
}

impl VmBody {
    fn from_spec(spec: &VmSpec) -> Self {
        Self {
            name: spec.name.clone(),
            cpu_count: spec.cpus,
            memory_mib: spec.memory_mib,
            disks: spec
                .disks
                .iter()
                .map(|d| DiskBody { capacity_kib: d.size_kib, mount: d.mount.clone() })
                .collect(),
            network: spec.network.clone(),
            datacenter: spec.datacenter.clone(),
            cluster: spec.cluster.clone(),
            folder: spec.folder.clone(),
            datastore: spec.datastore.clone(),
            annotation: spec.annotation.clone(),
            customization: CustomizationBody {
                hostname: spec.customization.short_hostname.clone(),
                domain: spec.customization.domain.clone(),
                ip: spec.customization.ip.clone(),
                gateway: spec.customization.gateway.clone(),
                netmask: spec.customization.netmask.clone(),
                dns: spec.customization.dns.clone(),
            },
        }
    }
}

pub struct VsphereRest {
    endpoint: String,
    username: String,
    password: String,
    insecure: bool,
    session: RefCell<Option<String>>,
}

enum Method {
    Get,
    Post,
    Delete,
}

impl VsphereRest {
    pub fn new(endpoint: &str, username: &str, password: &str, insecure: bool) -> Self {
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            username: username.to_string(),
            password: password.to_string(),
            insecure,
            session: RefCell::new(None),
        }
    }

    pub fn from_options(options: &Options) -> Result<Self> {
        let endpoint = options
            .get_str("vsphere_url")
            .ok_or_else(|| ForgeError::Config("vsphere_url is not configured".to_string()))?;
        let username = options
            .get_str("username")
            .ok_or_else(|| ForgeError::Config("username is not configured".to_string()))?;
        let password = options
            .get_str("password")
            .ok_or_else(|| ForgeError::Config("password is not configured".to_string()))?;
        let insecure = options.get_bool("insecure").unwrap_or(false);
        Ok(Self::new(&endpoint, &username, &password, insecure))
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.endpoint, path)
    }

    fn client(&self) -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .danger_accept_invalid_certs(self.insecure)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| ForgeError::Vsphere(format!("HTTP client: {}", e)))
    }

    fn runtime(&self) -> Result<tokio::runtime::Runtime> {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| ForgeError::Vsphere(format!("runtime: {}", e)))
    }

    fn ensure_session(&self) -> Result<String> {
        if let Some(token) = self.session.borrow().as_ref() {
            return Ok(token.clone());
        }
        let url = self.url("/rest/com/vmware/cis/session");
        let rt = self.runtime()?;
        let token = rt.block_on(async {
            let client = self.client()?;
            let resp = client
                .post(&url)
                .basic_auth(&self.username, Some(&self.password))
                .send()
                .await
                .map_err(|e| ForgeError::Vsphere(format!("login failed: {}", e)))?;
            if !resp.status().is_success() {
                return Err(ForgeError::Vsphere(format!("login failed: {}", resp.status())));
            }
            let wrapped: ValueWrapper<String> = resp
                .json()
                .await
                .map_err(|e| ForgeError::Vsphere(format!("login parse: {}", e)))?;
            Ok(wrapped.value)
        })?;
        *self.session.borrow_mut() = Some(token.clone());
        Ok(token)
    }

    /// One authenticated call; empty response bodies come back as "null" so
    /// callers can always deserialize a `ValueWrapper` when they expect one.
    fn call(&self, method: Method, path: &str, body: Option<serde_json::Value>) -> Result<String> {
        let token = self.ensure_session()?;
        let url = self.url(path);
        let rt = self.runtime()?;
        rt.block_on(async {
            let client = self.client()?;
            let mut request = match method {
                Method::Get => client.get(&url),
                Method::Post => client.post(&url),
                Method::Delete => client.delete(&url),
            };
            request = request.header("vmware-api-session-id", &token);
            if let Some(body) = body {
                request = request.json(&body);
            }
            let resp = request
                .send()
                .await
                .map_err(|e| ForgeError::Vsphere(format!("{}: {}", path, e)))?;
            let status = resp.status();
            let text = resp
                .text()
                .await
                .map_err(|e| ForgeError::Vsphere(format!("{}: {}", path, e)))?;
            if !status.is_success() {
                return Err(ForgeError::Vsphere(format!("{}: HTTP {} {}", path, status, text)));
            }
            if text.is_empty() {
                Ok("null".to_string())
            } else {
                Ok(text)
            }
        })
    }

    fn parse<T: for<'de> Deserialize<'de>>(&self, body: &str) -> Result<T> {
        serde_json::from_str::<ValueWrapper<T>>(body)
            .map(|w| w.value)
            .map_err(|e| ForgeError::Vsphere(format!("bad response: {} ({})", e, body)))
    }
}

impl VsphereClient for VsphereRest {
    fn find_vm(&self, name: &str) -> Result<Option<String>> {
        let path = format!("/rest/vcenter/vm?filter.names.1={}", urlencoding::encode(name));
        let body = self.call(Method::Get, &path, None)?;
        let vms: Vec<VmSummary> = self.parse(&body)?;
        Ok(vms.into_iter().next().map(|v| v.vm))
    }

    fn power_state(&self, vm: &str) -> Result<PowerState> {
        let body = self.call(Method::Get, &format!("/rest/vcenter/vm/{}/power", vm), None)?;
        let info: PowerInfo = self.parse(&body)?;
        Ok(PowerState::from_wire(&info.state))
    }

    fn power_on(&self, vm: &str) -> Result<()> {
        self.call(Method::Post, &format!("/rest/vcenter/vm/{}/power/start", vm), None)?;
        Ok(())
    }

    fn power_off(&self, vm: &str) -> Result<()> {
        self.call(Method::Post, &format!("/rest/vcenter/vm/{}/power/stop", vm), None)?;
        Ok(())
    }

    fn destroy(&self, vm: &str) -> Result<()> {
        self.call(Method::Delete, &format!("/rest/vcenter/vm/{}", vm), None)?;
        Ok(())
    }

    fn rename(&self, vm: &str, new_name: &str) -> Result<()> {
        let body = serde_json::json!({ "name": new_name });
        self.call(Method::Post, &format!("/rest/vcenter/vm/{}?action=rename", vm), Some(body))?;
        Ok(())
    }

    fn clone_vm(&self, source: &str, spec: &VmSpec) -> Result<String> {
        let mut body = serde_json::to_value(VmBody::from_spec(spec))
            .map_err(|e| ForgeError::Vsphere(format!("clone spec: {}", e)))?;
        body["source"] = serde_json::Value::String(source.to_string());
        let response = self.call(Method::Post, "/rest/vcenter/vm?action=clone", Some(body))?;
        self.parse(&response)
    }

    fn create_vm(&self, spec: &VmSpec) -> Result<String> {
        let body = serde_json::to_value(VmBody::from_spec(spec))
            .map_err(|e| ForgeError::Vsphere(format!("vm spec: {}", e)))?;
        let response = self.call(Method::Post, "/rest/vcenter/vm", Some(body))?;
        self.parse(&response)
    }

    fn clone_to_template(&self, source: &str, template_name: &str) -> Result<()> {
        let body = serde_json::json!({
            "source": source,
            "name": template_name,
            "power_on": false,
        });
        self.call(Method::Post, "/rest/vcenter/vm?action=clone-to-template", Some(body))?;
        Ok(())
    }

    fn guest_ip(&self, vm: &str) -> Result<Option<String>> {
        let body = self.call(
            Method::Get,
            &format!("/rest/vcenter/vm/{}/guest/identity", vm),
            None,
        )?;
        let identity: GuestIdentity = self.parse(&body)?;
        Ok(identity.ip_address)
    }

    fn datastores(&self, datacenter: &str) -> Result<Vec<Datastore>> {
        let path = format!(
            "/rest/vcenter/datastore?filter.datacenters.1={}",
            urlencoding::encode(datacenter)
        );
        let body = self.call(Method::Get, &path, None)?;
        let summaries: Vec<DatastoreSummary> = self.parse(&body)?;
        Ok(summaries
            .into_iter()
            .map(|d| Datastore { name: d.name, free_bytes: d.free_space })
            .collect())
    }

    fn affinity_rules(&self, cluster: &str) -> Result<Vec<AffinityRule>> {
        let path = format!(
            "/rest/vcenter/cluster/{}/drs/rules",
            urlencoding::encode(cluster)
        );
        let body = self.call(Method::Get, &path, None)?;
        let rules: Vec<RuleSummary> = self.parse(&body)?;
        Ok(rules
            .into_iter()
            .map(|r| AffinityRule { name: r.name, members: r.members })
            .collect())
    }

    fn create_affinity_rule(&self, cluster: &str, name: &str, members: &[String]) -> Result<()> {
        let path = format!(
            "/rest/vcenter/cluster/{}/drs/rules",
            urlencoding::encode(cluster)
        );
        // mandatory + enabled: a hard rule DRS must honor
        let body = serde_json::json!({
            "name": name,
            "type": "anti_affinity",
            "enabled": true,
            "mandatory": true,
            "members": members,
        });
        self.call(Method::Post, &path, Some(body))?;
        Ok(())
    }

    fn delete_affinity_rule(&self, cluster: &str, name: &str) -> Result<()> {
        let path = format!(
            "/rest/vcenter/cluster/{}/drs/rules/{}",
            urlencoding::encode(cluster),
            urlencoding::encode(name)
        );
        self.call(Method::Delete, &path, None)?;
        Ok(())
    }
}
