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

//! phpIPAM-style address registry client.
//!
//! Wire contract: `POST user/` (basic auth) returns a session token; reads
//! carry the token header; responses wrap payloads in
//! `{code, message, data}`. All requests go through the `IpamTransport`
//! trait so the allocation logic is testable without a server, and queries
//! are built from structured parameters, never string templating.

use crate::error::{ForgeError, Result};
use crate::options::Options;
use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use std::thread;
use std::time::Duration;

/// Fixed backoff schedule for transient authentication timeouts, in seconds.
/// The timeout after the last entry is fatal.
pub const AUTH_RETRY_SCHEDULE: &[u64] = &[3, 5, 10];

#[derive(Debug)]
pub enum TransportError {
    /// The request timed out on the wire; retryable during authentication.
    Timeout,
    /// Non-2xx response; the body is carried as diagnostic text.
    Status { code: u16, body: String },
    Other(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Timeout => write!(f, "request timed out"),
            TransportError::Status { code, body } => write!(f, "HTTP {}: {}", code, body),
            TransportError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

pub trait IpamTransport {
    fn get(&self, path: &str, token: Option<&str>)
        -> std::result::Result<String, TransportError>;
    fn post(
        &self,
        path: &str,
        params: &[(&str, String)],
        basic_auth: Option<(&str, &str)>,
        token: Option<&str>,
    ) -> std::result::Result<String, TransportError>;
    fn delete(&self, path: &str, token: Option<&str>)
        -> std::result::Result<String, TransportError>;
}

/// reqwest-backed transport against the configured IPAM endpoint.
pub struct HttpTransport {
    endpoint: String,
    insecure: bool,
}

impl HttpTransport {
    pub fn new(endpoint: &str, insecure: bool) -> Self {
        let endpoint = endpoint.trim_end_matches('/').to_string();
        Self { endpoint, insecure }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.endpoint, path)
    }

    fn client(&self) -> std::result::Result<reqwest::Client, TransportError> {
        reqwest::Client::builder()
            .danger_accept_invalid_certs(self.insecure)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| TransportError::Other(format!("HTTP client: {}", e)))
    }

    fn run(
        &self,
        build: impl FnOnce(&reqwest::Client) -> reqwest::RequestBuilder,
    ) -> std::result::Result<String, TransportError> {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| TransportError::Other(format!("runtime: {}", e)))?;
        rt.block_on(async {
            let client = self.client()?;
            let response = build(&client).send().await.map_err(|e| {
                if e.is_timeout() {
                    TransportError::Timeout
                } else {
                    TransportError::Other(e.to_string())
                }
            })?;
            let code = response.status().as_u16();
            let body = response
                .text()
                .await
                .map_err(|e| TransportError::Other(e.to_string()))?;
            if code == 200 || code == 201 {
                Ok(body)
            } else {
                Err(TransportError::Status { code, body })
            }
        })
    }
}

impl IpamTransport for HttpTransport {
    fn get(
        &self,
        path: &str,
        token: Option<&str>,
    ) -> std::result::Result<String, TransportError> {
        let url = self.url(path);
        self.run(|client| {
            let mut request = client.get(&url);
            if let Some(t) = token {
                request = request.header("token", t);
            }
            request
        })
    }

    fn post(
        &self,
        path: &str,
        params: &[(&str, String)],
        basic_auth: Option<(&str, &str)>,
        token: Option<&str>,
    ) -> std::result::Result<String, TransportError> {
        let url = self.url(path);
        self.run(|client| {
            let mut request = client.post(&url).query(params);
            if let Some((user, pass)) = basic_auth {
                request = request.basic_auth(user, Some(pass));
            }
            if let Some(t) = token {
                request = request.header("token", t);
            }
            request
        })
    }

    fn delete(
        &self,
        path: &str,
        token: Option<&str>,
    ) -> std::result::Result<String, TransportError> {
        let url = self.url(path);
        self.run(|client| {
            let mut request = client.delete(&url);
            if let Some(t) = token {
                request = request.header("token", t);
            }
            request
        })
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    code: u16,
    message: Option<String>,
    data: Option<Value>,
}

#[derive(Debug, Clone)]
pub struct AddressRecord {
    pub id: String,
    pub ip: String,
}

/// Strip a `DOMAIN\user` qualifier down to the bare user name.
pub fn strip_owner(username: &str) -> &str {
    match username.rsplit_once('\\') {
        Some((_, user)) => user,
        None => username,
    }
}

pub struct IpamClient {
    transport: Box<dyn IpamTransport>,
    username: String,
    password: String,
    token: Option<String>,
    retry_schedule: Vec<u64>,
}

impl IpamClient {
    pub fn new(transport: Box<dyn IpamTransport>, username: &str, password: &str) -> Self {
        Self {
            transport,
            username: username.to_string(),
            password: password.to_string(),
            token: None,
            retry_schedule: AUTH_RETRY_SCHEDULE.to_vec(),
        }
    }

    pub fn from_options(options: &Options) -> Result<Self> {
        let endpoint = options
            .get_str("ipam_url")
            .ok_or_else(|| ForgeError::Config("ipam_url is not configured".to_string()))?;
        let username = options
            .get_str("username")
            .ok_or_else(|| ForgeError::Config("username is not configured".to_string()))?;
        let password = options
            .get_str("password")
            .ok_or_else(|| ForgeError::Config("password is not configured".to_string()))?;
        let insecure = options.get_bool("insecure").unwrap_or(false);
        Ok(Self::new(
            Box::new(HttpTransport::new(&endpoint, insecure)),
            &username,
            &password,
        ))
    }

    /// Override the backoff schedule; tests use zero waits.
    pub fn with_retry_schedule(mut self, schedule: Vec<u64>) -> Self {
        self.retry_schedule = schedule;
        self
    }

    fn parse(body: &str) -> Result<Envelope> {
        let envelope: Envelope = serde_json::from_str(body)
            .map_err(|e| ForgeError::Ipam(format!("bad response: {} ({})", e, body)))?;
        if envelope.code != 200 && envelope.code != 201 {
            return Err(ForgeError::Ipam(
                envelope
                    .message
                    .unwrap_or_else(|| format!("IPAM returned code {}", envelope.code)),
            ));
        }
        Ok(envelope)
    }

    fn token(&self) -> Result<&str> {
        self.token
            .as_deref()
            .ok_or_else(|| ForgeError::Ipam("not authenticated".to_string()))
    }

    /// Authenticate and cache the session token. Transient timeouts are
    /// retried on the fixed backoff schedule; any other failure is fatal
    /// immediately.
    pub fn login(&mut self) -> Result<()> {
        if self.token.is_some() {
            return Ok(());
        }
        let mut timeouts = 0;
        loop {
            match self.transport.post(
                "user/",
                &[],
                Some((&self.username, &self.password)),
                None,
            ) {
                Ok(body) => {
                    let envelope = Self::parse(&body)?;
                    let token = envelope
                        .data
                        .as_ref()
                        .and_then(|d| d.get("token"))
                        .and_then(|t| t.as_str())
                        .ok_or_else(|| {
                            ForgeError::Ipam("login response carried no token".to_string())
                        })?;
                    self.token = Some(token.to_string());
                    return Ok(());
                }
                Err(TransportError::Timeout) => {
                    if timeouts >= self.retry_schedule.len() {
                        return Err(ForgeError::Ipam(format!(
                            "authentication timed out after {} retries",
                            self.retry_schedule.len()
                        )));
                    }
                    let wait = self.retry_schedule[timeouts];
                    timeouts += 1;
                    thread::sleep(Duration::from_secs(wait));
                }
                Err(e) => return Err(ForgeError::Ipam(format!("authentication failed: {}", e))),
            }
        }
    }

    /// Existing reservations for a hostname. A 404 means no records.
    pub fn find_by_hostname(&self, hostname: &str) -> Result<Vec<AddressRecord>> {
        let path = format!(
            "addresses/search_hostname/{}/",
            urlencoding::encode(hostname)
        );
        let body = match self.transport.get(&path, Some(self.token()?)) {
            Ok(body) => body,
            Err(TransportError::Status { code: 404, .. }) => return Ok(Vec::new()),
            Err(e) => return Err(ForgeError::Ipam(e.to_string())),
        };
        let envelope = Self::parse(&body)?;
        let mut records = Vec::new();
        if let Some(Value::Array(items)) = envelope.data {
            for item in items {
                let ip = item.get("ip").and_then(|v| v.as_str()).unwrap_or_default();
                let id = match item.get("id") {
                    Some(Value::String(s)) => s.clone(),
                    Some(Value::Number(n)) => n.to_string(),
                    _ => String::new(),
                };
                records.push(AddressRecord { id, ip: ip.to_string() });
            }
        }
        Ok(records)
    }

    pub fn find_subnet(&self, cidr: &str) -> Result<String> {
        let path = format!("subnets/cidr/{}", urlencoding::encode(cidr));
        let body = self
            .transport
            .get(&path, Some(self.token()?))
            .map_err(|e| ForgeError::Ipam(e.to_string()))?;
        let envelope = Self::parse(&body)?;
        let id = envelope
            .data
            .as_ref()
            .and_then(|d| d.as_array())
            .and_then(|a| a.first())
            .and_then(|entry| entry.get("id"))
            .map(|id| match id {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .ok_or_else(|| ForgeError::Ipam(format!("no subnet found for {}", cidr)))?;
        Ok(id)
    }

    pub fn first_free(&self, subnet_id: &str) -> Result<String> {
        let path = format!("subnets/{}/first_free/", subnet_id);
        let body = self
            .transport
            .get(&path, Some(self.token()?))
            .map_err(|e| ForgeError::Ipam(e.to_string()))?;
        let envelope = Self::parse(&body)?;
        match envelope.data {
            Some(Value::String(ip)) => Ok(ip),
            other => Err(ForgeError::Ipam(format!(
                "no free address in subnet {} ({:?})",
                subnet_id, other
            ))),
        }
    }

    pub fn reserve(&self, subnet_id: &str, ip: &str, hostname: &str) -> Result<()> {
        let owner = strip_owner(&self.username).to_string();
        let params = [
            ("subnetId", subnet_id.to_string()),
            ("ip", ip.to_string()),
            ("hostname", hostname.to_string()),
            ("owner", owner),
        ];
        let body = self
            .transport
            .post("addresses/", &params, None, Some(self.token()?))
            .map_err(|e| ForgeError::Ipam(format!("reservation failed: {}", e)))?;
        Self::parse(&body)?;
        Ok(())
    }

    /// Full allocation sequence: refuse to double-book a hostname, then
    /// resolve the subnet, take the first free address, and commit.
    pub fn allocate(&mut self, cidr: &str, hostname: &str) -> Result<String> {
        self.login()?;
        let existing = self.find_by_hostname(hostname)?;
        if let Some(record) = existing.first() {
            return Err(ForgeError::Ipam(format!(
                "{} already assigned {}",
                hostname, record.ip
            )));
        }
        let subnet_id = self.find_subnet(cidr)?;
        let ip = self.first_free(&subnet_id)?;
        self.reserve(&subnet_id, &ip, hostname)?;
        Ok(ip)
    }

    /// Release every reservation held by a hostname. No reservations is a
    /// no-op so decommission stays idempotent.
    pub fn release(&mut self, hostname: &str) -> Result<()> {
        self.login()?;
        let records = self.find_by_hostname(hostname)?;
        for record in records {
            let path = format!("addresses/{}/", record.id);
            let body = self
                .transport
                .delete(&path, Some(self.token()?))
                .map_err(|e| ForgeError::Ipam(format!("release failed: {}", e)))?;
            Self::parse(&body)?;
        }
        Ok(())
    }
}
