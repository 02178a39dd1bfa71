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

//! Config-management / access-inventory deregistration.
//!
//! Bearer-token API: exchange a key pair for a token, search servers by
//! hostname, delete every match. A host the inventory has never heard of is
//! a warning, not a failure; leaving it registered after deletion would be.

use crate::error::{ForgeError, Result};
use crate::options::Options;
use crate::output::Output;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    bearer_token: String,
}

#[derive(Debug, Deserialize)]
struct ServerRecord {
    id: String,
    project_name: String,
}

#[derive(Debug, Deserialize)]
struct ServerList {
    list: Vec<ServerRecord>,
}

pub struct CmClient {
    endpoint: String,
    team: String,
    key_id: String,
    key_secret: String,
}

impl CmClient {
    pub fn new(endpoint: &str, team: &str, key_id: &str, key_secret: &str) -> Self {
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            team: team.to_string(),
            key_id: key_id.to_string(),
            key_secret: key_secret.to_string(),
        }
    }

    /// `None` when the config-management integration is not configured.
    pub fn from_options(options: &Options) -> Option<Self> {
        Some(Self::new(
            &options.get_str("cm_url")?,
            &options.get_str("cm_team")?,
            &options.get_str("cm_key_id")?,
            &options.get_str("cm_key_secret")?,
        ))
    }

    fn runtime(&self) -> Result<tokio::runtime::Runtime> {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| ForgeError::Cm(format!("runtime: {}", e)))
    }

    fn team_url(&self, path: &str) -> String {
        format!("{}/{}{}", self.endpoint, self.team, path)
    }

    pub fn deregister(&self, hostname: &str, out: &Output) -> Result<()> {
        let rt = self.runtime()?;
        rt.block_on(async {
            let client = reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .map_err(|e| ForgeError::Cm(format!("HTTP client: {}", e)))?;

            let token_resp = client
                .post(self.team_url("/service_token"))
                .json(&serde_json::json!({
                    "key_id": self.key_id,
                    "key_secret": self.key_secret,
                }))
                .send()
                .await
                .map_err(|e| ForgeError::Cm(format!("auth: {}", e)))?;
            if !token_resp.status().is_success() {
                return Err(ForgeError::Cm(format!("auth: HTTP {}", token_resp.status())));
            }
            let token: TokenResponse = token_resp
                .json()
                .await
                .map_err(|e| ForgeError::Cm(format!("auth parse: {}", e)))?;
            let bearer = format!("Bearer {}", token.bearer_token);

            let search_resp = client
                .get(self.team_url("/servers"))
                .query(&[("hostname", hostname)])
                .header("Authorization", &bearer)
                .send()
                .await
                .map_err(|e| ForgeError::Cm(format!("search: {}", e)))?;
            if !search_resp.status().is_success() {
                return Err(ForgeError::Cm(format!(
                    "search for {}: HTTP {}",
                    hostname,
                    search_resp.status()
                )));
            }
            let servers: ServerList = search_resp
                .json()
                .await
                .map_err(|e| ForgeError::Cm(format!("search parse: {}", e)))?;

            if servers.list.is_empty() {
                out.warning(&format!("{} is not registered, nothing to deregister", hostname));
                return Ok(());
            }

            for server in servers.list {
                let url = self.team_url(&format!(
                    "/projects/{}/servers/{}",
                    urlencoding::encode(&server.project_name),
                    urlencoding::encode(&server.id)
                ));
                let resp = client
                    .delete(&url)
                    .header("Authorization", &bearer)
                    .send()
                    .await
                    .map_err(|e| ForgeError::Cm(format!("delete: {}", e)))?;
                if !resp.status().is_success() {
                    return Err(ForgeError::Cm(format!(
                        "could not deregister {}: HTTP {}",
                        hostname,
                        resp.status()
                    )));
                }
                out.info(&format!("deregistered {} from project {}", hostname, server.project_name));
            }
            Ok(())
        })
    }
}
