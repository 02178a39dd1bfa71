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

//! Monitoring downtime. Decommissioned hosts get a downtime window on the
//! Shinken/Nagios-style endpoint so the pager stays quiet while DNS and
//! inventory catch up.

use crate::error::{ForgeError, Result};
use crate::options::Options;
use crate::output::Output;
use chrono::Utc;
use std::time::Duration;

const DEFAULT_DOWNTIME_HOURS: i64 = 2;

pub struct MonitoringClient {
    endpoint: String,
    insecure: bool,
    downtime_hours: i64,
}

impl MonitoringClient {
    pub fn new(endpoint: &str, insecure: bool, downtime_hours: i64) -> Self {
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            insecure,
            downtime_hours,
        }
    }

    /// `None` when no monitoring endpoint is configured.
    pub fn from_options(options: &Options) -> Option<Self> {
        let endpoint = options.get_str("monitoring_url")?;
        let insecure = options.get_bool("insecure").unwrap_or(false);
        let hours = options
            .get_i64("downtime_hours")
            .unwrap_or(DEFAULT_DOWNTIME_HOURS);
        Some(Self::new(&endpoint, insecure, hours))
    }

    pub fn schedule_downtime(&self, host: &str, comment: &str, out: &Output) -> Result<()> {
        let start = Utc::now();
        let end = start + chrono::Duration::hours(self.downtime_hours);
        let params = [
            ("host", host.to_string()),
            ("start", start.timestamp().to_string()),
            ("end", end.timestamp().to_string()),
            ("comment", comment.to_string()),
        ];

        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| ForgeError::Monitoring(format!("runtime: {}", e)))?;
        rt.block_on(async {
            let client = reqwest::Client::builder()
                .danger_accept_invalid_certs(self.insecure)
                .timeout(Duration::from_secs(30))
                .build()
                .map_err(|e| ForgeError::Monitoring(format!("HTTP client: {}", e)))?;
            let resp = client
                .post(format!("{}/downtime", self.endpoint))
                .form(&params)
                .send()
                .await
                .map_err(|e| ForgeError::Monitoring(e.to_string()))?;
            if !resp.status().is_success() {
                return Err(ForgeError::Monitoring(format!(
                    "downtime for {}: HTTP {}",
                    host,
                    resp.status()
                )));
            }
            out.info(&format!(
                "downtime for {} until {}",
                host,
                end.format("%Y-%m-%d %H:%M UTC")
            ));
            Ok(())
        })
    }
}
