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

//! Decommission email. Silently suppressed unless the SMTP server, from
//! address, and to address are all configured; a half-configured mail setup
//! should never break a decommission.

use crate::error::{ForgeError, Result};
use crate::options::Options;
use lettre::message::header::ContentType;
use lettre::{Message, SmtpTransport, Transport};

#[derive(Debug, PartialEq, Eq)]
pub enum NotifyStatus {
    Sent,
    Suppressed,
}

pub struct Notifier {
    server: Option<String>,
    from: Option<String>,
    to: Option<String>,
}

/// The notice only speaks for the hypervisor teardown; sibling subsystems
/// may have failed or been skipped in the same run.
fn body_text(fqdn: &str) -> String {
    format!("{} has been powered off and destroyed.\n", fqdn)
}

impl Notifier {
    pub fn from_options(options: &Options) -> Self {
        Self {
            server: options.get_str("smtp_server"),
            from: options.get_str("mail_from"),
            to: options.get_str("mail_to"),
        }
    }

    fn config(&self) -> Option<(&str, &str, &str)> {
        Some((self.server.as_deref()?, self.from.as_deref()?, self.to.as_deref()?))
    }

    pub fn send_decommissioned(&self, fqdn: &str) -> Result<NotifyStatus> {
        let (server, from, to) = match self.config() {
            Some(config) => config,
            None => return Ok(NotifyStatus::Suppressed),
        };

        let message = Message::builder()
            .from(from.parse().map_err(|e| {
                ForgeError::Notify(format!("bad from address {}: {}", from, e))
            })?)
            .to(to.parse().map_err(|e| {
                ForgeError::Notify(format!("bad to address {}: {}", to, e))
            })?)
            .subject(format!("Decommissioned {}", fqdn))
            .header(ContentType::TEXT_PLAIN)
            .body(body_text(fqdn))
            .map_err(|e| ForgeError::Notify(format!("building message: {}", e)))?;

        let transport = SmtpTransport::builder_dangerous(server).port(25).build();
        transport
            .send(&message)
            .map_err(|e| ForgeError::Notify(format!("sending via {}: {}", server, e)))?;
        Ok(NotifyStatus::Sent)
    }
}
