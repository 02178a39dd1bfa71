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

//! Resource sizing: named templates or an explicit cpu,mem,sda triple,
//! plus an optional second disk. Human-readable sizes are accepted and
//! normalized to MiB for memory and KiB for disks.

use crate::error::{ForgeError, Result};
use crate::options::Options;
use crate::output::Output;
use crate::pipeline::{FlagDef, Stage};

/// (cpus, memory, primary disk) per named template.
const TEMPLATES: &[(&str, u32, &str, &str)] = &[
    ("tiny", 1, "512M", "14G"),
    ("small", 1, "1G", "15G"),
    ("medium", 2, "2G", "15G"),
    ("large", 2, "4G", "15G"),
    ("xlarge", 2, "8G", "15G"),
];

const DEFAULT_SDB: &str = "10G,/pub";

/// Convert a human-readable size ("4G", "512M", "10485760") to the target
/// unit, 'M' for Mebibytes or 'K' for Kibibytes. Bare numbers are taken to
/// already be in the target unit.
pub fn parse_size(size: &str, target_unit: char) -> Result<u64> {
    let trimmed = size.trim();
    if trimmed.chars().all(|c| c.is_ascii_digit()) && !trimmed.is_empty() {
        return trimmed
            .parse::<u64>()
            .map_err(|e| ForgeError::Validation(format!("bad size {}: {}", size, e)));
    }
    let unit = trimmed
        .chars()
        .last()
        .ok_or_else(|| ForgeError::Validation("empty size".to_string()))?;
    let number = &trimmed[..trimmed.len() - 1];
    let value = number
        .parse::<f64>()
        .map_err(|_| ForgeError::Validation(format!("bad size {}", size)))?;

    // factors are KiB per unit
    let factor = |u: char| -> Result<f64> {
        match u.to_ascii_uppercase() {
            'K' => Ok(1.0),
            'M' => Ok(1024.0),
            'G' => Ok(1048576.0),
            'T' => Ok(1073741824.0),
            other => Err(ForgeError::Validation(format!("Unit {} makes no sense", other))),
        }
    };
    let kib = value * factor(unit)?;
    Ok((kib / factor(target_unit)?) as u64)
}

pub struct SizingModule;

impl Stage for SizingModule {
    fn name(&self) -> &'static str {
        "sizing"
    }

    fn flags(&self) -> Vec<FlagDef> {
        vec![
            FlagDef {
                long: "template",
                key: "template",
                value_name: "TEMPLATE",
                help: "VM template: tiny, small, medium, large, xlarge",
            },
            FlagDef {
                long: "custom",
                key: "custom",
                value_name: "cpu,mem,sda",
                help: "CPU, memory, and primary disk for the VM",
            },
            FlagDef {
                long: "sdb",
                key: "raw_sdb",
                value_name: "SIZE[,/mount]",
                help: "Add a second disk; size and mount point optional (10G,/pub)",
            },
        ]
    }

    fn validate(&self, options: &mut Options, out: &Output) -> Result<()> {
        let template = options.get_str("template");
        let custom = options.get_str("custom");

        if template.is_none() && custom.is_none() {
            return Err(ForgeError::Validation(
                "--template or --custom is required".to_string(),
            ));
        }
        if template.is_some() && custom.is_some() {
            return Err(ForgeError::Validation(
                "--template and --custom are mutually exclusive".to_string(),
            ));
        }

        let (cpu, raw_mem, raw_sda) = match template {
            Some(name) => {
                let entry = TEMPLATES
                    .iter()
                    .find(|(n, _, _, _)| *n == name)
                    .ok_or_else(|| {
                        ForgeError::Validation(format!("unknown template {}", name))
                    })?;
                (entry.1 as i64, entry.2.to_string(), entry.3.to_string())
            }
            None => {
                let triple = custom.unwrap();
                let parts: Vec<&str> = triple.split(',').collect();
                if parts.len() != 3 {
                    return Err(ForgeError::Validation(format!(
                        "--custom wants cpu,mem,sda - got {}",
                        triple
                    )));
                }
                let cpu = parts[0].trim().parse::<i64>().map_err(|_| {
                    ForgeError::Validation(format!("bad CPU count {}", parts[0]))
                })?;
                (cpu, parts[1].trim().to_string(), parts[2].trim().to_string())
            }
        };

        options.set_i64("cpu", cpu);
        options.set_i64("mem", parse_size(&raw_mem, 'M')? as i64);
        options.set_i64("sda", parse_size(&raw_sda, 'K')? as i64);

        if let Some(raw_sdb) = options.get_str("raw_sdb") {
            let raw = if raw_sdb.is_empty() { DEFAULT_SDB.to_string() } else { raw_sdb };
            let mut pieces = raw.splitn(2, ',');
            let size = pieces.next().unwrap_or_default();
            let mount = pieces.next().unwrap_or("/pub");
            options.set_i64("sdb", parse_size(size, 'K')? as i64);
            options.set_str("sdb_path", mount);
        }

        out.debug(&format!(
            "cpu: {} mem: {} MiB sda: {} KiB",
            options.get_i64("cpu").unwrap_or(0),
            options.get_i64("mem").unwrap_or(0),
            options.get_i64("sda").unwrap_or(0)
        ));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validated(pairs: &[(&str, &str)]) -> Result<Options> {
        let mut options = Options::new();
        for (k, v) in pairs {
            options.set_str(k, v);
        }
        SizingModule.validate(&mut options, &Output::quiet())?;
        Ok(options)
    }

    #[test]
    fn test_parse_size_conversions() {
        assert_eq!(parse_size("1G", 'M').unwrap(), 1024);
        assert_eq!(parse_size("15G", 'K').unwrap(), 15728640);
        assert_eq!(parse_size("512M", 'M').unwrap(), 512);
        assert_eq!(parse_size("2048", 'M').unwrap(), 2048);
        assert_eq!(parse_size("1T", 'G').unwrap(), 1024);
    }

    #[test]
    fn test_parse_size_rejects_nonsense_unit() {
        assert!(parse_size("10Q", 'K').is_err());
    }

    #[test]
    fn test_template_small() {
        let options = validated(&[("template", "small")]).unwrap();
        assert_eq!(options.get_i64("cpu"), Some(1));
        assert_eq!(options.get_i64("mem"), Some(1024));
        assert_eq!(options.get_i64("sda"), Some(15728640));
    }

    #[test]
    fn test_custom_triple() {
        let options = validated(&[("custom", "4,8G,40G")]).unwrap();
        assert_eq!(options.get_i64("cpu"), Some(4));
        assert_eq!(options.get_i64("mem"), Some(8192));
        assert_eq!(options.get_i64("sda"), Some(41943040));
    }

    #[test]
    fn test_template_and_custom_are_exclusive() {
        assert!(validated(&[("template", "small"), ("custom", "1,1G,15G")]).is_err());
    }

    #[test]
    fn test_one_of_template_or_custom_required() {
        assert!(validated(&[]).is_err());
    }

    #[test]
    fn test_sdb_default_mount() {
        let options = validated(&[("template", "small"), ("raw_sdb", "10G")]).unwrap();
        assert_eq!(options.get_i64("sdb"), Some(10485760));
        assert_eq!(options.get_str("sdb_path").unwrap(), "/pub");
    }

    #[test]
    fn test_sdb_explicit_mount() {
        let options = validated(&[("template", "small"), ("raw_sdb", "20G,/data")]).unwrap();
        assert_eq!(options.get_i64("sdb"), Some(20971520));
        assert_eq!(options.get_str("sdb_path").unwrap(), "/data");
    }

    #[test]
    fn test_unknown_template() {
        assert!(validated(&[("template", "gigantic")]).is_err());
    }
}
