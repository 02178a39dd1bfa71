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

//! The staged validation pipeline.
//!
//! Stages come in two flavors: core modules (sizing, network, identity,
//! placement) and plugins (autoip, ip). All stages are constructed explicitly
//! at startup and held by a `StageRegistry`; there is no runtime discovery.
//! Phase order over the shared Options record:
//!
//!   1. `pre_validate`  - plugins first, lexicographic by name, then core
//!                        modules in declaration order. Plugins use this
//!                        phase to *compute* values (e.g. allocate an IP)
//!                        before core validation sees them.
//!   2. `validate`      - core modules only; each normalizes and
//!                        range-checks its own keys. The first `Err` aborts
//!                        the run: there is no partial continuation during
//!                        validation.
//!   3. `post_validate` - plugins in declaration order, to double-check
//!                        values after core normalization filled defaults.
//!
//! `pre_action`/`post_action` run around the provisioning executor in
//! declaration order, plugins before core modules.

pub mod stages;

use crate::error::Result;
use crate::options::Options;
use crate::output::Output;

/// A CLI flag declared by a stage. The clap layer materializes these as
/// value-taking long options and writes matched values back into the Options
/// record under `key`.
#[derive(Debug, Clone)]
pub struct FlagDef {
    pub long: &'static str,
    pub key: &'static str,
    pub value_name: &'static str,
    pub help: &'static str,
}

/// A named unit of pipeline behavior. Every capability defaults to a no-op;
/// a stage implements whichever subset it needs.
pub trait Stage {
    fn name(&self) -> &'static str;

    /// Defaults contributed to the Options record, below the user config
    /// file and CLI flags in precedence.
    fn defaults(&self) -> Options {
        Options::new()
    }

    /// CLI flags this stage wants the command line to accept.
    fn flags(&self) -> Vec<FlagDef> {
        Vec::new()
    }

    fn pre_validate(&self, _options: &mut Options, _out: &Output) -> Result<()> {
        Ok(())
    }

    /// Core-module normalization and range checking. Plugins leave this as
    /// the default no-op.
    fn validate(&self, _options: &mut Options, _out: &Output) -> Result<()> {
        Ok(())
    }

    fn post_validate(&self, _options: &mut Options, _out: &Output) -> Result<()> {
        Ok(())
    }

    fn pre_action(&self, _options: &mut Options, _out: &Output) -> Result<()> {
        Ok(())
    }

    fn post_action(&self, _options: &mut Options, _out: &Output) -> Result<()> {
        Ok(())
    }
}

/// Ordered collection of core modules and plugins.
pub struct StageRegistry {
    modules: Vec<Box<dyn Stage>>,
    plugins: Vec<Box<dyn Stage>>,
}

impl StageRegistry {
    pub fn new() -> Self {
        Self { modules: Vec::new(), plugins: Vec::new() }
    }

    /// The fixed stage set of a stock hostforge build.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register_module(Box::new(crate::modules::sizing::SizingModule));
        registry.register_module(Box::new(crate::modules::network::NetworkModule));
        registry.register_module(Box::new(crate::modules::identity::IdentityModule));
        registry.register_module(Box::new(crate::modules::placement::PlacementModule));
        registry.register_plugin(Box::new(stages::autoip::AutoipStage::new()));
        registry.register_plugin(Box::new(stages::ip::IpStage));
        registry
    }

    pub fn register_module(&mut self, stage: Box<dyn Stage>) {
        self.modules.push(stage);
    }

    pub fn register_plugin(&mut self, stage: Box<dyn Stage>) {
        self.plugins.push(stage);
    }

    /// Stage-contributed defaults, core modules before plugins so plugin
    /// defaults take precedence (they are the later source).
    pub fn stage_defaults(&self) -> Options {
        let mut merged = Options::new();
        for stage in self.modules.iter() {
            merged.merge(&stage.defaults());
        }
        for stage in self.plugins.iter() {
            merged.merge(&stage.defaults());
        }
        merged
    }

    /// All flags declared by all stages, core modules first.
    pub fn flags(&self) -> Vec<FlagDef> {
        let mut flags = Vec::new();
        for stage in self.modules.iter().chain(self.plugins.iter()) {
            flags.extend(stage.flags());
        }
        flags
    }

    fn plugins_sorted(&self) -> Vec<&dyn Stage> {
        let mut sorted: Vec<&dyn Stage> = self.plugins.iter().map(|s| s.as_ref()).collect();
        sorted.sort_by_key(|s| s.name());
        sorted
    }

    /// Run the full validation state machine. The first error aborts; on
    /// success the Options record is fully normalized and ready to be frozen
    /// into a HostSpec.
    pub fn run_validation(&self, options: &mut Options, out: &Output) -> Result<()> {
        for plugin in self.plugins_sorted() {
            out.debug(&format!("pre_validate: {}", plugin.name()));
            plugin.pre_validate(options, out)?;
        }
        for module in self.modules.iter() {
            module.pre_validate(options, out)?;
        }
        for module in self.modules.iter() {
            out.debug(&format!("validate: {}", module.name()));
            module.validate(options, out)?;
        }
        for plugin in self.plugins.iter() {
            out.debug(&format!("post_validate: {}", plugin.name()));
            plugin.post_validate(options, out)?;
        }
        Ok(())
    }

    pub fn run_pre_action(&self, options: &mut Options, out: &Output) -> Result<()> {
        for stage in self.plugins.iter().chain(self.modules.iter()) {
            stage.pre_action(options, out)?;
        }
        Ok(())
    }

    pub fn run_post_action(&self, options: &mut Options, out: &Output) -> Result<()> {
        for stage in self.plugins.iter().chain(self.modules.iter()) {
            stage.post_action(options, out)?;
        }
        Ok(())
    }
}

impl Default for StageRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ForgeError;
    use std::sync::{Arc, Mutex};

    struct RecordingStage {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
        fail_validate: bool,
    }

    impl RecordingStage {
        fn new(name: &'static str, log: &Arc<Mutex<Vec<String>>>) -> Self {
            Self { name, log: Arc::clone(log), fail_validate: false }
        }

        fn record(&self, phase: &str) {
            self.log.lock().unwrap().push(format!("{}:{}", self.name, phase));
        }
    }

    impl Stage for RecordingStage {
        fn name(&self) -> &'static str {
            self.name
        }

        fn pre_validate(&self, _options: &mut Options, _out: &Output) -> Result<()> {
            self.record("pre");
            Ok(())
        }

        fn validate(&self, _options: &mut Options, _out: &Output) -> Result<()> {
            self.record("validate");
            if self.fail_validate {
                return Err(ForgeError::Validation("forced failure".to_string()));
            }
            Ok(())
        }

        fn post_validate(&self, _options: &mut Options, _out: &Output) -> Result<()> {
            self.record("post");
            Ok(())
        }
    }

    #[test]
    fn test_phase_ordering_plugins_sorted_before_modules() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = StageRegistry::new();
        registry.register_module(Box::new(RecordingStage::new("core_a", &log)));
        registry.register_module(Box::new(RecordingStage::new("core_b", &log)));
        // registered out of lexicographic order on purpose
        registry.register_plugin(Box::new(RecordingStage::new("zeta", &log)));
        registry.register_plugin(Box::new(RecordingStage::new("alpha", &log)));

        let mut options = Options::new();
        registry.run_validation(&mut options, &Output::quiet()).unwrap();

        let entries = log.lock().unwrap().clone();
        assert_eq!(
            entries,
            vec![
                // pre_validate: plugins lexicographic, then modules
                "alpha:pre", "zeta:pre", "core_a:pre", "core_b:pre",
                // core validation
                "core_a:validate", "core_b:validate",
                // post_validate: plugins in declaration order
                "zeta:post", "alpha:post",
            ]
        );
    }

    struct InjectingStage;
    struct ConsumingStage;

    impl Stage for InjectingStage {
        fn name(&self) -> &'static str {
            "injector"
        }
        fn pre_validate(&self, options: &mut Options, _out: &Output) -> Result<()> {
            options.set_str("ip", "10.0.0.5");
            Ok(())
        }
    }

    impl Stage for ConsumingStage {
        fn name(&self) -> &'static str {
            "consumer"
        }
        fn validate(&self, options: &mut Options, _out: &Output) -> Result<()> {
            match options.get_str("ip") {
                Some(_) => Ok(()),
                None => Err(ForgeError::Validation("ip was not injected".to_string())),
            }
        }
    }

    #[test]
    fn test_stages_see_each_others_writes() {
        let mut registry = StageRegistry::new();
        registry.register_plugin(Box::new(InjectingStage));
        registry.register_module(Box::new(ConsumingStage));

        let mut options = Options::new();
        registry.run_validation(&mut options, &Output::quiet()).unwrap();
        assert_eq!(options.get_str("ip").unwrap(), "10.0.0.5");
    }

    #[test]
    fn test_validation_failure_stops_pipeline() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = StageRegistry::new();
        let mut failing = RecordingStage::new("core_fail", &log);
        failing.fail_validate = true;
        registry.register_module(Box::new(failing));
        registry.register_plugin(Box::new(RecordingStage::new("plug", &log)));

        let mut options = Options::new();
        let result = registry.run_validation(&mut options, &Output::quiet());
        assert!(result.is_err());

        let entries = log.lock().unwrap().clone();
        // post_validate never ran for the plugin
        assert!(!entries.contains(&"plug:post".to_string()));
    }
}
