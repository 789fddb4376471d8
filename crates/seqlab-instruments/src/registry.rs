//! Model discovery by identity string (spec §4.2 Discovery).
//!
//! Grounded on `daq-hardware/src/config/schema.rs`'s declarative
//! `DeviceConfig` idea (a model is data, not a hand-built object graph) and
//! on `daq-hardware/src/registry.rs`'s registry-of-models-by-identity shape,
//! expressed here as a flat static table instead of a TOML loader since the
//! spec's parameter tables are small enough to hardcode per model.

use crate::parameter::Parameter;
use std::time::Duration;

/// A declarative instrument model: identity prefix used for discovery, plus
/// its static parameter table (spec §9 redesign flag: lifted to `const`
/// data rather than built imperatively per-instance).
#[derive(Debug, Clone, Copy)]
pub struct InstrumentModel {
    /// Human name, e.g. `"Demo DMM"`.
    pub name: &'static str,
    /// Prefix the identity response (`*IDN?`/`ID`) must start with for this
    /// model to match during discovery.
    pub identity_prefix: &'static str,
    pub parameters: &'static [Parameter],
    /// Default settling delay applied after any write whose parameter
    /// doesn't override it (spec §4.2 per-model `writeDelay`).
    pub write_delay: Duration,
}

impl InstrumentModel {
    pub fn parameter(&self, name: &str) -> Option<&'static Parameter> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// View over readable parameters (spec §4.2 accessor helpers, used by
    /// editor choice population).
    pub fn readable(&self) -> impl Iterator<Item = &'static Parameter> {
        self.parameters.iter().filter(|p| p.readable())
    }

    pub fn writable(&self) -> impl Iterator<Item = &'static Parameter> {
        self.parameters.iter().filter(|p| p.writable())
    }

    pub fn readable_continuous_scalar(&self) -> impl Iterator<Item = &'static Parameter> {
        self.parameters
            .iter()
            .filter(|p| p.readable() && p.is_continuous_scalar())
    }

    pub fn writable_continuous_scalar(&self) -> impl Iterator<Item = &'static Parameter> {
        self.parameters
            .iter()
            .filter(|p| p.writable() && p.is_continuous_scalar())
    }
}

/// A registry of known models, consulted during discovery: the first model
/// whose `identity_prefix` matches the probe response wins (spec §4.2).
#[derive(Debug, Default, Clone)]
pub struct ModelRegistry {
    models: Vec<InstrumentModel>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self { models: Vec::new() }
    }

    pub fn register(&mut self, model: InstrumentModel) -> &mut Self {
        self.models.push(model);
        self
    }

    /// First model whose identity prefix matches `identity_response`.
    pub fn match_identity(&self, identity_response: &str) -> Option<InstrumentModel> {
        self.models
            .iter()
            .find(|m| identity_response.starts_with(m.identity_prefix))
            .copied()
    }

    pub fn by_name(&self, name: &str) -> Option<InstrumentModel> {
        self.models.iter().find(|m| m.name == name).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{demo_dmm, demo_source};

    #[test]
    fn first_match_wins() {
        let mut reg = ModelRegistry::new();
        reg.register(demo_dmm());
        reg.register(demo_source());
        let m = reg.match_identity("DEMO,DMM-1000,SN1,1.0").unwrap();
        assert_eq!(m.name, "Demo DMM");
    }

    #[test]
    fn no_match_returns_none() {
        let reg = ModelRegistry::new();
        assert!(reg.match_identity("UNKNOWN").is_none());
    }
}
