//! Declarative parameter descriptor (spec §3 Parameter, §4.2).

use futures::future::BoxFuture;
use seqlab_core::SeqError;
use seqlab_transport::{Handle, Transport};

/// A read macro performs multi-step device dialogue in place of a single
/// `read_command` query, returning the raw comma-joined reply text exactly
/// as a plain read_command response would (so the rest of the read pipeline
/// — split-on-comma, discrete lookup — is unchanged). Expressed as a plain
/// function pointer (not a trait object) so it stays a `'static` value a
/// static parameter table can hold, per the "lift to const tables" redesign
/// note: a fn pointer is a zero-sized, `Copy`, const-constructible value.
pub type ReadMacro = for<'a> fn(&'a dyn Transport, &'a Handle) -> BoxFuture<'a, Result<String, SeqError>>;

/// A write macro performs multi-step device dialogue for a write, given the
/// already-coerced wire-form argument(s) joined the same way a plain
/// `write_command` substitution would be.
pub type WriteMacro = for<'a> fn(&'a dyn Transport, &'a Handle, &'a str) -> BoxFuture<'a, Result<(), SeqError>>;

/// One parameter's direction/coercion rules (spec §3 `kind`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParameterKind {
    /// Numeric, optionally bounded and rounded.
    Continuous,
    /// One of a fixed set of wire tokens / human labels.
    Discrete,
    /// No value; a bare command is emitted on write, no read exists.
    Action,
}

/// A declarative parameter descriptor, one entry in an
/// [`InstrumentModel`](crate::registry::InstrumentModel)'s static table.
#[derive(Debug, Clone)]
pub struct Parameter {
    pub name: &'static str,
    pub kind: ParameterKind,

    pub read_command: Option<&'static str>,
    pub write_command: Option<&'static str>,
    pub read_macro: Option<ReadMacro>,
    pub write_macro: Option<WriteMacro>,

    /// One unit per component (or a single unit for a scalar parameter).
    pub units: &'static [&'static str],
    /// Sub-field names for a compound reading (e.g. `["X", "Y"]`); empty for
    /// a scalar parameter.
    pub components: &'static [&'static str],

    // Continuous-only.
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub precision: Option<u32>,

    // Discrete-only: parallel wire-token / human-label lists.
    pub values: &'static [&'static str],
    pub labels: &'static [&'static str],

    /// Hardware settling delay applied after a write (spec §4.2, per-model
    /// `writeDelay`; stored per-parameter here since some devices settle
    /// faster on action commands than on continuous writes).
    pub write_delay_ms: u64,
}

impl Parameter {
    /// True if a read is possible (has a read command or macro).
    pub fn readable(&self) -> bool {
        self.read_command.is_some() || self.read_macro.is_some()
    }

    /// True if a write is possible (has a write command or macro, or is an
    /// action parameter with a bare command).
    pub fn writable(&self) -> bool {
        self.write_command.is_some() || self.write_macro.is_some()
    }

    /// True for a readable continuous parameter with exactly one component
    /// (spec §4.2 accessor helper: "readable continuous scalar").
    pub fn is_continuous_scalar(&self) -> bool {
        self.kind == ParameterKind::Continuous && self.components.len() <= 1
    }

    /// Number of value slots this parameter carries (1 for scalar, N for
    /// compound).
    pub fn arity(&self) -> usize {
        self.components.len().max(1)
    }

    /// The unit string for a given component index (or the sole unit for a
    /// scalar parameter). Invariant (spec §3): for compound continuous
    /// parameters `len(units) == len(components)`.
    pub fn unit_for(&self, index: usize) -> &'static str {
        if self.units.len() == self.arity() {
            self.units.get(index).copied().unwrap_or("")
        } else {
            self.units.first().copied().unwrap_or("")
        }
    }

    /// Look up the wire token for a discrete value given either a wire token
    /// or a human label. Invariant (spec §3): `len(values) == len(labels)`.
    pub fn discrete_wire_token(&self, input: &str) -> Option<&'static str> {
        debug_assert_eq!(self.values.len(), self.labels.len());
        if let Some(pos) = self.values.iter().position(|v| *v == input) {
            return Some(self.values[pos]);
        }
        self.labels
            .iter()
            .position(|l| *l == input)
            .map(|pos| self.values[pos])
    }

    /// The human label paired with a wire token, or the token itself if
    /// unrecognised (defensive; `discrete_wire_token` / read validation
    /// should already have rejected unknown tokens before this is called).
    pub fn discrete_label(&self, wire_token: &str) -> String {
        self.values
            .iter()
            .position(|v| *v == wire_token)
            .and_then(|pos| self.labels.get(pos))
            .map(|l| l.to_string())
            .unwrap_or_else(|| wire_token.to_string())
    }
}

/// A value flowing out of a read, or into a write, at the parameter layer.
#[derive(Debug, Clone, PartialEq)]
pub enum ParameterValue {
    /// One value per component, canonical float text.
    Continuous(Vec<f64>),
    /// Wire token paired with its human label.
    Discrete { wire: String, label: String },
    /// No value carried.
    Action,
}

#[cfg(test)]
mod tests {
    use super::*;

    const VOLTAGE: Parameter = Parameter {
        name: "Voltage",
        kind: ParameterKind::Continuous,
        read_command: Some("MEAS:VOLT?"),
        write_command: None,
        read_macro: None,
        write_macro: None,
        units: &["V"],
        components: &[],
        min: None,
        max: None,
        precision: Some(3),
        values: &[],
        labels: &[],
        write_delay_ms: 0,
    };

    #[test]
    fn scalar_unit_lookup() {
        assert_eq!(VOLTAGE.unit_for(0), "V");
        assert!(VOLTAGE.is_continuous_scalar());
    }

    const RANGE: Parameter = Parameter {
        name: "Range",
        kind: ParameterKind::Discrete,
        read_command: Some("RANG?"),
        write_command: Some("RANG {}"),
        read_macro: None,
        write_macro: None,
        units: &[],
        components: &[],
        min: None,
        max: None,
        precision: None,
        values: &["AUTO", "10", "100"],
        labels: &["Auto", "10 V", "100 V"],
        write_delay_ms: 0,
    };

    #[test]
    fn discrete_accepts_either_wire_or_label() {
        assert_eq!(RANGE.discrete_wire_token("10"), Some("10"));
        assert_eq!(RANGE.discrete_wire_token("10 V"), Some("10"));
        assert_eq!(RANGE.discrete_wire_token("nope"), None);
        assert_eq!(RANGE.discrete_label("100"), "100 V");
    }
}
