//! Demonstration instrument models used by tests and the CLI's `--mock`
//! apparatus. Declining the Open Question of a TOML-driven config loader
//! (the spec doesn't pin down a config file format, and "do not guess" per
//! §9 applies), these are hand-written static tables — one scalar
//! multimeter, one scalar source, and one compound lock-in exercising a read
//! macro.

use crate::parameter::{Parameter, ParameterKind, ReadMacro};
use crate::registry::InstrumentModel;
use seqlab_transport::{Handle, Transport};
use std::time::Duration;

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
    precision: Some(4),
    values: &[],
    labels: &[],
    write_delay_ms: 0,
};

const DMM_RANGE: Parameter = Parameter {
    name: "Range",
    kind: ParameterKind::Discrete,
    read_command: Some("RANG?"),
    write_command: Some("RANG {value}"),
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

/// A fictitious multimeter: one scalar continuous read, one discrete
/// read/write, no write-only/action parameters.
pub fn demo_dmm() -> InstrumentModel {
    InstrumentModel {
        name: "Demo DMM",
        identity_prefix: "DEMO,DMM",
        parameters: &[VOLTAGE, DMM_RANGE],
        write_delay: Duration::ZERO,
    }
}

const OUTPUT_VOLTAGE: Parameter = Parameter {
    name: "OutputVoltage",
    kind: ParameterKind::Continuous,
    read_command: Some("SOUR:VOLT?"),
    write_command: Some("SOUR:VOLT {value}"),
    read_macro: None,
    write_macro: None,
    units: &["V"],
    components: &[],
    min: Some(-10.0),
    max: Some(10.0),
    precision: Some(2),
    values: &[],
    labels: &[],
    write_delay_ms: 5,
};

const OUTPUT_ENABLE: Parameter = Parameter {
    name: "Output",
    kind: ParameterKind::Discrete,
    read_command: Some("OUTP?"),
    write_command: Some("OUTP {value}"),
    read_macro: None,
    write_macro: None,
    units: &[],
    components: &[],
    min: None,
    max: None,
    precision: None,
    values: &["0", "1"],
    labels: &["Off", "On"],
    write_delay_ms: 0,
};

const RESET: Parameter = Parameter {
    name: "Reset",
    kind: ParameterKind::Action,
    read_command: None,
    write_command: Some("*RST"),
    read_macro: None,
    write_macro: None,
    units: &[],
    components: &[],
    min: None,
    max: None,
    precision: None,
    values: &[],
    labels: &[],
    write_delay_ms: 50,
};

/// A fictitious voltage source: a bounded continuous write/read, a discrete
/// output enable, and a bare action command.
pub fn demo_source() -> InstrumentModel {
    InstrumentModel {
        name: "Demo Source",
        identity_prefix: "DEMO,SRC",
        parameters: &[OUTPUT_VOLTAGE, OUTPUT_ENABLE, RESET],
        write_delay: Duration::from_millis(1),
    }
}

/// Two-step dialogue: query X then query Y, joined the way a single
/// `read_command` response would be (comma-separated), so the generic
/// continuous-read pipeline in `instrument.rs` doesn't need to know this was
/// a macro at all.
fn lockin_xy_macro<'a>(
    transport: &'a dyn Transport,
    handle: &'a Handle,
) -> futures::future::BoxFuture<'a, Result<String, seqlab_core::SeqError>> {
    Box::pin(async move {
        let x = transport.query(handle, "OUTP? X").await?;
        let y = transport.query(handle, "OUTP? Y").await?;
        Ok(format!("{},{}", x.trim(), y.trim()))
    })
}

const XY: Parameter = Parameter {
    name: "XY",
    kind: ParameterKind::Continuous,
    read_command: None,
    write_command: None,
    read_macro: Some(lockin_xy_macro as ReadMacro),
    write_macro: None,
    units: &["V", "V"],
    components: &["X", "Y"],
    min: None,
    max: None,
    precision: Some(6),
    values: &[],
    labels: &[],
    write_delay_ms: 0,
};

/// A fictitious lock-in amplifier whose `XY` reading is a compound
/// two-component continuous parameter populated by a read macro rather than
/// a single comma-separated query.
pub fn demo_lockin() -> InstrumentModel {
    InstrumentModel {
        name: "Demo Lock-in",
        identity_prefix: "DEMO,LOCKIN",
        parameters: &[XY],
        write_delay: Duration::ZERO,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_dmm_has_readable_voltage() {
        let m = demo_dmm();
        assert!(m.parameter("Voltage").unwrap().readable());
        assert!(!m.parameter("Voltage").unwrap().writable());
    }

    #[test]
    fn demo_source_output_voltage_is_bounded() {
        let m = demo_source();
        let p = m.parameter("OutputVoltage").unwrap();
        assert_eq!(p.min, Some(-10.0));
        assert_eq!(p.max, Some(10.0));
    }
}
