//! Instrument binding + typed read/write coercion (spec §3 Instrument,
//! §4.2 parameter query/write algorithms).

use crate::parameter::{Parameter, ParameterKind, ParameterValue};
use crate::registry::InstrumentModel;
use seqlab_core::SeqError;
use seqlab_transport::{Handle, Transport};
use seqlab_transport::{with_retries, RetryPolicy};
use std::collections::HashMap;
use std::time::Duration;

const NOT_IN_VALUE_SET: &str = "value not in declared value set";

/// Binding of an apparatus-local name to a transport address and a model
/// (spec §3). A nameless binding is a candidate; a named binding is active.
/// Steps reference instruments by name, rebound each run (weak reference via
/// name lookup) rather than holding a strong reference to this struct.
#[derive(Debug, Clone)]
pub struct Instrument {
    pub address: String,
    pub name: Option<String>,
    pub model: InstrumentModel,
    handle: Option<Handle>,
}

impl Instrument {
    pub fn new(address: impl Into<String>, model: InstrumentModel) -> Self {
        Self {
            address: address.into(),
            name: None,
            model,
            handle: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn is_active(&self) -> bool {
        self.name.is_some()
    }

    /// Called by the runtime at run start after `Transport::open`.
    pub fn bind_handle(&mut self, handle: Handle) {
        self.handle = Some(handle);
    }

    pub fn handle(&self) -> Result<&Handle, SeqError> {
        self.handle.as_ref().ok_or_else(|| SeqError::InstrumentMissing {
            name: self.name.clone().unwrap_or_else(|| self.address.clone()),
        })
    }

    fn label(&self) -> String {
        self.name.clone().unwrap_or_else(|| self.address.clone())
    }

    fn parameter(&self, name: &str) -> Result<&'static Parameter, SeqError> {
        self.model.parameter(name).ok_or_else(|| SeqError::BadParameter {
            instrument: self.label(),
            parameter: name.to_string(),
        })
    }

    /// Spec §4.2 parameter query algorithm: macro if declared, else the
    /// declared read command; retry up to N=10 on Timeout or on a discrete
    /// value outside the declared set, clearing the bus between retries.
    pub async fn read_parameter(
        &self,
        transport: &dyn Transport,
        name: &str,
    ) -> Result<ParameterValue, SeqError> {
        let param = self.parameter(name)?;
        if !param.readable() {
            return Err(SeqError::WriteOnly {
                instrument: self.label(),
                parameter: name.to_string(),
            });
        }
        let handle = self.handle()?.clone();
        let label = self.label();
        let pname = name.to_string();

        with_retries(
            RetryPolicy::PARAMETER_READ,
            |e| e.is_retryable() || matches!(e, SeqError::BadValue { reason, .. } if reason == NOT_IN_VALUE_SET),
            |_attempt| {
                let handle = handle.clone();
                let label = label.clone();
                let pname = pname.clone();
                async move {
                    let raw = if let Some(read_macro) = param.read_macro {
                        read_macro(transport, &handle).await?
                    } else {
                        let cmd = param.read_command.expect("readable() implies a command or macro");
                        transport.query(&handle, cmd).await?
                    };
                    parse_reply(param, raw.trim(), &label, &pname)
                }
            },
            || async { let _ = transport.clear(&handle).await; },
        )
        .await
    }

    /// Spec §4.2 parameter write algorithm: coerce the argument(s) to the
    /// parameter's kind, emit the command, then sleep the settling delay.
    pub async fn write_parameter(
        &self,
        transport: &dyn Transport,
        name: &str,
        args: &[String],
    ) -> Result<(), SeqError> {
        let param = self.parameter(name)?;
        if !param.writable() {
            return Err(SeqError::ReadOnly {
                instrument: self.label(),
                parameter: name.to_string(),
            });
        }
        let handle = self.handle()?.clone();
        let label = self.label();

        let wire = match param.kind {
            ParameterKind::Action => String::new(),
            ParameterKind::Discrete => {
                let input = args.first().map(String::as_str).unwrap_or("");
                param
                    .discrete_wire_token(input)
                    .ok_or_else(|| SeqError::BadValue {
                        instrument: label.clone(),
                        parameter: name.to_string(),
                        reason: format!("{input:?} is not a known value or label"),
                    })?
                    .to_string()
            }
            ParameterKind::Continuous => {
                let mut parts = Vec::with_capacity(param.arity());
                for raw in args.iter().take(param.arity()) {
                    let mut v: f64 = raw.trim().parse().map_err(|_| SeqError::BadValue {
                        instrument: label.clone(),
                        parameter: name.to_string(),
                        reason: format!("{raw:?} is not a number"),
                    })?;
                    if let Some(min) = param.min {
                        v = v.max(min);
                    }
                    if let Some(max) = param.max {
                        v = v.min(max);
                    }
                    let precision = param.precision.unwrap_or(6) as usize;
                    parts.push(format!("{v:.precision$}"));
                }
                parts.join(",")
            }
        };

        if let Some(write_macro) = param.write_macro {
            write_macro(transport, &handle, &wire).await?;
        } else {
            let template = param
                .write_command
                .expect("writable() implies a command or macro");
            let command = if template.contains("{value}") {
                let mut vars = HashMap::new();
                vars.insert("value".to_string(), wire);
                strfmt::strfmt(template, &vars).map_err(|e| SeqError::IoError(e.to_string()))?
            } else {
                template.to_string()
            };
            transport.write(&handle, &command).await?;
        }

        let delay_ms = if param.write_delay_ms > 0 {
            param.write_delay_ms
        } else {
            self.model.write_delay.as_millis() as u64
        };
        if delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }
        Ok(())
    }
}

fn parse_reply(
    param: &Parameter,
    raw: &str,
    instrument: &str,
    parameter: &str,
) -> Result<ParameterValue, SeqError> {
    match param.kind {
        ParameterKind::Discrete => {
            let wire = param.discrete_wire_token(raw).ok_or_else(|| SeqError::BadValue {
                instrument: instrument.to_string(),
                parameter: parameter.to_string(),
                reason: NOT_IN_VALUE_SET.to_string(),
            })?;
            Ok(ParameterValue::Discrete {
                wire: wire.to_string(),
                label: param.discrete_label(wire),
            })
        }
        ParameterKind::Continuous => {
            let mut values = Vec::with_capacity(param.arity());
            for part in raw.split(',') {
                let v: f64 = part.trim().parse().map_err(|_| SeqError::BadValue {
                    instrument: instrument.to_string(),
                    parameter: parameter.to_string(),
                    reason: format!("{part:?} is not a number"),
                })?;
                values.push(v);
            }
            Ok(ParameterValue::Continuous(values))
        }
        ParameterKind::Action => Ok(ParameterValue::Action),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{demo_dmm, demo_lockin, demo_source};
    use seqlab_transport::MockTransport;

    #[tokio::test]
    async fn reads_continuous_scalar() {
        let t = MockTransport::new();
        t.add_instrument("A", "DEMO,DMM-1000").await;
        t.set_response("A", "MEAS:VOLT?", "1.2345").await;
        let h = t.open(&"A".to_string()).await.unwrap();
        let mut inst = Instrument::new("A", demo_dmm()).with_name("dmm");
        inst.bind_handle(h);
        let v = inst.read_parameter(&t, "Voltage").await.unwrap();
        assert_eq!(v, ParameterValue::Continuous(vec![1.2345]));
    }

    #[tokio::test]
    async fn write_clamps_and_rounds_continuous() {
        let t = MockTransport::new();
        t.add_instrument("A", "DEMO,SRC-1").await;
        let h = t.open(&"A".to_string()).await.unwrap();
        let mut inst = Instrument::new("A", demo_source()).with_name("src");
        inst.bind_handle(h);
        inst.write_parameter(&t, "OutputVoltage", &["123.4567".to_string()])
            .await
            .unwrap();
        assert_eq!(t.last_write("A").await.unwrap(), "SOUR:VOLT 10.00");
    }

    #[tokio::test]
    async fn write_rejects_unknown_discrete() {
        let t = MockTransport::new();
        t.add_instrument("A", "DEMO,SRC-1").await;
        let h = t.open(&"A".to_string()).await.unwrap();
        let mut inst = Instrument::new("A", demo_source()).with_name("src");
        inst.bind_handle(h);
        let r = inst
            .write_parameter(&t, "Output", &["Sideways".to_string()])
            .await;
        assert!(matches!(r, Err(SeqError::BadValue { .. })));
    }

    #[tokio::test]
    async fn action_parameter_ignores_argument() {
        let t = MockTransport::new();
        t.add_instrument("A", "DEMO,SRC-1").await;
        let h = t.open(&"A".to_string()).await.unwrap();
        let mut inst = Instrument::new("A", demo_source()).with_name("src");
        inst.bind_handle(h);
        inst.write_parameter(&t, "Reset", &[]).await.unwrap();
    }

    #[tokio::test]
    async fn compound_read_macro_splits_into_components() {
        let t = MockTransport::new();
        t.add_instrument("A", "DEMO,LOCKIN-1").await;
        t.set_response("A", "OUTP? X", "0.5").await;
        t.set_response("A", "OUTP? Y", "-0.25").await;
        let h = t.open(&"A".to_string()).await.unwrap();
        let mut inst = Instrument::new("A", demo_lockin()).with_name("li");
        inst.bind_handle(h);
        let v = inst.read_parameter(&t, "XY").await.unwrap();
        assert_eq!(v, ParameterValue::Continuous(vec![0.5, -0.25]));
    }

    #[tokio::test]
    async fn read_retries_on_timeout_then_succeeds() {
        let t = MockTransport::new();
        t.add_instrument("A", "DEMO,DMM-1000").await;
        // No response programmed yet: first query() will time out.
        let h = t.open(&"A".to_string()).await.unwrap();
        let mut inst = Instrument::new("A", demo_dmm()).with_name("dmm");
        inst.bind_handle(h);
        t.set_response("A", "MEAS:VOLT?", "9.0").await;
        let v = inst.read_parameter(&t, "Voltage").await.unwrap();
        assert_eq!(v, ParameterValue::Continuous(vec![9.0]));
    }
}
