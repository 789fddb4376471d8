//! The five step variants and their run-time contracts (spec §4.4).
//!
//! Grounded on `daq-experiment/src/plans.rs`'s `PlanCommand` enum for the
//! "one concrete type per command kind" shape, and on
//! `daq-experiment/src/run_engine.rs` for the poll/sleep/abort-check pattern
//! each wait loop below follows.

use crate::context::ExecCtx;
use crate::loop_values::{cycle_values, ramp_values, CycleDirection, Spacing};
use crate::termination::{Termination, WaitSpec};
use rand::Rng;
use seqlab_core::{ColumnHeader, Record, SeqError};
use seqlab_instruments::{Instrument, Parameter, ParameterKind, ParameterValue};
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Shared attributes of every step variant (spec §3: `title`, `enabled`).
#[derive(Debug, Clone)]
pub struct StepCommon {
    pub title: String,
    pub enabled: bool,
}

impl StepCommon {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            enabled: true,
        }
    }
}

/// One (instrument, parameter, value) triple in a `Set` step. `args` is
/// already split into one entry per parameter component; a scalar write is
/// a single-element `args`.
#[derive(Debug, Clone)]
pub struct SetTarget {
    pub instrument: String,
    pub parameter: String,
    pub args: Vec<String>,
}

/// One (instrument, parameter) pair read by an `SMeas`/`CMeas`/`Wait`/`Loop`
/// step.
#[derive(Debug, Clone)]
pub struct MeasureTarget {
    pub instrument: String,
    pub parameter: String,
}

/// §4.4.1 Set.
#[derive(Debug, Clone)]
pub struct SetStep {
    pub common: StepCommon,
    pub targets: Vec<SetTarget>,
}

impl SetStep {
    pub async fn execute(&self, ctx: &ExecCtx<'_>) -> Result<(), SeqError> {
        for t in &self.targets {
            let inst = ctx.instrument(&t.instrument)?;
            let param = inst.model.parameter(&t.parameter);
            let unit = param
                .filter(|p| p.kind == ParameterKind::Continuous)
                .map(|p| p.unit_for(0))
                .unwrap_or("");
            ctx.publish(vec![format!(
                "Setting Values; Instrument:{}; Parameter:{} = {} {}",
                t.instrument,
                t.parameter,
                t.args.join(","),
                unit
            )]);
            inst.write_parameter(ctx.transport, &t.parameter, &t.args)
                .await?;
        }
        Ok(())
    }
}

/// §4.4.2 SingleMeasurement.
#[derive(Debug, Clone)]
pub struct SMeasStep {
    pub common: StepCommon,
    pub targets: Vec<MeasureTarget>,
}

impl SMeasStep {
    pub async fn execute(&self, ctx: &ExecCtx<'_>) -> Result<(), SeqError> {
        if ctx.aborted() {
            return Ok(());
        }
        let mut record = Record::new();
        let mut status = Vec::with_capacity(self.targets.len());
        for t in &self.targets {
            let inst = ctx.instrument(&t.instrument)?;
            let value = inst.read_parameter(ctx.transport, &t.parameter).await?;
            status.push(format!("{}--{} = {}", t.instrument, t.parameter, describe(&value)));
            if let Some(param) = inst.model.parameter(&t.parameter) {
                insert_value(&mut record, &t.instrument, param, &value);
            }
        }
        ctx.publish(status);
        ctx.records.emit(record)
    }
}

/// §4.4.3 ContinuousMeasurement.
#[derive(Debug, Clone)]
pub struct CMeasStep {
    pub common: StepCommon,
    pub targets: Vec<MeasureTarget>,
    pub wait: WaitSpec,
}

impl CMeasStep {
    pub async fn execute(&self, ctx: &ExecCtx<'_>) -> Result<(), SeqError> {
        let mut ring = match &self.wait.mode {
            Termination::Condition { .. } => Some(self.wait.new_ring()),
            Termination::Time { .. } => None,
        };
        let deadline = match &self.wait.mode {
            Termination::Time { timeout_s } => Some(Termination::effective_timeout_s(*timeout_s)),
            Termination::Condition { .. } => None,
        };
        let start = Instant::now();

        loop {
            if ctx.aborted() {
                return Ok(());
            }
            let mut record = Record::new();
            let mut status = Vec::with_capacity(self.targets.len() + 1);
            for t in &self.targets {
                let inst = ctx.instrument(&t.instrument)?;
                let value = inst.read_parameter(ctx.transport, &t.parameter).await?;
                status.push(format!("{}--{} = {}", t.instrument, t.parameter, describe(&value)));
                if let Some(param) = inst.model.parameter(&t.parameter) {
                    insert_value(&mut record, &t.instrument, param, &value);
                }
            }

            let mut stable = false;
            if let Termination::Condition {
                wait_inst,
                wait_param,
                ..
            } = &self.wait.mode
            {
                let inst = ctx.instrument(wait_inst)?;
                let value = inst.read_parameter(ctx.transport, wait_param).await?;
                if let ParameterValue::Continuous(vs) = &value {
                    ring.as_mut().unwrap().push(vs.first().copied().unwrap_or(f64::NAN));
                }
                if let Some(param) = inst.model.parameter(wait_param) {
                    insert_value(&mut record, wait_inst, param, &value);
                }
                stable = ring.as_ref().unwrap().is_stable();
            }

            ctx.publish(status);
            ctx.records.emit(record)?;

            if stable {
                return Ok(());
            }
            if let Some(limit) = deadline {
                if start.elapsed().as_secs_f64() > limit {
                    return Ok(());
                }
            }
            if ctx.aborted() {
                return Ok(());
            }
            tokio::time::sleep(Duration::from_secs_f64(self.wait.poll_seconds())).await;
        }
    }
}

/// §4.4.4 Loop: sweep shape plus the per-iteration wait sub-contract.
#[derive(Debug, Clone)]
pub enum LoopSpec {
    Ramp {
        start: f64,
        stop: f64,
        n_points: usize,
    },
    Cycle {
        start: f64,
        min: f64,
        max: f64,
        n_points: usize,
        cycles: f64,
        direction: CycleDirection,
    },
}

#[derive(Debug, Clone)]
pub struct LoopStep {
    pub common: StepCommon,
    pub sweep_inst: String,
    pub sweep_param: String,
    pub spec: LoopSpec,
    pub spacing: Spacing,
    pub wait: WaitSpec,
    values: Vec<f64>,
    iteration: usize,
}

impl LoopStep {
    /// Materialises the value schedule once, up front (spec §4.4.4 "Value
    /// generation"), so `iteration` only ever indexes into a fixed `Vec`.
    pub fn new(
        common: StepCommon,
        sweep_inst: impl Into<String>,
        sweep_param: impl Into<String>,
        spec: LoopSpec,
        spacing: Spacing,
        wait: WaitSpec,
        rng: &mut impl Rng,
    ) -> Self {
        let values = match &spec {
            LoopSpec::Ramp {
                start,
                stop,
                n_points,
            } => ramp_values(*start, *stop, *n_points, spacing, rng),
            LoopSpec::Cycle {
                start,
                min,
                max,
                n_points,
                cycles,
                direction,
            } => cycle_values(*start, *min, *max, *n_points, *cycles, *direction, spacing, rng),
        };
        Self {
            common,
            sweep_inst: sweep_inst.into(),
            sweep_param: sweep_param.into(),
            spec,
            spacing,
            wait,
            values,
            iteration: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iteration(&self) -> usize {
        self.iteration
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Reset by `LoopEnd` once the schedule is exhausted (spec §8 invariant
    /// 8: a finished loop's counter returns to 0 so a subsequent pass, or an
    /// enclosing outer `Loop`, starts clean).
    pub fn reset(&mut self) {
        self.iteration = 0;
    }

    pub async fn execute(&mut self, ctx: &ExecCtx<'_>) -> Result<(), SeqError> {
        let value = self.values[self.iteration];
        let inst = ctx.instrument(&self.sweep_inst)?;
        inst.write_parameter(ctx.transport, &self.sweep_param, &[format!("{value}")])
            .await?;
        self.iteration += 1;
        ctx.publish(vec![format!(
            "{}, {}/{}",
            self.common.title,
            self.iteration,
            self.values.len()
        )]);
        run_wait(ctx, &self.wait).await
    }
}

/// §4.4.4 LoopEnd. Holds the sequence index of its paired `Loop` (spec §9
/// redesign flag: index-based pairing, not an object back-reference).
#[derive(Debug, Clone)]
pub struct LoopEndStep {
    pub common: StepCommon,
    pub loop_index: usize,
}

impl LoopEndStep {
    /// `Some(index)` tells the engine to jump back to the paired `Loop`;
    /// `None` means the schedule is exhausted (or abort was observed) and
    /// the paired loop's counter is reset for any future re-entry.
    pub fn execute(&self, loop_step: &mut LoopStep, ctx: &ExecCtx<'_>) -> Option<usize> {
        if loop_step.iteration() < loop_step.len() && !ctx.aborted() {
            Some(self.loop_index)
        } else {
            loop_step.reset();
            None
        }
    }
}

/// §4.4.5 Wait.
#[derive(Debug, Clone)]
pub struct WaitStep {
    pub common: StepCommon,
    pub wait: WaitSpec,
}

impl WaitStep {
    pub async fn execute(&self, ctx: &ExecCtx<'_>) -> Result<(), SeqError> {
        run_wait(ctx, &self.wait).await
    }
}

/// Shared poll loop for `Wait` and a `Loop` iteration's wait: a `Time` wait
/// is a silent delay; a `Condition` wait polls and logs only the wait
/// parameter until its stability ring reports stable (spec §4.4.5: "only the
/// wait parameter is logged").
async fn run_wait(ctx: &ExecCtx<'_>, wait: &WaitSpec) -> Result<(), SeqError> {
    match &wait.mode {
        Termination::Time { timeout_s } => {
            let limit = Termination::effective_timeout_s(*timeout_s);
            let start = Instant::now();
            loop {
                if ctx.aborted() || start.elapsed().as_secs_f64() > limit {
                    return Ok(());
                }
                tokio::time::sleep(Duration::from_secs_f64(wait.poll_seconds())).await;
            }
        }
        Termination::Condition {
            wait_inst,
            wait_param,
            ..
        } => {
            let mut ring = wait.new_ring();
            loop {
                if ctx.aborted() {
                    return Ok(());
                }
                let inst = ctx.instrument(wait_inst)?;
                let value = inst.read_parameter(ctx.transport, wait_param).await?;
                let mut record = Record::new();
                if let Some(param) = inst.model.parameter(wait_param) {
                    insert_value(&mut record, wait_inst, param, &value);
                }
                if let ParameterValue::Continuous(vs) = &value {
                    ring.push(vs.first().copied().unwrap_or(f64::NAN));
                }
                ctx.records.emit(record)?;
                if ring.is_stable() {
                    return Ok(());
                }
                if ctx.aborted() {
                    return Ok(());
                }
                tokio::time::sleep(Duration::from_secs_f64(wait.poll_seconds())).await;
            }
        }
    }
}

fn describe(value: &ParameterValue) -> String {
    match value {
        ParameterValue::Continuous(vs) => vs
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(","),
        ParameterValue::Discrete { label, .. } => label.clone(),
        ParameterValue::Action => String::new(),
    }
}

/// Insert a read value under its canonical header(s) (spec §3: one cell per
/// component, unit-suffixed for continuous readings).
fn insert_value(record: &mut Record, instrument: &str, param: &Parameter, value: &ParameterValue) {
    match value {
        ParameterValue::Action => {
            record.insert(ColumnHeader::bare(instrument, param.name), "");
        }
        ParameterValue::Discrete { label, .. } => {
            record.insert(ColumnHeader::bare(instrument, param.name), label.clone());
        }
        ParameterValue::Continuous(values) => {
            if param.components.is_empty() {
                let header = ColumnHeader::continuous(instrument, param.name, param.unit_for(0));
                record.insert(header, values.first().copied().unwrap_or(f64::NAN).to_string());
            } else {
                for (i, component) in param.components.iter().enumerate() {
                    let header = ColumnHeader::continuous(instrument, component, param.unit_for(i));
                    let v = values.get(i).copied().unwrap_or(f64::NAN);
                    record.insert(header, v.to_string());
                }
            }
        }
    }
}

/// Canonical headers a measuring step contributes to `getVarsList` (spec
/// §4.3), without executing anything — used by `seqlab-apparatus` to compute
/// the file's column plan ahead of a run.
fn headers_for(targets: &[MeasureTarget], instruments: &HashMap<String, Instrument>) -> Vec<ColumnHeader> {
    let mut out = Vec::new();
    for t in targets {
        let Some(inst) = instruments.get(&t.instrument) else {
            continue;
        };
        let Some(param) = inst.model.parameter(&t.parameter) else {
            continue;
        };
        if param.components.is_empty() {
            match param.kind {
                ParameterKind::Continuous => {
                    out.push(ColumnHeader::continuous(&t.instrument, param.name, param.unit_for(0)))
                }
                _ => out.push(ColumnHeader::bare(&t.instrument, param.name)),
            }
        } else {
            for (i, component) in param.components.iter().enumerate() {
                out.push(ColumnHeader::continuous(&t.instrument, component, param.unit_for(i)));
            }
        }
    }
    out
}

fn condition_target(mode: &Termination) -> Vec<MeasureTarget> {
    match mode {
        Termination::Condition {
            wait_inst,
            wait_param,
            ..
        } => vec![MeasureTarget {
            instrument: wait_inst.clone(),
            parameter: wait_param.clone(),
        }],
        Termination::Time { .. } => Vec::new(),
    }
}

/// One of the five step variants (spec §9 redesign flag: a tagged sum, not
/// dynamic dispatch by class name).
#[derive(Debug, Clone)]
pub enum Step {
    Set(SetStep),
    SMeas(SMeasStep),
    CMeas(CMeasStep),
    Loop(LoopStep),
    LoopEnd(LoopEndStep),
    Wait(WaitStep),
}

impl Step {
    pub fn common(&self) -> &StepCommon {
        match self {
            Step::Set(s) => &s.common,
            Step::SMeas(s) => &s.common,
            Step::CMeas(s) => &s.common,
            Step::Loop(s) => &s.common,
            Step::LoopEnd(s) => &s.common,
            Step::Wait(s) => &s.common,
        }
    }

    pub fn common_mut(&mut self) -> &mut StepCommon {
        match self {
            Step::Set(s) => &mut s.common,
            Step::SMeas(s) => &mut s.common,
            Step::CMeas(s) => &mut s.common,
            Step::Loop(s) => &mut s.common,
            Step::LoopEnd(s) => &mut s.common,
            Step::Wait(s) => &mut s.common,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.common().enabled
    }

    /// The column headers this step's execution would contribute (spec
    /// §4.3 `getVarsList`); `Set` and `LoopEnd` contribute none.
    pub fn measurement_headers(&self, instruments: &HashMap<String, Instrument>) -> Vec<ColumnHeader> {
        match self {
            Step::SMeas(s) => headers_for(&s.targets, instruments),
            Step::CMeas(s) => {
                let mut h = headers_for(&s.targets, instruments);
                h.extend(headers_for(&condition_target(&s.wait.mode), instruments));
                h
            }
            Step::Wait(s) => headers_for(&condition_target(&s.wait.mode), instruments),
            Step::Loop(s) => headers_for(&condition_target(&s.wait.mode), instruments),
            Step::Set(_) | Step::LoopEnd(_) => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loop_values::Spacing;
    use rand::rngs::mock::StepRng;
    use seqlab_core::{AbortFlag, NullStatus, RecordLog};
    use seqlab_instruments::models::{demo_dmm, demo_source};
    use seqlab_transport::MockTransport;
    use std::collections::HashMap;

    async fn wired(t: &MockTransport, addr: &str, name: &str, model: seqlab_instruments::InstrumentModel) -> Instrument {
        let h = t.open(&addr.to_string()).await.unwrap();
        let mut inst = Instrument::new(addr, model).with_name(name);
        inst.bind_handle(h);
        inst
    }

    #[tokio::test]
    async fn set_step_writes_in_declaration_order() {
        let t = MockTransport::new();
        t.add_instrument("A", "DEMO,SRC-1").await;
        let inst = wired(&t, "A", "src", demo_source()).await;
        let mut instruments = HashMap::new();
        instruments.insert("src".to_string(), inst);

        let records = RecordLog::new();
        let status = NullStatus;
        let abort = AbortFlag::new();
        let ctx = ExecCtx {
            transport: &t,
            instruments: &instruments,
            records: &records,
            status: &status,
            abort: &abort,
        };

        let step = SetStep {
            common: StepCommon::new("Set"),
            targets: vec![SetTarget {
                instrument: "src".to_string(),
                parameter: "OutputVoltage".to_string(),
                args: vec!["3.3".to_string()],
            }],
        };
        step.execute(&ctx).await.unwrap();
        assert_eq!(t.last_write("A").await.unwrap(), "SOUR:VOLT 3.30");
    }

    #[tokio::test]
    async fn smeas_step_emits_one_record() {
        let t = MockTransport::new();
        t.add_instrument("A", "DEMO,DMM-1000").await;
        t.set_response("A", "MEAS:VOLT?", "2.5").await;
        let inst = wired(&t, "A", "dmm", demo_dmm()).await;
        let mut instruments = HashMap::new();
        instruments.insert("dmm".to_string(), inst);

        let records = RecordLog::new();
        let status = NullStatus;
        let abort = AbortFlag::new();
        let ctx = ExecCtx {
            transport: &t,
            instruments: &instruments,
            records: &records,
            status: &status,
            abort: &abort,
        };

        let step = SMeasStep {
            common: StepCommon::new("Measure"),
            targets: vec![MeasureTarget {
                instrument: "dmm".to_string(),
                parameter: "Voltage".to_string(),
            }],
        };
        step.execute(&ctx).await.unwrap();
        let rows = records.records();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get(&ColumnHeader::continuous("dmm", "Voltage", "V")), Some("2.5"));
    }

    #[tokio::test]
    async fn loop_step_walks_full_schedule_then_loopend_signals_reset() {
        let t = MockTransport::new();
        t.add_instrument("A", "DEMO,SRC-1").await;
        let inst = wired(&t, "A", "src", demo_source()).await;
        let mut instruments = HashMap::new();
        instruments.insert("src".to_string(), inst);

        let records = RecordLog::new();
        let status = NullStatus;
        let abort = AbortFlag::new();
        let ctx = ExecCtx {
            transport: &t,
            instruments: &instruments,
            records: &records,
            status: &status,
            abort: &abort,
        };

        let mut rng = StepRng::new(0, 1);
        let mut loop_step = LoopStep::new(
            StepCommon::new("Sweep"),
            "src",
            "OutputVoltage",
            LoopSpec::Ramp {
                start: 0.0,
                stop: 1.0,
                n_points: 3,
            },
            Spacing::Linear,
            WaitSpec::new(0.1, Termination::Time { timeout_s: 0.01 }),
            &mut rng,
        );
        let loop_end = LoopEndStep {
            common: StepCommon::new("Sweep end"),
            loop_index: 0,
        };

        // n_points=3: the first two visits still have schedule left, so
        // LoopEnd jumps back to the Loop; the third exhausts it and resets.
        for _ in 0..2 {
            loop_step.execute(&ctx).await.unwrap();
            assert_eq!(loop_end.execute(&mut loop_step, &ctx), Some(0));
        }
        loop_step.execute(&ctx).await.unwrap();
        assert_eq!(loop_end.execute(&mut loop_step, &ctx), None);
        assert_eq!(loop_step.iteration(), 0);
    }
}
