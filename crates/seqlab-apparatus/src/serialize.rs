//! Apparatus snapshot serialisation (spec §4.3 "Serialisation format", §6.3
//! "Sequence/metadata serialisation").
//!
//! The wire format is hand-rolled text, not serde, because the spec pins it
//! down byte-for-byte: two sections, `INSTRUMENTS:` then `COMMANDS:`, the
//! latter a sequence of `Sequence Command <N>:` blocks of indented
//! `attr = value` lines. Everything else in this workspace serializes
//! through serde (`seqlab-storage::FileRequest`); this is the one format the
//! editor and a standalone run process must agree on byte-for-byte, so it
//! gets its own tolerant little parser instead.
//!
//! Per-step attribute names are this crate's own invention — the spec
//! describes the section/line grammar exactly but leaves individual step
//! attributes to the implementation (they were editor widget state in the
//! original). The choices made here are recorded in `DESIGN.md`.

use crate::apparatus::Apparatus;
use rand::rngs::ThreadRng;
use seqlab_core::SeqError;
use seqlab_instruments::{Instrument, ModelRegistry};
use seqlab_steps::loop_values::{CycleDirection, Spacing};
use seqlab_steps::{
    CMeasStep, LoopEndStep, LoopSpec, LoopStep, MeasureTarget, SMeasStep, SetStep, SetTarget,
    Step, StepCommon, Termination, WaitSpec, WaitStep,
};

const INSTRUMENTS_HEADER: &str = "INSTRUMENTS:";
const COMMANDS_HEADER: &str = "COMMANDS:";

/// A single `attr = value` line, in declaration order. Lookups are linear
/// (these blocks are a handful of lines) rather than hashed, so repeated
/// attrs and insertion order both behave the way a human-edited text file
/// would expect.
struct AttrMap(Vec<(String, String)>);

impl AttrMap {
    fn parse(lines: &[String]) -> Self {
        let mut out = Vec::with_capacity(lines.len());
        for line in lines {
            if let Some((k, v)) = line.split_once('=') {
                out.push((k.trim().to_string(), v.trim().to_string()));
            }
        }
        AttrMap(out)
    }

    fn get(&self, key: &str) -> Option<&str> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    fn get_bool(&self, key: &str) -> Option<bool> {
        match self.get(key)? {
            "True" => Some(true),
            "False" => Some(false),
            _ => None,
        }
    }

    fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key)?.trim().parse().ok()
    }

    fn get_usize(&self, key: &str) -> Option<usize> {
        self.get(key)?.trim().parse().ok()
    }

    /// Tolerant list-literal parse (spec §6.3: "each element stripped of
    /// surrounding whitespace and quote characters").
    fn get_list(&self, key: &str) -> Option<Vec<String>> {
        let raw = self.get(key)?.trim();
        let inner = raw.strip_prefix('[')?.strip_suffix(']')?;
        if inner.trim().is_empty() {
            return Some(Vec::new());
        }
        Some(
            inner
                .split(',')
                .map(|s| s.trim().trim_matches(|c| c == '\'' || c == '"').to_string())
                .collect(),
        )
    }
}

fn encode_bool(b: bool) -> String {
    if b { "True" } else { "False" }.to_string()
}

fn encode_list(items: &[String]) -> String {
    format!("[{}]", items.join(", "))
}

fn encode_set_targets(targets: &[SetTarget]) -> Vec<(String, String)> {
    let items: Vec<String> = targets
        .iter()
        .map(|t| format!("{}--{}={}", t.instrument, t.parameter, t.args.join("+")))
        .collect();
    vec![("targets".to_string(), encode_list(&items))]
}

fn decode_set_targets(attrs: &AttrMap) -> Result<Vec<SetTarget>, SeqError> {
    attrs
        .get_list("targets")
        .unwrap_or_default()
        .iter()
        .map(|item| {
            let (inst_param, value) = item.split_once('=').ok_or_else(|| bad_target(item))?;
            let (instrument, parameter) = inst_param.split_once("--").ok_or_else(|| bad_target(item))?;
            let args = value.split('+').map(|s| s.to_string()).collect();
            Ok(SetTarget {
                instrument: instrument.to_string(),
                parameter: parameter.to_string(),
                args,
            })
        })
        .collect()
}

fn encode_measure_targets(key: &str, targets: &[MeasureTarget]) -> Vec<(String, String)> {
    let items: Vec<String> = targets
        .iter()
        .map(|t| format!("{}--{}", t.instrument, t.parameter))
        .collect();
    vec![(key.to_string(), encode_list(&items))]
}

fn decode_measure_targets(attrs: &AttrMap, key: &str) -> Result<Vec<MeasureTarget>, SeqError> {
    attrs
        .get_list(key)
        .unwrap_or_default()
        .iter()
        .map(|item| {
            let (instrument, parameter) = item.split_once("--").ok_or_else(|| bad_target(item))?;
            Ok(MeasureTarget {
                instrument: instrument.to_string(),
                parameter: parameter.to_string(),
            })
        })
        .collect()
}

fn bad_target(item: &str) -> SeqError {
    SeqError::StructureError {
        reason: format!("malformed target {item:?}"),
    }
}

fn encode_wait(wait: &WaitSpec) -> Vec<(String, String)> {
    let mut out = vec![("poll".to_string(), wait.poll_seconds().to_string())];
    match &wait.mode {
        Termination::Time { timeout_s } => {
            out.push(("termination".to_string(), "Time".to_string()));
            out.push(("timeout".to_string(), timeout_s.to_string()));
        }
        Termination::Condition {
            wait_inst,
            wait_param,
            target,
            stability,
            stable_time,
        } => {
            out.push(("termination".to_string(), "Condition".to_string()));
            out.push(("wait_inst".to_string(), wait_inst.clone()));
            out.push(("wait_param".to_string(), wait_param.clone()));
            out.push(("target".to_string(), target.to_string()));
            out.push(("stability".to_string(), stability.to_string()));
            out.push(("stable_time".to_string(), stable_time.to_string()));
        }
    }
    out
}

fn decode_wait(attrs: &AttrMap) -> WaitSpec {
    let poll = attrs.get_f64("poll").unwrap_or(0.1);
    let mode = match attrs.get("termination") {
        Some("Condition") => Termination::Condition {
            wait_inst: attrs.get("wait_inst").unwrap_or("").to_string(),
            wait_param: attrs.get("wait_param").unwrap_or("").to_string(),
            target: attrs.get_f64("target").unwrap_or(0.0),
            stability: attrs.get_f64("stability").unwrap_or(0.0),
            stable_time: attrs.get_f64("stable_time").unwrap_or(0.0),
        },
        _ => Termination::Time {
            timeout_s: attrs.get_f64("timeout").unwrap_or(0.0),
        },
    };
    WaitSpec::new(poll, mode)
}

fn encode_spacing(s: Spacing) -> &'static str {
    match s {
        Spacing::Linear => "Linear",
        Spacing::Logarithmic => "Logarithmic",
        Spacing::Sinusoidal => "Sinusoidal",
        Spacing::UniformRandom => "Uniform Random",
    }
}

fn decode_spacing(s: &str) -> Spacing {
    match s {
        "Logarithmic" => Spacing::Logarithmic,
        "Sinusoidal" => Spacing::Sinusoidal,
        "Uniform Random" | "UniformRandom" => Spacing::UniformRandom,
        _ => Spacing::Linear,
    }
}

fn encode_direction(d: CycleDirection) -> &'static str {
    match d {
        CycleDirection::UpFirst => "Up First",
        CycleDirection::DownFirst => "Down First",
    }
}

fn decode_direction(s: &str) -> CycleDirection {
    match s {
        "Down First" | "DownFirst" => CycleDirection::DownFirst,
        _ => CycleDirection::UpFirst,
    }
}

fn encode_loop(s: &LoopStep) -> Vec<(String, String)> {
    let mut out = vec![
        ("sweep_inst".to_string(), s.sweep_inst.clone()),
        ("sweep_param".to_string(), s.sweep_param.clone()),
        ("spacing".to_string(), encode_spacing(s.spacing).to_string()),
    ];
    match &s.spec {
        LoopSpec::Ramp {
            start,
            stop,
            n_points,
        } => {
            out.push(("loop_mode".to_string(), "Ramp".to_string()));
            out.push(("start".to_string(), start.to_string()));
            out.push(("stop".to_string(), stop.to_string()));
            out.push(("n".to_string(), n_points.to_string()));
        }
        LoopSpec::Cycle {
            start,
            min,
            max,
            n_points,
            cycles,
            direction,
        } => {
            out.push(("loop_mode".to_string(), "Cycle".to_string()));
            out.push(("start".to_string(), start.to_string()));
            out.push(("min".to_string(), min.to_string()));
            out.push(("max".to_string(), max.to_string()));
            out.push(("n".to_string(), n_points.to_string()));
            out.push(("cycles".to_string(), cycles.to_string()));
            out.push(("direction".to_string(), encode_direction(*direction).to_string()));
        }
    }
    out.extend(encode_wait(&s.wait));
    out
}

fn decode_loop(common: StepCommon, attrs: &AttrMap, rng: &mut ThreadRng) -> Step {
    let sweep_inst = attrs.get("sweep_inst").unwrap_or("").to_string();
    let sweep_param = attrs.get("sweep_param").unwrap_or("").to_string();
    let spacing = decode_spacing(attrs.get("spacing").unwrap_or("Linear"));
    let wait = decode_wait(attrs);
    let spec = match attrs.get("loop_mode") {
        Some("Cycle") => LoopSpec::Cycle {
            start: attrs.get_f64("start").unwrap_or(0.0),
            min: attrs.get_f64("min").unwrap_or(0.0),
            max: attrs.get_f64("max").unwrap_or(0.0),
            n_points: attrs.get_usize("n").unwrap_or(1),
            cycles: attrs.get_f64("cycles").unwrap_or(1.0),
            direction: decode_direction(attrs.get("direction").unwrap_or("Up First")),
        },
        _ => LoopSpec::Ramp {
            start: attrs.get_f64("start").unwrap_or(0.0),
            stop: attrs.get_f64("stop").unwrap_or(0.0),
            n_points: attrs.get_usize("n").unwrap_or(1),
        },
    };
    Step::Loop(LoopStep::new(
        common,
        sweep_inst,
        sweep_param,
        spec,
        spacing,
        wait,
        rng,
    ))
}

fn encode_step(step: &Step) -> Vec<(String, String)> {
    let (kind, common) = match step {
        Step::Set(s) => ("Set", &s.common),
        Step::SMeas(s) => ("SMeas", &s.common),
        Step::CMeas(s) => ("CMeas", &s.common),
        Step::Loop(s) => ("Loop", &s.common),
        Step::LoopEnd(s) => ("LoopEnd", &s.common),
        Step::Wait(s) => ("Wait", &s.common),
    };
    let mut out = vec![
        ("kind".to_string(), kind.to_string()),
        ("title".to_string(), common.title.clone()),
        ("enabled".to_string(), encode_bool(common.enabled)),
    ];
    match step {
        Step::Set(s) => out.extend(encode_set_targets(&s.targets)),
        Step::SMeas(s) => out.extend(encode_measure_targets("targets", &s.targets)),
        Step::CMeas(s) => {
            out.extend(encode_measure_targets("targets", &s.targets));
            out.extend(encode_wait(&s.wait));
        }
        Step::Loop(s) => out.extend(encode_loop(s)),
        Step::LoopEnd(s) => out.push(("loop_index".to_string(), (s.loop_index + 1).to_string())),
        Step::Wait(s) => out.extend(encode_wait(&s.wait)),
    }
    out
}

fn decode_step(attrs: &AttrMap, rng: &mut ThreadRng) -> Result<Step, SeqError> {
    let kind = attrs.get("kind").ok_or_else(|| SeqError::StructureError {
        reason: "command block has no kind".to_string(),
    })?;
    let common = StepCommon {
        title: attrs.get("title").unwrap_or("Step").to_string(),
        enabled: attrs.get_bool("enabled").unwrap_or(true),
    };
    match kind {
        "Set" => Ok(Step::Set(SetStep {
            common,
            targets: decode_set_targets(attrs)?,
        })),
        "SMeas" => Ok(Step::SMeas(SMeasStep {
            common,
            targets: decode_measure_targets(attrs, "targets")?,
        })),
        "CMeas" => Ok(Step::CMeas(CMeasStep {
            common,
            targets: decode_measure_targets(attrs, "targets")?,
            wait: decode_wait(attrs),
        })),
        "Loop" => Ok(decode_loop(common, attrs, rng)),
        "LoopEnd" => {
            let n = attrs.get_usize("loop_index").ok_or_else(|| SeqError::StructureError {
                reason: "LoopEnd has no loop_index".to_string(),
            })?;
            Ok(Step::LoopEnd(LoopEndStep {
                common,
                loop_index: n.saturating_sub(1),
            }))
        }
        "Wait" => Ok(Step::Wait(WaitStep {
            common,
            wait: decode_wait(attrs),
        })),
        other => Err(SeqError::StructureError {
            reason: format!("unknown step kind {other:?}"),
        }),
    }
}

/// Split the commands section into the indented-line blocks following each
/// `Sequence Command <N>:` header.
fn split_command_blocks(text: &str) -> Vec<Vec<String>> {
    let mut blocks = Vec::new();
    let mut current: Option<Vec<String>> = None;
    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("Sequence Command") && trimmed.ends_with(':') {
            if let Some(b) = current.take() {
                blocks.push(b);
            }
            current = Some(Vec::new());
        } else if !trimmed.is_empty() {
            if let Some(b) = current.as_mut() {
                b.push(trimmed.to_string());
            }
        }
    }
    if let Some(b) = current.take() {
        blocks.push(b);
    }
    blocks
}

impl Apparatus {
    /// Render this apparatus to its textual snapshot (spec §4.3, §6.3).
    pub fn serialize(&self) -> String {
        let mut out = String::new();
        out.push_str(INSTRUMENTS_HEADER);
        out.push('\n');
        for inst in self.instruments() {
            out.push_str(&inst.address);
            out.push('\t');
            out.push_str(inst.model.name);
            if let Some(name) = &inst.name {
                out.push('\t');
                out.push_str(name);
            }
            out.push('\n');
        }
        out.push_str(COMMANDS_HEADER);
        out.push('\n');
        for (i, step) in self.steps().iter().enumerate() {
            out.push_str(&format!("Sequence Command {}:\n", i + 1));
            for (k, v) in encode_step(step) {
                out.push_str(&format!("    {k} = {v}\n"));
            }
        }
        out
    }

    /// Parse a textual snapshot, resolving instrument models against
    /// `registry` by name. A metadata header above `INSTRUMENTS:` is
    /// tolerated and skipped (spec §6.3). Rejects only unrepairable
    /// structures (a `LoopEnd` whose `Loop` doesn't exist); `protectLoops`
    /// repairs everything else (spec §7 `StructureError`).
    pub fn deserialize(text: &str, registry: &ModelRegistry) -> Result<Apparatus, SeqError> {
        let from_instruments = match text.find(INSTRUMENTS_HEADER) {
            Some(pos) => &text[pos + INSTRUMENTS_HEADER.len()..],
            None => text,
        };
        let commands_pos = from_instruments
            .find(COMMANDS_HEADER)
            .ok_or_else(|| SeqError::StructureError {
                reason: "missing COMMANDS: section".to_string(),
            })?;
        let instruments_section = &from_instruments[..commands_pos];
        let commands_section = &from_instruments[commands_pos + COMMANDS_HEADER.len()..];

        let mut app = Apparatus::new();
        for line in instruments_section.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let mut parts = line.splitn(3, '\t');
            let address = parts.next().unwrap_or("").trim();
            if address.is_empty() {
                continue;
            }
            let model_name = parts.next().unwrap_or("").trim();
            let model = registry.by_name(model_name).ok_or_else(|| SeqError::StructureError {
                reason: format!("unknown instrument model {model_name:?}"),
            })?;
            let mut inst = Instrument::new(address.to_string(), model);
            if let Some(name) = parts.next() {
                let name = name.trim();
                if !name.is_empty() {
                    inst = inst.with_name(name.to_string());
                }
            }
            app.push_instrument(inst);
        }

        let mut rng = rand::thread_rng();
        for block in split_command_blocks(commands_section) {
            let attrs = AttrMap::parse(&block);
            app.push_step(decode_step(&attrs, &mut rng)?);
        }

        for step in app.steps() {
            if let Step::LoopEnd(le) = step {
                let pairs_with_loop = matches!(app.steps().get(le.loop_index), Some(Step::Loop(_)));
                if !pairs_with_loop {
                    return Err(SeqError::StructureError {
                        reason: "LoopEnd has no matching Loop anywhere in the sequence".to_string(),
                    });
                }
            }
        }
        app.protect_loops();
        Ok(app)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use seqlab_instruments::models::{demo_dmm, demo_source};
    use seqlab_instruments::ModelRegistry;
    use seqlab_steps::loop_values::Spacing as SpacingT;

    fn registry() -> ModelRegistry {
        let mut r = ModelRegistry::new();
        r.register(demo_dmm());
        r.register(demo_source());
        r
    }

    /// Spec §8 round-trip boundary: empty sequence.
    #[test]
    fn empty_apparatus_round_trips() {
        let app = Apparatus::new();
        let text = app.serialize();
        assert_eq!(text, "INSTRUMENTS:\nCOMMANDS:\n");
        let back = Apparatus::deserialize(&text, &registry()).unwrap();
        assert_eq!(back.serialize(), text);
    }

    #[test]
    fn instrument_without_name_is_a_candidate() {
        let mut app = Apparatus::new();
        app.push_instrument(Instrument::new("A", demo_dmm()));
        let text = app.serialize();
        assert!(text.contains("A\tDemo DMM\n"));
        let back = Apparatus::deserialize(&text, &registry()).unwrap();
        assert!(!back.instruments()[0].is_active());
    }

    /// Spec §8 invariant 3: `serialise . deserialise . serialise = serialise`.
    #[test]
    fn set_and_smeas_round_trip_is_idempotent() {
        let mut app = Apparatus::new();
        app.push_instrument(Instrument::new("A", demo_source()).with_name("src"));
        app.push_step(Step::Set(SetStep {
            common: StepCommon::new("Set voltage"),
            targets: vec![SetTarget {
                instrument: "src".to_string(),
                parameter: "OutputVoltage".to_string(),
                args: vec!["3.3".to_string()],
            }],
        }));
        app.push_step(Step::SMeas(SMeasStep {
            common: StepCommon::new("Measure"),
            targets: vec![MeasureTarget {
                instrument: "src".to_string(),
                parameter: "OutputVoltage".to_string(),
            }],
        }));

        let once = app.serialize();
        let reparsed = Apparatus::deserialize(&once, &registry()).unwrap();
        let twice = reparsed.serialize();
        assert_eq!(once, twice);
    }

    #[test]
    fn loop_pair_round_trips_with_correct_index() {
        let mut rng = rand::thread_rng();
        let l = LoopStep::new(
            StepCommon::new("Sweep"),
            "src",
            "OutputVoltage",
            LoopSpec::Ramp {
                start: 0.0,
                stop: 10.0,
                n_points: 11,
            },
            SpacingT::Linear,
            WaitSpec::new(0.1, Termination::Time { timeout_s: 0.0 }),
            &mut rng,
        );
        let mut app = Apparatus::new();
        app.push_instrument(Instrument::new("A", demo_source()).with_name("src"));
        app.push_step(Step::Loop(l));
        app.push_step(Step::LoopEnd(LoopEndStep {
            common: StepCommon::new("End sweep"),
            loop_index: 0,
        }));

        let text = app.serialize();
        assert!(text.contains("loop_index = 1"));
        let back = Apparatus::deserialize(&text, &registry()).unwrap();
        assert!(back.loops_well_formed());
        match &back.steps()[1] {
            Step::LoopEnd(le) => assert_eq!(le.loop_index, 0),
            _ => panic!("expected LoopEnd"),
        }
    }

    /// Spec §7 StructureError: unrepairable only when no `Loop` exists at all.
    #[test]
    fn loopend_with_no_loop_anywhere_is_rejected() {
        let text = "INSTRUMENTS:\nCOMMANDS:\nSequence Command 1:\n    kind = LoopEnd\n    title = End\n    enabled = True\n    loop_index = 5\n";
        let err = Apparatus::deserialize(text, &registry()).unwrap_err();
        assert!(matches!(err, SeqError::StructureError { .. }));
    }

    #[test]
    fn metadata_header_above_instruments_is_skipped() {
        let text = "# exported 2026-07-28\nsome tool banner\nINSTRUMENTS:\nCOMMANDS:\n";
        let app = Apparatus::deserialize(text, &registry()).unwrap();
        assert!(app.instruments().is_empty());
        assert!(app.steps().is_empty());
    }
}
