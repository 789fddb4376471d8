//! Instrument bank plus editable step sequence, loop/nesting repair, and the
//! run-loop state machine that drives steps in order.

use seqlab_core::{ColumnHeader, SeqError};
use seqlab_instruments::{Instrument, ModelRegistry};
use seqlab_steps::{ExecCtx, Step};
use seqlab_transport::{identity_probe, Transport, RESERVED_ADDRESS_PREFIX};
use std::collections::{BTreeSet, HashMap};

/// Owns the bound instruments (address -> candidate/active binding) and the
/// ordered, editable step sequence.
#[derive(Debug, Clone, Default)]
pub struct Apparatus {
    instruments: Vec<Instrument>,
    steps: Vec<Step>,
}

impl Apparatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn instruments(&self) -> &[Instrument] {
        &self.instruments
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn steps_mut(&mut self) -> &mut Vec<Step> {
        &mut self.steps
    }

    pub fn push_instrument(&mut self, inst: Instrument) {
        self.instruments.push(inst);
    }

    pub fn push_step(&mut self, step: Step) {
        self.steps.push(step);
    }

    /// Active instrument names must be unique (invariant 2).
    pub fn names_unique(&self) -> bool {
        let mut seen = BTreeSet::new();
        self.instruments
            .iter()
            .filter_map(|i| i.name.as_deref())
            .all(|n| seen.insert(n))
    }

    /// A name -> bound-copy lookup for the instruments currently active,
    /// the shape `ExecCtx` and `Step::measurement_headers` expect. Callers
    /// (the runtime's executor) bind transport handles onto the copies
    /// before a run.
    pub fn active_instrument_map(&self) -> HashMap<String, Instrument> {
        self.instruments
            .iter()
            .filter(|i| i.is_active())
            .map(|i| (i.name.clone().unwrap(), i.clone()))
            .collect()
    }

    /// Refresh the instrument bank from the bus: enumerate addresses, probe
    /// each one's identity, replace the bank with the newly observed set
    /// while preserving names for addresses whose resolved model is
    /// unchanged. Unreachable addresses are dropped.
    pub async fn find_instruments(
        &mut self,
        transport: &dyn Transport,
        registry: &ModelRegistry,
    ) -> Result<(), SeqError> {
        let previous = std::mem::take(&mut self.instruments);
        let addresses = transport.enumerate().await?;
        let mut discovered = Vec::with_capacity(addresses.len());

        for address in addresses {
            if address.starts_with(RESERVED_ADDRESS_PREFIX) {
                continue;
            }
            let handle = transport.open(&address).await?;
            let probe = identity_probe(&address);
            let reply = transport.query(&handle, probe).await?;
            transport.close(&handle).await.ok();
            let Some(model) = registry.match_identity(reply.trim()) else {
                continue;
            };

            let mut inst = Instrument::new(address.clone(), model);
            if let Some(prior) = previous
                .iter()
                .find(|p| p.address == address && p.model.name == inst.model.name)
            {
                if let Some(name) = &prior.name {
                    inst = inst.with_name(name.clone());
                }
            }
            discovered.push(inst);
        }

        self.instruments = discovered;
        Ok(())
    }

    /// `['Timestamp'] + ordered-unique-union` of every enabled step's
    /// declared headers, in declaration order (spec's `getVarsList`).
    pub fn column_plan(&self) -> Vec<ColumnHeader> {
        let instruments = self.active_instrument_map();
        let mut plan = vec![ColumnHeader::timestamp()];
        let mut seen: BTreeSet<String> = BTreeSet::new();
        seen.insert(ColumnHeader::timestamp().as_str().to_string());
        for step in self.steps.iter().filter(|s| s.is_enabled()) {
            for header in step.measurement_headers(&instruments) {
                if seen.insert(header.as_str().to_string()) {
                    plan.push(header);
                }
            }
        }
        plan
    }

    fn loopend_paired_with(&self, loop_index: usize) -> Option<usize> {
        self.steps.iter().position(|s| matches!(s, Step::LoopEnd(le) if le.loop_index == loop_index))
    }

    fn swap_steps(&mut self, a: usize, b: usize) {
        self.steps.swap(a, b);
        for s in &mut self.steps {
            if let Step::LoopEnd(le) = s {
                if le.loop_index == a {
                    le.loop_index = b;
                } else if le.loop_index == b {
                    le.loop_index = a;
                }
            }
        }
    }

    /// Move the element at `from` to `to` (`to` expressed in terms of the
    /// sequence *before* removal), shifting every other `LoopEnd.loop_index`
    /// that falls in the vacated/opened range.
    fn move_step(&mut self, from: usize, to: usize) {
        if from == to {
            return;
        }
        let item = self.steps.remove(from);
        self.steps.insert(to, item);
        if from < to {
            for s in &mut self.steps {
                if let Step::LoopEnd(le) = s {
                    if le.loop_index == from {
                        le.loop_index = to;
                    } else if le.loop_index > from && le.loop_index <= to {
                        le.loop_index -= 1;
                    }
                }
            }
        } else {
            for s in &mut self.steps {
                if let Step::LoopEnd(le) = s {
                    if le.loop_index == from {
                        le.loop_index = to;
                    } else if le.loop_index >= to && le.loop_index < from {
                        le.loop_index += 1;
                    }
                }
            }
        }
    }

    /// Restores well-formed Loop/LoopEnd nesting after a structural mutation:
    /// first, any `LoopEnd` that precedes its paired `Loop` is swapped into
    /// place; then a stack walk moves any `LoopEnd` that doesn't pair with
    /// the innermost open `Loop` up to the current position.
    pub fn protect_loops(&mut self) {
        loop {
            let mut fixed = false;
            for j in 0..self.steps.len() {
                if let Step::LoopEnd(le) = &self.steps[j] {
                    let i = le.loop_index;
                    if i > j {
                        self.swap_steps(i, j);
                        fixed = true;
                        break;
                    }
                }
            }
            if !fixed {
                break;
            }
        }

        let mut stack: Vec<usize> = Vec::new();
        let mut i = 0;
        while i < self.steps.len() {
            match &self.steps[i] {
                Step::Loop(_) => stack.push(i),
                Step::LoopEnd(le) => {
                    let want = le.loop_index;
                    if stack.last() != Some(&want) {
                        if let Some(&top) = stack.last() {
                            if let Some(pos) = self.loopend_paired_with(top) {
                                if pos != i {
                                    self.move_step(pos, i);
                                }
                            }
                        }
                    }
                    if let Step::LoopEnd(le2) = &self.steps[i] {
                        if stack.last() == Some(&le2.loop_index) {
                            stack.pop();
                        }
                    }
                }
                _ => {}
            }
            i += 1;
        }
    }

    /// Deleting a `Loop` or `LoopEnd` also deletes its pair. Indices are
    /// extended with pairs, then removed in descending order.
    pub fn delete(&mut self, indices: &[usize]) {
        let mut extended: BTreeSet<usize> = indices.iter().copied().collect();
        for &idx in indices {
            match self.steps.get(idx) {
                Some(Step::Loop(_)) => {
                    if let Some(pos) = self.loopend_paired_with(idx) {
                        extended.insert(pos);
                    }
                }
                Some(Step::LoopEnd(le)) => {
                    extended.insert(le.loop_index);
                }
                _ => {}
            }
        }
        let mut sorted: Vec<usize> = extended.into_iter().collect();
        sorted.sort_unstable_by(|a, b| b.cmp(a));
        for idx in sorted {
            if idx >= self.steps.len() {
                continue;
            }
            self.steps.remove(idx);
            for s in &mut self.steps {
                if let Step::LoopEnd(le) = s {
                    if le.loop_index > idx {
                        le.loop_index -= 1;
                    }
                }
            }
        }
        self.protect_loops();
    }

    /// Duplicates the selected indices (extended to whole pairs), inserting
    /// contiguous runs together directly after their last member. Copies
    /// pairing entirely within the duplicated run are rebound to the copy;
    /// copies of one half of an external pair keep pointing at the original.
    pub fn duplicate(&mut self, indices: &[usize]) {
        let mut extended: BTreeSet<usize> = indices.iter().copied().collect();
        for &idx in indices {
            match self.steps.get(idx) {
                Some(Step::Loop(_)) => {
                    if let Some(pos) = self.loopend_paired_with(idx) {
                        extended.insert(pos);
                    }
                }
                Some(Step::LoopEnd(le)) => {
                    extended.insert(le.loop_index);
                }
                _ => {}
            }
        }
        let sorted: Vec<usize> = extended.into_iter().collect();
        let mut groups: Vec<Vec<usize>> = Vec::new();
        for idx in sorted {
            if let Some(last) = groups.last_mut() {
                if *last.last().unwrap() + 1 == idx {
                    last.push(idx);
                    continue;
                }
            }
            groups.push(vec![idx]);
        }

        for group in groups.into_iter().rev() {
            let insert_at = *group.last().unwrap() + 1;
            let count = group.len();

            for s in &mut self.steps {
                if let Step::LoopEnd(le) = s {
                    if le.loop_index >= insert_at {
                        le.loop_index += count;
                    }
                }
            }

            let mut clones: Vec<Step> = group.iter().map(|&i| self.steps[i].clone()).collect();
            for clone in &mut clones {
                if let Step::LoopEnd(le) = clone {
                    if let Some(offset) = group.iter().position(|&gi| gi == le.loop_index) {
                        le.loop_index = insert_at + offset;
                    } else if le.loop_index >= insert_at {
                        le.loop_index += count;
                    }
                }
            }
            for (offset, step) in clones.into_iter().enumerate() {
                self.steps.insert(insert_at + offset, step);
            }
        }
        self.protect_loops();
    }

    /// Single-position shift; a no-op at either end of the sequence.
    pub fn move_up(&mut self, index: usize) {
        if index == 0 || index >= self.steps.len() {
            return;
        }
        self.move_step(index, index - 1);
        self.protect_loops();
    }

    pub fn move_down(&mut self, index: usize) {
        if index + 1 >= self.steps.len() {
            return;
        }
        self.move_step(index, index + 1);
        self.protect_loops();
    }

    /// Every `LoopEnd`'s pair is at a strictly earlier index, and loops
    /// nest without crossing (invariant 1).
    pub fn loops_well_formed(&self) -> bool {
        let mut stack: Vec<usize> = Vec::new();
        for (i, step) in self.steps.iter().enumerate() {
            match step {
                Step::Loop(_) => stack.push(i),
                Step::LoopEnd(le) => {
                    if le.loop_index >= i {
                        return false;
                    }
                    match stack.pop() {
                        Some(top) if top == le.loop_index => {}
                        _ => return false,
                    }
                }
                _ => {}
            }
        }
        stack.is_empty()
    }

    /// Drives the position pointer through one pass of the sequence,
    /// executing each enabled step and honouring `LoopEnd`'s jump-target
    /// return. Returns once the end of the sequence is reached or abort is
    /// observed.
    pub async fn run_sequence(&mut self, ctx: &ExecCtx<'_>) -> Result<(), SeqError> {
        let mut position = 0usize;
        while position < self.steps.len() {
            if ctx.aborted() {
                break;
            }
            if !self.steps[position].is_enabled() {
                position += 1;
                continue;
            }
            ctx.publish(vec![self.steps[position].common().title.clone()]);
            position = self.execute_step_at(position, ctx).await?;
        }
        Ok(())
    }

    async fn execute_step_at(&mut self, position: usize, ctx: &ExecCtx<'_>) -> Result<usize, SeqError> {
        let loop_end = match &self.steps[position] {
            Step::LoopEnd(le) => Some(le.clone()),
            _ => None,
        };
        if let Some(le) = loop_end {
            return Ok(match &mut self.steps[le.loop_index] {
                Step::Loop(loop_step) => le.execute(loop_step, ctx).unwrap_or(position + 1),
                _ => position + 1,
            });
        }

        match &mut self.steps[position] {
            Step::Set(s) => s.execute(ctx).await?,
            Step::SMeas(s) => s.execute(ctx).await?,
            Step::CMeas(s) => s.execute(ctx).await?,
            Step::Wait(s) => s.execute(ctx).await?,
            Step::Loop(s) => s.execute(ctx).await?,
            Step::LoopEnd(_) => unreachable!("handled above"),
        }
        Ok(position + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::mock::StepRng;
    use seqlab_core::{AbortFlag, NullStatus, RecordLog};
    use seqlab_instruments::models::demo_source;
    use seqlab_steps::loop_values::Spacing;
    use seqlab_steps::{LoopSpec, LoopStep, StepCommon, Termination, WaitSpec};
    use seqlab_steps::{LoopEndStep, SetStep, SetTarget};
    use seqlab_transport::MockTransport;

    fn loop_pair() -> (Step, Step) {
        let mut rng = StepRng::new(0, 1);
        let l = LoopStep::new(
            StepCommon::new("Sweep"),
            "src",
            "OutputVoltage",
            LoopSpec::Ramp {
                start: 0.0,
                stop: 1.0,
                n_points: 2,
            },
            Spacing::Linear,
            WaitSpec::new(0.1, Termination::Time { timeout_s: 0.01 }),
            &mut rng,
        );
        let end = LoopEndStep {
            common: StepCommon::new("Sweep end"),
            loop_index: 0,
        };
        (Step::Loop(l), Step::LoopEnd(end))
    }

    #[test]
    fn protect_loops_swaps_misordered_pair() {
        let mut app = Apparatus::new();
        let (l, end) = loop_pair();
        // Deliberately inserted out of order: LoopEnd before its Loop.
        app.push_step(end);
        app.push_step(l);
        // Fix up the stored loop_index to reflect the (wrong) position: the
        // Loop the LoopEnd names is now at index 1, not 0.
        if let Step::LoopEnd(le) = &mut app.steps_mut()[0] {
            le.loop_index = 1;
        }
        app.protect_loops();
        assert!(app.loops_well_formed());
        assert!(matches!(app.steps()[0], Step::Loop(_)));
        assert!(matches!(app.steps()[1], Step::LoopEnd(_)));
    }

    #[test]
    fn delete_removes_loop_and_its_end_together() {
        let mut app = Apparatus::new();
        let (l, end) = loop_pair();
        app.push_step(l);
        app.push_step(end);
        app.delete(&[0]);
        assert!(app.steps().is_empty());
    }

    #[test]
    fn move_up_and_down_preserve_nesting() {
        let mut app = Apparatus::new();
        let (l, end) = loop_pair();
        app.push_step(Step::Set(SetStep {
            common: StepCommon::new("Set"),
            targets: vec![SetTarget {
                instrument: "src".to_string(),
                parameter: "OutputVoltage".to_string(),
                args: vec!["0".to_string()],
            }],
        }));
        app.push_step(l);
        app.push_step(end);
        app.move_up(1);
        assert!(app.loops_well_formed());
    }

    #[test]
    fn duplicate_does_not_renumber_titles() {
        // §9 Open Question: whether duplicated Loop pairs renumber their
        // labels immediately or only at the next `updateTitles` pass. This
        // workspace has no editor-side `updateTitles` step, so duplication
        // leaves `title` exactly as copied; renumbering, if ever added,
        // would be a separate explicit pass over the sequence.
        let mut app = Apparatus::new();
        let (l, end) = loop_pair();
        app.push_step(l);
        app.push_step(end);
        app.duplicate(&[0, 1]);
        assert_eq!(app.steps()[0].common().title, app.steps()[2].common().title);
        assert_eq!(app.steps()[1].common().title, app.steps()[3].common().title);
    }

    #[tokio::test]
    async fn run_sequence_executes_loop_to_completion() {
        let t = MockTransport::new();
        t.add_instrument("A", "DEMO,SRC-1").await;
        let h = t.open(&"A".to_string()).await.unwrap();
        let mut inst = Instrument::new("A", demo_source()).with_name("src");
        inst.bind_handle(h);

        let mut instruments = HashMap::new();
        instruments.insert("src".to_string(), inst);

        let mut app = Apparatus::new();
        let (l, end) = loop_pair();
        app.push_step(l);
        app.push_step(end);

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
        app.run_sequence(&ctx).await.unwrap();
        if let Step::Loop(l) = &app.steps()[0] {
            assert_eq!(l.iteration(), 0);
        }
    }
}
