//! The executor (spec §4.5): binds transport handles to the apparatus's
//! active instruments, then drives `Apparatus::run_sequence` to completion
//! or abort.
//!
//! Grounded on `daq-experiment/src/run_engine.rs`'s `RunEngine::start`,
//! which likewise opens its device handles once at run start and then
//! drives a single state machine to completion; specialised here to the
//! single-pass `runSequence` position pointer rather than a resumable plan
//! generator, since the spec's Apparatus is itself that single pass.

use crate::controller::Controller;
use crate::sinks::FileRecordSink;
use seqlab_apparatus::Apparatus;
use seqlab_core::SeqError;
use seqlab_steps::ExecCtx;
use seqlab_transport::Transport;
use tracing::{info, instrument};

/// Run one pass of `apparatus`'s sequence against `transport`, publishing
/// status through and writing records through `controller`.
///
/// Returns the apparatus back to the caller (loop iteration state, e.g.
/// which `Loop` is mid-sweep, lives on its steps) so a caller can inspect
/// it after an abort, or re-run it for another pass.
#[instrument(skip_all)]
pub async fn run(
    mut apparatus: Apparatus,
    transport: &dyn Transport,
    controller: &Controller,
) -> Result<Apparatus, SeqError> {
    let mut instruments = apparatus.active_instrument_map();
    for (name, inst) in instruments.iter_mut() {
        let handle = transport.open(&inst.address).await?;
        info!(instrument = %name, address = %inst.address, "bound transport handle");
        inst.bind_handle(handle);
    }

    let sink = FileRecordSink::new(controller.files());
    let ctx = ExecCtx {
        transport,
        instruments: &instruments,
        records: &sink,
        status: controller,
        abort: &controller.abort_flag,
    };

    apparatus.run_sequence(&ctx).await?;
    controller.files().join().await;
    Ok(apparatus)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::mock::StepRng;
    use seqlab_instruments::models::demo_source;
    use seqlab_steps::loop_values::Spacing;
    use seqlab_steps::{LoopEndStep, LoopSpec, LoopStep, StepCommon, Step, Termination, WaitSpec};
    use seqlab_transport::MockTransport;

    #[tokio::test]
    async fn run_executes_a_loop_and_drains_the_file_queue() {
        let transport = MockTransport::new();
        transport.add_instrument("A", "DEMO,SRC-1").await;

        let mut apparatus = Apparatus::new();
        apparatus.push_instrument(
            seqlab_instruments::Instrument::new("A", demo_source()).with_name("src"),
        );

        let mut rng = StepRng::new(0, 1);
        let loop_step = LoopStep::new(
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
        apparatus.push_step(Step::Loop(loop_step));
        apparatus.push_step(Step::LoopEnd(LoopEndStep {
            common: StepCommon::new("Sweep end"),
            loop_index: 0,
        }));

        let (controller, _writer) = Controller::new();
        let apparatus = run(apparatus, &transport, &controller).await.unwrap();
        if let Step::Loop(l) = &apparatus.steps()[0] {
            assert_eq!(l.iteration(), 0);
        }
    }
}
