//! C4 Step Model (spec §4.4): the five sequence step variants, their
//! edit-time and run-time contracts, loop/end pairing, and schedule-produced
//! value sequences.
//!
//! Grounded on `daq-experiment/src/plans.rs`'s `Plan`/`PlanCommand` shape: a
//! plan there is a generator a `RunEngine` polls for the next command. Here
//! a `Step` *is* one command (spec §9 redesign flag: tagged sum with an
//! explicit `kind`, not dynamic dispatch by class name), and
//! `Apparatus::run_sequence` (in `seqlab-apparatus`) plays the role the
//! teacher's `RunEngine` does: drive a position pointer through the
//! sequence, calling `execute` on whichever step it lands on.

pub mod context;
pub mod loop_values;
pub mod stability;
pub mod step;
pub mod termination;

pub use context::ExecCtx;
pub use step::{
    CMeasStep, LoopEndStep, LoopSpec, LoopStep, MeasureTarget, SMeasStep, SetStep, SetTarget,
    Step, StepCommon, WaitStep,
};
pub use termination::{Termination, WaitSpec};
