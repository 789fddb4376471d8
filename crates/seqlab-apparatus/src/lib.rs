//! C3 Apparatus (spec §4.3): the bound-instrument bank plus the editable
//! step sequence, its loop/nesting repair, its textual snapshot format, and
//! the run-loop state machine that drives steps in order.
//!
//! Grounded on `daq-hardware/src/registry.rs`'s "one struct owns the bound
//! devices" shape; the step sequence and its `protectLoops` repair have no
//! analogue in the teacher workspace (plans there are generators, not an
//! editable list) and are built from spec §4.3 directly.

pub mod apparatus;
pub mod serialize;

pub use apparatus::Apparatus;
