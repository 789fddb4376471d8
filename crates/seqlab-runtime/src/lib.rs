//! C5 Runtime (spec §4.5): the three cooperating participants — executor,
//! file writer, observer — that turn a loaded `Apparatus` into a running
//! sequence.
//!
//! The file writer itself lives in `seqlab-storage` (it has no dependency
//! on the instrument/transport stack); this crate wires it together with
//! the executor and the shared controller state, grounded on
//! `daq-experiment/src/run_engine.rs`'s top-level module layout (one
//! `RunEngine` type coordinating a plan executor, a document writer task,
//! and a broadcast observer channel).

pub mod controller;
pub mod executor;
pub mod sinks;
pub mod snapshot;

pub use controller::Controller;
