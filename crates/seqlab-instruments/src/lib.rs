//! C2 Instrument & Parameter Model (spec §4.2).
//!
//! A [`Parameter`] is a declarative descriptor attached to an
//! [`InstrumentModel`]'s static table (spec §9 redesign flag: parameter
//! tables lifted to `const`/static data, not built imperatively in a
//! constructor). An [`Instrument`] binds an apparatus-local name to a
//! transport address and one such model; reads and writes go through the
//! coercion algorithms in this crate so wire-format variation across models
//! never leaks past this layer.

pub mod instrument;
pub mod models;
pub mod parameter;
pub mod registry;

pub use instrument::Instrument;
pub use parameter::{Parameter, ParameterKind, ParameterValue};
pub use registry::{InstrumentModel, ModelRegistry};
