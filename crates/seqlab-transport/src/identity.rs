//! Identity probe text selection (spec §4.1: `*IDN?` vs. legacy `ID`).

use crate::LEGACY_ID_THRESHOLD;

/// Extract the trailing GPIB primary address from an address string like
/// `GPIB0::12::INSTR`, if any.
fn trailing_gpib_number(address: &str) -> Option<u32> {
    address
        .split("::")
        .nth(1)
        .and_then(|s| s.parse::<u32>().ok())
}

/// The identity probe text to send for a given address: addresses numbered
/// above [`LEGACY_ID_THRESHOLD`] receive `ID`, others receive `*IDN?`.
pub fn identity_probe(address: &str) -> &'static str {
    match trailing_gpib_number(address) {
        Some(n) if n > LEGACY_ID_THRESHOLD => "ID",
        _ => "*IDN?",
    }
}
