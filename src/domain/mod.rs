// Domain layer: order records, sequence state machine, vehicle eligibility and ports (interfaces).
// No I/O happens here.

pub mod eligibility;
pub mod model;
pub mod object;
pub mod ports;
pub mod sequence;
