//! Rig initialization procedures
//!
//! - `fast`: one bounded attempt per device and a single pass/fail flag
//! - `guided`: interactive walk through every device category with retries

pub mod checks;
pub mod fast;
pub mod guided;
pub mod retry_loop;

pub use checks::RigChecks;
pub use fast::{fast_initialization, rig_fast_checks};
pub use guided::{full_initialization, GuidedReport};
