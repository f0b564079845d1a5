//! NeoRide CLI library.
//!
//! Connectivity checks used by the `neoride-cli` binary: a direct database
//! probe and a deployment verifier, plus terminal styling for their reports.

pub mod db_check;
pub mod terminal;
pub mod verify;
