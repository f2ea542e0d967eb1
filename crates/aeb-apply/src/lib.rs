//! Orchestrated apply flow.
//!
//! Drives one plan of edit operations through precheck, submission, and
//! verification over any [`aeb_protocol::CommandPort`], and leaves one
//! audit record per attempt. The flow never retries on its own.

pub mod flow;

pub use flow::{run_apply, ApplyError, ApplyOptions, ApplyReport, ApplyState};
