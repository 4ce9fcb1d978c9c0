//! Integration tests for the vernier supervisor.
//!
//! `scenarios` drives several supervisors through an `AxisRegistry` with a
//! recording sink; `end_to_end` runs them against the controller worker and
//! the simulated bench.

mod integration;
