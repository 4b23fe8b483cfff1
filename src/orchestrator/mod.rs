//! Application-level orchestration utilities.
//!
//! This module owns the run lifecycle of a demo surface (submit, poll, cancel) and the post-run
//! processing that turns a terminal run into a display-ready result. CLI layers call into this
//! module and only ever see `RunEvent`s.

mod controller;
mod post_process;

pub(crate) use controller::{run_controller, Surface, SurfaceCommand};
