//! Job scripts.
//!
//! This module provides:
//! - A structured command model with explicit shell quoting
//! - Rendering of a stage plus its resources into a batch script

mod command;
mod render;

pub use command::{quote, CommandScript, ScriptStep, ShellCommand};
pub use render::{render, render_text, script_stem, ScriptHandle, ScriptProfile};
