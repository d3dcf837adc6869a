//! CLI subcommand implementations.

pub mod history;
pub mod insights;
pub mod overrides;
pub mod patterns;
pub mod process;
pub mod rules;
pub mod status;
pub mod submit;
pub mod suggest;
pub mod util;
