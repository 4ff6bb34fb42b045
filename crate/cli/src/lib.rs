pub use commands::{Cli, ksema_main};

pub mod actions;
mod commands;
pub mod error;
