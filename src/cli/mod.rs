//! CLI module graph.

pub mod command;
pub mod handler;
pub mod output;
pub mod paths;
