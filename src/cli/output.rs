//! Terminal output helpers.
//!
//! Handlers print through a [`Printer`] so `--quiet` is honored in one
//! place. Errors always print, to stderr.

use std::fmt::Display;

use owo_colors::OwoColorize;

/// Quiet-aware printer shared by all command handlers.
#[derive(Debug, Clone, Copy)]
pub struct Printer {
    quiet: bool,
}

impl Printer {
    #[must_use]
    pub const fn new(quiet: bool) -> Self {
        Self { quiet }
    }

    /// A completed action.
    pub fn success(&self, message: impl Display) {
        if !self.quiet {
            println!("{} {message}", "✓".green());
        }
    }

    /// An informational line.
    pub fn note(&self, message: impl Display) {
        if !self.quiet {
            println!("  {message}");
        }
    }

    /// A section heading.
    pub fn heading(&self, title: impl Display) {
        if !self.quiet {
            println!("\n{}", title.bold());
        }
    }

    /// A `key: value` line.
    pub fn field(&self, key: &str, value: impl Display) {
        if !self.quiet {
            println!("  {}: {value}", key.dimmed());
        }
    }

    /// Always printed, even under `--quiet`; meant for primary results
    /// (URLs, names) that scripts consume.
    pub fn result(&self, message: impl Display) {
        println!("{message}");
    }
}

/// Print a terminal error line to stderr.
pub fn failure(error: impl Display) {
    eprintln!("{} {error}", "✗".red());
}
