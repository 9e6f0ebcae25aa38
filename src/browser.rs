//! Local browser launching.

use std::path::Path;
use std::process::{Command, Stdio};

use crate::error::Result;

/// Collaborator opening a URL in the operator's browser.
pub trait BrowserLauncher: Send + Sync {
    /// Open `url`, preferring `explicit` over the platform opener when set.
    fn open(&self, url: &str, explicit: Option<&Path>) -> Result<()>;
}

/// Launcher spawning the platform opener (or a configured browser command).
#[derive(Debug, Clone, Default)]
pub struct SystemBrowser;

impl SystemBrowser {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn platform_opener() -> &'static str {
        if cfg!(target_os = "macos") {
            "open"
        } else if cfg!(target_os = "windows") {
            "explorer"
        } else {
            "xdg-open"
        }
    }
}

impl BrowserLauncher for SystemBrowser {
    fn open(&self, url: &str, explicit: Option<&Path>) -> Result<()> {
        let program = explicit
            .map(|p| p.as_os_str().to_owned())
            .unwrap_or_else(|| Self::platform_opener().into());
        Command::new(program)
            .arg(url)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;
        Ok(())
    }
}
