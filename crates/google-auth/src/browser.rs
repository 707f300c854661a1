//! Launching the user's browser

use reqwest::Url;

/// Opens a URL for the user. Must not block until the browser exits.
pub trait Browser: Send + Sync {
    fn open(&self, url: &Url) -> std::io::Result<()>;
}

/// The platform default browser, spawned detached.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemBrowser;

impl Browser for SystemBrowser {
    fn open(&self, url: &Url) -> std::io::Result<()> {
        open::that_detached(url.as_str())
    }
}
