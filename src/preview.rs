//! Preview handles for loaded images.
//!
//! Each record gets one handle when it is created. A handle is a move-only
//! token: [`PreviewRegistry::release`] consumes it, so it cannot be released
//! twice. The registry counts what is still live so a leak shows up as a
//! non-zero [`PreviewRegistry::live`] once every record is gone.

use std::collections::HashSet;

/// Display-only reference to an image's preview. Not `Clone`.
#[derive(Debug, PartialEq, Eq)]
pub struct PreviewHandle {
    key: u64,
    url: String,
}

impl PreviewHandle {
    /// URL the front end displays the preview from.
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[derive(Debug, Default)]
pub struct PreviewRegistry {
    next_key: u64,
    live: HashSet<u64>,
}

impl PreviewRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a handle for the image called `name`.
    pub fn issue(&mut self, name: &str) -> PreviewHandle {
        self.next_key += 1;
        let key = self.next_key;
        self.live.insert(key);
        log::debug!("Preview {key} issued for {name}");
        PreviewHandle { key, url: format!("preview://{key}/{name}") }
    }

    /// Release a handle. Returns `false` (and warns) for a handle this
    /// registry did not issue.
    pub fn release(&mut self, handle: PreviewHandle) -> bool {
        if self.live.remove(&handle.key) {
            log::debug!("Preview {} released", handle.key);
            true
        } else {
            log::warn!("Release of unknown preview {}", handle.url);
            false
        }
    }

    /// Number of handles issued and not yet released.
    pub fn live(&self) -> usize {
        self.live.len()
    }
}
