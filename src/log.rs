//! Nested, timed log sections. Each [`Section`] enters a [`tracing`] span for
//! as long as it lives, so messages logged inside it are attributed to the
//! section (and its ancestors) by the subscriber rather than by a global
//! indentation counter.

use std::time::Instant;
use tracing::span::EnteredSpan;
use tracing::{info, info_span};

/// A guard for a named section of work. Logs `{name} ...` on creation and
/// `... done! [{elapsed}s]` when dropped.
pub struct Section {
    start: Instant,
    _span: EnteredSpan,
}

impl Section {
    pub fn new(name: &str) -> Section {
        info!("{} ...", name);
        Section {
            start: Instant::now(),
            _span: info_span!("section", section = name).entered(),
        }
    }

    /// Seconds since the section started.
    pub fn elapsed(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

impl Drop for Section {
    fn drop(&mut self) {
        // `_span` is still entered here; fields drop after this body
        info!("... done! [{:.2}s]", self.elapsed());
    }
}
