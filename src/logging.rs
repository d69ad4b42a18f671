//! Structured tracing setup.
//!
//! Kept as an explicit opt-in behind the `networkit-tracing` feature: a
//! library shouldn't install a global subscriber on behalf of its host
//! application, only offer one for binaries/tests that want it.

#![cfg(feature = "networkit-tracing")]

use tracing::level_filters::LevelFilter;
use tracing_subscriber::{fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt, Layer};

/// Installs a formatted `tracing` subscriber with file/line/level info and
/// span-close events. Intended for examples, tests, and host applications
/// that have not already installed their own subscriber.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_span_events(FmtSpan::CLOSE)
                .with_file(true)
                .with_line_number(true)
                .with_level(true)
                .with_filter(LevelFilter::DEBUG),
        )
        .init();
}
