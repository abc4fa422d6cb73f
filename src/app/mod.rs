//! Binary-side plumbing: terminal handling and progress display.

pub(crate) mod progress;
pub(crate) mod terminal;
