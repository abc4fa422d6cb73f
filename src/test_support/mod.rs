//! Helpers shared by unit tests.

pub(crate) mod download_fakes;
pub mod socket_guard;
