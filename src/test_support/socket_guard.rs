//! Skips wiremock-backed tests in sandboxes that forbid binding localhost.

use std::net::TcpListener;
use std::panic::Location;

use wiremock::MockServer;

const REQUIRE_SOCKET_TESTS: &str = "LITGATE_REQUIRE_SOCKET_TESTS";

fn socket_tests_required() -> bool {
    std::env::var(REQUIRE_SOCKET_TESTS)
        .ok()
        .is_some_and(|value| matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
}

#[track_caller]
fn should_skip_socket_bound_test() -> bool {
    if TcpListener::bind("127.0.0.1:0").is_ok() {
        return false;
    }
    let location = Location::caller();
    let message = format!(
        "[socket-bound-test] {}:{} cannot bind a localhost socket",
        location.file(),
        location.line()
    );
    assert!(
        !socket_tests_required(),
        "{message}; unset {REQUIRE_SOCKET_TESTS} to allow skipping"
    );
    eprintln!("{message}; skipping");
    true
}

/// Starts a mock server, or returns `None` when sockets are unavailable.
pub async fn start_mock_server_or_skip() -> Option<MockServer> {
    if should_skip_socket_bound_test() {
        None
    } else {
        Some(MockServer::start().await)
    }
}
