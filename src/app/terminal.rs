//! Terminal detection and logging setup for the binary.

use std::io::IsTerminal;

use tracing_subscriber::EnvFilter;

/// What the attached terminal can show, captured once at startup.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TerminalPolicy {
    pub(crate) color: bool,
    pub(crate) progress: bool,
}

impl TerminalPolicy {
    /// Reads `NO_COLOR`, `TERM`, and whether stderr is a TTY.
    pub(crate) fn detect(no_color_flag: bool, quiet: bool) -> Self {
        let dumb = std::env::var("TERM").is_ok_and(|term| term.eq_ignore_ascii_case("dumb"));
        let no_color_env = std::env::var_os("NO_COLOR").is_some_and(|value| !value.is_empty());
        Self::from_parts(
            std::io::stderr().is_terminal(),
            dumb,
            no_color_flag || no_color_env,
            quiet,
        )
    }

    fn from_parts(stderr_tty: bool, dumb: bool, no_color: bool, quiet: bool) -> Self {
        let usable = stderr_tty && !dumb;
        Self {
            color: usable && !no_color,
            progress: usable && !quiet,
        }
    }
}

/// Filter used when `RUST_LOG` is unset.
pub(crate) fn default_level(quiet: bool, verbose: u8) -> &'static str {
    match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "info",
        (false, 1) => "debug",
        (false, _) => "trace",
    }
}

/// Logs go to stderr; stdout carries only the JSON envelope.
pub(crate) fn init_tracing(default_level: &str, policy: TerminalPolicy) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_ansi(policy.color)
        .with_env_filter(filter)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quiet_beats_verbose() {
        assert_eq!(default_level(true, 2), "error");
        assert_eq!(default_level(false, 0), "info");
        assert_eq!(default_level(false, 1), "debug");
        assert_eq!(default_level(false, 5), "trace");
    }

    #[test]
    fn test_policy_from_terminal_traits() {
        let tty = TerminalPolicy::from_parts(true, false, false, false);
        assert!(tty.color && tty.progress);

        let piped = TerminalPolicy::from_parts(false, false, false, false);
        assert!(!piped.color && !piped.progress);

        let dumb = TerminalPolicy::from_parts(true, true, false, false);
        assert!(!dumb.color && !dumb.progress);

        let quiet_no_color = TerminalPolicy::from_parts(true, false, true, true);
        assert!(!quiet_no_color.color);
        assert!(!quiet_no_color.progress);
    }
}
