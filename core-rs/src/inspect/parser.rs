/**
 * parser.rs
 * Primary debug port detection from process start flags
 *
 * Recognized forms, first match wins:
 * - --inspect-port=9229
 * - --inspect=9229, --inspect=:9229 (and the -brk variants)
 * - --inspect=0.0.0.0:9229, --inspect-brk=127.0.0.1:9229
 *
 * Anything else resolves to the conventional inspector default, 9229.
 */

use once_cell::sync::Lazy;
use regex::Regex;

/// Default inspector port when no flag configures one
pub const DEFAULT_INSPECT_PORT: u16 = 9229;

static INSPECT_PORT_FLAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"--inspect-port=(?P<port>\d+)").expect("static regex")
});

static INSPECT_BARE_PORT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"--inspect(?:-brk)?=:?(?P<port>\d{1,5})(?:\s|$)").expect("static regex")
});

static INSPECT_HOST_PORT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"--inspect(?:-brk)?=(?P<host>.*?):(?P<port>\d{1,5})").expect("static regex")
});

/// Resolve the debug port of the primary process
///
/// # Arguments
/// * `args` - Start flags joined with single spaces
///
/// # Returns
/// The configured port, or [`DEFAULT_INSPECT_PORT`] when no form matches.
/// A matched number outside 1..=65535 does not count as a match.
///
/// # Example
/// ```
/// use cluster_debug::inspect::resolve_primary_debug_port;
///
/// assert_eq!(resolve_primary_debug_port("--inspect-brk=127.0.0.1:9113"), 9113);
/// assert_eq!(resolve_primary_debug_port("--trace-warnings"), 9229);
/// ```
pub fn resolve_primary_debug_port(args: &str) -> u16 {
    [&*INSPECT_PORT_FLAG, &*INSPECT_BARE_PORT, &*INSPECT_HOST_PORT]
        .iter()
        .find_map(|re| {
            re.captures(args)
                .and_then(|caps| caps.name("port"))
                .and_then(|m| parse_port(m.as_str()))
        })
        .unwrap_or(DEFAULT_INSPECT_PORT)
}

/// Join start arguments the way the parser expects them
pub fn join_args<S: AsRef<str>>(args: &[S]) -> String {
    args.iter()
        .map(|a| a.as_ref())
        .collect::<Vec<_>>()
        .join(" ")
}

fn parse_port(digits: &str) -> Option<u16> {
    digits.parse::<u16>().ok().filter(|&port| port != 0)
}
