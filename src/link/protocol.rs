use std::time::Duration;

/// Framing rules of one line-oriented command protocol.
///
/// A response ends at the first of:
/// - a line equal to one of `ok_markers` (success, not included in the reply),
/// - a line starting with one of `error_markers` when there is no prompt,
/// - the `prompt` byte, for protocols that end every response with one.
///
/// With a prompt, error lines are collected and the exchange still waits
/// for the prompt, then fails as rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineProtocol {
    /// Appended to every command.
    pub terminator: &'static str,
    pub ok_markers: &'static [&'static str],
    pub error_markers: &'static [&'static str],
    pub prompt: Option<u8>,
    /// Trivial command used to confirm the device answers.
    pub probe_command: &'static str,
    pub probe_timeout: Duration,
}

impl LineProtocol {
    /// Hayes AT command set (cellular modems, GNSS modules).
    pub const AT: LineProtocol = LineProtocol {
        terminator: "\r",
        ok_markers: &["OK"],
        error_markers: &["ERROR", "+CME ERROR", "+CMS ERROR"],
        prompt: None,
        probe_command: "AT",
        probe_timeout: Duration::from_millis(1500),
    };

    /// ELM327 OBD-II adapters: responses end with a `>` prompt.
    pub const ELM327: LineProtocol = LineProtocol {
        terminator: "\r",
        ok_markers: &[],
        error_markers: &["?", "UNABLE TO CONNECT", "NO DATA", "CAN ERROR", "BUS ERROR", "STOPPED"],
        prompt: Some(b'>'),
        probe_command: "ATI",
        probe_timeout: Duration::from_secs(2),
    };

    pub(crate) fn is_ok(&self, line: &str) -> bool {
        self.ok_markers.iter().any(|m| line == *m)
    }

    pub(crate) fn is_error(&self, line: &str) -> bool {
        self.error_markers.iter().any(|m| line.starts_with(m))
    }
}
