//! User-facing console output.
//!
//! Results and status lines go to stdout with ANSI colors; diagnostics go
//! through `tracing` to stderr. A reporter can capture its output instead of
//! printing it, which the tests use.

use crate::probe::ProbeOutcome;
use std::io::Write;
use std::sync::{Arc, Mutex};

/// Line color
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    /// No color
    Plain,
    /// Green
    Success,
    /// Yellow
    Warn,
    /// Red
    Error,
    /// Magenta
    Magenta,
    /// Cyan
    Cyan,
    /// Blue
    Blue,
    /// Gray
    Gray,
}

impl Tone {
    /// Every color, for random picks
    pub const ALL: [Tone; 7] = [
        Tone::Success,
        Tone::Warn,
        Tone::Error,
        Tone::Magenta,
        Tone::Cyan,
        Tone::Blue,
        Tone::Gray,
    ];

    fn code(self) -> &'static str {
        match self {
            Tone::Plain => "\x1b[0m",
            Tone::Success => "\x1b[92m",
            Tone::Warn => "\x1b[93m",
            Tone::Error => "\x1b[91m",
            Tone::Magenta => "\x1b[95m",
            Tone::Cyan => "\x1b[96m",
            Tone::Blue => "\x1b[94m",
            Tone::Gray => "\x1b[90m",
        }
    }

    /// Color used for a probe outcome
    pub fn for_outcome(outcome: &ProbeOutcome) -> Self {
        match outcome {
            ProbeOutcome::Success(_) => Tone::Success,
            ProbeOutcome::Error(_) => Tone::Error,
            ProbeOutcome::Empty | ProbeOutcome::DryRun => Tone::Warn,
        }
    }
}

const RESET: &str = "\x1b[0m";

#[derive(Clone)]
enum Sink {
    Stdout,
    Captured(Arc<Mutex<Vec<u8>>>),
}

/// Console printer
#[derive(Clone)]
pub struct Reporter {
    color: bool,
    sink: Sink,
}

impl Reporter {
    /// Print to stdout
    pub fn stdout(color: bool) -> Self {
        Self {
            color,
            sink: Sink::Stdout,
        }
    }

    /// Keep output in memory, uncolored
    pub fn captured() -> Self {
        Self {
            color: false,
            sink: Sink::Captured(Arc::new(Mutex::new(Vec::new()))),
        }
    }

    /// Captured output so far (empty for stdout reporters)
    pub fn captured_text(&self) -> String {
        match &self.sink {
            Sink::Stdout => String::new(),
            Sink::Captured(buf) => {
                let buf = buf.lock().unwrap_or_else(|e| e.into_inner());
                String::from_utf8_lossy(&buf).into_owned()
            }
        }
    }

    fn emit(&self, text: &str) {
        match &self.sink {
            Sink::Stdout => {
                let mut out = std::io::stdout().lock();
                // A closed stdout must not abort a probing run
                let _ = out.write_all(text.as_bytes());
                let _ = out.flush();
            }
            Sink::Captured(buf) => buf
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .extend_from_slice(text.as_bytes()),
        }
    }

    /// Print one line in `tone`
    pub fn line(&self, tone: Tone, msg: impl AsRef<str>) {
        let msg = msg.as_ref();
        if self.color {
            self.emit(&format!("{}{}{}\n", tone.code(), msg, RESET));
        } else {
            self.emit(&format!("{}\n", msg));
        }
    }

    /// Print without a trailing newline
    pub fn prompt(&self, text: &str) {
        self.emit(text);
    }

    /// Uncolored line
    pub fn plain(&self, msg: impl AsRef<str>) {
        self.line(Tone::Plain, msg);
    }

    /// Green line
    pub fn success(&self, msg: impl AsRef<str>) {
        self.line(Tone::Success, msg);
    }

    /// Yellow line
    pub fn warn(&self, msg: impl AsRef<str>) {
        self.line(Tone::Warn, msg);
    }

    /// Red line
    pub fn error(&self, msg: impl AsRef<str>) {
        self.line(Tone::Error, msg);
    }

    /// `▶ [i/N] <cmd> → <outcome>`, colored by outcome
    pub fn progress(&self, index: usize, total: usize, cmd: &str, outcome: &ProbeOutcome) {
        self.line(
            Tone::for_outcome(outcome),
            format!("▶ [{}/{}] {:<40} → {}", index, total, cmd, outcome),
        );
    }
}

/// Usage guide printed when no subcommand is given
pub fn usage(reporter: &Reporter, dry_run: bool) {
    reporter.plain("💀 DOOM SCPI Toolkit - Usage Guide 💀");
    reporter.plain("====================================");
    for line in [
        "  🔍 doom list                            List all VISA resources",
        "  🧪 doom test      --ip <addr> | --usb   Run full SCPI test suite",
        "  🎯 doom group     <GROUP> --ip | --usb  Test SCPI commands by group (e.g., MATH1)",
        "  🧾 doom licenses  <ip>                  Query installed license keys",
        "  📉 doom waveform  <CH> --ip | --usb     Retrieve waveform data (e.g., CHAN1)",
        "  💣 doom fuzz      --ip <addr> | --usb   Fuzz scope with random SCPI queries",
        "  🧠 doom learn     --ip <addr> | --usb   Discover new SCPI commands via probing",
        "  🌳 doom smart-learn --depth <n> --ip | --usb  Branch from known command prefixes",
        "  🔦 doom focus --wordlist <file> [--prefix <P>] --ip | --usb  Sweep a wordlist",
        "  ✉️ doom send \"<SCPI>\" --ip | --usb    Send any SCPI command (quoted)",
        "  🐰 doom pinky                          Activate Gehirnwäsche mode (easter egg)",
    ] {
        reporter.plain(line);
    }
    reporter.plain("====================================");
    if dry_run {
        reporter.plain("🚫  NOTE: --dry-run mode is enabled, no SCPI commands will be sent!");
    }
    reporter.plain("🛠️  Example: doom test --ip 192.168.2.70");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_line_layout() {
        let reporter = Reporter::captured();
        reporter.progress(1, 3, ":CHAN1:SCAL?", &ProbeOutcome::Success("1.0".into()));
        assert_eq!(
            reporter.captured_text(),
            format!("▶ [1/3] {:<40} → ✅ 1.0\n", ":CHAN1:SCAL?")
        );
    }

    #[test]
    fn test_color_codes_wrap_line() {
        let reporter = Reporter {
            color: true,
            sink: Sink::Captured(Arc::new(Mutex::new(Vec::new()))),
        };
        reporter.error("boom");
        assert_eq!(reporter.captured_text(), "\x1b[91mboom\x1b[0m\n");
    }

    #[test]
    fn test_outcome_tones() {
        assert_eq!(Tone::for_outcome(&ProbeOutcome::Empty), Tone::Warn);
        assert_eq!(Tone::for_outcome(&ProbeOutcome::Error("x".into())), Tone::Error);
        assert_eq!(Tone::for_outcome(&ProbeOutcome::Success("x".into())), Tone::Success);
    }

    #[test]
    fn test_usage_mentions_dry_run() {
        let reporter = Reporter::captured();
        usage(&reporter, true);
        let text = reporter.captured_text();
        assert!(text.contains("doom test"));
        assert!(text.contains("--dry-run mode is enabled"));
    }
}
