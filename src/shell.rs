//! `send` mode: one-shot commands and the interactive SCPI console.
//!
//! Lines containing `?` are queried, anything else is written. A line ending
//! in a tab, or `complete <prefix>`, lists matching known commands instead of
//! sending anything; `info <KEY>` prints what the index file has for a key.

use crate::adapters::ScpiTransport;
use crate::catalog::IndexInfo;
use crate::console::{Reporter, Tone};
use crate::interrupt::Interrupt;
use crate::error::AppResult;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::debug;

/// Console prompt
pub const PROMPT: &str = "🧠 SCPI> ";

/// What one console line asks for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellAction {
    /// Blank line
    Nothing,
    /// `exit` / `quit`
    Exit,
    /// Send and read a response
    Query(String),
    /// Send without reading
    Write(String),
    /// List completions for a prefix
    Complete(String),
    /// Show index data for a key
    Info(String),
}

/// Interpret one raw input line.
pub fn parse_line(raw: &str) -> ShellAction {
    let raw = raw.trim_end_matches(['\r', '\n']);
    if raw.ends_with('\t') {
        return ShellAction::Complete(raw.trim().to_string());
    }

    let line = raw.trim();
    if line.is_empty() {
        return ShellAction::Nothing;
    }
    if line.eq_ignore_ascii_case("exit") || line.eq_ignore_ascii_case("quit") {
        return ShellAction::Exit;
    }
    if let Some(rest) = strip_keyword(line, "complete") {
        return ShellAction::Complete(rest.to_string());
    }
    if let Some(rest) = strip_keyword(line, "info") {
        return ShellAction::Info(rest.to_string());
    }
    if line.contains('?') {
        ShellAction::Query(line.to_string())
    } else {
        ShellAction::Write(line.to_string())
    }
}

fn strip_keyword<'a>(line: &'a str, keyword: &str) -> Option<&'a str> {
    let (head, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    if head.eq_ignore_ascii_case(keyword) {
        Some(rest.trim())
    } else {
        None
    }
}

/// Known commands starting with `prefix`, ignoring case. A missing leading
/// `:` is assumed; an empty prefix matches everything.
pub fn completions<'a>(commands: &'a [String], prefix: &str) -> Vec<&'a str> {
    let mut wanted = prefix.trim().to_uppercase();
    if !wanted.is_empty() && !wanted.starts_with(':') && !wanted.starts_with('*') {
        wanted.insert(0, ':');
    }
    commands
        .iter()
        .filter(|c| c.to_uppercase().starts_with(&wanted))
        .map(String::as_str)
        .collect()
}

/// Send a single command and print the result.
///
/// Failures are printed, not returned; the caller keeps going.
pub async fn send_command(transport: &mut dyn ScpiTransport, reporter: &Reporter, cmd: &str, dry_run: bool) {
    if dry_run {
        reporter.warn(format!("💤 (dry-run) {}", cmd));
        return;
    }

    let result = if cmd.contains('?') {
        transport.query(cmd).await.map(|r| {
            let r = r.trim();
            if r.is_empty() {
                reporter.warn("⚠️  Empty response");
            } else {
                reporter.success(format!("✅ Response: {}", r));
            }
        })
    } else {
        transport
            .write(cmd)
            .await
            .map(|()| reporter.success("✅ Command sent (no response expected)"))
    };

    if let Err(e) = result {
        reporter.error(format!("❌ SCPI Error: {:#}", e));
    }
}

/// Interactive console state
pub struct ScpiShell {
    commands: Vec<String>,
    index: IndexInfo,
    dry_run: bool,
}

impl ScpiShell {
    /// Console completing from `commands` and answering `info` from `index`
    pub fn new(commands: Vec<String>, index: IndexInfo, dry_run: bool) -> Self {
        Self {
            commands,
            index,
            dry_run,
        }
    }

    fn show_completions(&self, reporter: &Reporter, prefix: &str) {
        let matches = completions(&self.commands, prefix);
        if matches.is_empty() {
            reporter.warn(format!("🤷 No known commands start with '{}'", prefix));
            return;
        }
        reporter.line(Tone::Cyan, format!("💡 {} matches for '{}':", matches.len(), prefix));
        for m in matches {
            reporter.plain(format!(" → {}", m));
        }
    }

    fn show_info(&self, reporter: &Reporter, key: &str) {
        let entry = self
            .index
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key));
        match entry {
            Some((k, directions)) => {
                reporter.line(Tone::Cyan, format!("📖 {}", k));
                for (direction, values) in directions {
                    reporter.plain(format!("  {:<8} {}", direction, values.join(", ")));
                }
            }
            None => reporter.warn(format!("❓ No index entry for '{}'", key)),
        }
    }

    /// Read lines from `input` until `exit`, end of input or Ctrl+C.
    pub async fn run<R>(
        &self,
        transport: &mut dyn ScpiTransport,
        reporter: &Reporter,
        interrupt: &Interrupt,
        input: R,
    ) -> AppResult<()>
    where
        R: AsyncBufRead + Unpin,
    {
        debug!(known = self.commands.len(), "Console completion set loaded");
        reporter.warn("💡 Enter SCPI commands interactively (end a line with TAB or use 'complete <prefix>' to list commands)");

        let mut lines = input.lines();
        loop {
            reporter.prompt(PROMPT);
            let line = tokio::select! {
                biased;
                _ = interrupt.triggered() => {
                    reporter.error("\n🛑 Aborted.");
                    break;
                }
                line = lines.next_line() => line?,
            };
            let Some(line) = line else {
                reporter.plain("");
                break;
            };

            match parse_line(&line) {
                ShellAction::Nothing => {}
                ShellAction::Exit => {
                    reporter.warn("👋 Exiting SCPI console.");
                    break;
                }
                ShellAction::Complete(prefix) => self.show_completions(reporter, &prefix),
                ShellAction::Info(key) => self.show_info(reporter, &key),
                ShellAction::Query(cmd) | ShellAction::Write(cmd) => {
                    send_command(transport, reporter, &cmd, self.dry_run).await;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MockAdapter;
    use crate::catalog::parse_index;

    fn known() -> Vec<String> {
        [":CHANnel1:SCALe?", ":CHANnel1:OFFSet?", ":CHANnel2:SCALe?", "*IDN?"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    #[test]
    fn test_parse_line() {
        assert_eq!(parse_line("  "), ShellAction::Nothing);
        assert_eq!(parse_line("QUIT"), ShellAction::Exit);
        assert_eq!(parse_line(":CHAN1:SCAL?"), ShellAction::Query(":CHAN1:SCAL?".into()));
        assert_eq!(parse_line(":RUN"), ShellAction::Write(":RUN".into()));
        assert_eq!(parse_line("chan\t"), ShellAction::Complete("chan".into()));
        assert_eq!(parse_line("complete :CHAN"), ShellAction::Complete(":CHAN".into()));
        assert_eq!(parse_line("info :TIMebase:MODE"), ShellAction::Info(":TIMebase:MODE".into()));
    }

    #[test]
    fn test_completions_ignore_case_and_colon() {
        let cmds = known();
        assert_eq!(
            completions(&cmds, "channel1"),
            vec![":CHANnel1:SCALe?", ":CHANnel1:OFFSet?"]
        );
        assert_eq!(completions(&cmds, ":CHANNEL2").len(), 1);
        assert_eq!(completions(&cmds, "*idn"), vec!["*IDN?"]);
        assert_eq!(completions(&cmds, "").len(), 4);
    }

    #[tokio::test]
    async fn test_send_command_routes_by_question_mark() {
        let mock = MockAdapter::new().with_response(":CHAN1:SCAL?", "1.0");
        let mut transport = mock.clone();
        let reporter = Reporter::captured();

        send_command(&mut transport, &reporter, ":CHAN1:SCAL?", false).await;
        send_command(&mut transport, &reporter, ":RUN", false).await;

        assert_eq!(mock.call_log(), vec!["query: :CHAN1:SCAL?", "write: :RUN"]);
        let text = reporter.captured_text();
        assert!(text.contains("✅ Response: 1.0"));
        assert!(text.contains("✅ Command sent (no response expected)"));
    }

    #[tokio::test]
    async fn test_console_session() {
        let mock = MockAdapter::new()
            .with_response(":CHAN1:SCAL?", "1.0")
            .with_failure(":BAD?", "-113,\"Undefined header\"");
        let mut transport = mock.clone();
        let reporter = Reporter::captured();
        let index = parse_index(":TIMebase:MODE\t1\tSET\tMAIN\tXY\n");
        let shell = ScpiShell::new(known(), index, false);

        let input: &[u8] = b":CHAN1:SCAL?\n:BAD?\nchannel2\t\ninfo :timebase:mode\n:STOP\nexit\n:NEVER?\n";
        shell
            .run(&mut transport, &reporter, &Interrupt::new(), input)
            .await
            .unwrap();

        assert_eq!(
            mock.call_log(),
            vec!["query: :CHAN1:SCAL?", "query: :BAD?", "write: :STOP"]
        );
        let text = reporter.captured_text();
        assert!(text.contains("❌ SCPI Error: -113"));
        assert!(text.contains(" → :CHANnel2:SCALe?"));
        assert!(text.contains("SET      MAIN, XY"));
        assert!(text.contains("👋 Exiting SCPI console."));
    }

    #[tokio::test]
    async fn test_console_stops_on_interrupt() {
        let mut transport = MockAdapter::new();
        let reporter = Reporter::captured();
        let interrupt = Interrupt::new();
        interrupt.trigger();
        let shell = ScpiShell::new(Vec::new(), IndexInfo::new(), false);

        let input: &[u8] = b":RUN\n";
        shell.run(&mut transport, &reporter, &interrupt, input).await.unwrap();
        assert!(reporter.captured_text().contains("🛑 Aborted."));
    }
}
