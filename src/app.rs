//! Mode dispatch.
//!
//! [`App`] owns the configuration, the console and the interrupt flag, and
//! runs one mode per invocation. Instrument modes share the same shape:
//! connect, identify, probe, save, close.

use crate::adapters::{self, ScpiTransport};
use crate::catalog::{group_commands, read_lines, CommandCatalog, CommandTree, InstrumentIdentity};
use crate::cli::{Command, TargetArgs};
use crate::config::DoomConfig;
use crate::console::{self, Reporter};
use crate::error::{AppResult, DoomError};
use crate::interrupt::Interrupt;
use crate::licenses;
use crate::pinky::{self, Chatter};
use crate::probe::{focus_candidates, smart_pools, CandidateGenerator, ProbeRun, Prober};
use crate::shell::{self, ScpiShell};
use crate::storage::RunStore;
use crate::waveform;
use std::path::{Path, PathBuf};
use tokio::io::BufReader;
use tracing::{info, warn};

/// An open instrument connection and its identity
pub struct Session {
    transport: Box<dyn ScpiTransport>,
    identity: Option<InstrumentIdentity>,
}

impl Session {
    /// Wrap an open transport with a known identity
    pub fn new(transport: Box<dyn ScpiTransport>, identity: Option<InstrumentIdentity>) -> Self {
        Self {
            transport,
            identity,
        }
    }

    /// Ask the instrument for `*IDN?`. Failure to answer is a connection error.
    pub async fn identify(mut transport: Box<dyn ScpiTransport>) -> AppResult<Self> {
        let idn = transport
            .query("*IDN?")
            .await
            .map_err(|e| DoomError::Connection(format!("{:#}", e)))?;
        let idn = idn.trim();
        let identity = (!idn.is_empty()).then(|| InstrumentIdentity::new(idn));
        Ok(Self::new(transport, identity))
    }

    /// Identity reported at connect time
    pub fn identity(&self) -> Option<&InstrumentIdentity> {
        self.identity.as_ref()
    }

    /// Underlying transport
    pub fn transport(&mut self) -> &mut dyn ScpiTransport {
        self.transport.as_mut()
    }

    /// Close the connection; failures are only logged.
    pub async fn close(mut self) {
        if let Err(e) = self.transport.close().await {
            warn!(error = %format!("{:#}", e), "Closing instrument connection failed");
        }
    }
}

/// Per-invocation state
pub struct App {
    config: DoomConfig,
    reporter: Reporter,
    interrupt: Interrupt,
    dry_run: bool,
    csv: bool,
}

impl App {
    /// Application over a loaded configuration
    pub fn new(config: DoomConfig, reporter: Reporter, interrupt: Interrupt) -> Self {
        Self {
            config,
            reporter,
            interrupt,
            dry_run: false,
            csv: false,
        }
    }

    /// Report probes instead of sending them
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Also export run logs as CSV
    pub fn with_csv(mut self, csv: bool) -> Self {
        self.csv = csv;
        self
    }

    /// Console output sink
    pub fn reporter(&self) -> &Reporter {
        &self.reporter
    }

    fn catalog(&self) -> CommandCatalog {
        CommandCatalog::new(&self.config.files)
    }

    fn store(&self, session: &Session) -> RunStore {
        RunStore::new(&self.config.files, session.identity().cloned()).with_csv(self.csv)
    }

    fn prober<'a>(&'a self, session: &'a mut Session) -> Prober<'a> {
        Prober::new(session.transport(), &self.reporter, self.interrupt.clone())
            .with_skip_patterns(&self.config.probe.skip_patterns)
            .with_dry_run(self.dry_run)
    }

    /// Run one mode. `None` prints the usage guide.
    pub async fn run(&self, command: Option<Command>) -> AppResult<()> {
        let Some(command) = command else {
            console::usage(&self.reporter, self.dry_run);
            return Ok(());
        };

        match command {
            Command::List => self.list(),
            Command::Licenses { ip } => self.licenses(&ip).await,
            Command::Pinky { count } => {
                pinky::gehirnwaesche(&self.reporter, &self.interrupt, count).await;
                Ok(())
            }
            Command::Test { target } => {
                let mut session = self.connect(&target).await?;
                let result = self.test(&mut session).await.map(|_| ());
                session.close().await;
                result
            }
            Command::Group { group, target } => {
                let mut session = self.connect(&target).await?;
                let result = self.group(&mut session, &group).await.map(|_| ());
                session.close().await;
                result
            }
            Command::Waveform {
                channel,
                output,
                target,
            } => {
                let mut session = self.connect(&target).await?;
                let result = self.waveform(&mut session, &channel, output.as_deref()).await;
                session.close().await;
                result
            }
            Command::Fuzz {
                attempts,
                prefix,
                target,
            } => {
                let mut session = self.connect(&target).await?;
                let result = self
                    .fuzz(&mut session, attempts, prefix.as_deref())
                    .await
                    .map(|_| ());
                session.close().await;
                result
            }
            Command::Learn {
                attempts,
                prefix,
                target,
            } => {
                let mut session = self.connect(&target).await?;
                let result = self
                    .learn(&mut session, attempts, prefix.as_deref())
                    .await
                    .map(|_| ());
                session.close().await;
                result
            }
            Command::SmartLearn {
                attempts,
                depth,
                target,
            } => {
                let mut session = self.connect(&target).await?;
                let result = self
                    .smart_learn(&mut session, attempts, depth)
                    .await
                    .map(|_| ());
                session.close().await;
                result
            }
            Command::Focus {
                wordlist,
                prefix,
                target,
            } => {
                let mut session = self.connect(&target).await?;
                let result = self
                    .focus(&mut session, &wordlist, prefix.as_deref())
                    .await
                    .map(|_| ());
                session.close().await;
                result
            }
            Command::Send { scpi, target } => {
                let mut session = self.connect(&target).await?;
                let result = self.send(&mut session, &scpi.join(" ")).await;
                session.close().await;
                result
            }
        }
    }

    /// Resolve the target, open it and read its identity.
    pub async fn connect(&self, target: &TargetArgs) -> AppResult<Session> {
        let target = adapters::resolve_target(target.ip.as_deref(), target.usb)?;
        let transport = adapters::open(&target, &self.config.connection).await?;
        let session = Session::identify(transport).await?;
        match session.identity() {
            Some(id) => self.reporter.success(format!("✅ Connected: {}", id)),
            None => self.reporter.warn("✅ Connected (no *IDN? response)"),
        }
        if let Some(fields) = session.identity().and_then(InstrumentIdentity::fields) {
            info!(model = %fields.model, serial = %fields.serial, firmware = %fields.firmware, "Instrument identified");
        }
        Ok(session)
    }

    fn load_known(&self, session: &Session) -> AppResult<Vec<String>> {
        let known = self.catalog().load_all(session.identity())?;
        if let Some(path) = &known.learned_from {
            self.reporter.warn(format!(
                "➕ Included {} learned commands from {}",
                known.learned,
                path.display()
            ));
        }
        Ok(known.commands)
    }

    fn interrupted(&self, run: &ProbeRun, what: &str) {
        if run.interrupted {
            self.reporter
                .error(format!("\n🛑 {} interrupted by user (Ctrl+C)", what));
        }
    }

    fn save_log(&self, session: &Session, name: &str, run: &ProbeRun) -> AppResult<()> {
        let saved = self.store(session).save_log(name, &run.results)?;
        self.reporter
            .success(format!("💾 Saved log to {}", saved.log.display()));
        if let Some(csv) = saved.csv {
            self.reporter
                .success(format!("💾 Saved CSV to {}", csv.display()));
        }
        Ok(())
    }

    fn save_discoveries(&self, session: &Session, run: &ProbeRun) -> AppResult<()> {
        match self.store(session).save_discoveries(&run.discovered)? {
            Some(saved) => {
                self.reporter.success(format!(
                    "💾 Learned {} new commands → {}",
                    saved.count,
                    saved.run_file.display()
                ));
                self.reporter.warn(format!(
                    "📌 Updated latest discoveries → {}",
                    saved.latest_file.display()
                ));
            }
            None => self.reporter.warn("🤷 Nothing new discovered."),
        }
        Ok(())
    }

    /// `list`: print every VISA resource.
    pub fn list(&self) -> AppResult<()> {
        let resources = adapters::visa_adapter::list_resources()?;
        if resources.is_empty() {
            self.reporter.warn("🤷 No VISA resources found");
        }
        for resource in resources {
            self.reporter.plain(format!("🔌 {}", resource));
        }
        Ok(())
    }

    /// `licenses`: print the installed options.
    pub async fn licenses(&self, ip: &str) -> AppResult<()> {
        let options = licenses::fetch_options(ip, self.config.connection.license_timeout()).await?;
        if options.is_empty() {
            self.reporter.warn("🤷 No license options reported");
        }
        licenses::report(&self.reporter, &options);
        Ok(())
    }

    /// `test`: every known command once.
    pub async fn test(&self, session: &mut Session) -> AppResult<ProbeRun> {
        let commands = self.load_known(session)?;
        let run = self.prober(session).run_batch(&commands).await;
        self.interrupted(&run, "Test");
        self.save_log(session, "test_all", &run)?;
        Ok(run)
    }

    /// `group`: known commands below one namespace.
    pub async fn group(&self, session: &mut Session, group: &str) -> AppResult<ProbeRun> {
        let commands = group_commands(&self.load_known(session)?, group);
        if commands.is_empty() {
            self.reporter
                .error(format!("❌ No commands found for group '{}'", group));
            return Ok(ProbeRun::default());
        }
        let run = self.prober(session).run_batch(&commands).await;
        self.interrupted(&run, "Group test");
        self.save_log(session, &format!("group_{}", group), &run)?;
        Ok(run)
    }

    /// `waveform`: one block from `channel`, optionally exported to CSV.
    ///
    /// Read errors are reported and do not fail the run.
    pub async fn waveform(&self, session: &mut Session, channel: &str, output: Option<&Path>) -> AppResult<()> {
        if self.dry_run {
            self.reporter
                .warn(format!("💤 (dry-run) would read waveform from {}", channel));
            return Ok(());
        }

        let settle = self.config.connection.settle();
        let capture = match waveform::capture(session.transport(), channel, settle).await {
            Ok(capture) => capture,
            Err(e) => {
                self.reporter.error(format!("❌ {}", e));
                return Ok(());
            }
        };
        self.reporter.success(format!(
            "✅ Got {} bytes from {}",
            capture.data.len(),
            capture.channel
        ));

        if let Some(path) = output {
            capture.export_csv(path)?;
            self.reporter
                .success(format!("💾 Saved waveform to {}", path.display()));
        }
        Ok(())
    }

    /// `fuzz`: random queries from the fuzz pools.
    pub async fn fuzz(&self, session: &mut Session, attempts: Option<usize>, prefix: Option<&str>) -> AppResult<ProbeRun> {
        let probe = &self.config.probe;
        let mut generator =
            CandidateGenerator::from_entropy(probe.fuzz_roots.clone(), probe.fuzz_suffixes.clone())
                .with_prefix(prefix);
        let attempts = attempts.unwrap_or(probe.fuzz_attempts);

        let run = self.prober(session).fuzz(&mut generator, attempts).await;
        self.interrupted(&run, "FUZZ");
        self.save_log(session, "fuzz", &run)?;
        Ok(run)
    }

    /// `learn`: random discovery from the learn pools.
    pub async fn learn(&self, session: &mut Session, attempts: Option<usize>, prefix: Option<&str>) -> AppResult<ProbeRun> {
        let known = self.load_known(session)?;
        let probe = &self.config.probe;
        let mut generator =
            CandidateGenerator::from_entropy(probe.learn_roots.clone(), probe.learn_suffixes.clone())
                .with_prefix(prefix);
        let attempts = attempts.unwrap_or(probe.learn_attempts);

        let run = self
            .prober(session)
            .with_chatter(Chatter::new(probe.thinking_probability))
            .learn(&mut generator, attempts, &known)
            .await;
        self.interrupted(&run, "Learning");
        self.save_discoveries(session, &run)?;
        Ok(run)
    }

    /// `smart-learn`: discovery branching from prefixes already known.
    pub async fn smart_learn(
        &self,
        session: &mut Session,
        attempts: Option<usize>,
        depth: Option<usize>,
    ) -> AppResult<ProbeRun> {
        let known = self.load_known(session)?;
        let probe = &self.config.probe;
        let depth = depth.unwrap_or(probe.smart_depth).max(1);
        let tree = CommandTree::from_commands(&known);
        let (roots, suffixes) = smart_pools(&tree, depth, &probe.learn_suffixes);
        if roots.is_empty() {
            self.reporter
                .warn("🤷 No known command prefixes to branch from.");
            return Ok(ProbeRun::default());
        }
        self.reporter.warn(format!(
            "🌳 Branching from {} known prefixes with {} suffixes (depth {})",
            roots.len(),
            suffixes.len(),
            depth
        ));

        let mut generator = CandidateGenerator::from_entropy(roots, suffixes);
        let attempts = attempts.unwrap_or(probe.smart_attempts);
        let run = self
            .prober(session)
            .with_chatter(Chatter::new(probe.thinking_probability))
            .learn(&mut generator, attempts, &known)
            .await;
        self.interrupted(&run, "Smart learning");
        self.save_discoveries(session, &run)?;
        Ok(run)
    }

    /// `focus`: every wordlist entry below `prefix`, in order.
    pub async fn focus(&self, session: &mut Session, wordlist: &Path, prefix: Option<&str>) -> AppResult<ProbeRun> {
        let words = read_lines(wordlist)?
            .ok_or_else(|| DoomError::MissingWordlist(wordlist.to_path_buf()))?;
        let candidates = focus_candidates(&words, prefix);
        let known = self.load_known(session)?;

        let run = self
            .prober(session)
            .with_chatter(Chatter::new(self.config.probe.thinking_probability))
            .focus(&candidates, &known)
            .await;
        self.interrupted(&run, "Focus");

        let name = match prefix {
            Some(p) => format!("focus_{}", p.trim_matches(':')),
            None => "focus".to_string(),
        };
        self.save_log(session, &name, &run)?;
        self.save_discoveries(session, &run)?;
        Ok(run)
    }

    /// `send`: one command, or the interactive console when `cmd` is empty.
    pub async fn send(&self, session: &mut Session, cmd: &str) -> AppResult<()> {
        let cmd = cmd.trim();
        if !cmd.is_empty() {
            self.reporter
                .warn(format!("🚀 Sending SCPI command: {}", cmd));
            shell::send_command(session.transport(), &self.reporter, cmd, self.dry_run).await;
            return Ok(());
        }

        let shell = self.console_shell(session)?;
        let stdin = BufReader::new(tokio::io::stdin());
        shell
            .run(session.transport(), &self.reporter, &self.interrupt, stdin)
            .await
    }

    /// Console with completions from the known commands and the command
    /// database, and `info` from the index file.
    pub fn console_shell(&self, session: &Session) -> AppResult<ScpiShell> {
        let catalog = self.catalog();
        let mut commands = match self.load_known(session) {
            Ok(commands) => commands,
            Err(DoomError::MissingCommandList(path)) => {
                self.reporter.warn(format!(
                    "⚠️ {} not found, completion limited to the command database",
                    path.display()
                ));
                Vec::new()
            }
            Err(e) => return Err(e),
        };
        commands.extend(catalog.load_db()?);
        commands.sort();
        commands.dedup();
        self.reporter
            .line(console::Tone::Gray, format!("📚 Loaded {} SCPI commands for completion", commands.len()));

        Ok(ScpiShell::new(commands, catalog.load_index()?, self.dry_run))
    }
}

/// Resolve the configuration file: `--config` wins, then the default location.
pub fn config_path(explicit: Option<PathBuf>) -> PathBuf {
    explicit.unwrap_or_else(|| PathBuf::from(crate::config::DEFAULT_CONFIG_PATH))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MockAdapter;
    use std::fs;

    fn app_in(dir: &Path) -> App {
        let mut config = DoomConfig::default();
        config.files.command_list = dir.join("scpi_command_list.txt");
        config.files.command_db = dir.join("db.txt");
        config.files.index_file = dir.join("index.txt");
        config.files.output_dir = dir.to_path_buf();
        App::new(config, Reporter::captured(), Interrupt::new())
    }

    #[tokio::test]
    async fn test_identify_reads_idn() {
        let mock = MockAdapter::new().with_response("*IDN?", "RIGOL TECHNOLOGIES,MSO5074,DS5A1,00.01\n");
        let session = Session::identify(Box::new(mock)).await.unwrap();
        assert_eq!(
            session.identity().map(|i| i.as_str()),
            Some("RIGOL TECHNOLOGIES,MSO5074,DS5A1,00.01")
        );
    }

    #[tokio::test]
    async fn test_identify_failure_is_connection_error() {
        let mock = MockAdapter::new().with_failure("*IDN?", "timed out");
        let result = Session::identify(Box::new(mock)).await;
        assert!(matches!(result, Err(DoomError::Connection(_))));
    }

    #[tokio::test]
    async fn test_empty_group_reports_and_sends_nothing() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("scpi_command_list.txt"), ":CHAN1:SCAL?\n").unwrap();
        let app = app_in(dir.path());
        let mock = MockAdapter::new();
        let mut session = Session::new(Box::new(mock.clone()), None);

        let run = app.group(&mut session, "MATH1").await.unwrap();
        assert!(run.results.is_empty());
        assert!(mock.call_log().is_empty());
        assert!(app.reporter().captured_text().contains("No commands found for group 'MATH1'"));
    }

    #[tokio::test]
    async fn test_focus_missing_wordlist() {
        let dir = tempfile::tempdir().unwrap();
        let app = app_in(dir.path());
        let mut session = Session::new(Box::new(MockAdapter::new()), None);
        let result = app
            .focus(&mut session, &dir.path().join("words.txt"), None)
            .await;
        assert!(matches!(result, Err(DoomError::MissingWordlist(_))));
    }

    #[tokio::test]
    async fn test_waveform_dry_run_sends_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let app = app_in(dir.path()).with_dry_run(true);
        let mock = MockAdapter::new();
        let mut session = Session::new(Box::new(mock.clone()), None);
        app.waveform(&mut session, "CHAN1", None).await.unwrap();
        assert!(mock.call_log().is_empty());
    }

    #[test]
    fn test_console_shell_without_command_list() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("db.txt"), ":RUN\n:STOP\n").unwrap();
        let app = app_in(dir.path());
        let session = Session::new(Box::new(MockAdapter::new()), None);
        assert!(app.console_shell(&session).is_ok());
        assert!(app.reporter().captured_text().contains("Loaded 2 SCPI commands"));
    }

    #[test]
    fn test_config_path_default() {
        assert_eq!(config_path(None), PathBuf::from("config/doom.toml"));
    }
}
