//! Run logs and learned-command files.
//!
//! Batch runs end with a text log named after the mode and the local time.
//! Discovery runs write the commands they found, once per run and merged into
//! a per-instrument "latest" file that later runs read back.

use crate::catalog::{read_lines, InstrumentIdentity};
use crate::config::FilesConfig;
use crate::error::{AppResult, DoomError};
use crate::probe::ProbeRecord;
use anyhow::Context;
use std::collections::BTreeSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

/// `strftime` format used in every generated file name
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Current local time in [`TIMESTAMP_FORMAT`]
pub fn timestamp() -> String {
    chrono::Local::now().format(TIMESTAMP_FORMAT).to_string()
}

/// Replace anything other than alphanumerics, `-` and `_` with `_`
pub fn sanitize(name: &str) -> String {
    name.trim()
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

/// Merged discoveries for `identity`, read back by later runs
pub fn learned_latest_path(dir: &Path, identity: Option<&InstrumentIdentity>) -> PathBuf {
    match identity {
        Some(id) => dir.join(format!("learned_scpi_latest_{}.txt", id.tag())),
        None => dir.join("learned_scpi_commands_latest.txt"),
    }
}

/// Discoveries of a single run
pub fn learned_run_path(dir: &Path, identity: Option<&InstrumentIdentity>, ts: &str) -> PathBuf {
    match identity {
        Some(id) => dir.join(format!("learned_scpi_{}_{}.txt", id.tag(), ts)),
        None => dir.join(format!("learned_scpi_commands_{}.txt", ts)),
    }
}

/// Files written for one run log
#[derive(Debug, Clone)]
pub struct SavedLog {
    /// Text log
    pub log: PathBuf,
    /// CSV export, when enabled
    pub csv: Option<PathBuf>,
}

/// Files written for one run's discoveries
#[derive(Debug, Clone)]
pub struct SavedDiscoveries {
    /// This run's discoveries
    pub run_file: PathBuf,
    /// Merged latest file
    pub latest_file: PathBuf,
    /// Commands written to `run_file`
    pub count: usize,
}

/// Writes run output under the configured output directory
#[derive(Debug, Clone)]
pub struct RunStore {
    output_dir: PathBuf,
    write_csv: bool,
    identity: Option<InstrumentIdentity>,
}

impl RunStore {
    /// Store for the configured files, optionally tagged with the instrument identity
    pub fn new(files: &FilesConfig, identity: Option<InstrumentIdentity>) -> Self {
        Self {
            output_dir: files.output_dir.clone(),
            write_csv: files.write_csv,
            identity,
        }
    }

    /// Also write a CSV export next to each log
    pub fn with_csv(mut self, enabled: bool) -> Self {
        self.write_csv = self.write_csv || enabled;
        self
    }

    fn ensure_dir(&self) -> AppResult<()> {
        fs::create_dir_all(&self.output_dir)
            .with_context(|| format!("Failed to create output directory at {:?}", self.output_dir))
            .map_err(DoomError::Storage)
    }

    /// Write `doom_log_<name>_<ts>.txt`, one `<cmd> → <outcome>` line per record.
    pub fn save_log(&self, name: &str, records: &[ProbeRecord]) -> AppResult<SavedLog> {
        self.ensure_dir()?;
        let stem = format!("doom_log_{}_{}", sanitize(name), timestamp());
        let path = self.output_dir.join(format!("{}.txt", stem));

        let mut text = String::new();
        if let Some(id) = &self.identity {
            text.push_str(&format!("# Scope IDN: {}\n", id));
        }
        for record in records {
            let (cmd, outcome) = record.rendered();
            text.push_str(&format!("{:<40} → {}\n", cmd, outcome));
        }
        fs::write(&path, text)
            .with_context(|| format!("Failed to write log at {:?}", path))
            .map_err(DoomError::Storage)?;
        info!(path = %path.display(), entries = records.len(), "Run log saved");

        let csv = if self.write_csv {
            let csv_path = self.output_dir.join(format!("{}.csv", stem));
            let rows = records.iter().map(|r| {
                vec![
                    r.command.clone(),
                    r.outcome.status().to_string(),
                    r.outcome.detail().to_string(),
                ]
            });
            write_csv(&csv_path, &["command", "status", "response"], rows)?;
            Some(csv_path)
        } else {
            None
        };

        Ok(SavedLog { log: path, csv })
    }

    /// Write this run's discoveries and merge them into the latest file.
    ///
    /// Returns `None` without touching the disk when nothing was discovered.
    pub fn save_discoveries(&self, discovered: &[ProbeRecord]) -> AppResult<Option<SavedDiscoveries>> {
        let commands: BTreeSet<String> = discovered.iter().map(|r| r.command.clone()).collect();
        if commands.is_empty() {
            return Ok(None);
        }
        self.ensure_dir()?;

        let run_file = learned_run_path(&self.output_dir, self.identity.as_ref(), &timestamp());
        write_lines(&run_file, &commands).map_err(DoomError::Storage)?;

        let latest_file = learned_latest_path(&self.output_dir, self.identity.as_ref());
        let mut merged: BTreeSet<String> = read_lines(&latest_file)?.unwrap_or_default().into_iter().collect();
        merged.extend(commands.iter().cloned());
        write_lines(&latest_file, &merged).map_err(DoomError::Storage)?;

        info!(
            run_file = %run_file.display(),
            latest = merged.len(),
            "Discoveries saved"
        );
        Ok(Some(SavedDiscoveries {
            run_file,
            latest_file,
            count: commands.len(),
        }))
    }
}

fn write_lines(path: &Path, lines: &BTreeSet<String>) -> anyhow::Result<()> {
    let mut file = fs::File::create(path).with_context(|| format!("Failed to create {:?}", path))?;
    for line in lines {
        writeln!(file, "{}", line).with_context(|| format!("Failed to write {:?}", path))?;
    }
    Ok(())
}

/// Write a CSV file with a header row.
#[cfg(feature = "storage_csv")]
pub fn write_csv<I>(path: &Path, header: &[&str], rows: I) -> AppResult<()>
where
    I: IntoIterator<Item = Vec<String>>,
{
    let inner = || -> anyhow::Result<()> {
        let mut writer = csv::Writer::from_path(path)
            .with_context(|| format!("Failed to create CSV file at {:?}", path))?;
        writer.write_record(header).context("Failed to write CSV header")?;
        for row in rows {
            writer.write_record(&row).context("Failed to write CSV row")?;
        }
        writer.flush().context("Failed to flush CSV writer")?;
        Ok(())
    };
    inner().map_err(DoomError::Storage)
}

/// Write a CSV file with a header row.
#[cfg(not(feature = "storage_csv"))]
pub fn write_csv<I>(_path: &Path, _header: &[&str], _rows: I) -> AppResult<()>
where
    I: IntoIterator<Item = Vec<String>>,
{
    Err(DoomError::FeatureNotEnabled("storage_csv".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::ProbeOutcome;

    fn files_in(dir: &Path) -> FilesConfig {
        FilesConfig {
            output_dir: dir.to_path_buf(),
            ..FilesConfig::default()
        }
    }

    fn learned(cmds: &[&str]) -> Vec<ProbeRecord> {
        cmds.iter()
            .map(|c| ProbeRecord::new(*c, ProbeOutcome::Success("1".into())))
            .collect()
    }

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize("group_:MATH1"), "group__MATH1");
        assert_eq!(sanitize("smart-learn"), "smart-learn");
    }

    #[test]
    fn test_latest_path_without_identity() {
        let path = learned_latest_path(Path::new("out"), None);
        assert_eq!(path, Path::new("out").join("learned_scpi_commands_latest.txt"));
    }

    #[test]
    fn test_save_log_writes_header_and_lines() {
        let dir = tempfile::tempdir().unwrap();
        let id = InstrumentIdentity::new("RIGOL TECHNOLOGIES,MSO5074,DS5A1,00.01");
        let store = RunStore::new(&files_in(dir.path()), Some(id));
        let records = vec![ProbeRecord::new(":CHAN1:SCAL?", ProbeOutcome::Success("1.0".into()))];

        let saved = store.save_log("test", &records).unwrap();
        let name = saved.log.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("doom_log_test_") && name.ends_with(".txt"));
        assert!(saved.csv.is_none());

        let text = fs::read_to_string(&saved.log).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "# Scope IDN: RIGOL TECHNOLOGIES,MSO5074,DS5A1,00.01");
        assert_eq!(lines[1], format!("{:<40} → ✅ 1.0", ":CHAN1:SCAL?"));
    }

    #[cfg(feature = "storage_csv")]
    #[test]
    fn test_save_log_csv_export() {
        let dir = tempfile::tempdir().unwrap();
        let store = RunStore::new(&files_in(dir.path()), None).with_csv(true);
        let records = vec![
            ProbeRecord::new(":CHAN1:SCAL?", ProbeOutcome::Success("1.0".into())),
            ProbeRecord::new(":SYS:ERR?", ProbeOutcome::Error("timeout".into())),
        ];

        let saved = store.save_log("test", &records).unwrap();
        let csv = fs::read_to_string(saved.csv.unwrap()).unwrap();
        assert_eq!(
            csv,
            "command,status,response\n:CHAN1:SCAL?,success,1.0\n:SYS:ERR?,error,timeout\n"
        );
    }

    #[test]
    fn test_nothing_discovered_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = RunStore::new(&files_in(dir.path()), None);
        assert!(store.save_discoveries(&[]).unwrap().is_none());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_latest_is_union() {
        let dir = tempfile::tempdir().unwrap();
        let id = InstrumentIdentity::new("RIGOL TECHNOLOGIES,MSO5074,DS5A1,00.01");
        let store = RunStore::new(&files_in(dir.path()), Some(id.clone()));
        let latest = learned_latest_path(dir.path(), Some(&id));
        fs::write(&latest, ":BUS1:MODE?\n:TIM:SCAL?\n").unwrap();

        let saved = store
            .save_discoveries(&learned(&[":CHAN1:OFFS?", ":BUS1:MODE?", ":CHAN1:OFFS?"]))
            .unwrap()
            .unwrap();

        assert_eq!(saved.count, 2);
        assert_eq!(saved.latest_file, latest);
        assert_eq!(
            fs::read_to_string(&latest).unwrap(),
            ":BUS1:MODE?\n:CHAN1:OFFS?\n:TIM:SCAL?\n"
        );
        assert_eq!(
            fs::read_to_string(&saved.run_file).unwrap(),
            ":BUS1:MODE?\n:CHAN1:OFFS?\n"
        );
        let run_name = saved.run_file.file_name().unwrap().to_string_lossy().into_owned();
        assert!(run_name.starts_with(&format!("learned_scpi_{}_", id.tag())));
    }
}
