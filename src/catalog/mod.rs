//! Known-command sources
//!
//! Loads the static command list, the learned commands saved by earlier
//! discovery runs for the same instrument, the optional command database and
//! the optional tab-delimited index file.

pub mod identity;
pub mod tree;

pub use identity::{IdentityFields, InstrumentIdentity};
pub use tree::CommandTree;

use crate::config::FilesConfig;
use crate::error::{AppResult, DoomError};
use crate::storage;
use std::collections::{BTreeMap, BTreeSet};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

/// `key -> direction -> values` from the index file
pub type IndexInfo = BTreeMap<String, BTreeMap<String, Vec<String>>>;

/// Merged known-command set
#[derive(Debug, Clone, Default)]
pub struct KnownCommands {
    /// Sorted, de-duplicated commands
    pub commands: Vec<String>,
    /// Number of commands read from the learned file
    pub learned: usize,
    /// Learned file that was merged, if it existed
    pub learned_from: Option<PathBuf>,
}

/// File-backed command catalog
#[derive(Debug, Clone)]
pub struct CommandCatalog {
    command_list: PathBuf,
    command_db: PathBuf,
    index_file: PathBuf,
    output_dir: PathBuf,
}

/// Non-empty trimmed lines of a file; `Ok(None)` when it does not exist.
pub fn read_lines(path: &Path) -> std::io::Result<Option<Vec<String>>> {
    match std::fs::read_to_string(path) {
        Ok(text) => Ok(Some(
            text.lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect(),
        )),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

impl CommandCatalog {
    /// Catalog over the configured file locations
    pub fn new(files: &FilesConfig) -> Self {
        Self {
            command_list: files.command_list.clone(),
            command_db: files.command_db.clone(),
            index_file: files.index_file.clone(),
            output_dir: files.output_dir.clone(),
        }
    }

    /// The static command list. Missing file is fatal.
    pub fn load_commands(&self) -> AppResult<Vec<String>> {
        read_lines(&self.command_list)?
            .ok_or_else(|| DoomError::MissingCommandList(self.command_list.clone()))
    }

    /// Commands learned for `identity` by earlier runs; empty when none saved.
    pub fn load_learned(&self, identity: Option<&InstrumentIdentity>) -> AppResult<(PathBuf, Option<Vec<String>>)> {
        let path = storage::learned_latest_path(&self.output_dir, identity);
        let learned = read_lines(&path)?;
        Ok((path, learned))
    }

    /// Command list merged with the learned commands, sorted and de-duplicated.
    pub fn load_all(&self, identity: Option<&InstrumentIdentity>) -> AppResult<KnownCommands> {
        let mut commands: BTreeSet<String> = self.load_commands()?.into_iter().collect();

        let (path, learned) = self.load_learned(identity)?;
        let mut known = KnownCommands::default();
        if let Some(learned) = learned {
            known.learned = learned.len();
            known.learned_from = Some(path);
            commands.extend(learned);
        }

        known.commands = commands.into_iter().collect();
        debug!(
            total = known.commands.len(),
            learned = known.learned,
            "Known commands loaded"
        );
        Ok(known)
    }

    /// Optional command database; empty when the file is missing.
    pub fn load_db(&self) -> AppResult<Vec<String>> {
        Ok(read_lines(&self.command_db)?.unwrap_or_default())
    }

    /// Optional index file; empty when missing.
    pub fn load_index(&self) -> AppResult<IndexInfo> {
        let text = match std::fs::read_to_string(&self.index_file) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(IndexInfo::new()),
            Err(e) => return Err(e.into()),
        };
        Ok(parse_index(&text))
    }
}

/// Parse tab-delimited index lines: `key \t _ \t direction \t value...`.
///
/// Lines with fewer than four fields are ignored; values for a repeated
/// key/direction pair accumulate.
pub fn parse_index(text: &str) -> IndexInfo {
    let mut info = IndexInfo::new();
    for line in text.lines() {
        let parts: Vec<&str> = line.trim().split('\t').collect();
        if parts.len() < 4 {
            continue;
        }
        info.entry(parts[0].trim().to_string())
            .or_default()
            .entry(parts[2].trim().to_string())
            .or_default()
            .extend(parts[3..].iter().map(|v| v.to_string()));
    }
    info
}

/// Commands in the `prefix` group: `MATH1` selects everything under `:MATH1`.
///
/// Matching ignores case; a leading `:` on the prefix is optional.
pub fn group_commands(commands: &[String], prefix: &str) -> Vec<String> {
    let wanted = format!(":{}", prefix.trim().trim_start_matches(':').to_uppercase());
    commands
        .iter()
        .filter(|c| c.to_uppercase().starts_with(&wanted))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn catalog_in(dir: &Path) -> CommandCatalog {
        let files = FilesConfig {
            command_list: dir.join("scpi_command_list.txt"),
            command_db: dir.join("db.txt"),
            index_file: dir.join("index.txt"),
            output_dir: dir.to_path_buf(),
            write_csv: false,
        };
        CommandCatalog::new(&files)
    }

    #[test]
    fn test_missing_command_list_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let result = catalog_in(dir.path()).load_commands();
        assert!(matches!(result, Err(DoomError::MissingCommandList(_))));
    }

    #[test]
    fn test_load_all_merges_learned() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("scpi_command_list.txt"),
            ":TIM:SCAL?\n\n  :CHAN1:SCAL?  \n",
        )
        .unwrap();
        let id = InstrumentIdentity::new("RIGOL TECHNOLOGIES,MSO5074,SN1,1.0");
        fs::write(
            storage::learned_latest_path(dir.path(), Some(&id)),
            ":BUS1:MODE?\n:CHAN1:SCAL?\n",
        )
        .unwrap();

        let known = catalog_in(dir.path()).load_all(Some(&id)).unwrap();
        assert_eq!(known.commands, vec![":BUS1:MODE?", ":CHAN1:SCAL?", ":TIM:SCAL?"]);
        assert_eq!(known.learned, 2);
        assert!(known.learned_from.is_some());

        // Another instrument does not see these learned commands
        let other = InstrumentIdentity::new("RIGOL TECHNOLOGIES,MSO5104,SN2,1.0");
        let known = catalog_in(dir.path()).load_all(Some(&other)).unwrap();
        assert_eq!(known.commands.len(), 2);
        assert!(known.learned_from.is_none());
    }

    #[test]
    fn test_optional_files_default_empty() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = catalog_in(dir.path());
        assert!(catalog.load_db().unwrap().is_empty());
        assert!(catalog.load_index().unwrap().is_empty());
    }

    #[test]
    fn test_parse_index() {
        let text = ":CHANnel<n>:SCALe\t12\tSET\t<scale>\n\
                    :CHANnel<n>:SCALe\t12\tSET\tMIN\tMAX\n\
                    :CHANnel<n>:SCALe\t12\tQUERY\t<scale>\n\
                    short\tline\n";
        let info = parse_index(text);
        assert_eq!(info.len(), 1);
        let entry = &info[":CHANnel<n>:SCALe"];
        assert_eq!(entry["SET"], vec!["<scale>", "MIN", "MAX"]);
        assert_eq!(entry["QUERY"], vec!["<scale>"]);
    }

    #[test]
    fn test_group_commands() {
        let commands: Vec<String> = [":MATH1:OPERator?", ":MATH2:SCALe?", ":math1:DISPlay?", ":CHANnel1:SCALe?"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(
            group_commands(&commands, "math1"),
            vec![":MATH1:OPERator?", ":math1:DISPlay?"]
        );
        assert_eq!(group_commands(&commands, ":CHAN").len(), 1);
        assert!(group_commands(&commands, "BUS").is_empty());
    }
}
