//! Command namespace tree
//!
//! Nested mapping built from colon-delimited SCPI commands. `:CHANnel1:SCALe?`
//! and `:CHANnel1:OFFSet?` share the `CHANnel1` branch. Query marks and
//! arguments are dropped; IEEE 488.2 common commands (`*IDN?`) have no
//! namespace and are left out.

use std::collections::{BTreeMap, BTreeSet};

/// One namespace level; the root has an empty name.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CommandTree {
    children: BTreeMap<String, CommandTree>,
    terminal: bool,
}

/// Namespace segments of a command: `:CHAN1:SCAL? 2` -> `["CHAN1", "SCAL"]`.
pub fn segments(cmd: &str) -> Vec<&str> {
    let head = cmd.split_whitespace().next().unwrap_or("");
    if head.starts_with('*') {
        return Vec::new();
    }
    head.trim_start_matches(':')
        .trim_end_matches('?')
        .split(':')
        .filter(|s| !s.is_empty())
        .collect()
}

impl CommandTree {
    /// Empty tree
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a tree from a command list
    pub fn from_commands<I, S>(commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut tree = Self::new();
        for cmd in commands {
            tree.insert(cmd.as_ref());
        }
        tree
    }

    /// Add one command
    pub fn insert(&mut self, cmd: &str) {
        let segs = segments(cmd);
        if segs.is_empty() {
            return;
        }
        let mut node = self;
        for seg in segs {
            node = node.children.entry(seg.to_string()).or_default();
        }
        node.terminal = true;
    }

    /// Whether `cmd` was inserted as a full command
    pub fn contains(&self, cmd: &str) -> bool {
        let segs = segments(cmd);
        !segs.is_empty() && self.node(&segs).is_some_and(|n| n.terminal)
    }

    fn node(&self, segs: &[&str]) -> Option<&CommandTree> {
        segs.iter()
            .try_fold(self, |node, seg| node.children.get(*seg))
    }

    /// Child names directly below `path` (e.g. `:CHANnel1`)
    pub fn children(&self, path: &str) -> Vec<&str> {
        self.node(&segments(path))
            .map(|n| n.children.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Number of full commands in the tree
    pub fn len(&self) -> usize {
        usize::from(self.terminal) + self.children.values().map(CommandTree::len).sum::<usize>()
    }

    /// Whether the tree holds no commands
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Namespace prefixes (nodes with children) at most `max_depth` levels deep,
    /// formatted as `:A` / `:A:B`, in sorted order.
    pub fn prefixes(&self, max_depth: usize) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_prefixes(String::new(), 0, max_depth, &mut out);
        out
    }

    fn collect_prefixes(&self, path: String, depth: usize, max_depth: usize, out: &mut Vec<String>) {
        if depth >= max_depth {
            return;
        }
        for (name, child) in &self.children {
            if child.children.is_empty() {
                continue;
            }
            let child_path = format!("{}:{}", path, name);
            out.push(child_path.clone());
            child.collect_prefixes(child_path, depth + 1, max_depth, out);
        }
    }

    /// Names of all leaf segments, e.g. `SCALe`, `OFFSet`
    pub fn leaf_names(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves(&self, out: &mut BTreeSet<String>) {
        for (name, child) in &self.children {
            if child.terminal {
                out.insert(name.clone());
            }
            child.collect_leaves(out);
        }
    }
}
