//! SCPI query candidate generation.
//!
//! Random candidates pair a namespace root with a subcommand suffix
//! (`:TRIGger:MODE?`). `focus` candidates come from a wordlist, in order.

use crate::catalog::CommandTree;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::collections::{BTreeSet, HashSet};

/// Join namespace parts into a query: `["CHANnel1", "SCALe"]` -> `:CHANnel1:SCALe?`.
///
/// Parts may already carry leading colons or nested namespaces (`:BUS1:RS232`).
pub fn query_form(parts: &[&str]) -> String {
    let body: Vec<&str> = parts
        .iter()
        .map(|p| p.trim().trim_matches(':').trim_end_matches('?'))
        .filter(|p| !p.is_empty())
        .collect();
    format!(":{}?", body.join(":"))
}

/// Random root/suffix sampler
pub struct CandidateGenerator<R: Rng = StdRng> {
    roots: Vec<String>,
    suffixes: Vec<String>,
    prefix: Option<String>,
    rng: R,
}

impl CandidateGenerator<StdRng> {
    /// Generator seeded from OS entropy
    pub fn from_entropy(roots: Vec<String>, suffixes: Vec<String>) -> Self {
        Self::with_rng(roots, suffixes, StdRng::from_entropy())
    }

    /// Reproducible generator
    pub fn seeded(roots: Vec<String>, suffixes: Vec<String>, seed: u64) -> Self {
        Self::with_rng(roots, suffixes, StdRng::seed_from_u64(seed))
    }
}

impl<R: Rng> CandidateGenerator<R> {
    /// Generator over the given pools and RNG
    pub fn with_rng(roots: Vec<String>, suffixes: Vec<String>, rng: R) -> Self {
        Self {
            roots,
            suffixes,
            prefix: None,
            rng,
        }
    }

    /// Probe below `prefix` instead of the root pool: `:PREFIX:SUFFIX?`
    pub fn with_prefix(mut self, prefix: Option<&str>) -> Self {
        self.prefix = prefix
            .map(|p| p.trim().trim_matches(':').to_string())
            .filter(|p| !p.is_empty());
        self
    }

    /// Number of distinct candidates this generator can produce
    pub fn space(&self) -> usize {
        let roots = if self.prefix.is_some() { 1 } else { self.roots.len() };
        roots * self.suffixes.len()
    }

    /// Draw one candidate; `None` when a pool is empty
    pub fn next_candidate(&mut self) -> Option<String> {
        let suffix = self.suffixes.choose(&mut self.rng)?;
        let root = match &self.prefix {
            Some(prefix) => prefix,
            None => self.roots.choose(&mut self.rng)?,
        };
        Some(query_form(&[root.as_str(), suffix.as_str()]))
    }
}

/// Pools for `smart-learn`: known prefixes up to `depth` levels, and the
/// configured suffixes joined with the leaf names already in the tree.
pub fn smart_pools(tree: &CommandTree, depth: usize, suffixes: &[String]) -> (Vec<String>, Vec<String>) {
    let roots = tree.prefixes(depth);
    let mut pool: BTreeSet<String> = suffixes
        .iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    pool.extend(tree.leaf_names());
    (roots, pool.into_iter().collect())
}

/// Deterministic `focus` candidates: each word below `prefix`, in wordlist
/// order, duplicates dropped. Blank lines and `#` comments are ignored.
pub fn focus_candidates(words: &[String], prefix: Option<&str>) -> Vec<String> {
    let prefix = prefix.unwrap_or("");
    let mut seen = HashSet::new();
    words
        .iter()
        .map(|w| w.trim())
        .filter(|w| !w.is_empty() && !w.starts_with('#'))
        .map(|w| query_form(&[prefix, w]))
        .filter(|c| seen.insert(c.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_query_form() {
        assert_eq!(query_form(&["CHANnel1", "SCALe"]), ":CHANnel1:SCALe?");
        assert_eq!(query_form(&[":BUS1:RS232", "PEND?"]), ":BUS1:RS232:PEND?");
        assert_eq!(query_form(&["", "RUN"]), ":RUN?");
    }

    #[test]
    fn test_candidates_come_from_pools() {
        let roots = pool(&["CHANnel1", "MATH1"]);
        let suffixes = pool(&["SCALe", "OFFSet"]);
        let mut gen = CandidateGenerator::seeded(roots, suffixes, 7);
        for _ in 0..50 {
            let cmd = gen.next_candidate().unwrap();
            assert!(cmd.starts_with(":CHANnel1:") || cmd.starts_with(":MATH1:"));
            assert!(cmd.ends_with("SCALe?") || cmd.ends_with("OFFSet?"));
        }
        assert_eq!(gen.space(), 4);
    }

    #[test]
    fn test_seeded_generators_agree() {
        let make = || CandidateGenerator::seeded(pool(&["A", "B", "C"]), pool(&["X", "Y", "Z"]), 42);
        let (mut a, mut b) = (make(), make());
        for _ in 0..20 {
            assert_eq!(a.next_candidate(), b.next_candidate());
        }
    }

    #[test]
    fn test_prefix_replaces_root() {
        let mut gen = CandidateGenerator::seeded(pool(&["CHANnel1"]), pool(&["MODE"]), 1)
            .with_prefix(Some(":BUS2:"));
        assert_eq!(gen.next_candidate().as_deref(), Some(":BUS2:MODE?"));
        assert_eq!(gen.space(), 1);
    }

    #[test]
    fn test_empty_pool_yields_nothing() {
        let mut gen = CandidateGenerator::seeded(Vec::new(), pool(&["MODE"]), 1);
        assert_eq!(gen.next_candidate(), None);
    }

    #[test]
    fn test_focus_candidates_deterministic() {
        let words = pool(&["SCALe", "# comment", "", "OFFSet?", "SCALe"]);
        assert_eq!(
            focus_candidates(&words, Some("CHANnel1")),
            vec![":CHANnel1:SCALe?", ":CHANnel1:OFFSet?"]
        );
        assert_eq!(focus_candidates(&words, None), vec![":SCALe?", ":OFFSet?"]);
    }

    #[test]
    fn test_smart_pools() {
        let tree = CommandTree::from_commands([":BUS1:RS232:PEND?", ":TIMebase:SCALe?"]);
        let (roots, suffixes) = smart_pools(&tree, 2, &pool(&["MODE", "SCALe"]));
        assert_eq!(roots, vec![":BUS1", ":BUS1:RS232", ":TIMebase"]);
        assert_eq!(suffixes, vec!["MODE", "PEND", "SCALe"]);
    }
}
