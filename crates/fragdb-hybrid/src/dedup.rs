//! Per-file result deduplication.
//!
//! A whole-file `component` fragment subsumes its sub-fragments for display
//! purposes: when a file group contains one, only the best component of
//! that group survives.

use std::collections::HashMap;

use fragdb_core::types::{FragmentKind, SearchResult};

#[derive(Debug, Clone, Copy, Default)]
pub struct ResultDeduplicator;

impl ResultDeduplicator {
    pub fn new() -> Self {
        Self
    }

    /// Collapse redundant fragments per source file, then re-sort the whole
    /// set descending by `cross_score` when present, fused score otherwise.
    /// Results without a file path are never grouped with each other.
    pub fn deduplicate(&self, results: Vec<SearchResult>) -> Vec<SearchResult> {
        let mut groups: Vec<Vec<SearchResult>> = Vec::new();
        let mut group_by_file: HashMap<String, usize> = HashMap::new();
        let mut ungrouped: Vec<SearchResult> = Vec::new();

        for result in results {
            if result.file_path.is_empty() {
                ungrouped.push(result);
                continue;
            }
            match group_by_file.get(&result.file_path) {
                Some(&slot) => groups[slot].push(result),
                None => {
                    group_by_file.insert(result.file_path.clone(), groups.len());
                    groups.push(vec![result]);
                }
            }
        }

        let mut kept: Vec<SearchResult> = ungrouped;
        for group in groups {
            if group.iter().any(|r| r.kind == FragmentKind::Component) {
                let best = group
                    .into_iter()
                    .filter(|r| r.kind == FragmentKind::Component)
                    .reduce(|best, candidate| {
                        if candidate.effective_score() > best.effective_score() {
                            candidate
                        } else {
                            best
                        }
                    });
                if let Some(best) = best {
                    kept.push(best);
                }
            } else {
                kept.extend(group);
            }
        }

        kept.sort_by(|a, b| {
            b.effective_score()
                .partial_cmp(&a.effective_score())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        kept
    }
}
