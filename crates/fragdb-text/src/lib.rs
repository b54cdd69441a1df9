//! fragdb-text
//!
//! Lexical (keyword) scoring over condensed fragment metadata. This is the
//! second leg of hybrid retrieval: deterministic term scoring against
//! content previews, weighted per fragment kind, fused downstream with the
//! vector leg.

use tracing::debug;

use fragdb_core::types::{FragmentId, FragmentKind, FragmentMetadataRecord};

/// Score for a query term matching a whole token of the preview.
pub const EXACT_TOKEN_SCORE: f32 = 3.0;
/// Score for a query term occurring as a substring of the preview.
pub const SUBSTRING_SCORE: f32 = 1.0;

/// One lexical hit; `score` is term score times the kind weight.
#[derive(Debug, Clone, PartialEq)]
pub struct KeywordHit {
    pub fragment_id: FragmentId,
    pub score: f32,
}

/// Relative lexical weight per fragment kind: components and script-like
/// fragments rank above styles and import blocks for the same term hits.
pub fn kind_weight(kind: FragmentKind) -> f32 {
    match kind {
        FragmentKind::Component => 1.5,
        FragmentKind::Hook | FragmentKind::Script => 1.3,
        FragmentKind::Function | FragmentKind::ApiCall => 1.2,
        FragmentKind::StateLogic | FragmentKind::Routing | FragmentKind::Template => 1.1,
        FragmentKind::JsxElement | FragmentKind::MuiComponent | FragmentKind::Generic => 1.0,
        FragmentKind::ImportBlock | FragmentKind::StyleBlock | FragmentKind::Style => 0.5,
    }
}

/// Stateless keyword scorer over metadata snapshots.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordScorer;

impl KeywordScorer {
    pub fn new() -> Self {
        Self
    }

    /// Score every document against the query terms and keep the top `k`.
    ///
    /// Per lowercase whitespace-separated query term: `EXACT_TOKEN_SCORE`
    /// when the term equals a preview token (split on non-identifier
    /// characters), `SUBSTRING_SCORE` when it merely occurs inside the
    /// preview. The sum is multiplied by the kind weight. Ties keep the
    /// incoming document order, so identical inputs always produce the
    /// same ranking.
    pub fn search<'a, I>(&self, query: &str, docs: I, k: usize) -> Vec<KeywordHit>
    where
        I: IntoIterator<Item = (&'a FragmentId, &'a FragmentMetadataRecord)>,
    {
        let query_lower = query.to_lowercase();
        let terms: Vec<&str> = query_lower.split_whitespace().collect();
        if terms.is_empty() || k == 0 {
            return Vec::new();
        }

        let mut hits: Vec<KeywordHit> = Vec::new();
        for (id, record) in docs {
            let preview_lower = record.content_preview.to_lowercase();
            let tokens: Vec<&str> = preview_lower
                .split(|c: char| !(c.is_alphanumeric() || c == '_'))
                .filter(|t| !t.is_empty())
                .collect();
            let mut term_score = 0.0f32;
            for term in &terms {
                if tokens.iter().any(|t| t == term) {
                    term_score += EXACT_TOKEN_SCORE;
                } else if preview_lower.contains(term) {
                    term_score += SUBSTRING_SCORE;
                }
            }
            if term_score > 0.0 {
                hits.push(KeywordHit {
                    fragment_id: id.clone(),
                    score: term_score * kind_weight(record.kind),
                });
            }
        }

        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(k);
        debug!(terms = terms.len(), hits = hits.len(), "keyword search");
        hits
    }
}
