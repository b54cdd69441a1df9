//! Domain types shared by the embedding, lexical and vector engines.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

pub type FragmentId = String;

/// Open metadata bag supplied by the upstream fragment producer. Keys and
/// value shapes vary by fragment kind; `file_path` and `file_name` are
/// conventionally present.
pub type Meta = HashMap<String, serde_json::Value>;

/// Maximum number of entries kept from list-valued producer metadata
/// (props, child components) in the condensed record.
pub const MAX_LIST_EXTRAS: usize = 5;

/// Kind of a source-code fragment, as assigned by the upstream producer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FragmentKind {
    Component,
    Hook,
    Function,
    JsxElement,
    StyleBlock,
    ImportBlock,
    ApiCall,
    MuiComponent,
    StateLogic,
    Routing,
    Template,
    Script,
    Style,
    Generic,
}

impl FragmentKind {
    pub const ALL: [FragmentKind; 14] = [
        FragmentKind::Component,
        FragmentKind::Hook,
        FragmentKind::Function,
        FragmentKind::JsxElement,
        FragmentKind::StyleBlock,
        FragmentKind::ImportBlock,
        FragmentKind::ApiCall,
        FragmentKind::MuiComponent,
        FragmentKind::StateLogic,
        FragmentKind::Routing,
        FragmentKind::Template,
        FragmentKind::Script,
        FragmentKind::Style,
        FragmentKind::Generic,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            FragmentKind::Component => "component",
            FragmentKind::Hook => "hook",
            FragmentKind::Function => "function",
            FragmentKind::JsxElement => "jsx_element",
            FragmentKind::StyleBlock => "style_block",
            FragmentKind::ImportBlock => "import_block",
            FragmentKind::ApiCall => "api_call",
            FragmentKind::MuiComponent => "mui_component",
            FragmentKind::StateLogic => "state_logic",
            FragmentKind::Routing => "routing",
            FragmentKind::Template => "template",
            FragmentKind::Script => "script",
            FragmentKind::Style => "style",
            FragmentKind::Generic => "generic",
        }
    }
}

impl fmt::Display for FragmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FragmentKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FragmentKind::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| Error::UnknownKind(s.to_string()))
    }
}

/// One semantically meaningful unit of source code, as delivered by the
/// external fragmenter.
///
/// - `id`: stable unique identifier, the join key for everything downstream
/// - `kind`: producer-assigned fragment kind (serialized as `type`)
/// - `name`: human-readable label, not unique
/// - `content`: raw source text of the fragment
/// - `metadata`: open bag of producer extras, see [`Meta`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fragment {
    pub id: FragmentId,
    #[serde(rename = "type")]
    pub kind: FragmentKind,
    pub name: String,
    pub content: String,
    #[serde(default)]
    pub metadata: Meta,
}

impl Fragment {
    /// String-valued metadata field, if present.
    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(|v| v.as_str())
    }

    /// List-valued metadata field as strings; non-string elements are dropped.
    pub fn meta_list(&self, key: &str) -> Vec<String> {
        self.metadata
            .get(key)
            .and_then(|v| v.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|i| i.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn file_path(&self) -> &str {
        self.meta_str("file_path").unwrap_or("")
    }

    pub fn file_name(&self) -> &str {
        self.meta_str("file_name").unwrap_or("")
    }
}

/// Kind-specific extras of a condensed metadata record. One variant per
/// fragment kind that carries structured fields; everything else is `None`
/// with producer extras living in the open bag.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "of", rename_all = "snake_case")]
pub enum KindDetails {
    Component {
        component_name: String,
        props: Vec<String>,
        child_components: Vec<String>,
    },
    Function {
        function_kind: Option<String>,
        is_async: bool,
        is_event_handler: bool,
        parent_id: Option<FragmentId>,
    },
    ApiCall {
        service: Option<String>,
        method: Option<String>,
    },
    StateLogic {
        hook: Option<String>,
        purpose: Option<String>,
    },
    Routing {
        route_path: Option<String>,
    },
    #[default]
    None,
}

impl KindDetails {
    pub fn from_fragment(fragment: &Fragment) -> Self {
        let cap = |mut v: Vec<String>| {
            v.truncate(MAX_LIST_EXTRAS);
            v
        };
        match fragment.kind {
            FragmentKind::Component => KindDetails::Component {
                component_name: fragment
                    .meta_str("component_name")
                    .unwrap_or(&fragment.name)
                    .to_string(),
                props: cap(fragment.meta_list("props")),
                child_components: cap(fragment.meta_list("components")),
            },
            FragmentKind::Function | FragmentKind::Hook => KindDetails::Function {
                function_kind: fragment.meta_str("function_type").map(str::to_string),
                is_async: fragment
                    .metadata
                    .get("is_async")
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false),
                is_event_handler: fragment
                    .metadata
                    .get("is_event_handler")
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false),
                parent_id: fragment.meta_str("parent_id").map(str::to_string),
            },
            FragmentKind::ApiCall => KindDetails::ApiCall {
                service: fragment.meta_str("api_service").map(str::to_string),
                method: fragment.meta_str("http_method").map(str::to_string),
            },
            FragmentKind::StateLogic => KindDetails::StateLogic {
                hook: fragment.meta_str("hook").map(str::to_string),
                purpose: fragment.meta_str("purpose").map(str::to_string),
            },
            FragmentKind::Routing => KindDetails::Routing {
                route_path: fragment.meta_str("route_path").map(str::to_string),
            },
            _ => KindDetails::None,
        }
    }
}

/// Condensed, persisted projection of a [`Fragment`]: everything needed to
/// render a search result without re-reading source. Written once when a
/// fragment is first indexed and immutable afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FragmentMetadataRecord {
    pub kind: FragmentKind,
    pub name: String,
    pub file_path: String,
    pub file_name: String,
    pub content_preview: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_content: Option<String>,
    #[serde(default)]
    pub details: KindDetails,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

impl FragmentMetadataRecord {
    pub const PREVIEW_LEN: usize = 150;
    pub const FULL_CONTENT_CAP: usize = 2000;

    pub fn from_fragment(fragment: &Fragment) -> Self {
        let preview = preview_of(&fragment.content, Self::PREVIEW_LEN);
        let full_content = if fragment.content.chars().count() <= Self::FULL_CONTENT_CAP {
            Some(fragment.content.clone())
        } else {
            Some(fragment.content.chars().take(Self::FULL_CONTENT_CAP).collect())
        };
        let extra = fragment
            .meta_str("purpose")
            .map(|p| {
                let mut m = BTreeMap::new();
                m.insert("purpose".to_string(), p.to_string());
                m
            })
            .unwrap_or_default();
        Self {
            kind: fragment.kind,
            name: fragment.name.clone(),
            file_path: fragment.file_path().to_string(),
            file_name: fragment.file_name().to_string(),
            content_preview: preview,
            full_content,
            details: KindDetails::from_fragment(fragment),
            extra,
        }
    }

    /// Resolve a filterable field by name. Returns `None` for fields this
    /// record does not carry; callers treat that as a non-match.
    pub fn field(&self, key: &str) -> Option<FieldValue<'_>> {
        match key {
            "type" | "kind" => Some(FieldValue::One(self.kind.as_str())),
            "name" => Some(FieldValue::One(&self.name)),
            "file_path" => Some(FieldValue::One(&self.file_path)),
            "file_name" => Some(FieldValue::One(&self.file_name)),
            _ => match &self.details {
                KindDetails::Component {
                    component_name,
                    props,
                    child_components,
                } => match key {
                    "component_name" => Some(FieldValue::One(component_name)),
                    "props" => Some(FieldValue::Many(props)),
                    "components" => Some(FieldValue::Many(child_components)),
                    _ => self.extra_field(key),
                },
                KindDetails::ApiCall { service, method } => match key {
                    "api_service" => service.as_deref().map(FieldValue::One),
                    "http_method" => method.as_deref().map(FieldValue::One),
                    _ => self.extra_field(key),
                },
                KindDetails::Routing { route_path } => match key {
                    "route_path" => route_path.as_deref().map(FieldValue::One),
                    _ => self.extra_field(key),
                },
                _ => self.extra_field(key),
            },
        }
    }

    fn extra_field(&self, key: &str) -> Option<FieldValue<'_>> {
        self.extra.get(key).map(|v| FieldValue::One(v))
    }

    /// True when every filter key resolves against this record and matches:
    /// set membership for list-valued sides, equality otherwise. A missing
    /// key is a non-match, never an error.
    pub fn matches(&self, filter: &Filter) -> bool {
        filter.iter().all(|(key, wanted)| {
            let Some(have) = self.field(key) else {
                return false;
            };
            match (have, wanted) {
                (FieldValue::One(m), FilterValue::One(f)) => m == f.as_str(),
                (FieldValue::One(m), FilterValue::Any(fs)) => fs.iter().any(|f| f.as_str() == m),
                (FieldValue::Many(ms), FilterValue::One(f)) => ms.iter().any(|m| m == f),
                (FieldValue::Many(ms), FilterValue::Any(fs)) => {
                    fs.iter().any(|f| ms.iter().any(|m| m == f))
                }
            }
        })
    }
}

/// A filterable metadata value as seen by the matcher.
#[derive(Debug, Clone, Copy)]
pub enum FieldValue<'a> {
    One(&'a str),
    Many(&'a [String]),
}

/// Filter constraint: a single expected value or a set of admissible values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    One(String),
    Any(Vec<String>),
}

/// Metadata filter applied to search candidates; every key must match.
pub type Filter = BTreeMap<String, FilterValue>;

/// One ranked search result.
///
/// `vector_score` is the raw similarity from the vector leg (0 when the id
/// was only discovered lexically). `keyword_score` is present only when
/// keyword search ran and produced a hit for this id. `score` is the fused
/// score, or the sole vector score when no fusion happened. `cross_score`
/// is attached by the reranking stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub fragment_id: FragmentId,
    pub kind: FragmentKind,
    pub name: String,
    pub file_path: String,
    pub file_name: String,
    pub content_preview: String,
    pub vector_score: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keyword_score: Option<f32>,
    pub score: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cross_score: Option<f32>,
}

impl SearchResult {
    pub fn from_record(id: &str, record: &FragmentMetadataRecord, vector_score: f32) -> Self {
        Self {
            fragment_id: id.to_string(),
            kind: record.kind,
            name: record.name.clone(),
            file_path: record.file_path.clone(),
            file_name: record.file_name.clone(),
            content_preview: record.content_preview.clone(),
            vector_score,
            keyword_score: None,
            score: vector_score,
            cross_score: None,
        }
    }

    /// Score used for final ordering and deduplication: the reranker's
    /// verdict when present, the fused score otherwise.
    pub fn effective_score(&self) -> f32 {
        self.cross_score.unwrap_or(self.score)
    }
}

/// Index-wide statistics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexStats {
    pub vector_count: usize,
    pub dimension: usize,
    pub metric: String,
    pub fragment_kinds: BTreeMap<String, usize>,
    pub file_count: usize,
    pub component_count: usize,
}

/// Cache statistics. `capacity` is reported by bounded backends,
/// `size_bytes` by on-disk backends.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    pub entries: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
}

/// Bounded character prefix of `content`, with an ellipsis appended when
/// anything was cut.
pub fn preview_of(content: &str, max_chars: usize) -> String {
    if content.chars().count() <= max_chars {
        content.to_string()
    } else {
        let mut p: String = content.chars().take(max_chars).collect();
        p.push_str("...");
        p
    }
}
