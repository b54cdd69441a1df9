//! Embedding-text construction.
//!
//! The text fed to the embedding model is `description \n\n context \n\n
//! content` under a fixed total character budget. Description and context
//! are cheap to compute and disambiguate short fragments, so they are
//! truncated first and the raw content absorbs whatever budget remains.
//! This assembly is result-affecting and must stay stable across releases.

use fragdb_core::types::{Fragment, FragmentKind};

/// Character budgets for the assembled embedding text.
#[derive(Debug, Clone, Copy)]
pub struct EmbeddingTextBuilder {
    pub total_budget: usize,
    pub description_budget: usize,
    pub context_budget: usize,
}

impl Default for EmbeddingTextBuilder {
    fn default() -> Self {
        Self { total_budget: 512, description_budget: 200, context_budget: 150 }
    }
}

/// Length of the two `\n\n` separators in the assembled text.
const SEPARATORS_LEN: usize = 4;

impl EmbeddingTextBuilder {
    /// Assemble the embedding text for one fragment. When the raw content
    /// alone exceeds the budget, the result is exactly `total_budget`
    /// characters long.
    pub fn build(&self, fragment: &Fragment) -> String {
        let description = truncate_chars(&describe(fragment), self.description_budget);
        let context = truncate_chars(&context_line(fragment), self.context_budget);
        let used = description.chars().count() + context.chars().count() + SEPARATORS_LEN;
        let allowance = self.total_budget.saturating_sub(used);
        let content = truncate_chars(&fragment.content, allowance);
        format!("{description}\n\n{context}\n\n{content}")
    }
}

fn truncate_chars(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        s.chars().take(max_chars).collect()
    }
}

/// Keywords associated with each fragment kind, folded into the context
/// line so that short fragments still carry their role.
pub fn kind_keywords(kind: FragmentKind) -> &'static [&'static str] {
    match kind {
        FragmentKind::Component => &["react", "component", "ui", "user interface"],
        FragmentKind::Hook => &["hook", "state management", "side effect"],
        FragmentKind::Function => &["function", "utility", "helper"],
        FragmentKind::JsxElement => &["jsx", "element", "markup"],
        FragmentKind::StyleBlock | FragmentKind::Style => &["style", "css", "layout"],
        FragmentKind::ImportBlock => &["import", "module", "dependency"],
        FragmentKind::ApiCall => &["api", "request", "http", "data fetching"],
        FragmentKind::MuiComponent => &["material ui", "mui", "component library"],
        FragmentKind::StateLogic => &["state", "logic", "data management"],
        FragmentKind::Routing => &["routing", "navigation", "spa"],
        FragmentKind::Template => &["template", "markup section"],
        FragmentKind::Script => &["script", "logic section"],
        FragmentKind::Generic => &[],
    }
}

/// Keywords associated with a producer-assigned purpose tag.
pub fn purpose_keywords(purpose: &str) -> &'static [&'static str] {
    match purpose {
        "auth" => &["login", "authentication", "user", "account"],
        "subscription" => &["subscription", "service", "payment"],
        "list" => &["list", "cards", "items"],
        "detail" => &["detail", "info", "view"],
        "form" => &["form", "input", "submit"],
        _ => &[],
    }
}

/// Short kind-specific description of the fragment.
fn describe(fragment: &Fragment) -> String {
    let mut description = format!(
        "This is a {} fragment named {}. ",
        fragment.kind, fragment.name
    );
    description.push_str(&module_info(fragment.file_path()));

    match fragment.kind {
        FragmentKind::Component => {
            if let Some(component_type) = fragment.meta_str("component_type") {
                description.push_str(&format!("A {component_type} React component. "));
            }
            let props = fragment.meta_list("props");
            if !props.is_empty() {
                let shown: Vec<_> = props.iter().take(5).cloned().collect();
                description.push_str(&format!("Uses props: {}. ", shown.join(", ")));
            }
        }
        FragmentKind::Function | FragmentKind::Hook => {
            let lower = fragment.name.to_lowercase();
            if lower.starts_with("handle") {
                description.push_str("An event handler. ");
            } else if lower.starts_with("fetch") || lower.starts_with("get") {
                description.push_str("Fetches or derives data. ");
            } else if lower.starts_with("format") {
                description.push_str("Formats data for display. ");
            }
            if fragment
                .metadata
                .get("is_async")
                .and_then(|v| v.as_bool())
                .unwrap_or(false)
            {
                description.push_str("Asynchronous. ");
            }
            if fragment.meta_str("parent_id").is_some() {
                description.push_str("Defined inside a parent component. ");
            }
        }
        FragmentKind::ApiCall => {
            if let Some(service) = fragment.meta_str("api_service") {
                description.push_str(&format!("Calls the {service} service. "));
            }
        }
        FragmentKind::StateLogic => {
            if let Some(hook) = fragment.meta_str("hook") {
                description.push_str(&format!("Built on {hook}. "));
            }
        }
        FragmentKind::Routing => {
            if let Some(route) = fragment.meta_str("route_path") {
                description.push_str(&format!("Handles the {route} route. "));
            }
        }
        _ => {}
    }

    if let Some(purpose) = fragment.meta_str("purpose") {
        description.push_str(&format!("Purpose: {purpose}. "));
    }
    description
}

/// Path-derived module hint for the description.
fn module_info(file_path: &str) -> String {
    if file_path.is_empty() {
        return String::new();
    }
    if let Some(rest) = file_path.split("src/components/").nth(1) {
        if let Some(category) = rest.split('/').next().filter(|c| !c.is_empty()) {
            return format!("Belongs to the '{category}' component category. ");
        }
        return "A component module. ".to_string();
    }
    if file_path.contains("src/pages/") {
        "A page component. ".to_string()
    } else if file_path.contains("src/contexts/") {
        "Related to the Context API. ".to_string()
    } else if file_path.contains("src/services/") {
        "Part of the API service layer. ".to_string()
    } else if file_path.contains("src/utils/") {
        "A utility module. ".to_string()
    } else {
        String::new()
    }
}

/// Pipe-separated context line: name, file name, kind keywords, purpose
/// keywords, kind-specific fields.
fn context_line(fragment: &Fragment) -> String {
    let mut parts: Vec<String> = vec![fragment.name.clone()];
    let file_name = fragment.file_name();
    if !file_name.is_empty() {
        parts.push(file_name.to_string());
    }
    let keywords = kind_keywords(fragment.kind);
    if !keywords.is_empty() {
        parts.push(keywords.join(" "));
    }
    if let Some(purpose) = fragment.meta_str("purpose") {
        let extras = purpose_keywords(purpose);
        if extras.is_empty() {
            parts.push(purpose.to_string());
        } else {
            parts.push(format!("{} {}", purpose, extras.join(" ")));
        }
    }
    match fragment.kind {
        FragmentKind::Component => {
            let props = fragment.meta_list("props");
            if !props.is_empty() {
                parts.push(format!("props: {}", props.join(", ")));
            }
        }
        FragmentKind::ApiCall => {
            if let Some(service) = fragment.meta_str("api_service") {
                parts.push(format!("api: {service}"));
            }
        }
        _ => {}
    }
    parts.join(" | ")
}
