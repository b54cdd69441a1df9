use std::collections::BTreeMap;
use std::str::FromStr;

use fragdb_core::types::{
    Filter, FilterValue, Fragment, FragmentKind, FragmentMetadataRecord, KindDetails,
};

fn fragment(kind: FragmentKind, name: &str, content: &str) -> Fragment {
    let mut metadata = fragdb_core::types::Meta::new();
    metadata.insert(
        "file_path".to_string(),
        serde_json::json!("src/components/Login.jsx"),
    );
    metadata.insert("file_name".to_string(), serde_json::json!("Login.jsx"));
    Fragment {
        id: format!("{}-{}", kind, name),
        kind,
        name: name.to_string(),
        content: content.to_string(),
        metadata,
    }
}

#[test]
fn kind_round_trips_through_str() {
    for kind in FragmentKind::ALL {
        let parsed = FragmentKind::from_str(kind.as_str()).expect("known kind");
        assert_eq!(parsed, kind);
    }
    assert!(FragmentKind::from_str("widget").is_err(), "unknown kinds are rejected");
}

#[test]
fn kind_serde_uses_snake_case() {
    let json = serde_json::to_string(&FragmentKind::JsxElement).expect("serialize");
    assert_eq!(json, "\"jsx_element\"");
    let back: FragmentKind = serde_json::from_str("\"api_call\"").expect("deserialize");
    assert_eq!(back, FragmentKind::ApiCall);
}

#[test]
fn preview_is_bounded_with_ellipsis() {
    let long = "x".repeat(400);
    let record = FragmentMetadataRecord::from_fragment(&fragment(
        FragmentKind::Function,
        "fetchData",
        &long,
    ));
    assert_eq!(
        record.content_preview.chars().count(),
        FragmentMetadataRecord::PREVIEW_LEN + 3
    );
    assert!(record.content_preview.ends_with("..."));

    let short = fragment(FragmentKind::Function, "fetchData", "let x = 1;");
    let record = FragmentMetadataRecord::from_fragment(&short);
    assert_eq!(record.content_preview, "let x = 1;");
}

#[test]
fn component_details_cap_list_extras() {
    let mut f = fragment(FragmentKind::Component, "Login", "function Login() {}");
    f.metadata.insert(
        "props".to_string(),
        serde_json::json!(["a", "b", "c", "d", "e", "f", "g"]),
    );
    let record = FragmentMetadataRecord::from_fragment(&f);
    match &record.details {
        KindDetails::Component { props, component_name, .. } => {
            assert_eq!(props.len(), 5, "props capped at five entries");
            assert_eq!(component_name, "Login");
        }
        other => panic!("expected component details, got {other:?}"),
    }
}

#[test]
fn filters_match_scalar_list_and_set_values() {
    let mut f = fragment(FragmentKind::Component, "Login", "function Login() {}");
    f.metadata
        .insert("props".to_string(), serde_json::json!(["onSubmit", "title"]));
    let record = FragmentMetadataRecord::from_fragment(&f);

    let mut filter: Filter = BTreeMap::new();
    filter.insert("type".to_string(), FilterValue::One("component".to_string()));
    assert!(record.matches(&filter));

    filter.insert("props".to_string(), FilterValue::One("onSubmit".to_string()));
    assert!(record.matches(&filter), "list field matches by membership");

    filter.insert(
        "type".to_string(),
        FilterValue::Any(vec!["function".to_string(), "component".to_string()]),
    );
    assert!(record.matches(&filter), "set-of-values matches by membership");

    filter.insert("type".to_string(), FilterValue::One("function".to_string()));
    assert!(!record.matches(&filter));
}

#[test]
fn missing_filter_key_is_a_non_match() {
    let record = FragmentMetadataRecord::from_fragment(&fragment(
        FragmentKind::Style,
        "theme",
        ".a {}",
    ));
    let mut filter: Filter = BTreeMap::new();
    filter.insert("no_such_key".to_string(), FilterValue::One("x".to_string()));
    assert!(!record.matches(&filter));
}

#[test]
fn metadata_record_serde_round_trip() {
    let mut f = fragment(FragmentKind::ApiCall, "authApi.post", "authApi.post('/login')");
    f.metadata
        .insert("api_service".to_string(), serde_json::json!("authApi"));
    let record = FragmentMetadataRecord::from_fragment(&f);
    let json = serde_json::to_string(&record).expect("serialize");
    let back: FragmentMetadataRecord = serde_json::from_str(&json).expect("deserialize");
    assert_eq!(back, record);
}
