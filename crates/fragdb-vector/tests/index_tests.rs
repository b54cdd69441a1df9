use std::collections::{BTreeMap, HashMap};
use tempfile::TempDir;

use fragdb_core::types::{Filter, FilterValue, Fragment, FragmentId, FragmentKind, Meta};
use fragdb_vector::{FragmentIndex, Metric};

const DIM: usize = 4;

fn fragment(id: &str, kind: FragmentKind, name: &str, file_path: &str) -> Fragment {
    let mut metadata = Meta::new();
    metadata.insert("file_path".to_string(), serde_json::json!(file_path));
    let file_name = file_path.rsplit('/').next().unwrap_or(file_path);
    metadata.insert("file_name".to_string(), serde_json::json!(file_name));
    Fragment {
        id: id.to_string(),
        kind,
        name: name.to_string(),
        content: format!("content of {name}"),
        metadata,
    }
}

fn embeddings(pairs: &[(&str, [f32; DIM])]) -> HashMap<FragmentId, Vec<f32>> {
    pairs.iter().map(|(id, v)| (id.to_string(), v.to_vec())).collect()
}

fn open(tmp: &TempDir, metric: Metric) -> FragmentIndex {
    FragmentIndex::open(tmp.path(), "test_fragments", DIM, metric).expect("open index")
}

#[test]
fn add_assigns_positions_and_is_idempotent() {
    let tmp = TempDir::new().expect("tempdir");
    let index = open(&tmp, Metric::Cosine);

    let fragments = vec![
        fragment("a", FragmentKind::Component, "Login", "src/Login.jsx"),
        fragment("b", FragmentKind::Function, "fetchData", "src/api.js"),
    ];
    let vectors = embeddings(&[("a", [1.0, 0.0, 0.0, 0.0]), ("b", [0.0, 1.0, 0.0, 0.0])]);

    let added = index.add(&fragments, &vectors).expect("add");
    assert_eq!(added, 2);
    assert_eq!(index.len(), 2);

    // Second add of the same batch changes nothing.
    let added = index.add(&fragments, &vectors).expect("re-add");
    assert_eq!(added, 0);
    assert_eq!(index.len(), 2);
    let stats = index.stats();
    assert_eq!(stats.vector_count, 2);
}

#[test]
fn missing_embeddings_are_skipped_not_fatal() {
    let tmp = TempDir::new().expect("tempdir");
    let index = open(&tmp, Metric::Cosine);

    let fragments = vec![
        fragment("a", FragmentKind::Function, "f1", "src/a.js"),
        fragment("b", FragmentKind::Function, "f2", "src/b.js"),
    ];
    let vectors = embeddings(&[("a", [1.0, 0.0, 0.0, 0.0])]);

    let added = index.add(&fragments, &vectors).expect("add");
    assert_eq!(added, 1);
    assert!(index.contains("a"));
    assert!(!index.contains("b"));
}

#[test]
fn wrong_dimension_is_a_hard_error() {
    let tmp = TempDir::new().expect("tempdir");
    let index = open(&tmp, Metric::Cosine);

    let fragments = vec![fragment("a", FragmentKind::Function, "f1", "src/a.js")];
    let mut vectors = HashMap::new();
    vectors.insert("a".to_string(), vec![1.0f32, 0.0]);
    assert!(index.add(&fragments, &vectors).is_err());

    assert!(index.search(&[1.0, 0.0], 5, None).is_err(), "query dimension checked too");
}

#[test]
fn cosine_vectors_are_stored_unit_normalized() {
    let tmp = TempDir::new().expect("tempdir");
    let index = open(&tmp, Metric::Cosine);

    let fragments = vec![fragment("a", FragmentKind::Function, "f1", "src/a.js")];
    let vectors = embeddings(&[("a", [3.0, 4.0, 0.0, 0.0])]);
    index.add(&fragments, &vectors).expect("add");

    let stored = index.reconstruct("a").expect("reconstruct");
    let norm: f32 = stored.iter().map(|x| x * x).sum::<f32>().sqrt();
    assert!((norm - 1.0).abs() <= 1e-5, "stored norm is 1 (got {norm})");
}

#[test]
fn search_ranks_by_similarity() {
    let tmp = TempDir::new().expect("tempdir");
    let index = open(&tmp, Metric::Cosine);

    let fragments = vec![
        fragment("a", FragmentKind::Function, "f1", "src/a.js"),
        fragment("b", FragmentKind::Function, "f2", "src/b.js"),
        fragment("c", FragmentKind::Function, "f3", "src/c.js"),
    ];
    let vectors = embeddings(&[
        ("a", [1.0, 0.0, 0.0, 0.0]),
        ("b", [0.7, 0.7, 0.0, 0.0]),
        ("c", [0.0, 0.0, 1.0, 0.0]),
    ]);
    index.add(&fragments, &vectors).expect("add");

    let results = index.search(&[1.0, 0.1, 0.0, 0.0], 2, None).expect("search");
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].fragment_id, "a");
    assert_eq!(results[1].fragment_id, "b");
    assert!(results[0].vector_score >= results[1].vector_score);
}

#[test]
fn filters_narrow_results_with_over_fetch() {
    let tmp = TempDir::new().expect("tempdir");
    let index = open(&tmp, Metric::Cosine);

    // Ten fragments, the two least similar ones are components; the 5x
    // over-fetch pool covers the whole index, so both survive the filter.
    let mut fragments = Vec::new();
    let mut vectors = HashMap::new();
    for i in 0..10 {
        let kind = if i >= 8 { FragmentKind::Component } else { FragmentKind::Function };
        let id = format!("f{i}");
        fragments.push(fragment(&id, kind, &id, &format!("src/{id}.js")));
        // Later fragments point further away from the query direction.
        let angle = i as f32 * 0.1;
        vectors.insert(id, vec![angle.cos(), angle.sin(), 0.0, 0.0]);
    }
    index.add(&fragments, &vectors).expect("add");

    let mut filter: Filter = BTreeMap::new();
    filter.insert("type".to_string(), FilterValue::One("component".to_string()));
    let results = index.search(&[1.0, 0.0, 0.0, 0.0], 2, Some(&filter)).expect("search");

    assert_eq!(results.len(), 2, "over-fetch keeps k results despite the filter");
    assert!(results.iter().all(|r| r.kind == FragmentKind::Component));
}

#[test]
fn l2_metric_prefers_closer_vectors() {
    let tmp = TempDir::new().expect("tempdir");
    let index = open(&tmp, Metric::L2);

    let fragments = vec![
        fragment("near", FragmentKind::Function, "f1", "src/a.js"),
        fragment("far", FragmentKind::Function, "f2", "src/b.js"),
    ];
    let vectors = embeddings(&[("near", [1.0, 1.0, 0.0, 0.0]), ("far", [5.0, 5.0, 0.0, 0.0])]);
    index.add(&fragments, &vectors).expect("add");

    let results = index.search(&[1.1, 1.0, 0.0, 0.0], 2, None).expect("search");
    assert_eq!(results[0].fragment_id, "near");
}

#[test]
fn similar_excludes_the_anchor_itself() {
    let tmp = TempDir::new().expect("tempdir");
    let index = open(&tmp, Metric::Cosine);

    let fragments = vec![
        fragment("a", FragmentKind::Function, "f1", "src/a.js"),
        fragment("b", FragmentKind::Function, "f2", "src/b.js"),
        fragment("c", FragmentKind::Function, "f3", "src/c.js"),
    ];
    let vectors = embeddings(&[
        ("a", [1.0, 0.0, 0.0, 0.0]),
        ("b", [0.9, 0.1, 0.0, 0.0]),
        ("c", [0.0, 1.0, 0.0, 0.0]),
    ]);
    index.add(&fragments, &vectors).expect("add");

    let results = index.similar("a", 2).expect("similar");
    assert!(results.iter().all(|r| r.fragment_id != "a"));
    assert_eq!(results[0].fragment_id, "b");

    assert!(index.similar("ghost", 2).expect("similar").is_empty());
}

#[test]
fn fragments_by_file_returns_insertion_order() {
    let tmp = TempDir::new().expect("tempdir");
    let index = open(&tmp, Metric::Cosine);

    let fragments = vec![
        fragment("a", FragmentKind::Component, "Login", "src/Login.jsx"),
        fragment("b", FragmentKind::Function, "handleSubmit", "src/Login.jsx"),
        fragment("c", FragmentKind::Function, "other", "src/Other.jsx"),
    ];
    let vectors = embeddings(&[
        ("a", [1.0, 0.0, 0.0, 0.0]),
        ("b", [0.0, 1.0, 0.0, 0.0]),
        ("c", [0.0, 0.0, 1.0, 0.0]),
    ]);
    index.add(&fragments, &vectors).expect("add");

    let results = index.fragments_by_file("src/Login.jsx");
    let ids: Vec<&str> = results.iter().map(|r| r.fragment_id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b"]);
}

#[test]
fn stats_count_kinds_files_and_components() {
    let tmp = TempDir::new().expect("tempdir");
    let index = open(&tmp, Metric::Cosine);

    let fragments = vec![
        fragment("a", FragmentKind::Component, "Login", "src/Login.jsx"),
        fragment("b", FragmentKind::Function, "handleSubmit", "src/Login.jsx"),
        fragment("c", FragmentKind::Component, "Signup", "src/Signup.jsx"),
    ];
    let vectors = embeddings(&[
        ("a", [1.0, 0.0, 0.0, 0.0]),
        ("b", [0.0, 1.0, 0.0, 0.0]),
        ("c", [0.0, 0.0, 1.0, 0.0]),
    ]);
    index.add(&fragments, &vectors).expect("add");

    let stats = index.stats();
    assert_eq!(stats.vector_count, 3);
    assert_eq!(stats.dimension, DIM);
    assert_eq!(stats.metric, "cosine");
    assert_eq!(stats.fragment_kinds.get("component"), Some(&2));
    assert_eq!(stats.fragment_kinds.get("function"), Some(&1));
    assert_eq!(stats.file_count, 2);
    assert_eq!(stats.component_count, 2);
}

#[test]
fn bijection_holds_between_id_and_position() {
    let tmp = TempDir::new().expect("tempdir");
    let index = open(&tmp, Metric::Cosine);

    let mut fragments = Vec::new();
    let mut vectors = HashMap::new();
    for i in 0..8 {
        let id = format!("f{i}");
        fragments.push(fragment(&id, FragmentKind::Function, &id, &format!("src/{id}.js")));
        // Distinct directions so each row is its own nearest neighbor.
        let angle = i as f32 * 0.15;
        vectors.insert(id, vec![angle.cos(), angle.sin(), 0.0, 0.0]);
    }
    index.add(&fragments, &vectors).expect("add");

    // Every id reconstructs to exactly one stored row, and search for that
    // row returns the id first: positions and ids are inverse mappings.
    for i in 0..8 {
        let id = format!("f{i}");
        let stored = index.reconstruct(&id).expect("reconstruct");
        let results = index.search(&stored, 1, None).expect("search");
        assert_eq!(results[0].fragment_id, id);
    }
}
