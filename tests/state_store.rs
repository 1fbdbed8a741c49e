use frontdesk::core::atomic;
use frontdesk::core::config::StoreConfig;
use frontdesk::core::document::StateDocument;
use frontdesk::core::error::FrontdeskError;
use frontdesk::core::handoff::{self, HandoffRecord};
use frontdesk::core::store::{ReadOutcome, StateStore, WriteOutcome};
use serde_json::json;
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::tempdir;

fn open(root: &Path) -> StateStore {
    StateStore::open(&StoreConfig::at(root)).expect("open store")
}

fn snapshot_files(root: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(root)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .filter(|n| n.starts_with("state.prev.") && n.ends_with(".json"))
        .collect();
    names.sort();
    names.reverse();
    names
}

fn write_leads(store: &StateStore, agent: &str, leads: i64) -> WriteOutcome {
    let mut doc = store.read_state().unwrap();
    doc.set_metric("leads_generated", leads);
    store.write_state(doc, agent, None).unwrap()
}

#[test]
fn fresh_environment_reads_version_zero_default() {
    let tmp = tempdir().unwrap();
    let store = open(tmp.path());

    let (doc, outcome) = store.read_state_with_outcome().unwrap();
    assert_eq!(outcome, ReadOutcome::Default);
    assert_eq!(doc.version, 0);

    let raw: serde_json::Value = serde_json::to_value(&doc).unwrap();
    for key in ["project", "metrics", "assets", "version"] {
        assert!(raw.get(key).is_some(), "default document lacks {}", key);
    }
    assert!(!tmp.path().join("state.json").exists());
    assert!(snapshot_files(tmp.path()).is_empty());
}

#[test]
fn two_writers_in_sequence() {
    let tmp = tempdir().unwrap();
    let store = open(tmp.path());

    assert!(store
        .write_state(store.read_state().unwrap(), "agentA", None)
        .unwrap()
        .is_written());
    assert!(store
        .write_state(store.read_state().unwrap(), "agentB", None)
        .unwrap()
        .is_written());

    let on_disk: serde_json::Value =
        serde_json::from_slice(&fs::read(tmp.path().join("state.json")).unwrap()).unwrap();
    assert_eq!(on_disk["updated_by"], "agentB");
    assert_eq!(on_disk["version"], 2);
}

#[test]
fn n_unconditioned_writes_advance_version_by_n() {
    let tmp = tempdir().unwrap();
    let store = open(tmp.path());
    for _ in 0..3 {
        write_leads(&store, "seed", 1);
    }
    let start = store.read_state().unwrap().version;
    for i in 0..7 {
        write_leads(&store, "writer", i);
    }
    assert_eq!(store.read_state().unwrap().version, start + 7);
}

#[test]
fn stale_expected_version_leaves_file_byte_identical() {
    let tmp = tempdir().unwrap();
    let store = open(tmp.path());
    write_leads(&store, "writer", 1);
    write_leads(&store, "writer", 2);
    let before = fs::read(tmp.path().join("state.json")).unwrap();

    let mut doc = store.read_state().unwrap();
    doc.set_metric("customers", 50);
    for stale in [0, 1, 3, 99] {
        let outcome = store.write_state(doc.clone(), "late", Some(stale)).unwrap();
        assert_eq!(
            outcome,
            WriteOutcome::Conflict {
                expected: stale,
                found: 2
            }
        );
    }
    assert_eq!(fs::read(tmp.path().join("state.json")).unwrap(), before);
}

#[test]
fn garbage_in_live_file_is_replaced_by_newest_snapshot() {
    let tmp = tempdir().unwrap();
    let store = open(tmp.path());
    for leads in [10, 20, 30] {
        write_leads(&store, "writer", leads);
    }
    let newest = snapshot_files(tmp.path())[0].clone();
    let newest_bytes = fs::read(tmp.path().join(&newest)).unwrap();

    fs::write(tmp.path().join("state.json"), b"\x00\x01garbage{{").unwrap();
    let (doc, outcome) = store.read_state_with_outcome().unwrap();

    assert_eq!(outcome, ReadOutcome::Restored { snapshot: newest });
    assert_eq!(doc.version, 2);
    assert_eq!(doc.metric("leads_generated"), 20);
    assert_eq!(fs::read(tmp.path().join("state.json")).unwrap(), newest_bytes);
}

#[test]
fn truncated_live_file_rolls_back() {
    let tmp = tempdir().unwrap();
    let store = open(tmp.path());
    write_leads(&store, "writer", 1);
    write_leads(&store, "writer", 2);

    let path = tmp.path().join("state.json");
    let full = fs::read(&path).unwrap();
    fs::write(&path, &full[..full.len() / 2]).unwrap();

    let doc = store.read_state().unwrap();
    assert_eq!(doc.version, 1);
}

#[test]
fn key_complete_document_with_loose_optional_fields_stays_current() {
    let tmp = tempdir().unwrap();
    let store = open(tmp.path());
    write_leads(&store, "writer", 1);
    write_leads(&store, "writer", 2);

    let path = tmp.path().join("state.json");
    let mut raw: serde_json::Value = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
    raw["blockers"] = json!([{"note": "waiting on dns"}]);
    raw["metrics"]["conversion_rate"] = json!(0.5);
    raw["domain"] = json!(null);
    let edited = serde_json::to_vec_pretty(&raw).unwrap();
    fs::write(&path, &edited).unwrap();

    let (doc, outcome) = store.read_state_with_outcome().unwrap();
    assert_eq!(outcome, ReadOutcome::Current);
    assert_eq!(doc.version, 2);
    assert_eq!(doc.metrics["conversion_rate"], json!(0.5));
    assert_eq!(fs::read(&path).unwrap(), edited);

    // The next write keeps the loosely typed fields.
    write_leads(&store, "writer", 3);
    let on_disk: serde_json::Value = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
    assert_eq!(on_disk["version"], 3);
    assert_eq!(on_disk["blockers"][0]["note"], "waiting on dns");
    assert_eq!(on_disk["metrics"]["conversion_rate"], 0.5);
}

#[test]
fn corrupt_live_file_with_no_snapshots_yields_default() {
    let tmp = tempdir().unwrap();
    let store = open(tmp.path());
    fs::write(tmp.path().join("state.json"), b"not json at all").unwrap();

    let (doc, outcome) = store.read_state_with_outcome().unwrap();
    assert_eq!(outcome, ReadOutcome::Default);
    assert_eq!(doc.version, 0);
}

#[test]
fn history_is_bounded_to_newest_snapshots() {
    let tmp = tempdir().unwrap();
    let store = StateStore::open(&StoreConfig::at(tmp.path()).with_max_versions(5)).unwrap();
    let writes = 12;
    for i in 0..writes {
        write_leads(&store, "writer", i);
    }

    let files = snapshot_files(tmp.path());
    assert!(files.len() <= 5, "kept {} snapshots", files.len());
    assert!(files.len() >= 4);

    let history = store.history().unwrap();
    let names: Vec<String> = history.iter().map(|h| h.name.clone()).collect();
    assert_eq!(names, files);
    let versions: Vec<u64> = history.iter().map(|h| h.version.unwrap()).collect();
    let expected: Vec<u64> = (0..files.len() as u64).map(|i| 11 - i).collect();
    assert_eq!(versions, expected, "snapshots must be the most recent ones");
}

#[test]
fn sanity_check_restores_last_non_negative_value() {
    let tmp = tempdir().unwrap();
    let store = open(tmp.path());
    write_leads(&store, "writer", 40);
    write_leads(&store, "writer", 41);

    // Hand-edit the live file to an inconsistent value.
    let path = tmp.path().join("state.json");
    let mut raw: serde_json::Value = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
    raw["metrics"]["leads_generated"] = json!(-1);
    fs::write(&path, serde_json::to_vec_pretty(&raw).unwrap()).unwrap();

    let doc = store.sanity_check("mailer").unwrap();
    assert_eq!(doc.metric("leads_generated"), 40);
    assert!(doc.is_sane());

    let on_disk: StateDocument = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
    assert_eq!(on_disk.metric("leads_generated"), 40);
}

#[test]
fn handoff_missing_next_steps_writes_no_file() {
    let tmp = tempdir().unwrap();
    let store = open(tmp.path());
    write_leads(&store, "scraper", 5);

    let summary = handoff::summary_from_value(json!({
        "status": "scraped",
        "deliverables": ["leads.csv"],
        "blockers": []
    }))
    .unwrap();
    let err = store.create_handoff("scraper", "enricher", summary).unwrap_err();
    assert!(matches!(err, FrontdeskError::MissingFieldError(ref f) if f == "next_steps"));
    assert!(err.to_string().contains("next_steps"));

    let dir = tmp.path().join("handoffs");
    let count = if dir.exists() {
        fs::read_dir(&dir).unwrap().count()
    } else {
        0
    };
    assert_eq!(count, 0);
}

#[test]
fn handoffs_are_separate_files_keyed_to_version() {
    let tmp = tempdir().unwrap();
    let store = open(tmp.path());
    write_leads(&store, "scraper", 5);
    let state_before = fs::read(tmp.path().join("state.json")).unwrap();

    let summary = json!({
        "status": "scraped",
        "deliverables": ["leads.csv"],
        "blockers": [],
        "next_steps": ["guess emails"]
    });
    let first = store
        .create_handoff(
            "scraper",
            "enricher",
            handoff::summary_from_value(summary.clone()).unwrap(),
        )
        .unwrap();
    let second = store
        .create_handoff(
            "scraper",
            "enricher",
            handoff::summary_from_value(summary).unwrap(),
        )
        .unwrap();
    assert_eq!(first.version, 1);
    assert_ne!(first.id, second.id);

    let mut files: Vec<_> = fs::read_dir(tmp.path().join("handoffs"))
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    files.sort();
    assert_eq!(files.len(), 2);
    for path in &files {
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("handoff_scraper_enricher_"));
        let record: HandoffRecord = serde_json::from_slice(&fs::read(path).unwrap()).unwrap();
        assert_eq!(record.version, 1);
    }
    assert_eq!(fs::read(tmp.path().join("state.json")).unwrap(), state_before);
}

#[test]
fn interrupted_atomic_write_keeps_live_state() {
    let tmp = tempdir().unwrap();
    let store = open(tmp.path());
    write_leads(&store, "writer", 3);
    let path = tmp.path().join("state.json");
    let before = fs::read(&path).unwrap();

    let result = atomic::atomic_write_with(&path, |w| {
        w.write_all(b"{\"project\": \"half")?;
        Err(std::io::Error::other("power loss"))
    });
    assert!(result.is_err());
    assert_eq!(fs::read(&path).unwrap(), before);
    assert!(!atomic::temp_path_for(&path).exists());
    assert_eq!(store.read_state().unwrap().metric("leads_generated"), 3);
}

#[test]
fn audit_log_records_mutations() {
    let tmp = tempdir().unwrap();
    let store = open(tmp.path());
    write_leads(&store, "writer", 1);
    let _ = store.write_state(store.read_state().unwrap(), "late", Some(0));

    let log = fs::read_to_string(tmp.path().join("state.events.jsonl")).unwrap();
    let ops: Vec<(String, String)> = log
        .lines()
        .map(|l| {
            let v: serde_json::Value = serde_json::from_str(l).unwrap();
            (
                v["op"].as_str().unwrap().to_string(),
                v["status"].as_str().unwrap().to_string(),
            )
        })
        .collect();
    assert_eq!(
        ops,
        vec![
            ("write".to_string(), "written".to_string()),
            ("write".to_string(), "conflict".to_string()),
        ]
    );
}
