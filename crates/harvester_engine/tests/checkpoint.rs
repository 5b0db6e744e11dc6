use std::fs;

use harvester_core::{Checkpoint, RunCounters, RunMode, SeenSet};
use harvester_engine::{CheckpointError, CheckpointStore};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tempfile::TempDir;

fn seen(ids: &[&str]) -> SeenSet {
    ids.iter().map(|id| id.to_string()).collect()
}

#[test]
fn missing_checkpoint_is_empty_state() {
    let temp = TempDir::new().unwrap();
    let store = CheckpointStore::new(temp.path().join("progress.json"), RunMode::Text);

    assert_eq!(store.load().unwrap(), Checkpoint::default());
}

#[test]
fn attachment_checkpoint_is_a_bare_list() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("download_progress.json");
    let store = CheckpointStore::new(path.clone(), RunMode::Attachments);

    store
        .save(&Checkpoint {
            seen: seen(&["read?id=2", "read?id=1"]),
            counters: None,
        })
        .unwrap();

    let raw: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(raw, json!(["read?id=1", "read?id=2"]));
    let loaded = store.load().unwrap();
    assert_eq!(loaded.seen, seen(&["read?id=1", "read?id=2"]));
    assert_eq!(loaded.counters, None);
}

#[test]
fn text_checkpoint_keeps_counters() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("crawl_progress.json");
    let store = CheckpointStore::new(path.clone(), RunMode::Text);
    let checkpoint = Checkpoint {
        seen: seen(&["a", "b"]),
        counters: Some(RunCounters {
            total_count: 250,
            file_idx: 3,
        }),
    };

    store.save(&checkpoint).unwrap();

    let raw: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(raw["total_count"], 250);
    assert_eq!(raw["file_idx"], 3);
    assert_eq!(raw["seen_hrefs"], json!(["a", "b"]));
    assert_eq!(store.load().unwrap(), checkpoint);
}

#[test]
fn reads_files_written_by_earlier_tools() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("crawl_progress.json");
    fs::write(&path, r#"{"seen_hrefs": ["x"], "total_count": 7}"#).unwrap();

    let loaded = CheckpointStore::new(path, RunMode::Text).load().unwrap();

    assert_eq!(loaded.seen, seen(&["x"]));
    assert_eq!(
        loaded.counters,
        Some(RunCounters {
            total_count: 7,
            file_idx: 1,
        })
    );
}

#[test]
fn corrupt_checkpoint_is_an_error() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("progress.json");
    fs::write(&path, "[1, 2").unwrap();

    let err = CheckpointStore::new(path, RunMode::Attachments)
        .load()
        .unwrap_err();

    assert!(matches!(err, CheckpointError::Corrupt { .. }));
}

#[test]
fn save_leaves_no_temp_files_behind() {
    let temp = TempDir::new().unwrap();
    let store = CheckpointStore::new(temp.path().join("progress.json"), RunMode::Attachments);

    for round in 0..3 {
        store
            .save(&Checkpoint {
                seen: seen(&[format!("id-{round}").as_str()]),
                counters: None,
            })
            .unwrap();
    }

    let names: Vec<String> = fs::read_dir(temp.path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["progress.json".to_string()]);
    assert_eq!(store.load().unwrap().seen, seen(&["id-2"]));
}
