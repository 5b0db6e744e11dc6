use std::fs;

use harvester_engine::{ensure_output_dir, AtomicFileWriter, PersistError};
use tempfile::TempDir;

#[test]
fn creates_missing_output_dir() {
    let temp = TempDir::new().unwrap();
    let new_dir = temp.path().join("out").join("nested");
    assert!(!new_dir.exists());
    ensure_output_dir(&new_dir).unwrap();
    assert!(new_dir.is_dir());
}

#[test]
fn output_dir_that_is_a_file_is_rejected() {
    let temp = TempDir::new().unwrap();
    let file_path = temp.path().join("not_a_dir");
    fs::write(&file_path, "x").unwrap();

    assert!(matches!(
        ensure_output_dir(&file_path),
        Err(PersistError::OutputDir(_))
    ));
}

#[test]
fn replace_overwrites_existing_content() {
    let temp = TempDir::new().unwrap();
    let writer = AtomicFileWriter::new(temp.path().to_path_buf());

    let first = writer.replace("state.json", b"[]").unwrap();
    let second = writer.replace("state.json", b"[\"a\"]").unwrap();

    assert_eq!(first, second);
    assert_eq!(fs::read_to_string(&second).unwrap(), "[\"a\"]");
}

#[test]
fn create_new_refuses_to_clobber() {
    let temp = TempDir::new().unwrap();
    let writer = AtomicFileWriter::new(temp.path().to_path_buf());
    writer.create_new("a.pdf", b"one").unwrap();

    let err = writer.create_new("a.pdf", b"two").unwrap_err();

    assert!(matches!(err, PersistError::AlreadyExists(path) if path == temp.path().join("a.pdf")));
    assert_eq!(fs::read(temp.path().join("a.pdf")).unwrap(), b"one");
    assert_eq!(fs::read_dir(temp.path()).unwrap().count(), 1);
}

#[test]
fn no_partial_file_on_error() {
    let temp = TempDir::new().unwrap();
    let file_path = temp.path().join("not_a_dir");
    fs::write(&file_path, "x").unwrap();

    let writer = AtomicFileWriter::new(file_path.clone());
    assert!(writer.replace("doc.md", b"data").is_err());
    assert!(!file_path.with_file_name("doc.md").exists());
}
