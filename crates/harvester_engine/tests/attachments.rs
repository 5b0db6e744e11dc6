mod support;

use std::fs;
use std::time::Duration;

use harvester_engine::{AttachmentHarvester, FrameResolver};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

use support::scripted_forum::{Attachment, Post, ScriptedForum};

fn resolver() -> FrameResolver {
    FrameResolver::new("a[href*='dn?']", "a[href*='sf?']")
}

#[tokio::test]
async fn hanging_download_is_skipped_and_siblings_are_saved() {
    let temp = TempDir::new().unwrap();
    let forum = ScriptedForum::new(vec![vec![Post::new("read?id=1", "Minutes")
        .with_attachment(Attachment::file("a.pdf", b"a"))
        .with_attachment(Attachment::Hangs)
        .with_attachment(Attachment::file("c.pdf", b"c"))]]);
    let detail = forum.open_detail(0, 0);
    let resolver = resolver();

    let harvester = AttachmentHarvester::new(
        &forum,
        &resolver,
        temp.path().to_path_buf(),
        Duration::from_millis(20),
    );
    let report = harvester.harvest(&detail, "Minutes").await;

    assert_eq!(report.affordances, 3);
    assert_eq!(
        report.saved,
        vec![
            temp.path().join("Minutes_a.pdf"),
            temp.path().join("Minutes_c.pdf"),
        ]
    );
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].0, 1);
    assert!(report.any_captured());
}

#[tokio::test]
async fn preview_view_is_closed_but_detail_stays_open() {
    let temp = TempDir::new().unwrap();
    let forum = ScriptedForum::new(vec![vec![Post::new("read?id=1", "Photos").with_attachment(
        Attachment::OpensPreview {
            name: "p.jpg".to_string(),
            bytes: b"jpg".to_vec(),
        },
    )]]);
    let detail = forum.open_detail(0, 0);
    let resolver = resolver();

    let report = AttachmentHarvester::new(
        &forum,
        &resolver,
        temp.path().to_path_buf(),
        Duration::from_millis(20),
    )
    .harvest(&detail, "Photos")
    .await;

    assert_eq!(report.saved.len(), 1);
    assert_eq!(forum.closed_views().len(), 1);
    assert!(forum.closed_views()[0].0.starts_with("preview-"));
    assert!(forum.open_views().contains(&detail));
}

#[tokio::test]
async fn colliding_names_get_numeric_suffixes() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("Notes_a.pdf"), b"older").unwrap();
    let forum = ScriptedForum::new(vec![vec![Post::new("read?id=1", "Notes")
        .with_attachment(Attachment::file("a.pdf", b"first"))
        .with_attachment(Attachment::file("a.pdf", b"second"))]]);
    let detail = forum.open_detail(0, 0);
    let resolver = resolver();

    let report = AttachmentHarvester::new(
        &forum,
        &resolver,
        temp.path().to_path_buf(),
        Duration::from_millis(20),
    )
    .harvest(&detail, "Notes")
    .await;

    assert_eq!(fs::read(temp.path().join("Notes_a.pdf")).unwrap(), b"older");
    assert_eq!(fs::read(temp.path().join("Notes_a_1.pdf")).unwrap(), b"first");
    assert_eq!(fs::read(temp.path().join("Notes_a_2.pdf")).unwrap(), b"second");
    assert_eq!(report.saved.len(), 2);
}

#[tokio::test]
async fn post_without_attachments_reports_nothing() {
    let temp = TempDir::new().unwrap();
    let forum = ScriptedForum::new(vec![vec![Post::new("read?id=1", "Chat")]]);
    let detail = forum.open_detail(0, 0);
    let resolver = resolver();

    let report = AttachmentHarvester::new(
        &forum,
        &resolver,
        temp.path().to_path_buf(),
        Duration::from_millis(20),
    )
    .harvest(&detail, "Chat")
    .await;

    assert_eq!(report.affordances, 0);
    assert!(!report.any_captured());
    assert_eq!(fs::read_dir(temp.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn view_listing_failure_skips_only_that_download() {
    let temp = TempDir::new().unwrap();
    let forum = ScriptedForum::new(vec![vec![Post::new("read?id=1", "Pair")
        .with_attachment(Attachment::file("first.pdf", b"1"))
        .with_attachment(Attachment::file("second.pdf", b"2"))]]);
    let detail = forum.open_detail(0, 0);
    let resolver = resolver();
    forum.fail_views(1);

    let report = AttachmentHarvester::new(
        &forum,
        &resolver,
        temp.path().to_path_buf(),
        Duration::from_millis(20),
    )
    .harvest(&detail, "Pair")
    .await;

    assert_eq!(report.affordances, 2);
    assert_eq!(report.saved, vec![temp.path().join("Pair_second.pdf")]);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].0, 0);
    assert!(report.skipped[0].1.contains("connection reset"), "{}", report.skipped[0].1);
    assert!(!temp.path().join("Pair_first.pdf").exists());
    assert!(forum.open_views().contains(&detail));
}
