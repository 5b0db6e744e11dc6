use std::path::PathBuf;
use std::sync::Arc;

use crate::filename::unique_path;
use crate::persist::{AtomicFileWriter, PersistError};
use crate::text::HarvestedRecord;

/// Produces the `written_utc` front-matter value.
pub type Clock = Arc<dyn Fn() -> String + Send + Sync>;

pub fn build_batch_document(
    source: &str,
    part: &str,
    written_utc: &str,
    records: &[HarvestedRecord],
) -> String {
    let mut doc = format!(
        "---\nsource: {source}\npart: {part}\nrecord_count: {count}\nwritten_utc: {written_utc}\n---\n\n",
        count = records.len(),
    );
    for record in records {
        doc.push_str("# ");
        doc.push_str(record.title.trim());
        doc.push_str("\n\n");
        doc.push_str(record.body_text.trim_end());
        doc.push_str("\n\n---\n\n");
    }
    doc
}

/// In-memory batch of text records, written out as numbered Markdown parts.
pub struct TextBatch {
    writer: AtomicFileWriter,
    prefix: String,
    records: Vec<HarvestedRecord>,
    clock: Clock,
}

impl TextBatch {
    pub fn new(dir: PathBuf, prefix: impl Into<String>, clock: Clock) -> Self {
        Self {
            writer: AtomicFileWriter::new(dir),
            prefix: prefix.into(),
            records: Vec::new(),
            clock,
        }
    }

    pub fn push(&mut self, record: HarvestedRecord) {
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Write `{prefix}_Part_{file_idx}.md` and start an empty batch.
    /// On failure the records are kept for the next flush.
    pub fn flush_part(&mut self, file_idx: u64) -> Result<PathBuf, PersistError> {
        let name = format!("{}_Part_{}.md", self.prefix, file_idx);
        let doc = build_batch_document(
            &self.prefix,
            &file_idx.to_string(),
            &(self.clock)(),
            &self.records,
        );
        let path = self.writer.replace(&name, doc.as_bytes())?;
        self.records.clear();
        Ok(path)
    }

    /// Write whatever is unflushed to `{prefix}_Final_Part.md`, de-collided
    /// so an earlier run's final part is never replaced.
    pub fn flush_final(&mut self) -> Result<PathBuf, PersistError> {
        crate::persist::ensure_output_dir(self.writer.dir())?;
        let doc = build_batch_document(&self.prefix, "final", &(self.clock)(), &self.records);
        let base = format!("{}_Final_Part.md", self.prefix);
        loop {
            let target = unique_path(self.writer.dir(), &base);
            let name = target
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| base.clone());
            match self.writer.create_new(&name, doc.as_bytes()) {
                Ok(path) => {
                    self.records.clear();
                    return Ok(path);
                }
                Err(PersistError::AlreadyExists(_)) => continue,
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(title: &str) -> HarvestedRecord {
        HarvestedRecord {
            title: title.to_string(),
            body_text: format!("{title} body"),
        }
    }

    #[test]
    fn failed_part_keeps_records_for_the_retry() {
        let dir = tempfile::TempDir::new().unwrap();
        let blocked = dir.path().join("Forum_Part_1.md");
        std::fs::create_dir_all(blocked.join("occupied")).unwrap();
        let mut batch = TextBatch::new(
            dir.path().to_path_buf(),
            "Forum",
            Arc::new(|| "2026-01-01T00:00:00Z".to_string()),
        );
        assert!(batch.is_empty());
        batch.push(record("One"));
        batch.push(record("Two"));

        assert!(batch.flush_part(1).is_err());
        assert_eq!(batch.len(), 2);

        std::fs::remove_dir_all(&blocked).unwrap();
        let path = batch.flush_part(1).unwrap();
        assert!(batch.is_empty());
        let written = std::fs::read_to_string(path).unwrap();
        assert!(written.contains("record_count: 2"));
        assert!(written.contains("# One\n\nOne body"));
    }
}
