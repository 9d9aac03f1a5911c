//! Filesystem document source.
//!
//! Layout:
//!
//! ```text
//! <root>/<case_id>/<document files>
//! <root>/<case_id>/mutations.log   one RFC 3339 timestamp per line, newest last
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use juris_abstraction::{Document, DocumentSource, StoreError};
use sha2::{Digest, Sha256};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

/// File recording case mutations; never treated as a document.
pub const MUTATIONS_LOG: &str = "mutations.log";

/// Hex SHA-256 of `bytes`.
pub fn content_hash(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Reads case documents from a directory tree.
#[derive(Debug, Clone)]
pub struct FsDocumentSource {
    root: PathBuf,
}

impl FsDocumentSource {
    /// Creates a source rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn case_dir(&self, case_id: &str) -> Result<PathBuf, StoreError> {
        let valid = !case_id.is_empty()
            && case_id != "."
            && case_id != ".."
            && !case_id.contains(['/', '\\']);
        if !valid {
            return Err(StoreError::InvalidData(format!("invalid case id '{}'", case_id)));
        }
        Ok(self.root.join(case_id))
    }

    /// Appends a mutation timestamp to the case log.
    ///
    /// # Errors
    /// Returns `StoreError` if the case directory cannot be written.
    pub async fn record_mutation(&self, case_id: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        use tokio::io::AsyncWriteExt;

        let path = self.case_dir(case_id)?.join(MUTATIONS_LOG);
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| io_error(&path, &e))?;
        file.write_all(format!("{}\n", at.to_rfc3339()).as_bytes())
            .await
            .map_err(|e| io_error(&path, &e))?;
        Ok(())
    }
}

fn io_error(path: &Path, err: &std::io::Error) -> StoreError {
    if err.kind() == ErrorKind::NotFound {
        StoreError::NotFound(path.display().to_string())
    } else {
        StoreError::Unavailable(format!("{}: {}", path.display(), err))
    }
}

#[async_trait]
impl DocumentSource for FsDocumentSource {
    async fn get_documents(&self, case_id: &str) -> Result<Vec<Document>, StoreError> {
        let dir = self.case_dir(case_id)?;
        let mut entries = tokio::fs::read_dir(&dir).await.map_err(|e| io_error(&dir, &e))?;

        let mut paths = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| io_error(&dir, &e))? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name == MUTATIONS_LOG || name.starts_with('.') {
                continue;
            }
            let file_type = entry.file_type().await.map_err(|e| io_error(&entry.path(), &e))?;
            if file_type.is_file() {
                paths.push((name, entry.path()));
            }
        }
        paths.sort();

        let mut documents = Vec::with_capacity(paths.len());
        for (name, path) in paths {
            let bytes = tokio::fs::read(&path).await.map_err(|e| io_error(&path, &e))?;
            documents.push(Document {
                id: name,
                content_hash: content_hash(&bytes),
                size_bytes: bytes.len() as u64,
                text: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }

        debug!(case_id = %case_id, documents = documents.len(), "Loaded case documents");
        Ok(documents)
    }

    async fn last_mutation_at(&self, case_id: &str) -> Result<Option<DateTime<Utc>>, StoreError> {
        let path = self.case_dir(case_id)?.join(MUTATIONS_LOG);
        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error(&path, &e)),
        };

        let Some(line) = contents.lines().map(str::trim).rfind(|l| !l.is_empty()) else {
            return Ok(None);
        };

        DateTime::parse_from_rfc3339(line)
            .map(|dt| Some(dt.with_timezone(&Utc)))
            .map_err(|e| StoreError::InvalidData(format!("{}: bad timestamp '{}': {}", path.display(), line, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn case_fixture() -> (tempfile::TempDir, FsDocumentSource) {
        let dir = tempfile::tempdir().unwrap();
        let case = dir.path().join("case-1");
        std::fs::create_dir(&case).unwrap();
        std::fs::write(case.join("b-motion.txt"), "Motion to dismiss").unwrap();
        std::fs::write(case.join("a-complaint.txt"), "Complaint for damages").unwrap();
        std::fs::write(case.join(".hidden"), "ignored").unwrap();
        let source = FsDocumentSource::new(dir.path());
        (dir, source)
    }

    #[tokio::test]
    async fn test_documents_sorted_and_hashed() {
        let (_dir, source) = case_fixture();
        let docs = source.get_documents("case-1").await.unwrap();

        let ids: Vec<_> = docs.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["a-complaint.txt", "b-motion.txt"]);
        assert_eq!(docs[0].content_hash, content_hash(b"Complaint for damages"));
        assert_eq!(docs[0].content_hash.len(), 64);
        assert_eq!(docs[1].size_bytes, 17);
        assert_eq!(docs[1].text, "Motion to dismiss");
    }

    #[tokio::test]
    async fn test_missing_case_is_not_found() {
        let (_dir, source) = case_fixture();
        let err = source.get_documents("case-404").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_path_traversal_rejected() {
        let (_dir, source) = case_fixture();
        assert!(matches!(
            source.get_documents("../etc").await,
            Err(StoreError::InvalidData(_))
        ));
    }

    #[tokio::test]
    async fn test_mutation_log_latest_line_wins() {
        let (_dir, source) = case_fixture();
        assert_eq!(source.last_mutation_at("case-1").await.unwrap(), None);

        let first = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        let second = Utc.with_ymd_and_hms(2024, 5, 2, 14, 30, 0).unwrap();
        source.record_mutation("case-1", first).await.unwrap();
        source.record_mutation("case-1", second).await.unwrap();

        assert_eq!(source.last_mutation_at("case-1").await.unwrap(), Some(second));

        let docs = source.get_documents("case-1").await.unwrap();
        assert!(docs.iter().all(|d| d.id != MUTATIONS_LOG));
    }

    #[tokio::test]
    async fn test_garbled_mutation_log_is_invalid_data() {
        let (dir, source) = case_fixture();
        std::fs::write(dir.path().join("case-1").join(MUTATIONS_LOG), "yesterday\n").unwrap();
        assert!(matches!(
            source.last_mutation_at("case-1").await,
            Err(StoreError::InvalidData(_))
        ));
    }
}
