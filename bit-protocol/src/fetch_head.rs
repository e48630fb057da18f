//! `FETCH_HEAD` writing: §4.5 step 7 and §6's on-disk layout. Protected by an advisory
//! `.lock` sibling file, created exclusively and renamed into place on commit — the
//! same lock-then-rename idiom `libbit`'s own lockfile uses, done with async file I/O
//! since the rest of this crate never blocks a thread on disk access.

use std::path::{Path, PathBuf};

use log::debug;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

use crate::error::{Error, Result};
use crate::oid::ObjectId;

/// One line of `FETCH_HEAD`: an object id, the ref it came from, the remote URI, and
/// whether it should be excluded from `git merge`'s default set of heads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchHeadRecord {
    pub id: ObjectId,
    pub source_ref: String,
    pub source_uri: String,
    pub not_for_merge: bool,
}

impl FetchHeadRecord {
    fn to_line(&self) -> String {
        let marker = if self.not_for_merge { "not-for-merge" } else { "" };
        format!("{}\t{}\tbranch '{}' of {}\n", self.id, marker, self.source_ref, self.source_uri)
    }
}

/// Replace `path`'s contents with `records`, one line each, via lock-and-rename.
/// Always replaces wholesale (git's own incremental-append behavior behind `git fetch
/// --append` is a host-level concern, not modeled here).
pub async fn write(path: &Path, records: &[FetchHeadRecord]) -> Result<()> {
    let lock_path = lock_path_for(path);

    let mut lock_file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&lock_path)
        .await
        .map_err(Error::TransportFailure)?;

    let mut contents = String::new();
    for record in records {
        contents.push_str(&record.to_line());
    }

    let result = lock_file.write_all(contents.as_bytes()).await.and(Ok(()));
    drop(lock_file);

    match result {
        Ok(()) => {
            tokio::fs::rename(&lock_path, path).await.map_err(Error::TransportFailure)?;
            debug!("wrote {} FETCH_HEAD record(s) to {}", records.len(), path.display());
            Ok(())
        }
        Err(err) => {
            let _ = tokio::fs::remove_file(&lock_path).await;
            Err(err)
        }
    }
}

fn lock_path_for(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".lock");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, name: &str, not_for_merge: bool) -> FetchHeadRecord {
        FetchHeadRecord {
            id: ObjectId::from(id),
            source_ref: name.to_owned(),
            source_uri: "https://example.com/repo.git".to_owned(),
            not_for_merge,
        }
    }

    #[tokio::test]
    async fn writes_tab_separated_records_with_merge_marker() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("FETCH_HEAD");
        let id = "1".repeat(40);

        write(&path, &[record(&id, "refs/heads/main", false), record(&id, "refs/tags/v1", true)])
            .await
            .unwrap();

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let mut lines = contents.lines();
        assert_eq!(lines.next().unwrap(), format!("{id}\t\tbranch 'refs/heads/main' of https://example.com/repo.git"));
        assert_eq!(
            lines.next().unwrap(),
            format!("{id}\tnot-for-merge\tbranch 'refs/tags/v1' of https://example.com/repo.git")
        );
    }

    #[tokio::test]
    async fn replaces_existing_contents_wholesale() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("FETCH_HEAD");
        let id = "2".repeat(40);

        write(&path, &[record(&id, "refs/heads/main", false)]).await.unwrap();
        write(&path, &[]).await.unwrap();

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(contents.is_empty());
    }

    #[tokio::test]
    async fn lock_file_does_not_survive_a_successful_commit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("FETCH_HEAD");
        write(&path, &[]).await.unwrap();
        assert!(!lock_path_for(&path).exists());
    }
}
