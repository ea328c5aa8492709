//! `ObjectStore`: the opaque interface this crate treats the cloud
//! object-store SDK through. Wiring a real cloud SDK behind it is deliberately
//! out of scope. `FsObjectStore` is a filesystem-backed reference
//! implementation used by the CLI's local mode and by the test suite.

use std::{
    fs,
    io::{self, Read, Write},
    path::PathBuf,
};

use crate::error::ArcError;

/// Outcome of a `head_object` call.
pub enum HeadResult {
    Found { etag: String },
    NotFound,
}

/// The object-store SDK, abstracted to exactly the two operations the
/// Uploader Driver needs.
pub trait ObjectStore {
    fn head_object(&self, bucket: &str, key: &str) -> Result<HeadResult, ArcError>;

    fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: &mut dyn Read,
        storage_class: &str,
        content_md5: &str,
    ) -> Result<String, ArcError>;
}

/// A local-filesystem reference implementation: `bucket` is a subdirectory
/// of `root`, `key` is a relative path under that, and the etag is the
/// quoted MD5 hex of the stored content, mirroring a typical quoted-hex ETag
/// convention closely enough that the driver's "strip one leading and one
/// trailing character" comparison exercises the same code path it would
/// against a real object store.
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn object_path(&self, bucket: &str, key: &str) -> PathBuf {
        self.root.join(bucket).join(key)
    }
}

impl ObjectStore for FsObjectStore {
    fn head_object(&self, bucket: &str, key: &str) -> Result<HeadResult, ArcError> {
        let path = self.object_path(bucket, key);
        if !path.exists() {
            return Ok(HeadResult::NotFound);
        }
        let data = fs::read(&path)?;
        let digest = md5::compute(&data);
        Ok(HeadResult::Found {
            etag: format!("\"{:x}\"", digest),
        })
    }

    fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: &mut dyn Read,
        _storage_class: &str,
        _content_md5: &str,
    ) -> Result<String, ArcError> {
        let path = self.object_path(bucket, key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut data = Vec::new();
        body.read_to_end(&mut data)
            .map_err(|e: io::Error| ArcError::ClientError(e.to_string()))?;

        let mut file = fs::File::create(&path)?;
        file.write_all(&data)?;

        let digest = md5::compute(&data);
        Ok(format!("\"{:x}\"", digest))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn head_missing_object_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(dir.path().to_path_buf());
        let result = store.head_object("my-bucket", "some/key").unwrap();
        assert!(matches!(result, HeadResult::NotFound));
    }

    #[test]
    fn put_then_head_returns_matching_etag() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(dir.path().to_path_buf());
        let mut body = Cursor::new(b"hello world".to_vec());
        let etag = store
            .put_object("my-bucket", "some/key", &mut body, "STANDARD", "")
            .unwrap();

        let head = store.head_object("my-bucket", "some/key").unwrap();
        match head {
            HeadResult::Found { etag: head_etag } => assert_eq!(head_etag, etag),
            HeadResult::NotFound => panic!("expected object to exist"),
        }
    }
}
