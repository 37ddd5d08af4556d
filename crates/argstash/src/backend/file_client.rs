//! FileObjectClient: filesystem-backed object storage.
//!
//! Layout:
//! ```text
//! {root}/
//! ├── app/                      # bucket (stash namespace)
//! │   ├── color.5c735d76...     # object (name.digest)
//! │   └── mydatapoint.0a1b...
//! └── other-bucket/
//! ```
//!
//! Objects are write-once: a key is derived from its content, so an existing
//! file already holds the right bytes. Suitable for local use and for shared
//! filesystems, since concurrent writers of one key write identical data.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use super::object_store::{ObjectClient, ObjectClientError};

/// Object client rooted at a local directory.
#[derive(Debug, Clone)]
pub struct FileObjectClient {
    root: PathBuf,
    create_buckets: bool,
}

impl FileObjectClient {
    /// Client that creates bucket directories on first write.
    ///
    /// Nothing touches the filesystem until the first `put`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            create_buckets: true,
        }
    }

    /// Client that refuses to write into buckets that do not exist yet.
    pub fn existing_buckets_only(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            create_buckets: false,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn bucket_path(&self, bucket: &str) -> PathBuf {
        self.root.join(bucket)
    }

    /// Where an object would be stored.
    pub fn object_path(&self, bucket: &str, key: &str) -> PathBuf {
        self.bucket_path(bucket).join(key)
    }
}

fn io_error(context: &str, path: &Path, error: io::Error) -> ObjectClientError {
    ObjectClientError::Other(format!("{} {}: {}", context, path.display(), error))
}

impl ObjectClient for FileObjectClient {
    fn put(&self, bucket: &str, key: &str, bytes: &[u8]) -> Result<(), ObjectClientError> {
        let bucket_path = self.bucket_path(bucket);
        if !bucket_path.is_dir() {
            if !self.create_buckets {
                return Err(ObjectClientError::NoSuchBucket);
            }
            fs::create_dir_all(&bucket_path)
                .map_err(|e| io_error("failed to create bucket", &bucket_path, e))?;
        }

        let obj_path = bucket_path.join(key);
        if obj_path.exists() {
            return Ok(());
        }

        // Write to a sibling temp file, then rename, so readers never see a
        // partial object.
        let mut staging = tempfile::NamedTempFile::new_in(&bucket_path)
            .map_err(|e| io_error("failed to create temp file in", &bucket_path, e))?;
        staging
            .write_all(bytes)
            .map_err(|e| io_error("failed to write", staging.path(), e))?;
        staging
            .persist(&obj_path)
            .map_err(|e| io_error("failed to persist", &obj_path, e.error))?;
        Ok(())
    }

    fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, ObjectClientError> {
        let bucket_path = self.bucket_path(bucket);
        if !bucket_path.is_dir() {
            return Err(ObjectClientError::NoSuchBucket);
        }

        let obj_path = bucket_path.join(key);
        match fs::read(&obj_path) {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(ObjectClientError::NoSuchKey),
            Err(e) => Err(io_error("failed to read", &obj_path, e)),
        }
    }
}
