//! Object-store backend: bucket/key storage such as S3.
//!
//! The namespace names the bucket and the key is `<name>.<digest>`, so the
//! address `s3://bucket/name.digest` maps one-to-one onto a stored object.
//! The actual transport sits behind [`ObjectClient`].

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

use crate::address::{Address, AddressShape};
use crate::error::{StashError, StashResult};
use crate::stash::{LinkedStash, Stash};

use super::{content_address, Backend};

pub const S3: &str = "s3";

/// Errors an object-storage client reports.
#[derive(Debug, Error)]
pub enum ObjectClientError {
    #[error("no such key")]
    NoSuchKey,

    #[error("no such bucket")]
    NoSuchBucket,

    #[error("presigned URLs are not supported by this client")]
    PresignUnsupported,

    #[error("{0}")]
    Other(String),
}

/// Minimal object-storage client.
pub trait ObjectClient: Send + Sync {
    fn put(&self, bucket: &str, key: &str, bytes: &[u8]) -> Result<(), ObjectClientError>;

    fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, ObjectClientError>;

    /// URL granting read access to `bucket/key` for `ttl`.
    fn presign_get(
        &self,
        _bucket: &str,
        _key: &str,
        _ttl: Duration,
    ) -> Result<String, ObjectClientError> {
        Err(ObjectClientError::PresignUnsupported)
    }
}

/// Content-addressed backend over an [`ObjectClient`].
#[derive(Clone)]
pub struct ObjectStoreBackend {
    client: Arc<dyn ObjectClient>,
}

impl ObjectStoreBackend {
    pub fn new(client: Arc<dyn ObjectClient>) -> Self {
        Self { client }
    }

    fn remote(&self, address: &Address, op: &str, error: ObjectClientError) -> StashError {
        warn!(backend = S3, %address, op, %error, "object store request failed");
        StashError::remote(S3, format!("{} {}: {}", op, address, error))
    }
}

impl Backend for ObjectStoreBackend {
    fn name(&self) -> &str {
        S3
    }

    fn shape(&self) -> AddressShape {
        AddressShape::ContentAddressed
    }

    fn make_address(&self, stash: &Stash) -> StashResult<Address> {
        content_address(S3, stash)
    }

    fn persist(&self, stash: &LinkedStash) -> StashResult<()> {
        let address = stash.address();
        self.client
            .put(address.namespace(), &address.key(), stash.encoded())
            .map_err(|e| self.remote(address, "put", e))
    }

    fn fetch(&self, address: &Address) -> StashResult<Vec<u8>> {
        match self.client.get(address.namespace(), &address.key()) {
            Ok(bytes) => Ok(bytes),
            Err(ObjectClientError::NoSuchKey | ObjectClientError::NoSuchBucket) => {
                Err(StashError::StashNotFound(address.to_string()))
            }
            Err(e) => Err(self.remote(address, "get", e)),
        }
    }

    fn make_share_address(&self, stash: &LinkedStash, ttl_seconds: u64) -> StashResult<String> {
        let address = stash.address();
        let ttl = Duration::from_secs(ttl_seconds);
        match self.client.presign_get(address.namespace(), &address.key(), ttl) {
            Ok(url) => Ok(url),
            Err(ObjectClientError::PresignUnsupported) => {
                Err(StashError::unsupported(S3, "share"))
            }
            Err(ObjectClientError::NoSuchKey | ObjectClientError::NoSuchBucket) => {
                Err(StashError::StashNotFound(address.to_string()))
            }
            Err(e) => Err(self.remote(address, "presign", e)),
        }
    }
}

impl fmt::Debug for ObjectStoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectStoreBackend").finish_non_exhaustive()
    }
}
