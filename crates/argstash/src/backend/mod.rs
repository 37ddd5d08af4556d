//! Storage backends.
//!
//! A backend owns one address scheme. It decides which values it will take,
//! derives addresses from stashes, and moves encoded bytes to and from
//! wherever it keeps them. The save and load sequences are shared and live
//! on the trait as provided methods:
//!
//! - save: `accepts` -> encode + hash -> `make_address` -> `persist`
//! - load: `parse_address` -> `fetch` -> digest check -> decode
//!
//! # Variants
//!
//! - [`InlineBackend`] (`inline`) -- the payload rides in the address itself
//! - [`MemBackend`] (`mem`) -- process-local table, lost on exit
//! - [`ObjectStoreBackend`] (`s3`) -- bucket/key object storage
//! - [`HttpBackend`] (`https`) -- read-only fetch by URL

pub mod file_client;
pub mod http;
pub mod inline;
pub mod mem;
pub mod object_store;

pub use file_client::FileObjectClient;
pub use http::{HttpBackend, HttpClient, HttpClientError, HttpResponse, ReqwestClient};
pub use inline::InlineBackend;
pub use mem::MemBackend;
pub use object_store::{ObjectClient, ObjectClientError, ObjectStoreBackend};

use stashconf::StashConfig;
use tracing::debug;

use crate::address::{Address, AddressShape};
use crate::codec::ArgValue;
use crate::digest::Digest;
use crate::error::{StashError, StashResult};
use crate::stash::{LinkedStash, Stash};

/// A storage strategy for one address scheme.
///
/// Implementations must be cheap to share across threads; the registry hands
/// out `Arc<dyn Backend>`.
pub trait Backend: Send + Sync {
    /// Registry key, which is also the address scheme.
    fn name(&self) -> &str;

    /// Grammar of this backend's addresses.
    fn shape(&self) -> AddressShape;

    /// Whether this backend is willing to store `value`.
    fn accepts(&self, _value: &ArgValue, _config: &StashConfig) -> bool {
        true
    }

    /// Derive the address naming `stash` on this backend.
    fn make_address(&self, stash: &Stash) -> StashResult<Address>;

    /// Parse and validate an address against this backend's grammar.
    fn parse_address(&self, address: &str) -> StashResult<Address> {
        Address::parse(address, self.name(), self.shape())
    }

    /// Store the encoded bytes of a freshly linked stash.
    fn persist(&self, stash: &LinkedStash) -> StashResult<()>;

    /// Fetch the encoded bytes named by an already-parsed address.
    fn fetch(&self, address: &Address) -> StashResult<Vec<u8>>;

    /// Produce a time-limited URL that dereferences to the stored bytes.
    fn make_share_address(&self, _stash: &LinkedStash, _ttl_seconds: u64) -> StashResult<String> {
        Err(StashError::unsupported(self.name(), "share"))
    }

    /// Encode `data`, derive its address and persist it.
    fn save(
        &self,
        name: &str,
        data: ArgValue,
        namespace: &str,
        config: &StashConfig,
    ) -> StashResult<LinkedStash> {
        if !self.accepts(&data, config) {
            return Err(StashError::UnsupportedOperation {
                backend: self.name().to_string(),
                operation: "save of this value",
            });
        }
        let stash = Stash::new(namespace, name, data)?;
        let address = self.make_address(&stash)?;
        let linked = stash.link(self.name(), address);
        self.persist(&linked)?;
        debug!(backend = self.name(), address = %linked.address(), "saved stash");
        Ok(linked)
    }

    /// Parse `address`, fetch its bytes and rebuild the stash.
    fn load(&self, address: &str) -> StashResult<LinkedStash> {
        let address = self.parse_address(address)?;
        let encoded = self.fetch(&address)?;
        if let Some(expected) = address.digest() {
            verify_digest(&address, expected, &encoded)?;
        }
        let stash = Stash::decode(address.namespace(), address.name(), encoded)?;
        debug!(backend = self.name(), address = %address, "loaded stash");
        Ok(stash.link(self.name(), address))
    }
}

fn verify_digest(address: &Address, expected: &Digest, encoded: &[u8]) -> StashResult<()> {
    let computed = Digest::of(encoded);
    if &computed != expected {
        return Err(StashError::DigestMismatch {
            address: address.to_string(),
            computed: computed.into_inner(),
        });
    }
    Ok(())
}

/// Content-addressed address for `stash` under `scheme`.
pub(crate) fn content_address(scheme: &str, stash: &Stash) -> StashResult<Address> {
    Address::content_addressed(scheme, stash.namespace(), stash.name(), stash.digest().clone())
}
