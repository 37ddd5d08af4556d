//! Stash and LinkedStash: immutable records binding a name to a value.
//!
//! A [`Stash`] is built by [`Stash::new`], which encodes and hashes the value
//! up front; there is no way to change any field afterwards. Handing a stash
//! to a backend produces a [`LinkedStash`], which additionally records the
//! backend and the address it was stored under.

use std::fmt;

use crate::address::Address;
use crate::codec::{self, ArgValue};
use crate::digest::Digest;
use crate::error::StashResult;

/// Namespace used when the caller does not pick one.
pub const DEFAULT_NAMESPACE: &str = "default";

/// A named value with its encoding and content digest.
#[derive(Clone, PartialEq)]
pub struct Stash {
    namespace: String,
    name: String,
    data: ArgValue,
    encoded: Vec<u8>,
    digest: Digest,
}

impl Stash {
    /// Encode and hash `data`. Performs no I/O.
    pub fn new(namespace: &str, name: &str, data: ArgValue) -> StashResult<Self> {
        let encoded = codec::encode(&data)?;
        let digest = Digest::of(&encoded);
        Ok(Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
            data,
            encoded,
            digest,
        })
    }

    /// Rebuild a stash from bytes fetched out of a backend.
    pub fn decode(namespace: &str, name: &str, encoded: Vec<u8>) -> StashResult<Self> {
        let data = codec::decode(&encoded)?;
        let digest = Digest::of(&encoded);
        Ok(Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
            data,
            encoded,
            digest,
        })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data(&self) -> &ArgValue {
        &self.data
    }

    pub fn encoded(&self) -> &[u8] {
        &self.encoded
    }

    pub fn digest(&self) -> &Digest {
        &self.digest
    }

    /// Attach the backend and address. The only way to get a LinkedStash.
    pub fn link(self, backend: &str, address: Address) -> LinkedStash {
        LinkedStash {
            stash: self,
            backend: backend.to_string(),
            address,
        }
    }
}

impl fmt::Debug for Stash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stash")
            .field("namespace", &self.namespace)
            .field("name", &self.name)
            .field("digest", &self.digest)
            .finish()
    }
}

/// A stash bound to the backend that holds it and the address naming it.
#[derive(Clone, PartialEq)]
pub struct LinkedStash {
    stash: Stash,
    backend: String,
    address: Address,
}

impl LinkedStash {
    /// Name of the backend (its registry key).
    pub fn backend(&self) -> &str {
        &self.backend
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn stash(&self) -> &Stash {
        &self.stash
    }

    pub fn into_stash(self) -> Stash {
        self.stash
    }

    pub fn namespace(&self) -> &str {
        self.stash.namespace()
    }

    pub fn name(&self) -> &str {
        self.stash.name()
    }

    pub fn data(&self) -> &ArgValue {
        self.stash.data()
    }

    pub fn encoded(&self) -> &[u8] {
        self.stash.encoded()
    }

    pub fn digest(&self) -> &Digest {
        self.stash.digest()
    }
}

impl fmt::Debug for LinkedStash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinkedStash")
            .field("namespace", &self.stash.namespace)
            .field("name", &self.stash.name)
            .field("backend", &self.backend)
            .field("address", &self.address.to_string())
            .finish()
    }
}
