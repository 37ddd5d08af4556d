//! Argument stashing: pass values around as short, self-describing addresses.
//!
//! A value is encoded (MessagePack), hashed (BLAKE3, 128 bits), and handed to
//! the first enabled backend willing to hold it. The caller gets back an
//! address string that any process with the same configuration can turn back
//! into the value.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use argstash::{create, retrieve, ArgValue, StashConfig};
//!
//! let config = StashConfig::load().unwrap();
//!
//! // Small scalars ride inside the address itself
//! let color = create("color", "red-red", "app", &config).unwrap();
//! println!("{}", color.address()); // inline://app/color?data=p3JlZC1yZWQ%3D
//!
//! // Larger values go to the next backend in line
//! let point = create(
//!     "mydatapoint",
//!     ArgValue::map([("color", ArgValue::from("red-red"))]),
//!     "app",
//!     &config,
//! )
//! .unwrap();
//! println!("{}", point.address()); // mem://app/mydatapoint.<digest>
//!
//! let again = retrieve(point.address(), &config).unwrap();
//! assert_eq!(again.data(), point.data());
//! ```
//!
//! # Addresses
//!
//! ```text
//! <scheme>://<namespace>/<name>.<digest>    mem, s3
//! <scheme>://<namespace>/<name>?data=<b64>  inline
//! https://<host>/<path>                     read-only fetch
//! ```
//!
//! # Configuration
//!
//! See [`stashconf`]. `backends` is both the enabled set and the write
//! priority.

pub mod address;
pub mod api;
pub mod backend;
pub mod codec;
pub mod digest;
pub mod error;
pub mod registry;
pub mod stash;

// Re-exports for convenience
pub use address::{Address, AddressShape};
pub use api::{create, retrieve, share};
pub use backend::{
    Backend, FileObjectClient, HttpBackend, HttpClient, HttpClientError, HttpResponse,
    InlineBackend, MemBackend, ObjectClient, ObjectClientError, ObjectStoreBackend, ReqwestClient,
};
pub use codec::{decode, encode, ArgValue};
pub use digest::{Digest, DigestError};
pub use error::{StashError, StashResult};
pub use registry::{BackendFactory, BackendRegistry};
pub use stash::{LinkedStash, Stash, DEFAULT_NAMESPACE};
pub use stashconf::StashConfig;
