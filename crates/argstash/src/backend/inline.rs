//! Inline backend: the encoded value is carried in the address.

use stashconf::StashConfig;

use crate::address::{Address, AddressShape};
use crate::codec::ArgValue;
use crate::error::{StashError, StashResult};
use crate::stash::{LinkedStash, Stash};

use super::Backend;

pub const INLINE: &str = "inline";

/// Non-persisting backend for small scalars.
///
/// Accepts booleans, integers, floats, and strings no longer than
/// `max_inline_value_bytes` (UTF-8 bytes). Null, bytes, arrays and maps go
/// to the next backend in line.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineBackend;

impl Backend for InlineBackend {
    fn name(&self) -> &str {
        INLINE
    }

    fn shape(&self) -> AddressShape {
        AddressShape::Inline
    }

    fn accepts(&self, value: &ArgValue, config: &StashConfig) -> bool {
        match value {
            ArgValue::Bool(_) | ArgValue::Int(_) | ArgValue::Float(_) => true,
            ArgValue::Str(s) => s.len() <= config.max_inline_value_bytes,
            ArgValue::Null | ArgValue::Bytes(_) | ArgValue::Array(_) | ArgValue::Map(_) => false,
        }
    }

    fn make_address(&self, stash: &Stash) -> StashResult<Address> {
        Address::inline(INLINE, stash.namespace(), stash.name(), stash.encoded())
    }

    // The address is the storage.
    fn persist(&self, _stash: &LinkedStash) -> StashResult<()> {
        Ok(())
    }

    fn fetch(&self, address: &Address) -> StashResult<Vec<u8>> {
        address
            .inline_payload()?
            .ok_or_else(|| StashError::invalid_address(address.to_string(), "missing inline payload"))
    }
}
