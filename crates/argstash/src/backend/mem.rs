//! Memory backend: a process-local table keyed by address string.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use crate::address::{Address, AddressShape};
use crate::error::{StashError, StashResult};
use crate::stash::{LinkedStash, Stash};

use super::{content_address, Backend};

pub const MEM: &str = "mem";

type MemTable = Arc<RwLock<HashMap<String, Vec<u8>>>>;

/// Table shared by every `MemBackend::shared()` handle.
static SHARED_TABLE: OnceLock<MemTable> = OnceLock::new();

/// Volatile content-addressed backend.
///
/// Handles are cheap clones over the same table. [`MemBackend::shared`]
/// returns a handle onto the process-wide table the registry uses;
/// [`MemBackend::new`] starts an isolated one.
#[derive(Clone, Default)]
pub struct MemBackend {
    table: MemTable,
}

impl MemBackend {
    /// A backend with its own empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// A handle onto the process-wide table.
    pub fn shared() -> Self {
        Self {
            table: SHARED_TABLE.get_or_init(MemTable::default).clone(),
        }
    }

    /// Number of stored stashes.
    pub fn len(&self) -> usize {
        self.table.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every stored stash.
    pub fn clear(&self) {
        self.table
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl Backend for MemBackend {
    fn name(&self) -> &str {
        MEM
    }

    fn shape(&self) -> AddressShape {
        AddressShape::ContentAddressed
    }

    fn make_address(&self, stash: &Stash) -> StashResult<Address> {
        content_address(MEM, stash)
    }

    fn persist(&self, stash: &LinkedStash) -> StashResult<()> {
        // Same address means same bytes, so overwriting is harmless.
        self.table
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(stash.address().to_string(), stash.encoded().to_vec());
        Ok(())
    }

    fn fetch(&self, address: &Address) -> StashResult<Vec<u8>> {
        let key = address.to_string();
        self.table
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .cloned()
            .ok_or(StashError::StashNotFound(key))
    }
}

impl fmt::Debug for MemBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemBackend")
            .field("stash_count", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::ArgValue;
    use stashconf::StashConfig;
    use std::thread;

    #[test]
    fn test_save_and_load() {
        let backend = MemBackend::new();
        let value = ArgValue::map([("color", ArgValue::from("red-red"))]);
        let saved = backend
            .save("mydatapoint", value.clone(), "app", &StashConfig::default())
            .unwrap();

        let rendered = saved.address().to_string();
        assert!(rendered.starts_with("mem://app/mydatapoint."));
        assert_eq!(saved.address().digest(), Some(saved.digest()));

        let loaded = backend.load(&rendered).unwrap();
        assert_eq!(loaded.data(), &value);
        assert_eq!(loaded.backend(), MEM);
        assert_eq!(loaded, saved);
    }

    #[test]
    fn test_same_content_same_address() {
        let backend = MemBackend::new();
        let config = StashConfig::default();
        let a = backend.save("x", ArgValue::Int(7), "ns", &config).unwrap();
        let b = backend.save("x", ArgValue::Int(7), "ns", &config).unwrap();
        assert_eq!(a.address(), b.address());
        assert_eq!(backend.len(), 1);
    }

    #[test]
    fn test_not_found_names_address() {
        let backend = MemBackend::new();
        let address = "mem://ns/missing.28a5e15a666b0cd1415490dcf6674255";
        match backend.load(address) {
            Err(StashError::StashNotFound(missing)) => assert_eq!(missing, address),
            other => panic!("expected StashNotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_isolated_tables() {
        let a = MemBackend::new();
        let b = MemBackend::new();
        let saved = a.save("x", ArgValue::Null, "ns", &StashConfig::default()).unwrap();
        assert!(b.load(&saved.address().to_string()).is_err());
        assert!(a.clone().load(&saved.address().to_string()).is_ok());
    }

    #[test]
    fn test_shared_handles_see_each_other() {
        let saved = MemBackend::shared()
            .save("shared-handle-test", ArgValue::Int(42), "ns", &StashConfig::default())
            .unwrap();
        let loaded = MemBackend::shared().load(&saved.address().to_string()).unwrap();
        assert_eq!(loaded.data(), &ArgValue::Int(42));
    }

    #[test]
    fn test_corrupted_entry_is_detected() {
        let backend = MemBackend::new();
        let saved = backend.save("x", ArgValue::Int(1), "ns", &StashConfig::default()).unwrap();
        backend
            .table
            .write()
            .unwrap()
            .insert(saved.address().to_string(), vec![0x02]);

        let result = backend.load(&saved.address().to_string());
        assert!(matches!(result, Err(StashError::DigestMismatch { .. })));
    }

    #[test]
    fn test_concurrent_saves() {
        let backend = MemBackend::new();
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let backend = backend.clone();
                thread::spawn(move || {
                    backend
                        .save("item", ArgValue::Int(i), "ns", &StashConfig::default())
                        .unwrap()
                })
            })
            .collect();

        for handle in handles {
            let saved = handle.join().unwrap();
            let loaded = backend.load(&saved.address().to_string()).unwrap();
            assert_eq!(loaded.data(), saved.data());
        }
        assert_eq!(backend.len(), 8);
    }

    #[test]
    fn test_cannot_share() {
        let backend = MemBackend::new();
        let saved = backend.save("x", ArgValue::Int(1), "ns", &StashConfig::default()).unwrap();
        assert!(matches!(
            backend.make_share_address(&saved, 10),
            Err(StashError::UnsupportedOperation { .. })
        ));
    }
}
