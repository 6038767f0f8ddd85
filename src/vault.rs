//! Encrypted secrets vault on top of the ticket store.
//!
//! Plaintext secrets and derived keys exist only in memory for the span of
//! one call. Only `{name, ciphertext, salt, nonce}` reaches the store.

use crate::crypto;
use crate::models::KeyEntry;
use crate::storage::Store;
use crate::{Error, Result};
use tracing::{debug, info};

/// Names that `ticket key <name> <password>` would parse as a subcommand.
const RESERVED_KEY_NAMES: &[&str] = &["add", "list", "rm", "help"];

/// Named secrets sealed under per-secret passwords.
pub struct Vault<'a> {
    store: &'a mut Store,
}

impl<'a> Vault<'a> {
    pub fn new(store: &'a mut Store) -> Self {
        Self { store }
    }

    /// Encrypt and store a secret, overwriting any entry with the same name.
    ///
    /// A fresh salt and nonce are generated on every call.
    pub fn add(&mut self, name: &str, plaintext: &str, password: &str) -> Result<()> {
        if name.trim().is_empty() {
            return Err(Error::InvalidInput("key name is empty".to_string()));
        }
        if RESERVED_KEY_NAMES.contains(&name) || name.starts_with('-') {
            return Err(Error::InvalidInput(format!(
                "key name '{}' is reserved and could not be leased; pick another name",
                name
            )));
        }

        let salt = crypto::generate_salt();
        let key = crypto::derive_key(password, &salt);
        let sealed = crypto::encrypt(&key, plaintext.as_bytes())?;

        self.store.save_key(&KeyEntry {
            name: name.to_string(),
            encrypted_value: sealed.ciphertext,
            salt,
            nonce: sealed.nonce,
        })?;

        info!(key = %name, "stored vault key");
        Ok(())
    }

    /// Decrypt a stored secret.
    pub fn lease(&self, name: &str, password: &str) -> Result<String> {
        let entry = self.store.get_key(name)?.ok_or_else(|| {
            Error::NotFound(format!(
                "key not found: {}; run 'ticket key list' to see stored keys",
                name
            ))
        })?;

        let key = crypto::derive_key(password, &entry.salt);
        let plaintext = crypto::decrypt(&key, &entry.nonce, &entry.encrypted_value)?;

        debug!(key = %name, "leased vault key");
        String::from_utf8(plaintext).map_err(|_| Error::InvalidPassword)
    }

    /// Stored key names, ascending. Never ciphertext.
    pub fn list(&self) -> Result<Vec<String>> {
        self.store.list_key_names()
    }

    /// Delete a secret. Removing an absent name is not an error.
    pub fn remove(&mut self, name: &str) -> Result<bool> {
        let removed = self.store.delete_key(name)?;
        debug!(key = %name, removed, "removed vault key");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_store() -> (TempDir, Store) {
        let temp_dir = TempDir::new().unwrap();
        let store = Store::open(&temp_dir.path().join("tickets.db")).unwrap();
        (temp_dir, store)
    }

    #[test]
    fn test_add_then_lease() {
        let (_temp_dir, mut store) = open_store();
        let mut vault = Vault::new(&mut store);
        vault.add("k", "secret", "pw").unwrap();
        assert_eq!(vault.lease("k", "pw").unwrap(), "secret");
    }

    #[test]
    fn test_wrong_password_is_generic() {
        let (_temp_dir, mut store) = open_store();
        let mut vault = Vault::new(&mut store);
        vault.add("k", "secret", "pw").unwrap();
        let err = vault.lease("k", "wrong").unwrap_err();
        assert!(matches!(err, Error::InvalidPassword));
        assert_eq!(err.to_string(), "invalid password or corrupted key data");
    }

    #[test]
    fn test_lease_missing_is_not_found() {
        let (_temp_dir, mut store) = open_store();
        let vault = Vault::new(&mut store);
        assert!(matches!(vault.lease("nope", "pw"), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_list_and_remove() {
        let (_temp_dir, mut store) = open_store();
        let mut vault = Vault::new(&mut store);
        vault.add("k", "secret", "pw").unwrap();
        vault.add("a", "other", "pw").unwrap();
        assert_eq!(vault.list().unwrap(), vec!["a", "k"]);

        assert!(vault.remove("k").unwrap());
        assert_eq!(vault.list().unwrap(), vec!["a"]);
        // idempotent
        assert!(!vault.remove("k").unwrap());
    }

    #[test]
    fn test_overwrite_uses_fresh_salt_and_nonce() {
        let (_temp_dir, mut store) = open_store();
        Vault::new(&mut store).add("k", "secret", "pw").unwrap();
        let first = store.get_key("k").unwrap().unwrap();

        Vault::new(&mut store).add("k", "secret", "pw").unwrap();
        let second = store.get_key("k").unwrap().unwrap();

        assert_ne!(first.salt, second.salt);
        assert_ne!(first.nonce, second.nonce);
        assert_eq!(Vault::new(&mut store).lease("k", "pw").unwrap(), "secret");
    }

    #[test]
    fn test_plaintext_never_stored() {
        let (_temp_dir, mut store) = open_store();
        Vault::new(&mut store)
            .add("k", "very-visible-secret", "pw")
            .unwrap();
        let entry = store.get_key("k").unwrap().unwrap();
        let needle = b"very-visible-secret";
        assert!(!entry
            .encrypted_value
            .windows(needle.len())
            .any(|w| w == needle));
    }

    #[test]
    fn test_reserved_names_are_rejected() {
        let (_temp_dir, mut store) = open_store();
        let mut vault = Vault::new(&mut store);
        for name in ["add", "list", "rm", "help", "--db"] {
            let err = vault.add(name, "secret", "pw").unwrap_err();
            assert!(matches!(err, Error::InvalidInput(_)), "{}", name);
        }
        assert!(vault.list().unwrap().is_empty());

        // Only exact matches are reserved
        vault.add("listing", "secret", "pw").unwrap();
        assert_eq!(vault.lease("listing", "pw").unwrap(), "secret");
    }
}
