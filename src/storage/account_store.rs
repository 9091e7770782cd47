use crate::common::{FaceBankError, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::PathBuf;
use std::sync::Mutex;

/// Bump when the on-disk account layout changes.
pub const STORAGE_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub version: u32,
    pub identifier: String,
    pub display_name: String,
    pub date_of_birth: String,
    /// Enrollment descriptor as stored JSON, absent for accounts that never
    /// completed enrollment.
    pub descriptor_json: Option<String>,
    pub balance: Decimal,
    pub created_at: DateTime<Utc>,
}

impl Account {
    pub fn new(
        identifier: String,
        display_name: String,
        date_of_birth: String,
        descriptor_json: Option<String>,
    ) -> Self {
        Self {
            version: STORAGE_VERSION,
            identifier,
            display_name,
            date_of_birth,
            descriptor_json,
            balance: Decimal::ZERO,
            created_at: Utc::now(),
        }
    }
}

/// Identifiers are phone numbers: 3 to 20 ASCII digits, nothing else. They
/// become file names, so this also keeps path separators out of storage.
pub fn validate_identifier(identifier: &str) -> bool {
    (3..=20).contains(&identifier.len()) && identifier.bytes().all(|b| b.is_ascii_digit())
}

/// Account persistence. One record per identifier; `create` must refuse an
/// identifier that already exists, atomically under concurrent callers.
pub trait AccountStore: Send + Sync {
    fn find_by_identifier(&self, identifier: &str) -> Result<Option<Account>>;
    fn create(&self, account: &Account) -> Result<()>;
    /// Adds `amount` and returns the new balance.
    fn credit(&self, identifier: &str, amount: Decimal) -> Result<Decimal>;
    /// Subtracts `amount` and returns the new balance. Fails without writing
    /// when the balance does not cover it.
    fn debit(&self, identifier: &str, amount: Decimal) -> Result<Decimal>;
}

/// File-backed store: one `{identifier}.bincode` per account. Uniqueness at
/// creation rides on `create_new`, so two racing enrollments cannot both win.
/// Balance mutations serialize through a process-wide lock.
pub struct FsAccountStore {
    accounts_dir: PathBuf,
    write_lock: Mutex<()>,
}

impl FsAccountStore {
    pub fn new(accounts_dir: impl Into<PathBuf>) -> Result<Self> {
        let accounts_dir = accounts_dir.into();
        fs::create_dir_all(&accounts_dir)?;
        Ok(Self {
            accounts_dir,
            write_lock: Mutex::new(()),
        })
    }

    fn account_path(&self, identifier: &str) -> PathBuf {
        self.accounts_dir.join(format!("{}.bincode", identifier))
    }

    fn read_account(&self, identifier: &str) -> Result<Option<Account>> {
        let path = self.account_path(identifier);
        if !path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&path)?;
        let account = bincode::deserialize(&bytes).map_err(|e| {
            FaceBankError::Storage(format!("Failed to decode account {}: {}", identifier, e))
        })?;
        Ok(Some(account))
    }

    fn write_account(&self, account: &Account) -> Result<()> {
        let bytes = encode_account(account)?;
        fs::write(self.account_path(&account.identifier), bytes)?;
        Ok(())
    }

    fn mutate<F>(&self, identifier: &str, apply: F) -> Result<Decimal>
    where
        F: FnOnce(&mut Account) -> Result<()>,
    {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| FaceBankError::Storage("Account write lock poisoned".into()))?;

        let mut account = self
            .read_account(identifier)?
            .ok_or_else(|| FaceBankError::AccountNotFound(identifier.to_string()))?;
        apply(&mut account)?;
        self.write_account(&account)?;
        Ok(account.balance)
    }
}

impl AccountStore for FsAccountStore {
    fn find_by_identifier(&self, identifier: &str) -> Result<Option<Account>> {
        self.read_account(identifier)
    }

    fn create(&self, account: &Account) -> Result<()> {
        let bytes = encode_account(account)?;
        let path = self.account_path(&account.identifier);

        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(FaceBankError::DuplicateIdentifier(
                    account.identifier.clone(),
                ))
            }
            Err(e) => return Err(e.into()),
        };
        file.write_all(&bytes)?;
        Ok(())
    }

    fn credit(&self, identifier: &str, amount: Decimal) -> Result<Decimal> {
        self.mutate(identifier, |account| {
            account.balance = account
                .balance
                .checked_add(amount)
                .ok_or_else(|| FaceBankError::BalanceOverflow(identifier.to_string()))?;
            Ok(())
        })
    }

    fn debit(&self, identifier: &str, amount: Decimal) -> Result<Decimal> {
        self.mutate(identifier, |account| {
            if account.balance < amount {
                return Err(FaceBankError::InsufficientFunds {
                    balance: account.balance,
                    requested: amount,
                });
            }
            account.balance -= amount;
            Ok(())
        })
    }
}

fn encode_account(account: &Account) -> Result<Vec<u8>> {
    bincode::serialize(account).map_err(|e| {
        FaceBankError::Storage(format!(
            "Failed to encode account {}: {}",
            account.identifier, e
        ))
    })
}

/// In-memory store for tests and development.
#[derive(Default)]
pub struct MemoryAccountStore {
    accounts: Mutex<HashMap<String, Account>>,
}

impl MemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_accounts<F, T>(&self, apply: F) -> Result<T>
    where
        F: FnOnce(&mut HashMap<String, Account>) -> Result<T>,
    {
        let mut accounts = self
            .accounts
            .lock()
            .map_err(|_| FaceBankError::Storage("Account table lock poisoned".into()))?;
        apply(&mut accounts)
    }
}

impl AccountStore for MemoryAccountStore {
    fn find_by_identifier(&self, identifier: &str) -> Result<Option<Account>> {
        self.with_accounts(|accounts| Ok(accounts.get(identifier).cloned()))
    }

    fn create(&self, account: &Account) -> Result<()> {
        self.with_accounts(|accounts| {
            if accounts.contains_key(&account.identifier) {
                return Err(FaceBankError::DuplicateIdentifier(
                    account.identifier.clone(),
                ));
            }
            accounts.insert(account.identifier.clone(), account.clone());
            Ok(())
        })
    }

    fn credit(&self, identifier: &str, amount: Decimal) -> Result<Decimal> {
        self.with_accounts(|accounts| {
            let account = accounts
                .get_mut(identifier)
                .ok_or_else(|| FaceBankError::AccountNotFound(identifier.to_string()))?;
            account.balance = account
                .balance
                .checked_add(amount)
                .ok_or_else(|| FaceBankError::BalanceOverflow(identifier.to_string()))?;
            Ok(account.balance)
        })
    }

    fn debit(&self, identifier: &str, amount: Decimal) -> Result<Decimal> {
        self.with_accounts(|accounts| {
            let account = accounts
                .get_mut(identifier)
                .ok_or_else(|| FaceBankError::AccountNotFound(identifier.to_string()))?;
            if account.balance < amount {
                return Err(FaceBankError::InsufficientFunds {
                    balance: account.balance,
                    requested: amount,
                });
            }
            account.balance -= amount;
            Ok(account.balance)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn sample_account(identifier: &str) -> Account {
        Account::new(
            identifier.to_string(),
            "Test Person".to_string(),
            "1990-01-01".to_string(),
            Some("[1.0, 2.0]".to_string()),
        )
    }

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn identifier_validation() {
        assert!(validate_identifier("555"));
        assert!(validate_identifier("15551234567"));
        assert!(!validate_identifier("55"));
        assert!(!validate_identifier("555-123-4567"));
        assert!(!validate_identifier("abc1234567"));
        assert!(!validate_identifier(""));
        assert!(!validate_identifier("123456789012345678901"));
    }

    #[test]
    fn create_then_find_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsAccountStore::new(dir.path()).unwrap();

        let account = sample_account("5551234567");
        store.create(&account).unwrap();

        let loaded = store.find_by_identifier("5551234567").unwrap().unwrap();
        assert_eq!(loaded.identifier, "5551234567");
        assert_eq!(loaded.display_name, "Test Person");
        assert_eq!(loaded.descriptor_json.as_deref(), Some("[1.0, 2.0]"));
        assert_eq!(loaded.balance, Decimal::ZERO);
        assert_eq!(loaded.version, STORAGE_VERSION);
    }

    #[test]
    fn find_missing_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsAccountStore::new(dir.path()).unwrap();
        assert!(store.find_by_identifier("5550000000").unwrap().is_none());
    }

    #[test]
    fn create_refuses_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsAccountStore::new(dir.path()).unwrap();

        store.create(&sample_account("5551234567")).unwrap();
        let err = store.create(&sample_account("5551234567")).unwrap_err();
        assert!(matches!(err, FaceBankError::DuplicateIdentifier(id) if id == "5551234567"));
    }

    #[test]
    fn credit_and_debit_update_balance() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsAccountStore::new(dir.path()).unwrap();
        store.create(&sample_account("5551234567")).unwrap();

        assert_eq!(store.credit("5551234567", dec("100.50")).unwrap(), dec("100.50"));
        assert_eq!(store.debit("5551234567", dec("30.25")).unwrap(), dec("70.25"));

        let loaded = store.find_by_identifier("5551234567").unwrap().unwrap();
        assert_eq!(loaded.balance, dec("70.25"));
    }

    #[test]
    fn debit_beyond_balance_fails_without_writing() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsAccountStore::new(dir.path()).unwrap();
        store.create(&sample_account("5551234567")).unwrap();
        store.credit("5551234567", dec("10.00")).unwrap();

        let err = store.debit("5551234567", dec("10.01")).unwrap_err();
        match err {
            FaceBankError::InsufficientFunds { balance, requested } => {
                assert_eq!(balance, dec("10.00"));
                assert_eq!(requested, dec("10.01"));
            }
            other => panic!("unexpected error: {:?}", other),
        }

        let loaded = store.find_by_identifier("5551234567").unwrap().unwrap();
        assert_eq!(loaded.balance, dec("10.00"));
    }

    #[test]
    fn credit_unknown_account_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsAccountStore::new(dir.path()).unwrap();
        let err = store.credit("5559999999", dec("1.00")).unwrap_err();
        assert!(matches!(err, FaceBankError::AccountNotFound(id) if id == "5559999999"));
    }

    #[test]
    fn memory_store_matches_fs_semantics() {
        let store = MemoryAccountStore::new();
        store.create(&sample_account("5551234567")).unwrap();

        let err = store.create(&sample_account("5551234567")).unwrap_err();
        assert!(matches!(err, FaceBankError::DuplicateIdentifier(_)));

        store.credit("5551234567", dec("5.00")).unwrap();
        let err = store.debit("5551234567", dec("6.00")).unwrap_err();
        assert!(matches!(err, FaceBankError::InsufficientFunds { .. }));
        assert_eq!(
            store.find_by_identifier("5551234567").unwrap().unwrap().balance,
            dec("5.00")
        );
    }
}
