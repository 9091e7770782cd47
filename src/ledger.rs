use crate::common::{FaceBankError, Result};
use crate::storage::AccountStore;
use rust_decimal::Decimal;

/// Amounts move in whole cents. Finer precision is a client bug.
fn validate_amount(amount: Decimal) -> Result<()> {
    if amount <= Decimal::ZERO {
        return Err(FaceBankError::InvalidAmount(
            "amount must be positive".to_string(),
        ));
    }
    if amount.normalize().scale() > 2 {
        return Err(FaceBankError::InvalidAmount(
            "amount cannot be finer than cents".to_string(),
        ));
    }
    Ok(())
}

/// Adds funds and returns the new balance.
pub fn deposit(store: &dyn AccountStore, identifier: &str, amount: Decimal) -> Result<Decimal> {
    validate_amount(amount)?;
    let balance = store.credit(identifier, amount)?;
    tracing::info!("Deposited {} into {}", amount, identifier);
    Ok(balance)
}

/// Pays an external party from the account and returns the new balance.
pub fn pay(store: &dyn AccountStore, identifier: &str, amount: Decimal) -> Result<Decimal> {
    validate_amount(amount)?;
    let balance = store.debit(identifier, amount)?;
    tracing::info!("Paid {} from {}", amount, identifier);
    Ok(balance)
}

/// Moves funds between two accounts and returns the sender's new balance.
/// The receiver is checked before any money moves; if the credit still fails
/// afterwards, the debit is rolled back.
pub fn transfer(
    store: &dyn AccountStore,
    from: &str,
    to: &str,
    amount: Decimal,
) -> Result<Decimal> {
    validate_amount(amount)?;
    if from == to {
        return Err(FaceBankError::SelfTransfer);
    }
    if store.find_by_identifier(to)?.is_none() {
        return Err(FaceBankError::AccountNotFound(to.to_string()));
    }

    let balance = store.debit(from, amount)?;
    if let Err(e) = store.credit(to, amount) {
        // The debit must not stand without the credit
        if let Err(refund) = store.credit(from, amount) {
            tracing::error!("Failed to refund {} after aborted transfer: {}", from, refund);
        }
        return Err(e);
    }

    tracing::info!("Transferred {} from {} to {}", amount, from, to);
    Ok(balance)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{Account, MemoryAccountStore};
    use std::str::FromStr;

    const SENDER: &str = "5551110000";
    const RECEIVER: &str = "5552220000";

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn seeded_store() -> MemoryAccountStore {
        let store = MemoryAccountStore::new();
        for identifier in [SENDER, RECEIVER] {
            store
                .create(&Account::new(
                    identifier.to_string(),
                    "Holder".to_string(),
                    "1990-01-01".to_string(),
                    None,
                ))
                .unwrap();
        }
        store
    }

    fn balance_of(store: &dyn AccountStore, identifier: &str) -> Decimal {
        store
            .find_by_identifier(identifier)
            .unwrap()
            .unwrap()
            .balance
    }

    #[test]
    fn deposit_adds_to_the_balance() {
        let store = seeded_store();
        assert_eq!(deposit(&store, SENDER, dec("100.50")).unwrap(), dec("100.50"));
        assert_eq!(deposit(&store, SENDER, dec("0.01")).unwrap(), dec("100.51"));
    }

    #[test]
    fn non_positive_amounts_are_invalid() {
        let store = seeded_store();
        for bad in ["0", "-5.00"] {
            let err = deposit(&store, SENDER, dec(bad)).unwrap_err();
            assert!(matches!(err, FaceBankError::InvalidAmount(_)));
        }
        assert_eq!(balance_of(&store, SENDER), Decimal::ZERO);
    }

    #[test]
    fn sub_cent_amounts_are_invalid() {
        let store = seeded_store();
        let err = deposit(&store, SENDER, dec("0.001")).unwrap_err();
        assert!(matches!(err, FaceBankError::InvalidAmount(_)));

        // Trailing zeros are representation, not precision
        deposit(&store, SENDER, dec("10.100")).unwrap();
        assert_eq!(balance_of(&store, SENDER), dec("10.10"));
    }

    #[test]
    fn pay_subtracts_and_refuses_overdraw() {
        let store = seeded_store();
        deposit(&store, SENDER, dec("20.00")).unwrap();

        assert_eq!(pay(&store, SENDER, dec("7.25")).unwrap(), dec("12.75"));

        let err = pay(&store, SENDER, dec("12.76")).unwrap_err();
        assert!(matches!(err, FaceBankError::InsufficientFunds { .. }));
        assert_eq!(balance_of(&store, SENDER), dec("12.75"));
    }

    #[test]
    fn transfer_moves_funds_between_accounts() {
        let store = seeded_store();
        deposit(&store, SENDER, dec("100.00")).unwrap();

        let sender_balance = transfer(&store, SENDER, RECEIVER, dec("30.00")).unwrap();
        assert_eq!(sender_balance, dec("70.00"));
        assert_eq!(balance_of(&store, RECEIVER), dec("30.00"));
    }

    #[test]
    fn transfer_to_self_is_refused() {
        let store = seeded_store();
        deposit(&store, SENDER, dec("10.00")).unwrap();

        let err = transfer(&store, SENDER, SENDER, dec("5.00")).unwrap_err();
        assert!(matches!(err, FaceBankError::SelfTransfer));
        assert_eq!(balance_of(&store, SENDER), dec("10.00"));
    }

    #[test]
    fn transfer_to_unknown_account_moves_nothing() {
        let store = seeded_store();
        deposit(&store, SENDER, dec("10.00")).unwrap();

        let err = transfer(&store, SENDER, "5559990000", dec("5.00")).unwrap_err();
        assert!(matches!(err, FaceBankError::AccountNotFound(id) if id == "5559990000"));
        assert_eq!(balance_of(&store, SENDER), dec("10.00"));
    }

    #[test]
    fn transfer_overdraw_leaves_receiver_untouched() {
        let store = seeded_store();
        deposit(&store, SENDER, dec("10.00")).unwrap();

        let err = transfer(&store, SENDER, RECEIVER, dec("10.01")).unwrap_err();
        assert!(matches!(err, FaceBankError::InsufficientFunds { .. }));
        assert_eq!(balance_of(&store, SENDER), dec("10.00"));
        assert_eq!(balance_of(&store, RECEIVER), Decimal::ZERO);
    }

    #[test]
    fn failed_credit_rolls_the_debit_back() {
        struct FailingCreditStore {
            inner: MemoryAccountStore,
            poisoned: &'static str,
        }

        impl AccountStore for FailingCreditStore {
            fn find_by_identifier(&self, identifier: &str) -> Result<Option<Account>> {
                self.inner.find_by_identifier(identifier)
            }

            fn create(&self, account: &Account) -> Result<()> {
                self.inner.create(account)
            }

            fn credit(&self, identifier: &str, amount: Decimal) -> Result<Decimal> {
                if identifier == self.poisoned {
                    return Err(FaceBankError::Storage("disk full".to_string()));
                }
                self.inner.credit(identifier, amount)
            }

            fn debit(&self, identifier: &str, amount: Decimal) -> Result<Decimal> {
                self.inner.debit(identifier, amount)
            }
        }

        let store = FailingCreditStore {
            inner: seeded_store(),
            poisoned: RECEIVER,
        };
        deposit(&store, SENDER, dec("50.00")).unwrap();

        let err = transfer(&store, SENDER, RECEIVER, dec("20.00")).unwrap_err();
        assert!(matches!(err, FaceBankError::Storage(_)));
        assert_eq!(balance_of(&store, SENDER), dec("50.00"));
        assert_eq!(balance_of(&store, RECEIVER), Decimal::ZERO);
    }
}
