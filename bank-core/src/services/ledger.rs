//! Ledger service - accounts, balance updates and transfers
//!
//! Validation and ownership checks happen here; the atomic write itself
//! (balance change plus log entry) belongs to the repository. The
//! sufficient-funds checks in this layer reject obvious overdrafts early;
//! the repository re-checks inside its transaction, which is what holds
//! under concurrency.
//!
//! Reads go through `Deadline::run`. Balance mutations hand the repository a
//! commit deadline instead and wait for its answer, so a `Timeout` always
//! means nothing was written.

use std::sync::Arc;

use rust_decimal::Decimal;

use crate::domain::result::{Error, Result};
use crate::domain::{
    validate_precision, Account, AccountId, Currency, Transaction, TransactionType, UserId,
};
use crate::ports::LedgerRepository;
use crate::services::deadline::Deadline;

pub struct LedgerService {
    repository: Arc<dyn LedgerRepository>,
    deadline: Deadline,
}

impl LedgerService {
    pub fn new(repository: Arc<dyn LedgerRepository>, deadline: Deadline) -> Self {
        Self {
            repository,
            deadline,
        }
    }

    pub async fn create_account(&self, caller: UserId, currency: Currency) -> Result<Account> {
        let account = self
            .deadline
            .run("insert account", self.repository.insert_account(caller, currency))
            .await?;
        tracing::info!(account_id = account.id, user_id = caller, %currency, "account opened");
        Ok(account)
    }

    /// Load an account the caller owns
    pub async fn get_account(&self, id: AccountId, caller: UserId) -> Result<Account> {
        let account = self.load(id).await?;
        if !account.is_owned_by(caller) {
            tracing::warn!(account_id = id, user_id = caller, "account accessed by non-owner");
            return Err(Error::forbidden("account", id));
        }
        Ok(account)
    }

    pub async fn list_accounts(&self, caller: UserId) -> Result<Vec<Account>> {
        self.deadline
            .run("list accounts", self.repository.list_accounts_by_user(caller))
            .await
    }

    /// Deposit (`delta > 0`) or withdraw (`delta < 0`) on one of the
    /// caller's accounts; returns the logged entry
    pub async fn update_balance(
        &self,
        id: AccountId,
        caller: UserId,
        delta: Decimal,
    ) -> Result<Transaction> {
        if delta.is_zero() {
            return Err(Error::ZeroAmount);
        }
        validate_precision(delta)?;

        let account = self.get_account(id, caller).await?;
        if delta.is_sign_negative() && account.balance + delta < Decimal::ZERO {
            return Err(Error::InsufficientFunds { account_id: id });
        }

        let tx_type = TransactionType::for_delta(delta);
        let entry = self
            .repository
            .apply_balance_delta_and_log(id, delta, tx_type, self.deadline.commit_by())
            .await?;

        tracing::info!(account_id = id, %delta, transaction_id = entry.id, "balance updated");
        Ok(entry)
    }

    /// Move `amount` from the caller's account to any account in the same
    /// currency; returns `(withdrawal, deposit)`
    pub async fn transfer(
        &self,
        from_id: AccountId,
        to_id: AccountId,
        caller: UserId,
        amount: Decimal,
    ) -> Result<(Transaction, Transaction)> {
        if from_id == to_id {
            return Err(Error::SameAccount);
        }
        if amount <= Decimal::ZERO {
            return Err(Error::NonPositiveAmount);
        }
        validate_precision(amount)?;

        let from = self.get_account(from_id, caller).await?;
        let to = self.load(to_id).await?;
        if from.currency != to.currency {
            return Err(Error::CurrencyMismatch {
                from: from_id,
                to: to_id,
            });
        }
        if from.balance < amount {
            return Err(Error::InsufficientFunds { account_id: from_id });
        }

        let entries = self
            .repository
            .apply_transfer_and_log(from_id, to_id, amount, self.deadline.commit_by())
            .await?;

        tracing::info!(
            from_account_id = from_id,
            to_account_id = to_id,
            %amount,
            "transfer completed"
        );
        Ok(entries)
    }

    pub async fn list_transactions(
        &self,
        account_id: AccountId,
        caller: UserId,
    ) -> Result<Vec<Transaction>> {
        self.get_account(account_id, caller).await?;
        self.deadline
            .run(
                "list transactions",
                self.repository.list_transactions_by_account(account_id),
            )
            .await
    }

    pub async fn list_transactions_for_user(&self, caller: UserId) -> Result<Vec<Transaction>> {
        self.deadline
            .run(
                "list transactions",
                self.repository.list_transactions_by_user(caller),
            )
            .await
    }

    async fn load(&self, id: AccountId) -> Result<Account> {
        self.deadline
            .run("get account", self.repository.get_account(id))
            .await?
            .ok_or_else(|| Error::not_found("account", id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryRepository;
    use std::time::Duration;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn service() -> LedgerService {
        LedgerService::new(Arc::new(InMemoryRepository::new()), Deadline::default())
    }

    #[tokio::test]
    async fn test_zero_delta_rejected() {
        let service = service();
        let account = service.create_account(1, Currency::Rub).await.unwrap();
        assert!(matches!(
            service.update_balance(account.id, 1, Decimal::ZERO).await,
            Err(Error::ZeroAmount)
        ));
    }

    #[tokio::test]
    async fn test_sub_cent_amount_rejected() {
        let service = service();
        let account = service.create_account(1, Currency::Rub).await.unwrap();
        assert!(matches!(
            service.update_balance(account.id, 1, dec("0.001")).await,
            Err(Error::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_foreign_account_forbidden() {
        let service = service();
        let account = service.create_account(1, Currency::Usd).await.unwrap();

        assert!(matches!(
            service.get_account(account.id, 2).await,
            Err(Error::Forbidden { entity: "account", .. })
        ));
        assert!(matches!(
            service.update_balance(account.id, 2, dec("5")).await,
            Err(Error::Forbidden { .. })
        ));
        assert!(matches!(
            service.list_transactions(account.id, 2).await,
            Err(Error::Forbidden { .. })
        ));
    }

    #[tokio::test]
    async fn test_transfer_argument_checks() {
        let service = service();
        let a = service.create_account(1, Currency::Rub).await.unwrap();
        let b = service.create_account(2, Currency::Rub).await.unwrap();

        assert!(matches!(
            service.transfer(a.id, a.id, 1, dec("1")).await,
            Err(Error::SameAccount)
        ));
        assert!(matches!(
            service.transfer(a.id, b.id, 1, Decimal::ZERO).await,
            Err(Error::NonPositiveAmount)
        ));
        assert!(matches!(
            service.transfer(a.id, b.id, 1, dec("-3")).await,
            Err(Error::NonPositiveAmount)
        ));
        assert!(matches!(
            service.transfer(a.id, 404, 1, dec("1")).await,
            Err(Error::NotFound { id: 404, .. })
        ));
        // Source must be the caller's
        assert!(matches!(
            service.transfer(b.id, a.id, 1, dec("1")).await,
            Err(Error::Forbidden { .. })
        ));
    }

    #[tokio::test]
    async fn test_transfer_to_other_users_account() {
        let service = service();
        let mine = service.create_account(1, Currency::Eur).await.unwrap();
        let theirs = service.create_account(2, Currency::Eur).await.unwrap();
        service.update_balance(mine.id, 1, dec("10.00")).await.unwrap();

        let (withdrawal, deposit) = service
            .transfer(mine.id, theirs.id, 1, dec("2.50"))
            .await
            .unwrap();

        assert_eq!(withdrawal.tx_type, TransactionType::Withdrawal);
        assert_eq!(withdrawal.account_id, mine.id);
        assert_eq!(deposit.tx_type, TransactionType::Deposit);
        assert_eq!(deposit.account_id, theirs.id);
        assert_eq!(service.get_account(theirs.id, 2).await.unwrap().balance, dec("2.50"));
    }

    #[tokio::test]
    async fn test_currency_mismatch() {
        let service = service();
        let rub = service.create_account(1, Currency::Rub).await.unwrap();
        let usd = service.create_account(1, Currency::Usd).await.unwrap();
        service.update_balance(rub.id, 1, dec("100")).await.unwrap();

        assert!(matches!(
            service.transfer(rub.id, usd.id, 1, dec("1")).await,
            Err(Error::CurrencyMismatch { .. })
        ));
        assert_eq!(service.get_account(rub.id, 1).await.unwrap().balance, dec("100"));
    }

    #[tokio::test]
    async fn test_timed_out_transfer_leaves_no_trace() {
        let repository = Arc::new(InMemoryRepository::new());
        let service = LedgerService::new(repository.clone(), Deadline::default());
        let a = service.create_account(1, Currency::Rub).await.unwrap();
        let b = service.create_account(2, Currency::Rub).await.unwrap();
        service.update_balance(a.id, 1, dec("100")).await.unwrap();

        let expired = LedgerService::new(repository, Deadline::new(Duration::ZERO));
        assert!(matches!(
            expired.transfer(a.id, b.id, 1, dec("40")).await,
            Err(Error::Timeout { .. })
        ));
        assert!(matches!(
            expired.update_balance(a.id, 1, dec("-40")).await,
            Err(Error::Timeout { .. })
        ));

        assert_eq!(service.get_account(a.id, 1).await.unwrap().balance, dec("100"));
        assert_eq!(service.get_account(b.id, 2).await.unwrap().balance, Decimal::ZERO);
        assert_eq!(service.list_transactions(a.id, 1).await.unwrap().len(), 1);
        assert!(service.list_transactions(b.id, 2).await.unwrap().is_empty());
    }
}
