//! Repository ports - storage abstraction

use std::time::Instant;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::domain::result::Result;
use crate::domain::{
    Account, AccountId, Card, CardId, CardSummary, Currency, NewCard, Transaction,
    TransactionType, UserId,
};

/// Ledger storage: accounts and their append-only transaction log
///
/// The two `apply_*` methods are the only way balances change. Each one is a
/// single atomic unit: the balance update(s) and the transaction record(s)
/// commit together or not at all. Implementations must also make the
/// sufficient-funds guard part of that unit, so two concurrent withdrawals
/// can never both pass against the same stale balance.
///
/// Both also take a `commit_by` instant. Once it has passed they fail
/// `Timeout` and roll back rather than commit, so the result they return is
/// always the true outcome of the write.
#[async_trait]
pub trait LedgerRepository: Send + Sync {
    // === Accounts ===

    /// Open an account with a zero balance; storage assigns id and created_at
    async fn insert_account(&self, owner_user_id: UserId, currency: Currency) -> Result<Account>;

    async fn get_account(&self, id: AccountId) -> Result<Option<Account>>;

    /// Accounts owned by a user, ordered by id
    async fn list_accounts_by_user(&self, user_id: UserId) -> Result<Vec<Account>>;

    // === Atomic balance mutations ===

    /// Add `delta` to the balance and append one COMPLETED entry of
    /// `tx_type` for `|delta|`.
    ///
    /// Fails `NotFound` if the account is missing and `InsufficientFunds` if
    /// the balance would go negative; nothing is written in either case.
    async fn apply_balance_delta_and_log(
        &self,
        account_id: AccountId,
        delta: Decimal,
        tx_type: TransactionType,
        commit_by: Instant,
    ) -> Result<Transaction>;

    /// Move `amount` from `from_id` to `to_id`, appending a WITHDRAWAL entry
    /// on the source and a DEPOSIT entry on the destination.
    ///
    /// Returns `(withdrawal, deposit)`. Any failure leaves both accounts and
    /// the log untouched.
    async fn apply_transfer_and_log(
        &self,
        from_id: AccountId,
        to_id: AccountId,
        amount: Decimal,
        commit_by: Instant,
    ) -> Result<(Transaction, Transaction)>;

    // === Transactions ===

    /// Entries for one account, oldest first
    async fn list_transactions_by_account(&self, account_id: AccountId) -> Result<Vec<Transaction>>;

    /// Entries across every account the user owns, oldest first
    async fn list_transactions_by_user(&self, user_id: UserId) -> Result<Vec<Transaction>>;
}

/// Card storage
///
/// Cards are insert-only. Listing returns metadata so encrypted columns never
/// leave storage on the listing path.
#[async_trait]
pub trait CardRepository: Send + Sync {
    /// Persist a card; storage assigns id and created_at
    async fn insert_card(&self, card: NewCard) -> Result<Card>;

    async fn get_card(&self, id: CardId) -> Result<Option<Card>>;

    /// Card metadata for a user, newest first
    async fn list_cards_by_user(&self, user_id: UserId) -> Result<Vec<CardSummary>>;
}
