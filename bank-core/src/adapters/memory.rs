//! In-memory repository for tests and dry runs
//!
//! All state sits behind one lock, so every trait method is atomic by
//! construction. Writes can be made to fail on demand to exercise rollback
//! and error paths in the services above.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;

use crate::domain::result::{Error, Result};
use crate::domain::{
    Account, AccountId, Card, CardId, CardSummary, Currency, NewCard, NewTransaction, Transaction,
    TransactionType, UserId,
};
use crate::ports::{CardRepository, LedgerRepository};
use crate::services::ensure_before;

#[derive(Default)]
struct State {
    accounts: BTreeMap<AccountId, Account>,
    transactions: Vec<Transaction>,
    cards: BTreeMap<CardId, Card>,
    next_account_id: i64,
    next_transaction_id: i64,
    next_card_id: i64,
}

impl State {
    fn append(&mut self, new: NewTransaction) -> Transaction {
        self.next_transaction_id += 1;
        let record = Transaction {
            id: self.next_transaction_id,
            account_id: new.account_id,
            amount: new.amount,
            tx_type: new.tx_type,
            status: new.status,
            created_at: Utc::now(),
        };
        self.transactions.push(record.clone());
        record
    }

    /// Balance after applying `delta`, without writing it
    fn checked_balance(&self, account_id: AccountId, delta: Decimal) -> Result<Decimal> {
        let account = self
            .accounts
            .get(&account_id)
            .ok_or_else(|| Error::not_found("account", account_id))?;
        let next = account.balance.checked_add(delta).ok_or_else(|| {
            Error::validation(format!("balance of account {} would overflow", account_id))
        })?;
        if next < Decimal::ZERO {
            return Err(Error::InsufficientFunds { account_id });
        }
        Ok(next)
    }

    fn set_balance(&mut self, account_id: AccountId, balance: Decimal) {
        if let Some(account) = self.accounts.get_mut(&account_id) {
            account.balance = balance;
        }
    }
}

/// Ledger and card storage held in process memory
#[derive(Default)]
pub struct InMemoryRepository {
    state: Mutex<State>,
    fail_writes: AtomicBool,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// While enabled, every mutating call fails with a storage error and
    /// changes nothing
    pub fn set_fail_writes(&self, enabled: bool) {
        self.fail_writes.store(enabled, Ordering::SeqCst);
    }

    fn lock(&self, operation: &str) -> Result<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| Error::storage(operation, "state lock poisoned"))
    }

    fn lock_for_write(&self, operation: &str) -> Result<MutexGuard<'_, State>> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::storage(operation, "write failure injected"));
        }
        self.lock(operation)
    }
}

#[async_trait]
impl LedgerRepository for InMemoryRepository {
    async fn insert_account(&self, owner_user_id: UserId, currency: Currency) -> Result<Account> {
        let mut state = self.lock_for_write("insert account")?;
        state.next_account_id += 1;
        let account = Account {
            id: state.next_account_id,
            owner_user_id,
            balance: Decimal::ZERO,
            currency,
            created_at: Utc::now(),
        };
        state.accounts.insert(account.id, account.clone());
        Ok(account)
    }

    async fn get_account(&self, id: AccountId) -> Result<Option<Account>> {
        Ok(self.lock("get account")?.accounts.get(&id).cloned())
    }

    async fn list_accounts_by_user(&self, user_id: UserId) -> Result<Vec<Account>> {
        Ok(self
            .lock("list accounts")?
            .accounts
            .values()
            .filter(|a| a.owner_user_id == user_id)
            .cloned()
            .collect())
    }

    async fn apply_balance_delta_and_log(
        &self,
        account_id: AccountId,
        delta: Decimal,
        tx_type: TransactionType,
        commit_by: Instant,
    ) -> Result<Transaction> {
        let mut state = self.lock_for_write("apply balance delta")?;
        let balance = state.checked_balance(account_id, delta)?;
        ensure_before(commit_by, "apply balance delta")?;

        state.set_balance(account_id, balance);
        Ok(state.append(NewTransaction {
            tx_type,
            ..NewTransaction::completed(account_id, delta)
        }))
    }

    async fn apply_transfer_and_log(
        &self,
        from_id: AccountId,
        to_id: AccountId,
        amount: Decimal,
        commit_by: Instant,
    ) -> Result<(Transaction, Transaction)> {
        let mut state = self.lock_for_write("apply transfer")?;
        let from_balance = state.checked_balance(from_id, -amount)?;
        let to_balance = state.checked_balance(to_id, amount)?;
        ensure_before(commit_by, "apply transfer")?;

        state.set_balance(from_id, from_balance);
        state.set_balance(to_id, to_balance);
        let withdrawal = state.append(NewTransaction::completed(from_id, -amount));
        let deposit = state.append(NewTransaction::completed(to_id, amount));
        Ok((withdrawal, deposit))
    }

    async fn list_transactions_by_account(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<Transaction>> {
        Ok(self
            .lock("list transactions")?
            .transactions
            .iter()
            .filter(|t| t.account_id == account_id)
            .cloned()
            .collect())
    }

    async fn list_transactions_by_user(&self, user_id: UserId) -> Result<Vec<Transaction>> {
        let state = self.lock("list transactions")?;
        Ok(state
            .transactions
            .iter()
            .filter(|t| {
                state
                    .accounts
                    .get(&t.account_id)
                    .is_some_and(|a| a.owner_user_id == user_id)
            })
            .cloned()
            .collect())
    }
}

#[async_trait]
impl CardRepository for InMemoryRepository {
    async fn insert_card(&self, card: NewCard) -> Result<Card> {
        let mut state = self.lock_for_write("insert card")?;
        state.next_card_id += 1;
        let stored = Card {
            id: state.next_card_id,
            owner_user_id: card.owner_user_id,
            encrypted_pan: card.encrypted_pan,
            encrypted_expiry: card.encrypted_expiry,
            cvv_digest: card.cvv_digest,
            created_at: Utc::now(),
        };
        state.cards.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn get_card(&self, id: CardId) -> Result<Option<Card>> {
        Ok(self.lock("get card")?.cards.get(&id).cloned())
    }

    async fn list_cards_by_user(&self, user_id: UserId) -> Result<Vec<CardSummary>> {
        Ok(self
            .lock("list cards")?
            .cards
            .values()
            .rev()
            .filter(|c| c.owner_user_id == user_id)
            .map(Card::summary)
            .collect())
    }
}
