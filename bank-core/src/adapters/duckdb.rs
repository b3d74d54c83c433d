//! DuckDB repository implementation

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};
use std::thread;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use duckdb::types::Type;
use duckdb::{params, Connection};
use rust_decimal::Decimal;

use crate::domain::result::{Error, Result};
use crate::domain::{
    Account, AccountId, Card, CardId, CardSummary, Currency, NewCard, NewTransaction, Transaction,
    TransactionType, UserId,
};
use crate::ports::{CardRepository, LedgerRepository};
use crate::services::{ensure_before, MigrationResult, MigrationService};

/// Maximum number of attempts when the database file is locked
const MAX_RETRIES: u32 = 5;

/// Initial retry delay in milliseconds (doubles each retry: 50, 100, 200, 400ms)
const INITIAL_RETRY_DELAY_MS: u64 = 50;

/// How often a mutation re-checks a busy connection before its deadline
const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(2);

/// Check if an error message indicates a file locking issue that should be retried
fn is_retryable_error(err_msg: &str) -> bool {
    let lower = err_msg.to_lowercase();
    // Windows
    lower.contains("being used by another process")
        || lower.contains("cannot access the file")
        // Unix/macOS
        || lower.contains("resource temporarily unavailable")
        || lower.contains("database is locked")
        || lower.contains("file is already open")
}

/// Tag a DuckDB failure with the operation it interrupted
trait StorageContext<T> {
    fn during(self, operation: &str) -> Result<T>;
}

impl<T> StorageContext<T> for duckdb::Result<T> {
    fn during(self, operation: &str) -> Result<T> {
        self.map_err(|e| Error::storage(operation, e))
    }
}

const ACCOUNT_COLUMNS: &str =
    "SELECT id, owner_user_id, balance::VARCHAR, currency, created_at FROM accounts";

const TRANSACTION_COLUMNS: &str =
    "SELECT t.id, t.account_id, t.amount::VARCHAR, t.type, t.status, t.created_at FROM transactions t";

const CARD_COLUMNS: &str =
    "SELECT id, owner_user_id, encrypted_pan, encrypted_expiry, cvv_digest, created_at FROM cards";

/// DuckDB-backed ledger and card storage
///
/// One connection behind a mutex; every call runs on the blocking pool.
/// Balance mutations run inside a DuckDB transaction that is committed
/// explicitly and rolled back when dropped on any early return.
pub struct DuckDbRepository {
    conn: Arc<Mutex<Connection>>,
    db_path: Option<PathBuf>,
}

impl DuckDbRepository {
    /// Open (or create) the database file and bring its schema up to date
    ///
    /// Retries with exponential backoff while another process holds the
    /// file lock.
    pub fn open(db_path: &Path) -> Result<Self> {
        let mut attempt = 0;
        let conn = loop {
            match Self::try_open_connection(db_path) {
                Ok(conn) => break conn,
                Err(e) => {
                    let err_msg = e.to_string();
                    attempt += 1;
                    if !is_retryable_error(&err_msg) || attempt >= MAX_RETRIES {
                        return Err(Error::storage("open database", err_msg));
                    }
                    let delay =
                        Duration::from_millis(INITIAL_RETRY_DELAY_MS * 2u64.pow(attempt - 1));
                    tracing::warn!(
                        delay_ms = delay.as_millis() as u64,
                        attempt,
                        max_attempts = MAX_RETRIES,
                        error = %err_msg,
                        "database busy, retrying"
                    );
                    thread::sleep(delay);
                }
            }
        };

        let repo = Self {
            conn: Arc::new(Mutex::new(conn)),
            db_path: Some(db_path.to_path_buf()),
        };
        repo.run_migrations()?;
        Ok(repo)
    }

    /// Fresh in-memory database with the full schema
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().during("open database")?;
        let repo = Self {
            conn: Arc::new(Mutex::new(conn)),
            db_path: None,
        };
        repo.run_migrations()?;
        Ok(repo)
    }

    fn try_open_connection(db_path: &Path) -> duckdb::Result<Connection> {
        // Extension autoloading off: nothing here needs one, and cached
        // extensions can fail code-signing checks on macOS.
        let config = duckdb::Config::default().enable_autoload_extension(false)?;
        Connection::open_with_flags(db_path, config)
    }

    /// Apply pending schema migrations
    pub fn run_migrations(&self) -> Result<MigrationResult> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| Error::storage("migrate", "connection lock poisoned"))?;
        let result = MigrationService::new(&conn)
            .run_pending()
            .map_err(|e| Error::storage("migrate", format!("{:#}", e)))?;
        if !result.applied.is_empty() {
            tracing::info!(applied = ?result.applied, "applied database migrations");
        }
        Ok(result)
    }

    /// Database file, or `None` for an in-memory database
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Run `f` against the connection on the blocking pool
    async fn with_conn<T, F>(&self, operation: &'static str, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| Error::storage(operation, "connection lock poisoned"))?;
            f(&mut guard)
        })
        .await
        .map_err(|e| Error::storage(operation, e))?
    }

    /// Like `with_conn`, but stops waiting for the connection once
    /// `commit_by` passes. `f` must call `ensure_before` ahead of its commit.
    async fn with_conn_until<T, F>(
        &self,
        operation: &'static str,
        commit_by: Instant,
        f: F,
    ) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = lock_until(&conn, operation, commit_by)?;
            ensure_before(commit_by, operation)?;
            f(&mut guard)
        })
        .await
        .map_err(|e| Error::storage(operation, e))?
    }
}

fn lock_until<'a>(
    conn: &'a Mutex<Connection>,
    operation: &'static str,
    commit_by: Instant,
) -> Result<MutexGuard<'a, Connection>> {
    loop {
        match conn.try_lock() {
            Ok(guard) => return Ok(guard),
            Err(TryLockError::Poisoned(_)) => {
                return Err(Error::storage(operation, "connection lock poisoned"));
            }
            Err(TryLockError::WouldBlock) => {
                ensure_before(commit_by, operation)?;
                thread::sleep(LOCK_POLL_INTERVAL);
            }
        }
    }
}

// === Row mapping ===

fn conversion_error<E>(idx: usize, err: E) -> duckdb::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    duckdb::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn parsed_at<T>(row: &duckdb::Row, idx: usize) -> duckdb::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e| conversion_error(idx, e))
}

fn timestamp_at(row: &duckdb::Row, idx: usize) -> duckdb::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn row_to_account(row: &duckdb::Row) -> duckdb::Result<Account> {
    Ok(Account {
        id: row.get(0)?,
        owner_user_id: row.get(1)?,
        balance: parsed_at::<Decimal>(row, 2)?,
        currency: parsed_at::<Currency>(row, 3)?,
        created_at: timestamp_at(row, 4)?,
    })
}

fn row_to_transaction(row: &duckdb::Row) -> duckdb::Result<Transaction> {
    Ok(Transaction {
        id: row.get(0)?,
        account_id: row.get(1)?,
        amount: parsed_at(row, 2)?,
        tx_type: parsed_at(row, 3)?,
        status: parsed_at(row, 4)?,
        created_at: timestamp_at(row, 5)?,
    })
}

fn row_to_card(row: &duckdb::Row) -> duckdb::Result<Card> {
    Ok(Card {
        id: row.get(0)?,
        owner_user_id: row.get(1)?,
        encrypted_pan: row.get(2)?,
        encrypted_expiry: row.get(3)?,
        cvv_digest: row.get(4)?,
        created_at: timestamp_at(row, 5)?,
    })
}

// === Statement helpers (usable on a connection or an open transaction) ===

fn account_exists(conn: &Connection, id: AccountId) -> Result<bool> {
    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM accounts WHERE id = ?", [id], |row| row.get(0))
        .during("check account")?;
    Ok(count > 0)
}

/// Conditionally add `delta`; returns false if the row is missing or the
/// result would be negative
fn add_to_balance(conn: &Connection, id: AccountId, delta: Decimal) -> Result<bool> {
    let delta = delta.to_string();
    let updated = conn
        .execute(
            "UPDATE accounts
             SET balance = balance + CAST(? AS DECIMAL(18, 2))
             WHERE id = ? AND balance + CAST(? AS DECIMAL(18, 2)) >= 0",
            params![delta, id, delta],
        )
        .during("update balance")?;
    Ok(updated == 1)
}

/// Explain a failed conditional update
fn balance_update_error(conn: &Connection, id: AccountId) -> Error {
    match account_exists(conn, id) {
        Ok(true) => Error::InsufficientFunds { account_id: id },
        Ok(false) => Error::not_found("account", id),
        Err(e) => e,
    }
}

fn insert_transaction(conn: &Connection, new: &NewTransaction) -> Result<Transaction> {
    let created_at = Utc::now();
    let id: i64 = conn
        .query_row(
            "INSERT INTO transactions (account_id, amount, type, status, created_at)
             VALUES (?, CAST(? AS DECIMAL(18, 2)), ?, ?, ?)
             RETURNING id",
            params![
                new.account_id,
                new.amount.to_string(),
                new.tx_type.as_str(),
                new.status.as_str(),
                created_at.to_rfc3339(),
            ],
            |row| row.get(0),
        )
        .during("insert transaction")?;

    Ok(Transaction {
        id,
        account_id: new.account_id,
        amount: new.amount,
        tx_type: new.tx_type,
        status: new.status,
        created_at,
    })
}

fn query_transactions(conn: &Connection, sql: &str, id: i64) -> Result<Vec<Transaction>> {
    let mut stmt = conn.prepare(sql).during("list transactions")?;
    let rows = stmt
        .query_map([id], row_to_transaction)
        .during("list transactions")?
        .collect::<duckdb::Result<Vec<_>>>()
        .during("list transactions")?;
    Ok(rows)
}

#[async_trait]
impl LedgerRepository for DuckDbRepository {
    async fn insert_account(&self, owner_user_id: UserId, currency: Currency) -> Result<Account> {
        self.with_conn("insert account", move |conn| {
            let created_at = Utc::now();
            let id: i64 = conn
                .query_row(
                    "INSERT INTO accounts (owner_user_id, currency, created_at)
                     VALUES (?, ?, ?)
                     RETURNING id",
                    params![owner_user_id, currency.as_str(), created_at.to_rfc3339()],
                    |row| row.get(0),
                )
                .during("insert account")?;

            Ok(Account {
                id,
                owner_user_id,
                balance: Decimal::ZERO,
                currency,
                created_at,
            })
        })
        .await
    }

    async fn get_account(&self, id: AccountId) -> Result<Option<Account>> {
        self.with_conn("get account", move |conn| {
            let mut stmt = conn
                .prepare(&format!("{} WHERE id = ?", ACCOUNT_COLUMNS))
                .during("get account")?;
            let mut rows = stmt.query([id]).during("get account")?;
            match rows.next().during("get account")? {
                Some(row) => Ok(Some(row_to_account(row).during("get account")?)),
                None => Ok(None),
            }
        })
        .await
    }

    async fn list_accounts_by_user(&self, user_id: UserId) -> Result<Vec<Account>> {
        self.with_conn("list accounts", move |conn| {
            let mut stmt = conn
                .prepare(&format!("{} WHERE owner_user_id = ? ORDER BY id", ACCOUNT_COLUMNS))
                .during("list accounts")?;
            let accounts = stmt
                .query_map([user_id], row_to_account)
                .during("list accounts")?
                .collect::<duckdb::Result<Vec<_>>>()
                .during("list accounts")?;
            Ok(accounts)
        })
        .await
    }

    async fn apply_balance_delta_and_log(
        &self,
        account_id: AccountId,
        delta: Decimal,
        tx_type: TransactionType,
        commit_by: Instant,
    ) -> Result<Transaction> {
        self.with_conn_until("apply balance delta", commit_by, move |conn| {
            let tx = conn.transaction().during("begin transaction")?;

            if !add_to_balance(&tx, account_id, delta)? {
                return Err(balance_update_error(&tx, account_id));
            }
            let record = insert_transaction(
                &tx,
                &NewTransaction {
                    tx_type,
                    ..NewTransaction::completed(account_id, delta)
                },
            )?;

            ensure_before(commit_by, "apply balance delta")?;
            tx.commit().during("commit balance delta")?;
            Ok(record)
        })
        .await
    }

    async fn apply_transfer_and_log(
        &self,
        from_id: AccountId,
        to_id: AccountId,
        amount: Decimal,
        commit_by: Instant,
    ) -> Result<(Transaction, Transaction)> {
        self.with_conn_until("apply transfer", commit_by, move |conn| {
            let tx = conn.transaction().during("begin transaction")?;

            if !add_to_balance(&tx, from_id, -amount)? {
                return Err(balance_update_error(&tx, from_id));
            }
            if !add_to_balance(&tx, to_id, amount)? {
                return Err(Error::not_found("account", to_id));
            }
            let withdrawal = insert_transaction(&tx, &NewTransaction::completed(from_id, -amount))?;
            let deposit = insert_transaction(&tx, &NewTransaction::completed(to_id, amount))?;

            ensure_before(commit_by, "apply transfer")?;
            tx.commit().during("commit transfer")?;
            Ok((withdrawal, deposit))
        })
        .await
    }

    async fn list_transactions_by_account(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<Transaction>> {
        self.with_conn("list transactions", move |conn| {
            query_transactions(
                conn,
                &format!("{} WHERE t.account_id = ? ORDER BY t.id", TRANSACTION_COLUMNS),
                account_id,
            )
        })
        .await
    }

    async fn list_transactions_by_user(&self, user_id: UserId) -> Result<Vec<Transaction>> {
        self.with_conn("list transactions", move |conn| {
            query_transactions(
                conn,
                &format!(
                    "{} JOIN accounts a ON a.id = t.account_id WHERE a.owner_user_id = ? ORDER BY t.id",
                    TRANSACTION_COLUMNS
                ),
                user_id,
            )
        })
        .await
    }
}

#[async_trait]
impl CardRepository for DuckDbRepository {
    async fn insert_card(&self, card: NewCard) -> Result<Card> {
        self.with_conn("insert card", move |conn| {
            let created_at = Utc::now();
            let id: CardId = conn
                .query_row(
                    "INSERT INTO cards (owner_user_id, encrypted_pan, encrypted_expiry, cvv_digest, created_at)
                     VALUES (?, ?, ?, ?, ?)
                     RETURNING id",
                    params![
                        card.owner_user_id,
                        card.encrypted_pan,
                        card.encrypted_expiry,
                        card.cvv_digest,
                        created_at.to_rfc3339(),
                    ],
                    |row| row.get(0),
                )
                .during("insert card")?;

            Ok(Card {
                id,
                owner_user_id: card.owner_user_id,
                encrypted_pan: card.encrypted_pan,
                encrypted_expiry: card.encrypted_expiry,
                cvv_digest: card.cvv_digest,
                created_at,
            })
        })
        .await
    }

    async fn get_card(&self, id: CardId) -> Result<Option<Card>> {
        self.with_conn("get card", move |conn| {
            let mut stmt = conn
                .prepare(&format!("{} WHERE id = ?", CARD_COLUMNS))
                .during("get card")?;
            let mut rows = stmt.query([id]).during("get card")?;
            match rows.next().during("get card")? {
                Some(row) => Ok(Some(row_to_card(row).during("get card")?)),
                None => Ok(None),
            }
        })
        .await
    }

    async fn list_cards_by_user(&self, user_id: UserId) -> Result<Vec<CardSummary>> {
        self.with_conn("list cards", move |conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, owner_user_id, created_at FROM cards
                     WHERE owner_user_id = ?
                     ORDER BY id DESC",
                )
                .during("list cards")?;
            let cards = stmt
                .query_map([user_id], |row| {
                    Ok(CardSummary {
                        id: row.get(0)?,
                        owner_user_id: row.get(1)?,
                        created_at: timestamp_at(row, 2)?,
                    })
                })
                .during("list cards")?
                .collect::<duckdb::Result<Vec<_>>>()
                .during("list cards")?;
            Ok(cards)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn later() -> Instant {
        Instant::now() + Duration::from_secs(60)
    }

    async fn funded_pair(repo: &DuckDbRepository) -> (Account, Account) {
        let a = repo.insert_account(1, Currency::Rub).await.unwrap();
        let b = repo.insert_account(2, Currency::Rub).await.unwrap();
        repo.apply_balance_delta_and_log(a.id, dec("100"), TransactionType::Deposit, later())
            .await
            .unwrap();
        (a, b)
    }

    async fn balance(repo: &DuckDbRepository, id: AccountId) -> Decimal {
        repo.get_account(id).await.unwrap().unwrap().balance
    }

    #[test]
    fn test_retryable_errors() {
        assert!(is_retryable_error(
            "IO Error: Could not set lock on file: Resource temporarily unavailable"
        ));
        assert!(is_retryable_error(
            "The process cannot access the file because it is being used by another process"
        ));
        assert!(!is_retryable_error("Catalog Error: Table with name foo does not exist!"));
    }

    #[tokio::test]
    async fn test_account_roundtrip() {
        let repo = DuckDbRepository::open_in_memory().unwrap();

        let created = repo.insert_account(7, Currency::Usd).await.unwrap();
        let loaded = repo.get_account(created.id).await.unwrap().unwrap();

        assert_eq!(loaded, created);
        assert_eq!(loaded.balance, Decimal::ZERO);
        assert!(repo.get_account(created.id + 100).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delta_keeps_two_decimal_places() {
        let repo = DuckDbRepository::open_in_memory().unwrap();
        let account = repo.insert_account(1, Currency::Rub).await.unwrap();

        repo.apply_balance_delta_and_log(
            account.id,
            dec("10.05"),
            TransactionType::Deposit,
            later(),
        )
        .await
        .unwrap();
        repo.apply_balance_delta_and_log(
            account.id,
            dec("-0.05"),
            TransactionType::Withdrawal,
            later(),
        )
        .await
        .unwrap();

        let loaded = repo.get_account(account.id).await.unwrap().unwrap();
        assert_eq!(loaded.balance, dec("10.00"));
        let history = repo.list_transactions_by_account(account.id).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].amount, dec("0.05"));
        assert_eq!(history[1].tx_type, TransactionType::Withdrawal);
    }

    #[tokio::test]
    async fn test_overdraw_rolls_back() {
        let repo = DuckDbRepository::open_in_memory().unwrap();
        let account = repo.insert_account(1, Currency::Rub).await.unwrap();

        let err = repo
            .apply_balance_delta_and_log(
                account.id,
                dec("-1"),
                TransactionType::Withdrawal,
                later(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, Error::InsufficientFunds { account_id } if account_id == account.id));
        assert!(repo.list_transactions_by_account(account.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_transfer_to_missing_account_rolls_back() {
        let repo = DuckDbRepository::open_in_memory().unwrap();
        let from = repo.insert_account(1, Currency::Rub).await.unwrap();
        repo.apply_balance_delta_and_log(from.id, dec("100"), TransactionType::Deposit, later())
            .await
            .unwrap();

        let err = repo
            .apply_transfer_and_log(from.id, 999, dec("40"), later())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::NotFound { entity: "account", id: 999 }));
        let loaded = repo.get_account(from.id).await.unwrap().unwrap();
        assert_eq!(loaded.balance, dec("100"));
        assert_eq!(repo.list_transactions_by_account(from.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_transfer_waiting_past_deadline_never_commits() {
        let repo = DuckDbRepository::open_in_memory().unwrap();
        let (a, b) = funded_pair(&repo).await;

        let (locked_tx, locked_rx) = std::sync::mpsc::channel();
        let conn = Arc::clone(&repo.conn);
        let holder = thread::spawn(move || {
            let _guard = conn.lock().unwrap();
            locked_tx.send(()).unwrap();
            thread::sleep(Duration::from_millis(300));
        });
        locked_rx.recv().unwrap();

        let commit_by = Instant::now() + Duration::from_millis(100);
        let err = repo
            .apply_transfer_and_log(a.id, b.id, dec("40"), commit_by)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Timeout { ref operation } if operation == "apply transfer"));

        holder.join().unwrap();
        assert_eq!(balance(&repo, a.id).await, dec("100"));
        assert_eq!(balance(&repo, b.id).await, Decimal::ZERO);
        assert_eq!(repo.list_transactions_by_account(a.id).await.unwrap().len(), 1);
        assert!(repo.list_transactions_by_account(b.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_expired_deadline_leaves_balance_unchanged() {
        let repo = DuckDbRepository::open_in_memory().unwrap();
        let (a, _) = funded_pair(&repo).await;

        let err = repo
            .apply_balance_delta_and_log(
                a.id,
                dec("-30"),
                TransactionType::Withdrawal,
                Instant::now(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Timeout { .. }));
        assert_eq!(balance(&repo, a.id).await, dec("100"));
        assert_eq!(repo.list_transactions_by_account(a.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_cards_listed_newest_first() {
        let repo = DuckDbRepository::open_in_memory().unwrap();
        for n in 0..3u8 {
            repo.insert_card(NewCard {
                owner_user_id: 5,
                encrypted_pan: vec![n; 4],
                encrypted_expiry: vec![n; 2],
                cvv_digest: format!("digest-{}", n),
            })
            .await
            .unwrap();
        }

        let cards = repo.list_cards_by_user(5).await.unwrap();
        assert_eq!(cards.len(), 3);
        assert!(cards[0].id > cards[2].id);

        let stored = repo.get_card(cards[2].id).await.unwrap().unwrap();
        assert_eq!(stored.encrypted_pan, vec![0u8; 4]);
        assert_eq!(stored.cvv_digest, "digest-0");
    }

    #[test]
    fn test_open_file_twice_in_process() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bank.duckdb");

        let first = DuckDbRepository::open(&path).unwrap();
        drop(first);
        let second = DuckDbRepository::open(&path).unwrap();
        assert_eq!(second.db_path(), Some(path.as_path()));
    }
}
