//! Concurrent ledger access tests
//!
//! Many tasks race to drain the same account. Whatever the interleaving,
//! the balance must never go below zero and every successful debit must
//! be reflected exactly once in both the balance and the history.
//!
//! Run with: cargo test --test concurrent_transfer_test -- --nocapture

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use rust_decimal::Decimal;
use tempfile::TempDir;
use tokio::sync::Barrier;

use bank_core::adapters::duckdb::DuckDbRepository;
use bank_core::adapters::memory::InMemoryRepository;
use bank_core::domain::{Currency, TransactionType};
use bank_core::ports::LedgerRepository;
use bank_core::services::{Deadline, LedgerService};
use bank_core::Error;

/// Number of tasks racing against the same source account
const TASK_COUNT: usize = 8;

/// Debits attempted per task
const ATTEMPTS_PER_TASK: usize = 5;

const OWNER: i64 = 1;
const PAYEE: i64 = 2;

fn dec(s: &str) -> Decimal {
    s.parse().unwrap()
}

#[derive(Debug, Default)]
struct Tally {
    succeeded: AtomicUsize,
    insufficient: AtomicUsize,
    other: AtomicUsize,
}

impl Tally {
    fn record<T>(&self, result: Result<T, Error>) {
        match result {
            Ok(_) => self.succeeded.fetch_add(1, Ordering::SeqCst),
            Err(Error::InsufficientFunds { .. }) => {
                self.insufficient.fetch_add(1, Ordering::SeqCst)
            }
            Err(e) => {
                eprintln!("unexpected error: {}", e);
                self.other.fetch_add(1, Ordering::SeqCst)
            }
        };
    }
}

/// Fund a source with 10.00 and fire TASK_COUNT * ATTEMPTS_PER_TASK debits
/// of 1.00 at it, alternating transfers and plain withdrawals.
async fn race_debits(repo: Arc<dyn LedgerRepository>) {
    let service = Arc::new(LedgerService::new(repo.clone(), Deadline::default()));

    let source = service.create_account(OWNER, Currency::Rub).await.unwrap();
    let target = service.create_account(PAYEE, Currency::Rub).await.unwrap();
    service.update_balance(source.id, OWNER, dec("10.00")).await.unwrap();

    let barrier = Arc::new(Barrier::new(TASK_COUNT));
    let tally = Arc::new(Tally::default());
    let mut handles = Vec::with_capacity(TASK_COUNT);

    for task_id in 0..TASK_COUNT {
        let service = Arc::clone(&service);
        let barrier = Arc::clone(&barrier);
        let tally = Arc::clone(&tally);

        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            for i in 0..ATTEMPTS_PER_TASK {
                if (task_id + i) % 2 == 0 {
                    tally.record(service.transfer(source.id, target.id, OWNER, dec("1.00")).await);
                } else {
                    tally.record(service.update_balance(source.id, OWNER, dec("-1.00")).await);
                }
            }
        }));
    }

    for handle in handles {
        handle.await.unwrap();
    }

    let succeeded = tally.succeeded.load(Ordering::SeqCst);
    let insufficient = tally.insufficient.load(Ordering::SeqCst);
    println!("succeeded: {}, insufficient funds: {}", succeeded, insufficient);

    assert_eq!(tally.other.load(Ordering::SeqCst), 0);
    assert_eq!(succeeded, 10, "exactly the funded amount can be debited");
    assert_eq!(succeeded + insufficient, TASK_COUNT * ATTEMPTS_PER_TASK);

    let source_after = repo.get_account(source.id).await.unwrap().unwrap();
    let target_after = repo.get_account(target.id).await.unwrap().unwrap();
    assert_eq!(source_after.balance, Decimal::ZERO);

    // Every withdrawal on the source is either a plain debit or the source
    // side of a transfer whose deposit landed on the target
    let source_history = repo.list_transactions_by_account(source.id).await.unwrap();
    let target_history = repo.list_transactions_by_account(target.id).await.unwrap();
    let withdrawals = source_history
        .iter()
        .filter(|t| t.tx_type == TransactionType::Withdrawal)
        .count();
    assert_eq!(withdrawals, succeeded);
    assert_eq!(
        target_after.balance,
        Decimal::from(target_history.len() as i64)
    );
    assert!(target_history
        .iter()
        .all(|t| t.tx_type == TransactionType::Deposit));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_debits_duckdb() {
    let temp_dir = TempDir::new().unwrap();
    let repo = DuckDbRepository::open(&temp_dir.path().join("race.duckdb")).unwrap();
    race_debits(Arc::new(repo)).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_debits_in_memory() {
    race_debits(Arc::new(InMemoryRepository::new())).await;
}

/// Two accounts sending to each other at the same time must not deadlock
/// and must conserve the total.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_opposing_transfers_conserve_total() {
    let temp_dir = TempDir::new().unwrap();
    let repo: Arc<dyn LedgerRepository> =
        Arc::new(DuckDbRepository::open(&temp_dir.path().join("opposing.duckdb")).unwrap());
    let service = Arc::new(LedgerService::new(repo, Deadline::default()));

    let a = service.create_account(OWNER, Currency::Usd).await.unwrap();
    let b = service.create_account(PAYEE, Currency::Usd).await.unwrap();
    service.update_balance(a.id, OWNER, dec("20.00")).await.unwrap();
    service.update_balance(b.id, PAYEE, dec("20.00")).await.unwrap();

    let forward = {
        let service = Arc::clone(&service);
        tokio::spawn(async move {
            for _ in 0..15 {
                let _ = service.transfer(a.id, b.id, OWNER, dec("3.00")).await;
            }
        })
    };
    let backward = {
        let service = Arc::clone(&service);
        tokio::spawn(async move {
            for _ in 0..15 {
                let _ = service.transfer(b.id, a.id, PAYEE, dec("2.00")).await;
            }
        })
    };
    forward.await.unwrap();
    backward.await.unwrap();

    let a_balance = service.get_account(a.id, OWNER).await.unwrap().balance;
    let b_balance = service.get_account(b.id, PAYEE).await.unwrap().balance;
    assert!(a_balance >= Decimal::ZERO);
    assert!(b_balance >= Decimal::ZERO);
    assert_eq!(a_balance + b_balance, dec("40.00"));
}
