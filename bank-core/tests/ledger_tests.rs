//! Integration tests for the ledger
//!
//! Every test runs the real LedgerService against a DuckDB file in a
//! temporary directory.
//!
//! Run with: cargo test --test ledger_tests -- --nocapture

use std::sync::Arc;
use std::time::{Duration, Instant};

use rust_decimal::Decimal;
use tempfile::TempDir;

use bank_core::adapters::duckdb::DuckDbRepository;
use bank_core::domain::{Currency, TransactionStatus, TransactionType};
use bank_core::ports::LedgerRepository;
use bank_core::services::{Deadline, LedgerService};
use bank_core::Error;

// ============================================================================
// Test Helpers
// ============================================================================

fn dec(s: &str) -> Decimal {
    s.parse().unwrap()
}

/// Repository over a fresh database file, plus the service on top of it
fn setup(temp_dir: &TempDir) -> (Arc<DuckDbRepository>, LedgerService) {
    let db_path = temp_dir.path().join("bank.duckdb");
    let repo = Arc::new(DuckDbRepository::open(&db_path).expect("Failed to open repository"));
    let service = LedgerService::new(repo.clone(), Deadline::default());
    (repo, service)
}

const ALICE: i64 = 1;
const BOB: i64 = 2;

// ============================================================================
// Balance Updates
// ============================================================================

/// +50.00 then -30.00 on a 100.00 account leaves 120.00 and two entries
#[tokio::test]
async fn test_deposit_then_withdraw_logs_both() {
    let temp_dir = TempDir::new().unwrap();
    let (_, service) = setup(&temp_dir);

    let account = service.create_account(ALICE, Currency::Rub).await.unwrap();
    service.update_balance(account.id, ALICE, dec("100.00")).await.unwrap();
    let before = service.list_transactions(account.id, ALICE).await.unwrap().len();

    service.update_balance(account.id, ALICE, dec("50.00")).await.unwrap();
    service.update_balance(account.id, ALICE, dec("-30.00")).await.unwrap();

    let loaded = service.get_account(account.id, ALICE).await.unwrap();
    assert_eq!(loaded.balance, dec("120.00"));

    let history = service.list_transactions(account.id, ALICE).await.unwrap();
    let new_entries = &history[before..];
    assert_eq!(new_entries.len(), 2);
    assert_eq!(new_entries[0].tx_type, TransactionType::Deposit);
    assert_eq!(new_entries[0].amount, dec("50.00"));
    assert_eq!(new_entries[1].tx_type, TransactionType::Withdrawal);
    assert_eq!(new_entries[1].amount, dec("30.00"));
    assert!(new_entries.iter().all(|t| t.status == TransactionStatus::Completed));
}

/// A withdrawal past zero fails and writes nothing
#[tokio::test]
async fn test_overdraft_rejected_without_side_effects() {
    let temp_dir = TempDir::new().unwrap();
    let (_, service) = setup(&temp_dir);

    let account = service.create_account(ALICE, Currency::Usd).await.unwrap();
    service.update_balance(account.id, ALICE, dec("10.00")).await.unwrap();

    let err = service
        .update_balance(account.id, ALICE, dec("-10.01"))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::InsufficientFunds { account_id } if account_id == account.id));
    assert_eq!(
        service.get_account(account.id, ALICE).await.unwrap().balance,
        dec("10.00")
    );
    assert_eq!(service.list_transactions(account.id, ALICE).await.unwrap().len(), 1);
}

/// Withdrawing the exact balance reaches zero
#[tokio::test]
async fn test_withdraw_to_exactly_zero() {
    let temp_dir = TempDir::new().unwrap();
    let (_, service) = setup(&temp_dir);

    let account = service.create_account(ALICE, Currency::Eur).await.unwrap();
    service.update_balance(account.id, ALICE, dec("7.25")).await.unwrap();
    service.update_balance(account.id, ALICE, dec("-7.25")).await.unwrap();

    assert_eq!(
        service.get_account(account.id, ALICE).await.unwrap().balance,
        Decimal::ZERO
    );
}

/// The repository guard holds even when the service-level check is bypassed
#[tokio::test]
async fn test_repository_guard_blocks_negative_balance() {
    let temp_dir = TempDir::new().unwrap();
    let (repo, service) = setup(&temp_dir);

    let account = service.create_account(ALICE, Currency::Rub).await.unwrap();
    let err = repo
        .apply_balance_delta_and_log(
            account.id,
            dec("-0.01"),
            TransactionType::Withdrawal,
            Instant::now() + Duration::from_secs(60),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, Error::InsufficientFunds { .. }));
    assert!(repo.list_transactions_by_account(account.id).await.unwrap().is_empty());
}

// ============================================================================
// Transfers
// ============================================================================

/// 100.00 on A, transfer of 150.00 fails and neither balance moves
#[tokio::test]
async fn test_transfer_more_than_balance() {
    let temp_dir = TempDir::new().unwrap();
    let (_, service) = setup(&temp_dir);

    let a = service.create_account(ALICE, Currency::Rub).await.unwrap();
    let b = service.create_account(BOB, Currency::Rub).await.unwrap();
    service.update_balance(a.id, ALICE, dec("100.00")).await.unwrap();

    let err = service.transfer(a.id, b.id, ALICE, dec("150.00")).await.unwrap_err();

    assert!(matches!(err, Error::InsufficientFunds { account_id } if account_id == a.id));
    assert_eq!(service.get_account(a.id, ALICE).await.unwrap().balance, dec("100.00"));
    assert_eq!(service.get_account(b.id, BOB).await.unwrap().balance, Decimal::ZERO);
    assert!(service.list_transactions(b.id, BOB).await.unwrap().is_empty());
}

/// A -> B then B -> A restores both balances with exactly four entries
#[tokio::test]
async fn test_round_trip_transfer_restores_balances() {
    let temp_dir = TempDir::new().unwrap();
    let (repo, service) = setup(&temp_dir);

    let a = service.create_account(ALICE, Currency::Usd).await.unwrap();
    let b = service.create_account(BOB, Currency::Usd).await.unwrap();
    service.update_balance(a.id, ALICE, dec("80.00")).await.unwrap();
    service.update_balance(b.id, BOB, dec("5.00")).await.unwrap();
    let entries_before = repo.list_transactions_by_account(a.id).await.unwrap().len()
        + repo.list_transactions_by_account(b.id).await.unwrap().len();

    service.transfer(a.id, b.id, ALICE, dec("33.30")).await.unwrap();
    service.transfer(b.id, a.id, BOB, dec("33.30")).await.unwrap();

    assert_eq!(service.get_account(a.id, ALICE).await.unwrap().balance, dec("80.00"));
    assert_eq!(service.get_account(b.id, BOB).await.unwrap().balance, dec("5.00"));

    let a_history = repo.list_transactions_by_account(a.id).await.unwrap();
    let b_history = repo.list_transactions_by_account(b.id).await.unwrap();
    assert_eq!(a_history.len() + b_history.len() - entries_before, 4);

    // Source side is always the withdrawal
    assert_eq!(a_history[1].tx_type, TransactionType::Withdrawal);
    assert_eq!(b_history[1].tx_type, TransactionType::Deposit);
    assert_eq!(b_history[2].tx_type, TransactionType::Withdrawal);
    assert_eq!(a_history[2].tx_type, TransactionType::Deposit);
}

/// Transfers from someone else's account are refused
#[tokio::test]
async fn test_transfer_requires_source_ownership() {
    let temp_dir = TempDir::new().unwrap();
    let (_, service) = setup(&temp_dir);

    let a = service.create_account(ALICE, Currency::Rub).await.unwrap();
    let b = service.create_account(BOB, Currency::Rub).await.unwrap();
    service.update_balance(b.id, BOB, dec("50")).await.unwrap();

    assert!(matches!(
        service.transfer(b.id, a.id, ALICE, dec("10")).await,
        Err(Error::Forbidden { entity: "account", .. })
    ));
    assert_eq!(service.get_account(b.id, BOB).await.unwrap().balance, dec("50"));
}

// ============================================================================
// Listings and persistence
// ============================================================================

#[tokio::test]
async fn test_user_history_covers_all_owned_accounts() {
    let temp_dir = TempDir::new().unwrap();
    let (_, service) = setup(&temp_dir);

    let rub = service.create_account(ALICE, Currency::Rub).await.unwrap();
    let usd = service.create_account(ALICE, Currency::Usd).await.unwrap();
    let other = service.create_account(BOB, Currency::Rub).await.unwrap();
    service.update_balance(rub.id, ALICE, dec("1")).await.unwrap();
    service.update_balance(usd.id, ALICE, dec("2")).await.unwrap();
    service.update_balance(other.id, BOB, dec("3")).await.unwrap();

    let accounts = service.list_accounts(ALICE).await.unwrap();
    assert_eq!(
        accounts.iter().map(|a| a.id).collect::<Vec<_>>(),
        vec![rub.id, usd.id]
    );

    let history = service.list_transactions_for_user(ALICE).await.unwrap();
    assert_eq!(history.len(), 2);
    assert!(history.iter().all(|t| t.account_id != other.id));
}

/// Balances and history survive closing and reopening the database file
#[tokio::test]
async fn test_state_persists_across_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let account_id = {
        let (_, service) = setup(&temp_dir);
        let account = service.create_account(ALICE, Currency::Eur).await.unwrap();
        service.update_balance(account.id, ALICE, dec("12.34")).await.unwrap();
        account.id
    };

    let (_, service) = setup(&temp_dir);
    let account = service.get_account(account_id, ALICE).await.unwrap();
    assert_eq!(account.balance, dec("12.34"));
    assert_eq!(account.currency, Currency::Eur);
    assert_eq!(service.list_transactions(account_id, ALICE).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_missing_account_is_not_found() {
    let temp_dir = TempDir::new().unwrap();
    let (_, service) = setup(&temp_dir);

    assert!(matches!(
        service.get_account(12345, ALICE).await,
        Err(Error::NotFound { entity: "account", id: 12345 })
    ));
}
