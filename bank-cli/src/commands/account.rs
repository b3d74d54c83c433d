//! Account commands - open accounts, move money, show history

use anyhow::{anyhow, Result};
use clap::Subcommand;
use colored::Colorize;
use rust_decimal::Decimal;

use bank_core::domain::{AccountId, UserId};
use bank_core::{Account, Currency, Transaction, TransactionType};

use super::get_context;
use crate::output;

#[derive(Subcommand)]
pub enum AccountCommands {
    /// Open a new account with a zero balance
    Open {
        /// Currency code (RUB, USD, EUR)
        #[arg(long, default_value = "RUB")]
        currency: String,
    },
    /// Show one account
    Show {
        /// Account ID
        id: AccountId,
    },
    /// List your accounts
    List,
    /// Add money to an account
    Deposit {
        /// Account ID
        id: AccountId,
        /// Amount, at most two decimal places
        amount: String,
    },
    /// Take money out of an account
    Withdraw {
        /// Account ID
        id: AccountId,
        /// Amount, at most two decimal places
        amount: String,
    },
    /// Move money from one of your accounts to any account in the same currency
    Transfer {
        /// Source account ID
        #[arg(long)]
        from: AccountId,
        /// Recipient account ID
        #[arg(long)]
        to: AccountId,
        /// Amount, at most two decimal places
        amount: String,
    },
    /// Show transaction history
    History {
        /// Only this account (defaults to all of your accounts)
        #[arg(long)]
        account: Option<AccountId>,
    },
}

impl AccountCommands {
    /// Name used in the event log
    pub fn name(&self) -> &'static str {
        match self {
            AccountCommands::Open { .. } => "account open",
            AccountCommands::Show { .. } => "account show",
            AccountCommands::List => "account list",
            AccountCommands::Deposit { .. } => "account deposit",
            AccountCommands::Withdraw { .. } => "account withdraw",
            AccountCommands::Transfer { .. } => "account transfer",
            AccountCommands::History { .. } => "account history",
        }
    }
}

fn parse_amount(raw: &str) -> Result<Decimal> {
    let amount: Decimal = raw
        .trim()
        .parse()
        .map_err(|_| anyhow!("Invalid amount: {}", raw))?;
    if amount <= Decimal::ZERO {
        return Err(anyhow!("Amount must be positive"));
    }
    Ok(amount)
}

pub async fn run(command: AccountCommands, user: UserId, json: bool) -> Result<()> {
    let ctx = get_context()?;
    let ledger = &ctx.ledger_service;

    match command {
        AccountCommands::Open { currency } => {
            let currency: Currency = currency.parse()?;
            let account = ledger.create_account(user, currency).await?;
            if json {
                return output::json(&account);
            }
            output::success(&format!("Opened account {} ({})", account.id, account.currency));
        }
        AccountCommands::Show { id } => {
            let account = ledger.get_account(id, user).await?;
            if json {
                return output::json(&account);
            }
            print_accounts(&[account]);
        }
        AccountCommands::List => {
            let accounts = ledger.list_accounts(user).await?;
            if json {
                return output::json(&accounts);
            }
            if accounts.is_empty() {
                println!("No accounts found.");
            } else {
                print_accounts(&accounts);
            }
        }
        AccountCommands::Deposit { id, amount } => {
            let entry = ledger.update_balance(id, user, parse_amount(&amount)?).await?;
            if json {
                return output::json(&entry);
            }
            output::success(&format!("Deposited {} to account {}", entry.amount, id));
        }
        AccountCommands::Withdraw { id, amount } => {
            let entry = ledger.update_balance(id, user, -parse_amount(&amount)?).await?;
            if json {
                return output::json(&entry);
            }
            output::success(&format!("Withdrew {} from account {}", entry.amount, id));
        }
        AccountCommands::Transfer { from, to, amount } => {
            let amount = parse_amount(&amount)?;
            let (withdrawal, deposit) = ledger.transfer(from, to, user, amount).await?;
            if json {
                return output::json(serde_json::json!({
                    "withdrawal": withdrawal,
                    "deposit": deposit,
                }));
            }
            output::success(&format!(
                "Transferred {} from account {} to account {}",
                amount, from, to
            ));
        }
        AccountCommands::History { account } => {
            let entries = match account {
                Some(id) => ledger.list_transactions(id, user).await?,
                None => ledger.list_transactions_for_user(user).await?,
            };
            if json {
                return output::json(&entries);
            }
            if entries.is_empty() {
                println!("No transactions found.");
            } else {
                print_transactions(&entries);
            }
        }
    }

    Ok(())
}

fn print_accounts(accounts: &[Account]) {
    let mut table = output::create_table();
    table.set_header(vec!["ID", "Currency", "Balance", "Opened"]);
    for account in accounts {
        table.add_row(vec![
            account.id.to_string(),
            account.currency.to_string(),
            account.balance.to_string(),
            output::format_time(&account.created_at),
        ]);
    }
    println!("{}", table);
}

fn print_transactions(entries: &[Transaction]) {
    let mut table = output::create_table();
    table.set_header(vec!["ID", "Account", "Type", "Amount", "Status", "Time"]);
    for entry in entries {
        let amount = match entry.tx_type {
            TransactionType::Deposit => format!("+{}", entry.amount).green().to_string(),
            TransactionType::Withdrawal => format!("-{}", entry.amount).red().to_string(),
        };
        table.add_row(vec![
            entry.id.to_string(),
            entry.account_id.to_string(),
            entry.tx_type.to_string(),
            amount,
            entry.status.to_string(),
            output::format_time(&entry.created_at),
        ]);
    }
    println!("{}", table);
}
