//! Card commands - issue cards, show masked details, authorize payments

use anyhow::{bail, Result};
use clap::Subcommand;
use colored::Colorize;
use dialoguer::Password;

use bank_core::domain::{CardId, UserId};

use super::get_context;
use crate::output;

#[derive(Subcommand)]
pub enum CardCommands {
    /// Issue a new card; the number, expiry and CVV are shown only once
    Issue {
        /// Card passphrase (prompted for when omitted)
        #[arg(long, env = "BANK_CARD_PASSPHRASE", hide_env_values = true)]
        passphrase: Option<String>,
    },
    /// Show the masked number and expiry of one of your cards
    Details {
        /// Card ID
        id: CardId,
        /// Card passphrase (prompted for when omitted)
        #[arg(long, env = "BANK_CARD_PASSPHRASE", hide_env_values = true)]
        passphrase: Option<String>,
    },
    /// List your cards
    List,
    /// Authorize a payment against a card
    Verify {
        /// Card ID
        id: CardId,
        /// Card verification value
        #[arg(long)]
        cvv: String,
        /// Signature returned when the card was issued
        #[arg(long)]
        signature: Option<String>,
        /// Card passphrase (prompted for when omitted)
        #[arg(long, env = "BANK_CARD_PASSPHRASE", hide_env_values = true)]
        passphrase: Option<String>,
    },
}

impl CardCommands {
    /// Name used in the event log
    pub fn name(&self) -> &'static str {
        match self {
            CardCommands::Issue { .. } => "card issue",
            CardCommands::Details { .. } => "card details",
            CardCommands::List => "card list",
            CardCommands::Verify { .. } => "card verify",
        }
    }
}

fn passphrase_or_prompt(passphrase: Option<String>, confirm: bool) -> Result<String> {
    if let Some(p) = passphrase {
        return Ok(p);
    }
    let mut prompt = Password::new().with_prompt("Card passphrase");
    if confirm {
        prompt = prompt.with_confirmation("Repeat passphrase", "Passphrases do not match");
    }
    let entered = prompt.interact()?;
    if entered.is_empty() {
        bail!("Passphrase must not be empty");
    }
    Ok(entered)
}

pub async fn run(command: CardCommands, user: UserId, json: bool) -> Result<()> {
    let ctx = get_context()?;
    let cards = &ctx.card_service;

    match command {
        CardCommands::Issue { passphrase } => {
            let passphrase = passphrase_or_prompt(passphrase, true)?;
            let (card, issued) = cards.create_card(user, &passphrase).await?;
            if json {
                return output::json(serde_json::json!({
                    "card": card.summary(),
                    "issued": issued,
                }));
            }

            output::success(&format!("Issued card {}", card.id));
            println!("  Number:    {}", issued.pan.bold());
            println!("  Expiry:    {}", issued.expiry);
            println!("  CVV:       {}", issued.cvv);
            println!("  Signature: {}", issued.signature.dimmed());
            println!();
            output::warning(
                "These values are not stored in readable form and will not be shown again.",
            );
        }
        CardCommands::Details { id, passphrase } => {
            let passphrase = passphrase_or_prompt(passphrase, false)?;
            let details = cards.get_card_details(id, user, &passphrase).await?;
            if json {
                return output::json(&details);
            }
            println!("{}", format!("Card {}", details.id).bold());
            println!("  Number: {}", details.masked_pan);
            println!("  Expiry: {}", details.expiry);
        }
        CardCommands::List => {
            let summaries = cards.list_cards_for_user(user).await?;
            if json {
                return output::json(&summaries);
            }
            if summaries.is_empty() {
                println!("No cards found.");
                return Ok(());
            }
            let mut table = output::create_table();
            table.set_header(vec!["ID", "Issued"]);
            for summary in &summaries {
                table.add_row(vec![
                    summary.id.to_string(),
                    output::format_time(&summary.created_at),
                ]);
            }
            println!("{}", table);
        }
        CardCommands::Verify {
            id,
            cvv,
            signature,
            passphrase,
        } => {
            let passphrase = passphrase_or_prompt(passphrase, false)?;
            let authorized = match signature {
                Some(sig) => {
                    cards
                        .verify_card_payment_signed(id, &cvv, &passphrase, &sig)
                        .await?
                }
                None => cards.verify_card_payment(id, &cvv, &passphrase).await?,
            };
            if json {
                return output::json(serde_json::json!({ "card_id": id, "authorized": authorized }));
            }
            output::success(&format!("Payment authorized for card {}", id));
        }
    }

    Ok(())
}
