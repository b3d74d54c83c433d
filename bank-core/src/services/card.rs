//! Card service - issuance, masked disclosure and payment verification
//!
//! Plaintext card data exists only on the stack of these methods. The
//! tracing events carry card and user ids, nothing else.

use std::sync::Arc;

use crate::domain::result::{Error, Result};
use crate::domain::{
    mask_pan, Card, CardDetails, CardId, CardSummary, Expiry, IssuedCard, NewCard, UserId,
};
use crate::ports::{CardRepository, Clock};
use crate::services::card_generator::CardNumberGenerator;
use crate::services::card_vault::{payment_message, CardVault};
use crate::services::deadline::Deadline;

/// Decrypted card data of a card that passed CVV and expiry checks
struct AuthorizedCard {
    pan: String,
    expiry: String,
}

pub struct CardService {
    repository: Arc<dyn CardRepository>,
    vault: CardVault,
    generator: CardNumberGenerator,
    clock: Arc<dyn Clock>,
    deadline: Deadline,
}

impl CardService {
    pub fn new(
        repository: Arc<dyn CardRepository>,
        vault: CardVault,
        generator: CardNumberGenerator,
        clock: Arc<dyn Clock>,
        deadline: Deadline,
    ) -> Self {
        Self {
            repository,
            vault,
            generator,
            clock,
            deadline,
        }
    }

    /// Issue a card to the caller
    ///
    /// Nothing is persisted unless generation, both encryptions and the CVV
    /// hash succeed. The returned `IssuedCard` is the only copy of the
    /// plaintext; its signature is what `verify_card_payment_signed` expects.
    pub async fn create_card(
        &self,
        caller: UserId,
        passphrase: &str,
    ) -> Result<(Card, IssuedCard)> {
        if passphrase.is_empty() {
            return Err(Error::validation("passphrase must not be empty"));
        }

        let generated = self.generator.generate(self.clock.now().date_naive())?;
        let expiry = generated.expiry.to_string();

        let encrypted_pan = self
            .deadline
            .run("encrypt card number", self.vault.encrypt(&generated.pan, passphrase))
            .await?;
        let encrypted_expiry = self
            .deadline
            .run("encrypt expiry", self.vault.encrypt(&expiry, passphrase))
            .await?;
        let cvv_digest = self
            .deadline
            .run("hash cvv", self.vault.hash_secret(&generated.cvv))
            .await?;

        let card = self
            .deadline
            .run(
                "insert card",
                self.repository.insert_card(NewCard {
                    owner_user_id: caller,
                    encrypted_pan,
                    encrypted_expiry,
                    cvv_digest,
                }),
            )
            .await?;

        let signature = self.vault.sign(&payment_message(
            card.id,
            &generated.pan,
            &expiry,
            &generated.cvv,
        ))?;

        tracing::info!(card_id = card.id, user_id = caller, "card issued");

        Ok((
            card,
            IssuedCard {
                pan: generated.pan,
                expiry,
                cvv: generated.cvv,
                signature,
            },
        ))
    }

    /// Masked PAN and expiry of one of the caller's cards
    pub async fn get_card_details(
        &self,
        card_id: CardId,
        caller: UserId,
        passphrase: &str,
    ) -> Result<CardDetails> {
        let card = self.load_card(card_id).await?;
        if card.owner_user_id != caller {
            tracing::warn!(card_id, user_id = caller, "card details requested by non-owner");
            return Err(Error::forbidden("card", card_id));
        }

        let pan = self
            .deadline
            .run("decrypt card number", self.vault.decrypt(&card.encrypted_pan, passphrase))
            .await?;
        let expiry = self
            .deadline
            .run("decrypt expiry", self.vault.decrypt(&card.encrypted_expiry, passphrase))
            .await?;

        Ok(CardDetails {
            id: card.id,
            masked_pan: mask_pan(&pan),
            expiry,
        })
    }

    /// Card metadata only; encrypted columns are never loaded on this path
    pub async fn list_cards_for_user(&self, caller: UserId) -> Result<Vec<CardSummary>> {
        self.deadline
            .run("list cards", self.repository.list_cards_by_user(caller))
            .await
    }

    /// Authorize a payment: CVV matches, passphrase decrypts, card unexpired
    pub async fn verify_card_payment(
        &self,
        card_id: CardId,
        cvv: &str,
        passphrase: &str,
    ) -> Result<bool> {
        self.authorize(card_id, cvv, passphrase).await?;
        tracing::info!(card_id, "card payment authorized");
        Ok(true)
    }

    /// `verify_card_payment` plus a match against the signature handed out
    /// at issuance
    pub async fn verify_card_payment_signed(
        &self,
        card_id: CardId,
        cvv: &str,
        passphrase: &str,
        expected_signature: &str,
    ) -> Result<bool> {
        let card = self.authorize(card_id, cvv, passphrase).await?;
        let message = payment_message(card_id, &card.pan, &card.expiry, cvv);

        if !self.vault.verify_signature(&message, expected_signature)? {
            tracing::warn!(card_id, "payment signature mismatch");
            return Err(Error::SignatureMismatch { card_id });
        }

        tracing::info!(card_id, "signed card payment authorized");
        Ok(true)
    }

    async fn load_card(&self, card_id: CardId) -> Result<Card> {
        self.deadline
            .run("get card", self.repository.get_card(card_id))
            .await?
            .ok_or_else(|| Error::not_found("card", card_id))
    }

    async fn authorize(
        &self,
        card_id: CardId,
        cvv: &str,
        passphrase: &str,
    ) -> Result<AuthorizedCard> {
        let card = self.load_card(card_id).await?;

        let cvv_ok = self
            .deadline
            .run("verify cvv", self.vault.verify_secret(cvv, &card.cvv_digest))
            .await?;
        if !cvv_ok {
            tracing::warn!(card_id, "card payment rejected: cvv");
            return Err(Error::InvalidCvv { card_id });
        }

        let expiry = self
            .deadline
            .run("decrypt expiry", self.vault.decrypt(&card.encrypted_expiry, passphrase))
            .await?;
        let pan = self
            .deadline
            .run("decrypt card number", self.vault.decrypt(&card.encrypted_pan, passphrase))
            .await?;

        if Expiry::parse(&expiry)?.is_expired_at(self.clock.now()) {
            tracing::warn!(card_id, "card payment rejected: expired");
            return Err(Error::CardExpired { card_id });
        }

        Ok(AuthorizedCard { pan, expiry })
    }
}
