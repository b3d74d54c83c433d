//! Service layer - business logic orchestration
//!
//! Services coordinate domain logic and port interactions. Each service
//! focuses on a specific use case or feature area.

mod card;
pub mod card_generator;
pub mod card_vault;
mod deadline;
mod ledger;
pub mod logging;
pub mod migration;

pub use card::CardService;
pub use card_generator::{CardNumberGenerator, GeneratedCard};
pub use card_vault::{payment_message, CardVault};
pub use deadline::{ensure_before, Deadline, DEFAULT_OPERATION_TIMEOUT};
pub use ledger::LedgerService;
pub use logging::{EntryPoint, LogEntry, LogEvent, LoggingService};
pub use migration::{MigrationResult, MigrationService};
