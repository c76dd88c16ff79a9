pub mod account;
pub mod password_reset_token;
pub mod postgres;

pub use account::{AccountRepository, InMemoryAccountRepository};
pub use password_reset_token::{InMemoryResetTokenStore, ResetTokenStore};
pub use postgres::{PgAccountRepository, PgResetTokenStore};
