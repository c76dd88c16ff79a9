pub mod account;
pub mod password_reset_token;

pub use account::{Account, NewAccount, PublicAccount, normalize_email};
pub use password_reset_token::{
    PasswordResetToken, ResetGrant, TokenLookup, TokenRejection, generate_token, hash_token,
};
