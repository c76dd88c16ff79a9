pub mod auth;
pub mod email;
pub mod password_policy;
pub mod password_reset;
pub mod session;
pub mod token_sweeper;

pub use auth::{AuthService, SignupInput};
pub use email::{ChannelNotifier, LogNotifier, ResetNotifier, notifier_from_config};
pub use password_policy::{PasswordPolicy, PasswordValidationResult, UserContext};
pub use password_reset::PasswordResetService;
pub use session::{SessionClaims, SessionService};
pub use token_sweeper::TokenSweeper;
