//! Session and token core: JWT-family tokens, the session state
//! machine, device binding, blacklist, and purpose-specific rate
//! limits.

pub mod blacklist;
pub mod device;
pub mod ratelimit;
pub mod state;
pub mod token;

pub use blacklist::TokenBlacklist;
pub use ratelimit::{PurposeLimits, SessionRateLimiter, LOGIN_LIMITS, MFA_VERIFY_LIMITS, PASSWORD_RESET_LIMITS};
pub use state::{Session, SessionError, SessionManager, SessionStatus};
pub use token::{TokenClaims, TokenError, TokenService, TokenType};
