pub mod identity;
pub mod middleware;

pub use identity::{issue_token, AuthUser, IdentityVerifier, MaybeAuthUser};
