//! Identity resolution, input validation, conversation naming, and
//! completion-context assembly.

pub mod context;
pub mod identity;
pub mod naming;
pub mod validation;

pub use context::{conversation_detail, BuiltContext, ContextBuilder};
pub use identity::{
    hash_token, mint_user_token, AuthenticatedUser, Authenticator, Credentials, IdentityResolver,
    TokenAuthenticator,
};
pub use naming::{conversation_name, display_name, UNTITLED};
