//! Authenticated session bootstrap from an exported cookie bundle.

mod bootstrap;
mod credentials;

pub use bootstrap::{Authenticator, SessionBootstrapper};
pub use credentials::CredentialBundle;
