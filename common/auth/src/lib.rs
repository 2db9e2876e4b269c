pub mod claims;
pub mod config;
pub mod engine;
pub mod error;
pub mod expiry;
pub mod extractors;
pub mod revocation;
pub mod signer;

pub use claims::{Audience, Claims, Identity, TokenType};
pub use config::EngineConfig;
pub use engine::{TokenEngine, TokenEngineBuilder, TokenOptions};
pub use error::{AuthError, AuthResult};
pub use expiry::{ExpiresIn, ExpiryPolicy};
pub use extractors::{Authorize, RequestContext};
pub use jsonwebtoken::Algorithm;
pub use revocation::{InMemoryDenylist, RevocationCheck, RevocationGate};
pub use signer::{ClaimChecks, Headers, TokenSigner};
