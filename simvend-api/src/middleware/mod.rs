pub mod auth;
pub mod signature;

pub use auth::{customer_auth_middleware, CustomerClaims};
pub use signature::{
    CallbackScheme, SignatureError, SignatureVerifier, CALLBACK_TOKEN_HEADER, SIGNATURE_HEADER,
};
