use axum::http::HeaderMap;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use simvend_shared::Masked;

/// Header carrying the hex HMAC-SHA256 of the raw callback body.
pub const SIGNATURE_HEADER: &str = "x-callback-signature";

/// Header carrying Xendit's static callback verification token.
pub const CALLBACK_TOKEN_HEADER: &str = "x-callback-token";

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("Callback signature secret is not configured")]
    NotConfigured,
    #[error("Callback carries no {0} header")]
    Missing(&'static str),
    #[error("Callback signature is not valid hex")]
    Malformed,
    #[error("Callback signature does not match")]
    Mismatch,
}

/// How a payment callback proves where it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackScheme {
    /// The configured secret echoed verbatim in `x-callback-token` (Xendit).
    Token,
    /// Hex HMAC-SHA256 of the raw body in `x-callback-signature`.
    HmacSha256,
}

impl CallbackScheme {
    pub fn header(&self) -> &'static str {
        match self {
            CallbackScheme::Token => CALLBACK_TOKEN_HEADER,
            CallbackScheme::HmacSha256 => SIGNATURE_HEADER,
        }
    }
}

/// Verifies payment callbacks against the shared webhook secret.
/// Comparison is constant-time under both schemes.
#[derive(Clone)]
pub struct SignatureVerifier {
    secret: Masked<String>,
    scheme: CallbackScheme,
}

impl SignatureVerifier {
    /// HMAC-SHA256 body signatures.
    pub fn new(secret: Masked<String>) -> Self {
        Self::with_scheme(secret, CallbackScheme::HmacSha256)
    }

    /// Static callback token, as sent by Xendit.
    pub fn callback_token(secret: Masked<String>) -> Self {
        Self::with_scheme(secret, CallbackScheme::Token)
    }

    pub fn with_scheme(secret: Masked<String>, scheme: CallbackScheme) -> Self {
        Self { secret, scheme }
    }

    pub fn scheme(&self) -> CallbackScheme {
        self.scheme
    }

    fn mac(&self) -> Result<HmacSha256, SignatureError> {
        if self.secret.expose().is_empty() {
            return Err(SignatureError::NotConfigured);
        }
        HmacSha256::new_from_slice(self.secret.expose().as_bytes())
            .map_err(|_| SignatureError::NotConfigured)
    }

    /// Hex signature for `body`; senders and tests use this.
    pub fn sign(&self, body: &[u8]) -> Result<String, SignatureError> {
        let mut mac = self.mac()?;
        mac.update(body);
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    pub fn verify(&self, body: &[u8], signature: &str) -> Result<(), SignatureError> {
        let expected = hex::decode(signature.trim()).map_err(|_| SignatureError::Malformed)?;
        let mut mac = self.mac()?;
        mac.update(body);
        mac.verify_slice(&expected).map_err(|_| SignatureError::Mismatch)
    }

    /// Tokens of any length are compared through their MACs, so the
    /// comparison itself is over equal-length digests.
    pub fn verify_token(&self, presented: &str) -> Result<(), SignatureError> {
        let mut expected = self.mac()?;
        expected.update(self.secret.expose().as_bytes());
        let expected = expected.finalize().into_bytes();

        let mut mac = self.mac()?;
        mac.update(presented.as_bytes());
        mac.verify_slice(&expected).map_err(|_| SignatureError::Mismatch)
    }

    /// Check a callback request under the configured scheme.
    pub fn verify_request(&self, headers: &HeaderMap, body: &[u8]) -> Result<(), SignatureError> {
        let header = self.scheme.header();
        let value = headers
            .get(header)
            .and_then(|v| v.to_str().ok())
            .ok_or(SignatureError::Missing(header))?;

        match self.scheme {
            CallbackScheme::Token => self.verify_token(value),
            CallbackScheme::HmacSha256 => self.verify(body, value),
        }
    }
}
