//! # pointsync SCRAM
//!
//! SCRAM-SHA-256 client computation (RFC 5802, RFC 7677). Pure and
//! synchronous: no I/O and no header handling here, just message → message
//! computation. The HTTP carriage of these messages lives in the adapter
//! crate.
//!
//! The exchange, from this side:
//!
//! 1. [`ScramClient::client_first`] — gs2 header, escaped username, nonce
//! 2. [`ScramClient::set_server_first`] — validates nonce continuation,
//!    salt and iteration count
//! 3. [`ScramClient::client_final`] — channel-binding echo, proof
//! 4. [`ScramClient::verify_server_final`] — constant-time check of the
//!    server signature, the step that unmasks a spoofed server

#![warn(missing_docs)]
#![warn(clippy::all)]

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use hmac::{Hmac, Mac};
use pbkdf2::pbkdf2_hmac;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// gs2 header for a client that neither supports nor requires channel
/// binding; its base64 form is the `c=` attribute of the final message.
const GS2_HEADER: &str = "n,,";

const NONCE_BYTES: usize = 18;
const KEY_BYTES: usize = 32;

type HmacSha256 = Hmac<Sha256>;

/// SCRAM-SHA-256 client state for one authentication exchange.
///
/// Methods must be called in protocol order; calling ahead returns
/// [`ScramError::OutOfOrder`] rather than producing an invalid message.
pub struct ScramClient {
    username: String,
    password: String,
    nonce: String,
    client_first_bare: Option<String>,
    server_first: Option<ServerFirst>,
    server_signature: Option<[u8; KEY_BYTES]>,
}

#[derive(Debug)]
struct ServerFirst {
    nonce: String,
    salt: Vec<u8>,
    iterations: u32,
    raw: String,
}

impl ScramClient {
    /// Create a client with a freshly generated nonce.
    #[must_use]
    pub fn new(username: &str, password: &str) -> Self {
        let mut bytes = [0u8; NONCE_BYTES];
        OsRng.fill_bytes(&mut bytes);
        Self::with_nonce(username, password, &URL_SAFE_NO_PAD.encode(bytes))
    }

    /// Create a client with a caller-supplied nonce.
    ///
    /// Exists so exchanges can be made deterministic under test; the nonce
    /// must not contain `,`.
    #[must_use]
    pub fn with_nonce(username: &str, password: &str, nonce: &str) -> Self {
        Self {
            username: username.to_string(),
            password: password.to_string(),
            nonce: nonce.to_string(),
            client_first_bare: None,
            server_first: None,
            server_signature: None,
        }
    }

    /// Compute the client-first message.
    pub fn client_first(&mut self) -> String {
        let bare = format!("n={},r={}", escape_username(&self.username), self.nonce);
        let message = format!("{GS2_HEADER}{bare}");
        self.client_first_bare = Some(bare);
        message
    }

    /// Feed the server-first message.
    ///
    /// # Errors
    ///
    /// Returns [`ScramError::OutOfOrder`] before [`Self::client_first`],
    /// [`ScramError::MalformedServerMessage`] when `r=`/`s=`/`i=` are
    /// absent or undecodable, and [`ScramError::NonceMismatch`] when the
    /// server nonce does not extend the client nonce.
    pub fn set_server_first(&mut self, message: &str) -> Result<(), ScramError> {
        if self.client_first_bare.is_none() {
            return Err(ScramError::OutOfOrder {
                expected: "client_first",
            });
        }

        let nonce = attr(message, 'r').ok_or_else(|| malformed("missing r= attribute"))?;
        let salt_b64 = attr(message, 's').ok_or_else(|| malformed("missing s= attribute"))?;
        let iterations_text = attr(message, 'i').ok_or_else(|| malformed("missing i= attribute"))?;

        if !nonce.starts_with(&self.nonce) || nonce.len() <= self.nonce.len() {
            return Err(ScramError::NonceMismatch);
        }

        let salt = STANDARD
            .decode(salt_b64)
            .map_err(|e| malformed(&format!("salt is not base64: {e}")))?;
        let iterations: u32 = iterations_text
            .parse()
            .map_err(|_| malformed(&format!("iteration count is not a number: {iterations_text:?}")))?;
        if iterations == 0 {
            return Err(malformed("iteration count is zero"));
        }

        self.server_first = Some(ServerFirst {
            nonce: nonce.to_string(),
            salt,
            iterations,
            raw: message.to_string(),
        });
        Ok(())
    }

    /// Compute the client-final message, embedding the client proof, and
    /// fix the expected server signature.
    ///
    /// # Errors
    ///
    /// Returns [`ScramError::OutOfOrder`] before
    /// [`Self::set_server_first`].
    pub fn client_final(&mut self) -> Result<String, ScramError> {
        let bare = self
            .client_first_bare
            .as_ref()
            .ok_or(ScramError::OutOfOrder {
                expected: "client_first",
            })?;
        let server_first = self.server_first.as_ref().ok_or(ScramError::OutOfOrder {
            expected: "set_server_first",
        })?;

        let without_proof = format!(
            "c={},r={}",
            STANDARD.encode(GS2_HEADER),
            server_first.nonce
        );
        let auth_message = format!("{bare},{},{without_proof}", server_first.raw);

        let salted = salt_password(
            self.password.as_bytes(),
            &server_first.salt,
            server_first.iterations,
        );
        let client_key = hmac_sha256(&salted, b"Client Key");
        let stored_key: [u8; KEY_BYTES] = Sha256::digest(client_key).into();
        let client_signature = hmac_sha256(&stored_key, auth_message.as_bytes());

        let mut proof = [0u8; KEY_BYTES];
        for (i, byte) in proof.iter_mut().enumerate() {
            *byte = client_key[i] ^ client_signature[i];
        }

        let server_key = hmac_sha256(&salted, b"Server Key");
        self.server_signature = Some(hmac_sha256(&server_key, auth_message.as_bytes()));

        Ok(format!("{without_proof},p={}", STANDARD.encode(proof)))
    }

    /// Verify the server-final message against the expected signature.
    ///
    /// # Errors
    ///
    /// Returns [`ScramError::OutOfOrder`] before [`Self::client_final`],
    /// [`ScramError::ServerRejected`] when the server answered with `e=`,
    /// [`ScramError::MalformedServerMessage`] when `v=` is absent or not
    /// base64, and [`ScramError::SignatureMismatch`] when the signature
    /// does not verify. The comparison is constant-time.
    pub fn verify_server_final(&self, message: &str) -> Result<(), ScramError> {
        let expected = self.server_signature.ok_or(ScramError::OutOfOrder {
            expected: "client_final",
        })?;

        if let Some(error) = attr(message, 'e') {
            return Err(ScramError::ServerRejected {
                detail: error.to_string(),
            });
        }

        let signature_b64 = attr(message, 'v').ok_or_else(|| malformed("missing v= attribute"))?;
        let signature = STANDARD
            .decode(signature_b64)
            .map_err(|e| malformed(&format!("server signature is not base64: {e}")))?;

        if signature.ct_eq(&expected).into() {
            Ok(())
        } else {
            Err(ScramError::SignatureMismatch)
        }
    }
}

/// Escape a username for the `n=` attribute: `=` and `,` are reserved.
fn escape_username(username: &str) -> String {
    username.replace('=', "=3D").replace(',', "=2C")
}

/// Find a single-letter attribute in a comma-separated SCRAM message.
fn attr(message: &str, key: char) -> Option<&str> {
    message.split(',').find_map(|part| {
        let (k, v) = part.split_once('=')?;
        (k.len() == 1 && k.starts_with(key)).then_some(v)
    })
}

fn malformed(detail: &str) -> ScramError {
    ScramError::MalformedServerMessage {
        detail: detail.to_string(),
    }
}

fn salt_password(password: &[u8], salt: &[u8], iterations: u32) -> [u8; KEY_BYTES] {
    let mut out = [0u8; KEY_BYTES];
    pbkdf2_hmac::<Sha256>(password, salt, iterations, &mut out);
    out
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> [u8; KEY_BYTES] {
    // HMAC accepts keys of any length
    let mut mac = match HmacSha256::new_from_slice(key) {
        Ok(mac) => mac,
        Err(_) => unreachable!(),
    };
    mac.update(data);
    mac.finalize().into_bytes().into()
}

/// Errors from the SCRAM exchange.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScramError {
    /// A method was called before the exchange reached it
    #[error("SCRAM exchange out of order: {expected} must run first")]
    OutOfOrder {
        /// The step that has to happen before the one attempted
        expected: &'static str,
    },
    /// A server message did not parse under the attribute grammar
    #[error("malformed SCRAM server message: {detail}")]
    MalformedServerMessage {
        /// What failed to parse
        detail: String,
    },
    /// The server nonce does not extend the client nonce
    #[error("server nonce does not extend the client nonce")]
    NonceMismatch,
    /// The server answered the final message with an `e=` error
    #[error("server rejected authentication: {detail}")]
    ServerRejected {
        /// The server's `e=` value
        detail: String,
    },
    /// The server-final signature failed verification
    #[error("server signature failed verification")]
    SignatureMismatch,
}
