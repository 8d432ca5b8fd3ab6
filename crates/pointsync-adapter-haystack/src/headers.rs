//! Authentication-header field grammar.
//!
//! Challenge and info headers carry semi-structured values of the form
//! `SCHEME key=value, key=value, ...` (the scheme word is optional in
//! `authentication-info`). Parsing is by grammar, not index arithmetic: a
//! missing field is an absent `Option`, never a slice panic.

use base64::engine::general_purpose::URL_SAFE;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

/// A parsed authentication header value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthFields {
    /// Leading scheme word, when present (`HELLO`, `SCRAM`, `Bearer`)
    pub scheme: Option<String>,
    fields: Vec<(String, String)>,
}

impl AuthFields {
    /// Parse a header value into scheme and `key=value` fields.
    ///
    /// Field values run to the next comma; whitespace around separators is
    /// insignificant. Parts without `=` are ignored.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        let trimmed = value.trim();
        let (scheme, rest) = match trimmed.split_once(' ') {
            Some((word, rest)) if !word.contains('=') => {
                (Some(word.to_string()), rest)
            }
            _ if !trimmed.contains('=') && !trimmed.is_empty() => {
                (Some(trimmed.to_string()), "")
            }
            _ => (None, trimmed),
        };

        let fields = rest
            .split(',')
            .filter_map(|part| {
                let (key, value) = part.trim().split_once('=')?;
                Some((key.trim().to_string(), value.trim().to_string()))
            })
            .collect();

        Self { scheme, fields }
    }

    /// Look up a field by exact name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

/// Build the unauthenticated probe header: `HELLO username=<b64>`.
#[must_use]
pub fn hello_header(username: &str) -> String {
    format!("HELLO username={}", URL_SAFE_NO_PAD.encode(username))
}

/// Build a SCRAM round header carrying the handshake token and a payload
/// already encoded by the caller.
#[must_use]
pub fn scram_header(handshake_token: &str, data_b64: &str) -> String {
    format!("SCRAM handshakeToken={handshake_token}, hash=SHA-256, data={data_b64}")
}

/// Build the bearer header used by every data call after authentication.
#[must_use]
pub fn bearer_header(auth_token: &str) -> String {
    format!("Bearer authToken={auth_token}")
}

/// Encode a handshake payload without padding (username, client-first).
#[must_use]
pub fn encode_payload(payload: &str) -> String {
    URL_SAFE_NO_PAD.encode(payload)
}

/// Encode a handshake payload keeping padding (client-final, matching the
/// wire behavior the store accepts).
#[must_use]
pub fn encode_payload_padded(payload: &str) -> String {
    URL_SAFE.encode(payload)
}

/// Decode a base64url payload whose padding the server may have dropped.
///
/// # Errors
///
/// Returns [`HeaderError`] when the text cannot be base64url under any
/// padding restoration, or decodes to non-UTF-8.
pub fn decode_payload(data: &str) -> Result<String, HeaderError> {
    let bytes = match data.len() % 4 {
        0 => URL_SAFE.decode(data),
        2 => URL_SAFE.decode(format!("{data}==")),
        3 => URL_SAFE.decode(format!("{data}=")),
        _ => {
            return Err(HeaderError::Base64 {
                detail: "length is not a valid base64 quantum".to_string(),
            })
        }
    }
    .map_err(|e| HeaderError::Base64 {
        detail: e.to_string(),
    })?;

    String::from_utf8(bytes).map_err(|e| HeaderError::Utf8 {
        detail: e.to_string(),
    })
}

/// Decode an unpadded base64url username (the `HELLO` payload).
///
/// # Errors
///
/// Returns [`HeaderError`] on invalid base64url or non-UTF-8 content.
pub fn decode_username(data: &str) -> Result<String, HeaderError> {
    decode_payload(data.trim_end_matches('='))
}

/// Errors from header payload decoding.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HeaderError {
    /// Payload is not valid base64url
    #[error("header payload is not base64url: {detail}")]
    Base64 {
        /// Decoder failure detail
        detail: String,
    },
    /// Payload decodes to invalid UTF-8
    #[error("header payload is not UTF-8: {detail}")]
    Utf8 {
        /// Decoder failure detail
        detail: String,
    },
}
