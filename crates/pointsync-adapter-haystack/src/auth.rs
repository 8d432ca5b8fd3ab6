//! SCRAM handshake over HTTP headers.
//!
//! Four phases, terminal on success:
//! `Init → HelloSent → ClientFirstSent → Authenticated`.
//!
//! The hello probe surrenders a handshake token; two SCRAM rounds carry the
//! client-first and client-final payloads; the server's final signature is
//! verified before the bearer token is accepted, so a server that cannot
//! prove knowledge of the password never completes the exchange.

use crate::headers::{
    decode_payload, encode_payload, encode_payload_padded, hello_header, scram_header, AuthFields,
    HeaderError,
};
use crate::transport::{HttpResponse, HttpTransport, TransportError};
use pointsync_scram::{ScramClient, ScramError};

/// HTTP status the server answers the client-first round with.
const STATUS_AUTH_CHALLENGE: u16 = 401;

/// Phases of the handshake, used for error context and tracing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakePhase {
    /// Nothing sent yet
    Init,
    /// Hello probe sent, awaiting handshake token
    HelloSent,
    /// Client-first sent, awaiting server challenge
    ClientFirstSent,
    /// Server proof verified, bearer token extracted
    Authenticated,
}

impl std::fmt::Display for HandshakePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HandshakePhase::Init => write!(f, "init"),
            HandshakePhase::HelloSent => write!(f, "hello-sent"),
            HandshakePhase::ClientFirstSent => write!(f, "client-first-sent"),
            HandshakePhase::Authenticated => write!(f, "authenticated"),
        }
    }
}

/// Errors from the handshake.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// Username or password was empty; nothing was sent
    #[error("username and password must both be provided")]
    InvalidCredentials,
    /// A response violated the handshake contract
    #[error("protocol violation in phase {phase}: {detail}")]
    ProtocolViolation {
        /// Phase the violation occurred in
        phase: HandshakePhase,
        /// What was expected and not found
        detail: String,
    },
    /// The server's final proof failed verification
    #[error("server signature failed verification; refusing token from unproven server")]
    ServerSignatureMismatch,
    /// Underlying HTTP failure
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// The handshake driver: one authentication exchange against one URL.
pub struct ScramHandshake<'a, T: HttpTransport> {
    transport: &'a T,
    url: &'a str,
    phase: HandshakePhase,
}

impl<'a, T: HttpTransport> ScramHandshake<'a, T> {
    /// Create a handshake against the store's base URL.
    #[must_use]
    pub fn new(transport: &'a T, url: &'a str) -> Self {
        Self {
            transport,
            url,
            phase: HandshakePhase::Init,
        }
    }

    /// Run the full exchange and return the bearer token.
    ///
    /// # Errors
    ///
    /// [`AuthError::InvalidCredentials`] before any network call when a
    /// credential is empty; [`AuthError::ProtocolViolation`] on any
    /// contract breach; [`AuthError::ServerSignatureMismatch`] when the
    /// server cannot prove itself; [`AuthError::Transport`] on HTTP
    /// failure. Any error aborts the run.
    pub fn run(mut self, username: &str, password: &str) -> Result<String, AuthError> {
        if username.is_empty() || password.is_empty() {
            return Err(AuthError::InvalidCredentials);
        }

        let handshake_token = self.send_hello(username)?;
        let mut scram = ScramClient::new(username, password);
        let server_first = self.send_client_first(&mut scram, &handshake_token)?;
        scram
            .set_server_first(&server_first)
            .map_err(|e| self.scram_violation(e))?;

        let client_final = scram.client_final().map_err(|e| self.scram_violation(e))?;
        let info = self.send_client_final(&handshake_token, &client_final)?;

        let server_final = self.info_payload(&info)?;
        scram.verify_server_final(&server_final).map_err(|e| match e {
            ScramError::SignatureMismatch => AuthError::ServerSignatureMismatch,
            other => self.scram_violation(other),
        })?;

        let token = info
            .get("authToken")
            .ok_or_else(|| self.violation("authentication-info lacks authToken field"))?
            .to_string();

        self.phase = HandshakePhase::Authenticated;
        tracing::debug!(phase = %self.phase, "handshake complete");
        Ok(token)
    }

    /// Phase `Init → HelloSent`: probe for the handshake token.
    fn send_hello(&mut self, username: &str) -> Result<String, AuthError> {
        let headers = vec![("Authorization".to_string(), hello_header(username))];
        let response = self.transport.get(self.url, &headers)?;
        self.phase = HandshakePhase::HelloSent;
        tracing::debug!(phase = %self.phase, status = response.status, "hello round");

        let challenge = self.challenge_fields(&response)?;
        challenge
            .get("handshakeToken")
            .map(str::to_string)
            .ok_or_else(|| self.violation("challenge lacks handshakeToken field"))
    }

    /// Phase `HelloSent → ClientFirstSent`: send client-first, collect the
    /// server-first payload. The server must answer with an
    /// authentication challenge (401); anything else breaks the contract.
    fn send_client_first(
        &mut self,
        scram: &mut ScramClient,
        handshake_token: &str,
    ) -> Result<String, AuthError> {
        let payload = encode_payload(&scram.client_first());
        let headers = vec![(
            "Authorization".to_string(),
            scram_header(handshake_token, &payload),
        )];
        let response = self.transport.get(self.url, &headers)?;
        self.phase = HandshakePhase::ClientFirstSent;
        tracing::debug!(phase = %self.phase, status = response.status, "client-first round");

        if response.status != STATUS_AUTH_CHALLENGE {
            return Err(self.violation(&format!(
                "expected authentication challenge ({STATUS_AUTH_CHALLENGE}), got {}",
                response.status
            )));
        }

        let challenge = self.challenge_fields(&response)?;
        let data = challenge
            .get("data")
            .ok_or_else(|| self.violation("challenge lacks data field"))?;
        decode_payload(data).map_err(|e| self.header_violation(&e))
    }

    /// Phase `ClientFirstSent → …`: send client-final, collect the
    /// authentication-info fields carrying the server proof and token.
    fn send_client_final(
        &mut self,
        handshake_token: &str,
        client_final: &str,
    ) -> Result<AuthFields, AuthError> {
        let payload = encode_payload_padded(client_final);
        let headers = vec![(
            "Authorization".to_string(),
            scram_header(handshake_token, &payload),
        )];
        let response = self.transport.get(self.url, &headers)?;
        tracing::debug!(phase = %self.phase, status = response.status, "client-final round");

        let info = response
            .header("authentication-info")
            .ok_or_else(|| self.violation("response lacks authentication-info header"))?;
        Ok(AuthFields::parse(info))
    }

    fn info_payload(&self, info: &AuthFields) -> Result<String, AuthError> {
        let data = info
            .get("data")
            .ok_or_else(|| self.violation("authentication-info lacks data field"))?;
        decode_payload(data).map_err(|e| self.header_violation(&e))
    }

    fn challenge_fields(&self, response: &HttpResponse) -> Result<AuthFields, AuthError> {
        let value = response
            .header("www-authenticate")
            .ok_or_else(|| self.violation("response lacks www-authenticate header"))?;
        Ok(AuthFields::parse(value))
    }

    fn violation(&self, detail: &str) -> AuthError {
        AuthError::ProtocolViolation {
            phase: self.phase,
            detail: detail.to_string(),
        }
    }

    fn scram_violation(&self, error: ScramError) -> AuthError {
        self.violation(&error.to_string())
    }

    fn header_violation(&self, error: &HeaderError) -> AuthError {
        self.violation(&error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedTransport;
    use base64::engine::general_purpose::URL_SAFE;
    use base64::Engine;

    const USERNAME: &str = "ops";
    const PASSWORD: &str = "hunter2";
    const SALT: &[u8] = b"0123456789abcdef";
    const ITERATIONS: u32 = 4096;
    const TOKEN: &str = "web-31a9f2";

    #[test]
    fn empty_credentials_fail_before_any_network_call() {
        let transport = ScriptedTransport::new();
        for (user, pass) in [("", PASSWORD), (USERNAME, ""), ("", "")] {
            let err = ScramHandshake::new(&transport, "http://store.local/api")
                .run(user, pass)
                .unwrap_err();
            assert_eq!(err, AuthError::InvalidCredentials);
        }
        assert_eq!(transport.request_count(), 0);
    }

    #[test]
    fn hello_round_sends_unpadded_username() {
        let transport = ScriptedTransport::new();
        transport.push(HttpResponse::new(401, vec![], String::new()));
        let _ = ScramHandshake::new(&transport, "http://store.local/api")
            .run("su", PASSWORD)
            .unwrap_err();
        let auth = transport.nth_request_header(0, "Authorization");
        assert_eq!(auth.as_deref(), Some("HELLO username=c3U"));
    }

    #[test]
    fn missing_challenge_header_is_protocol_violation() {
        let transport = ScriptedTransport::new();
        transport.push(HttpResponse::new(401, vec![], String::new()));
        let err = ScramHandshake::new(&transport, "http://store.local/api")
            .run(USERNAME, PASSWORD)
            .unwrap_err();
        assert!(matches!(
            err,
            AuthError::ProtocolViolation {
                phase: HandshakePhase::HelloSent,
                ..
            }
        ));
    }

    #[test]
    fn non_401_client_first_status_is_protocol_violation() {
        let transport = ScriptedTransport::new();
        transport.push(HttpResponse::new(
            401,
            vec![(
                "www-authenticate".to_string(),
                "SCRAM handshakeToken=tok-1".to_string(),
            )],
            String::new(),
        ));
        transport.push(HttpResponse::new(200, vec![], String::new()));
        let err = ScramHandshake::new(&transport, "http://store.local/api")
            .run(USERNAME, PASSWORD)
            .unwrap_err();
        match err {
            AuthError::ProtocolViolation { phase, detail } => {
                assert_eq!(phase, HandshakePhase::ClientFirstSent);
                assert!(detail.contains("401"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn transport_failure_propagates_unchanged() {
        let transport = ScriptedTransport::new();
        // No scripted responses: the transport errors on first use
        let err = ScramHandshake::new(&transport, "http://store.local/api")
            .run(USERNAME, PASSWORD)
            .unwrap_err();
        assert!(matches!(err, AuthError::Transport(_)));
    }

    #[test]
    fn tampered_server_signature_aborts_without_token() {
        let transport = ScriptedTransport::new();
        transport.push(HttpResponse::new(
            401,
            vec![(
                "www-authenticate".to_string(),
                "SCRAM handshakeToken=tok-1".to_string(),
            )],
            String::new(),
        ));
        transport.push_dynamic_server_first(PASSWORD, SALT, ITERATIONS);
        transport.push_dynamic_server_final_tampered();
        let err = ScramHandshake::new(&transport, "http://store.local/api")
            .run(USERNAME, PASSWORD)
            .unwrap_err();
        assert_eq!(err, AuthError::ServerSignatureMismatch);
    }

    #[test]
    fn correct_server_signature_yields_token() {
        let transport = ScriptedTransport::new();
        transport.push(HttpResponse::new(
            401,
            vec![(
                "www-authenticate".to_string(),
                "SCRAM handshakeToken=tok-1".to_string(),
            )],
            String::new(),
        ));
        transport.push_dynamic_server_first(PASSWORD, SALT, ITERATIONS);
        transport.push_dynamic_server_final(TOKEN);
        let token = ScramHandshake::new(&transport, "http://store.local/api")
            .run(USERNAME, PASSWORD)
            .unwrap();
        assert_eq!(token, TOKEN);
    }

    #[test]
    fn client_final_payload_keeps_padding() {
        let transport = ScriptedTransport::new();
        transport.push(HttpResponse::new(
            401,
            vec![(
                "www-authenticate".to_string(),
                "SCRAM handshakeToken=tok-1".to_string(),
            )],
            String::new(),
        ));
        transport.push_dynamic_server_first(PASSWORD, SALT, ITERATIONS);
        transport.push_dynamic_server_final(TOKEN);
        ScramHandshake::new(&transport, "http://store.local/api")
            .run(USERNAME, PASSWORD)
            .unwrap();

        let final_header = transport
            .nth_request_header(2, "Authorization")
            .expect("client-final header");
        let data = AuthFields::parse(&final_header)
            .get("data")
            .expect("data field")
            .to_string();
        // client-final decodes with padding intact
        assert!(URL_SAFE.decode(&data).is_ok());
        let decoded = String::from_utf8(URL_SAFE.decode(&data).unwrap()).unwrap();
        assert!(decoded.starts_with("c=biws,r="));
        assert!(decoded.contains(",p="));
    }
}
