//! Scripted in-memory transport for handshake, resolver and writer tests.

use crate::headers::{decode_payload, AuthFields};
use crate::transport::{HttpResponse, HttpTransport, TransportError};
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use hmac::{Hmac, Mac};
use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;
use std::cell::RefCell;
use std::collections::VecDeque;

/// One recorded request.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: &'static str,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(candidate, _)| candidate.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

enum ScriptEntry {
    Fixed(HttpResponse),
    /// Compute a real SCRAM server-first from the observed client-first.
    ServerFirst {
        password: String,
        salt: Vec<u8>,
        iterations: u32,
    },
    /// Compute the server-final signature from the recorded exchange.
    ServerFinal {
        token: String,
        tamper: bool,
    },
}

#[derive(Default)]
struct ScramServerState {
    client_first_bare: String,
    server_first: String,
    salted: [u8; 32],
}

/// Transport returning a scripted response per request, in order, and
/// recording every request it sees. An exhausted script turns into a
/// transport error, which doubles as the "network down" fixture.
#[derive(Default)]
pub struct ScriptedTransport {
    script: RefCell<VecDeque<ScriptEntry>>,
    requests: RefCell<Vec<RecordedRequest>>,
    scram: RefCell<ScramServerState>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, response: HttpResponse) {
        self.script
            .borrow_mut()
            .push_back(ScriptEntry::Fixed(response));
    }

    /// Script a SCRAM challenge round computed from the client's actual
    /// first message, so the exchange verifies end to end.
    pub fn push_dynamic_server_first(&self, password: &str, salt: &[u8], iterations: u32) {
        self.script.borrow_mut().push_back(ScriptEntry::ServerFirst {
            password: password.to_string(),
            salt: salt.to_vec(),
            iterations,
        });
    }

    /// Script a correctly signed server-final round carrying `token`.
    pub fn push_dynamic_server_final(&self, token: &str) {
        self.script.borrow_mut().push_back(ScriptEntry::ServerFinal {
            token: token.to_string(),
            tamper: false,
        });
    }

    /// Script a server-final round whose signature is corrupted.
    pub fn push_dynamic_server_final_tampered(&self) {
        self.script.borrow_mut().push_back(ScriptEntry::ServerFinal {
            token: "token-from-impostor".to_string(),
            tamper: true,
        });
    }

    pub fn request_count(&self) -> usize {
        self.requests.borrow().len()
    }

    pub fn nth_request(&self, index: usize) -> RecordedRequest {
        self.requests.borrow()[index].clone()
    }

    pub fn nth_request_header(&self, index: usize, name: &str) -> Option<String> {
        self.requests.borrow()[index]
            .header(name)
            .map(str::to_string)
    }

    pub fn bodies(&self) -> Vec<String> {
        self.requests
            .borrow()
            .iter()
            .map(|request| request.body.clone())
            .collect()
    }

    fn scram_payload(request: &RecordedRequest) -> String {
        let authorization = request.header("Authorization").expect("Authorization header");
        let data = AuthFields::parse(authorization)
            .get("data")
            .expect("data field")
            .to_string();
        decode_payload(&data).expect("decodable payload")
    }

    fn respond(&self, request: &RecordedRequest) -> Result<HttpResponse, TransportError> {
        let entry = self
            .script
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| TransportError("script exhausted".to_string()))?;

        match entry {
            ScriptEntry::Fixed(response) => Ok(response),
            ScriptEntry::ServerFirst {
                password,
                salt,
                iterations,
            } => {
                let client_first = Self::scram_payload(request);
                let bare = client_first
                    .strip_prefix("n,,")
                    .expect("gs2 header")
                    .to_string();
                let client_nonce = bare
                    .rsplit_once("r=")
                    .map(|(_, nonce)| nonce.to_string())
                    .expect("client nonce");

                let server_nonce = format!("{client_nonce}srv");
                let server_first = format!(
                    "r={server_nonce},s={},i={iterations}",
                    STANDARD.encode(&salt)
                );

                let mut salted = [0u8; 32];
                pbkdf2_hmac::<Sha256>(password.as_bytes(), &salt, iterations, &mut salted);
                *self.scram.borrow_mut() = ScramServerState {
                    client_first_bare: bare,
                    server_first: server_first.clone(),
                    salted,
                };

                Ok(HttpResponse::new(
                    401,
                    vec![(
                        "www-authenticate".to_string(),
                        format!(
                            "SCRAM handshakeToken=tok-1, hash=SHA-256, data={}",
                            URL_SAFE_NO_PAD.encode(&server_first)
                        ),
                    )],
                    String::new(),
                ))
            }
            ScriptEntry::ServerFinal { token, tamper } => {
                let client_final = Self::scram_payload(request);
                let without_proof = client_final
                    .split_once(",p=")
                    .map(|(prefix, _)| prefix.to_string())
                    .expect("client proof");

                let state = self.scram.borrow();
                let auth_message = format!(
                    "{},{},{without_proof}",
                    state.client_first_bare, state.server_first
                );

                let server_key = hmac_sha256(&state.salted, b"Server Key");
                let mut signature = hmac_sha256(&server_key, auth_message.as_bytes());
                if tamper {
                    signature[0] ^= 0xff;
                }
                let server_final = format!("v={}", STANDARD.encode(signature));

                Ok(HttpResponse::new(
                    200,
                    vec![(
                        "authentication-info".to_string(),
                        format!(
                            "authToken={token}, data={}",
                            URL_SAFE_NO_PAD.encode(&server_final)
                        ),
                    )],
                    String::new(),
                ))
            }
        }
    }

    fn record(
        &self,
        method: &'static str,
        url: &str,
        headers: &[(String, String)],
        body: &str,
    ) -> RecordedRequest {
        let request = RecordedRequest {
            method,
            url: url.to_string(),
            headers: headers.to_vec(),
            body: body.to_string(),
        };
        self.requests.borrow_mut().push(request.clone());
        request
    }
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> [u8; 32] {
    let mut mac = Hmac::<Sha256>::new_from_slice(key).expect("any key length");
    mac.update(data);
    mac.finalize().into_bytes().into()
}

impl HttpTransport for ScriptedTransport {
    fn get(&self, url: &str, headers: &[(String, String)]) -> Result<HttpResponse, TransportError> {
        let request = self.record("GET", url, headers, "");
        self.respond(&request)
    }

    fn post(
        &self,
        url: &str,
        headers: &[(String, String)],
        body: &str,
    ) -> Result<HttpResponse, TransportError> {
        let request = self.record("POST", url, headers, body);
        self.respond(&request)
    }
}
