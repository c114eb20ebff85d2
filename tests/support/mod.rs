pub mod socket_guard;

use wiremock::{Request, Respond, ResponseTemplate};

use shuffle_fetch::hmac_auth::{self, AUTH_HEADER, REPLY_HEADER};

/// Encodes one attempt's header + payload in the wire format `ShuffleHeader`
/// expects: 4-byte path length, path bytes, 8-byte compressed length,
/// 8-byte uncompressed length, 4-byte partition, then the payload bytes.
pub fn encode_attempt(path: &str, payload: &[u8], partition: i32) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(&(path.len() as u32).to_be_bytes());
    buf.extend_from_slice(path.as_bytes());
    buf.extend_from_slice(&(payload.len() as i64).to_be_bytes());
    buf.extend_from_slice(&(payload.len() as i64).to_be_bytes());
    buf.extend_from_slice(&partition.to_be_bytes());
    buf.extend_from_slice(payload);
    buf
}

/// Encodes a malformed header: a path length prefix with no following
/// bytes at all, used to exercise the bad-header failure path.
pub fn encode_truncated_header() -> Vec<u8> {
    10u32.to_be_bytes().to_vec()
}

/// A wiremock responder that echoes the HMAC reply header this crate's
/// `hmac_auth` module expects, then returns a fixed body.
pub struct ShuffleResponder {
    pub hmac_key: Vec<u8>,
    pub body: Vec<u8>,
}

impl Respond for ShuffleResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let auth = request
            .headers
            .get(AUTH_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        let reply = hmac_auth::sign(&self.hmac_key, auth);
        ResponseTemplate::new(200)
            .insert_header(REPLY_HEADER, reply.as_str())
            .set_body_bytes(self.body.clone())
    }
}

/// A responder that never echoes a valid reply header, to exercise the
/// validation-failure path.
pub struct NoReplyResponder {
    pub body: Vec<u8>,
}

impl Respond for NoReplyResponder {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_bytes(self.body.clone())
    }
}
