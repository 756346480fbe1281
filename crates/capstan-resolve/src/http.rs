use crate::ResolveError;
use base64::Engine;
use std::io::Read;
use tracing::debug;

/// Raw file retrieval from hosted-platform endpoints.
pub trait RawFileClient: Send + Sync {
    fn get(&self, url: &str) -> Result<Vec<u8>, ResolveError>;
}

/// HTTP-backed raw file client.
pub struct HttpClient {
    agent: ureq::Agent,
}

impl HttpClient {
    pub fn new() -> Self {
        Self {
            agent: ureq::Agent::new_with_defaults(),
        }
    }
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl RawFileClient for HttpClient {
    fn get(&self, url: &str) -> Result<Vec<u8>, ResolveError> {
        debug!("GET {url}");
        let resp = match self.agent.get(url).call() {
            Ok(r) => r,
            Err(ureq::Error::StatusCode(code)) => {
                return Err(ResolveError::Http(format!("HTTP {code} for {url}")));
            }
            Err(e) => {
                return Err(ResolveError::Http(e.to_string()));
            }
        };
        let mut reader = resp.into_body().into_reader();
        let mut body = Vec::new();
        reader
            .read_to_end(&mut body)
            .map_err(|e| ResolveError::Http(e.to_string()))?;
        Ok(body)
    }
}

/// Decode a base64 text dump. Hosted text endpoints wrap their output in
/// lines, so ASCII whitespace is stripped before decoding.
pub fn decode_base64_text(data: &[u8]) -> Result<Vec<u8>, ResolveError> {
    let compact: Vec<u8> = data
        .iter()
        .copied()
        .filter(|byte| !byte.is_ascii_whitespace())
        .collect();
    base64::engine::general_purpose::STANDARD
        .decode(&compact)
        .map_err(|e| ResolveError::Payload(format!("invalid base64: {e}")))
}
