//! Test doubles shared by the unit tests of this crate.

use std::collections::{HashMap, VecDeque};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use crate::fetch::{HttpClient, HttpResponse, RetryPolicy, TransportError};

/// Retry policy that does not sleep.
pub fn fast_policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        backoff_unit: Duration::ZERO,
    }
}

/// Scripted reply for one request.
#[derive(Debug, Clone)]
pub enum FakeReply {
    Status(u16, Vec<u8>),
    Network(String),
}

impl FakeReply {
    pub fn ok(body: &[u8]) -> Self {
        Self::Status(200, body.to_vec())
    }

    pub fn json(value: &serde_json::Value) -> Self {
        Self::Status(200, value.to_string().into_bytes())
    }

    pub fn status(status: u16) -> Self {
        Self::Status(status, Vec::new())
    }

    pub fn network(message: &str) -> Self {
        Self::Network(message.to_string())
    }
}

/// A recorded request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeRequest {
    pub url: String,
    pub query: Vec<(String, String)>,
    /// Tokio clock reading when the request was made.
    pub at: tokio::time::Instant,
}

/// In-memory [`HttpClient`].
///
/// Replies are queued per URL; the last queued reply for a URL repeats
/// forever once the queue is down to one entry. Unknown URLs answer 404.
#[derive(Debug, Default)]
pub struct FakeClient {
    replies: Mutex<HashMap<String, VecDeque<FakeReply>>>,
    requests: Mutex<Vec<FakeRequest>>,
}

impl FakeClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(&self, url: &str, reply: FakeReply) -> &Self {
        self.replies
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .push_back(reply);
        self
    }

    /// Replaces every queued reply for `url`.
    pub fn set(&self, url: &str, reply: FakeReply) -> &Self {
        self.replies
            .lock()
            .unwrap()
            .insert(url.to_string(), VecDeque::from([reply]));
        self
    }

    pub fn requests(&self) -> Vec<FakeRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn count(&self, url: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.url == url)
            .count()
    }

    pub fn clear_requests(&self) {
        self.requests.lock().unwrap().clear();
    }

    fn next_reply(&self, url: &str, query: &[(&str, &str)]) -> FakeReply {
        self.requests.lock().unwrap().push(FakeRequest {
            url: url.to_string(),
            query: query
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
            at: tokio::time::Instant::now(),
        });

        let mut replies = self.replies.lock().unwrap();
        match replies.get_mut(url) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
            Some(queue) => queue.front().cloned().unwrap_or(FakeReply::status(404)),
            None => FakeReply::status(404),
        }
    }
}

impl HttpClient for FakeClient {
    async fn get(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<HttpResponse, TransportError> {
        match self.next_reply(url, query) {
            FakeReply::Status(status, body) => Ok(HttpResponse { status, body }),
            FakeReply::Network(message) => Err(TransportError::Network(message)),
        }
    }

    async fn download(&self, url: &str, dest: &Path) -> Result<u16, TransportError> {
        match self.next_reply(url, &[]) {
            FakeReply::Status(status, body) => {
                if (200..300).contains(&status) {
                    std::fs::write(dest, &body).map_err(|source| TransportError::Io {
                        path: dest.to_path_buf(),
                        source,
                    })?;
                }
                Ok(status)
            }
            FakeReply::Network(message) => Err(TransportError::Network(message)),
        }
    }
}

/// Builds a gzip compressed tarball from `(path, contents, mode)` entries.
pub fn tar_gz(entries: &[(&str, &[u8], u32)]) -> Vec<u8> {
    let encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    let mut builder = tar::Builder::new(encoder);

    for (path, contents, mode) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(*mode);
        header.set_entry_type(tar::EntryType::Regular);
        builder.append_data(&mut header, path, *contents).unwrap();
    }

    let mut encoder = builder.into_inner().unwrap();
    encoder.flush().unwrap();
    encoder.finish().unwrap()
}

/// Lowercase hex SHA-1 of `data`.
pub fn sha1_hex(data: &[u8]) -> String {
    use sha1::Digest;
    hex::encode(sha1::Sha1::digest(data))
}

/// Lowercase hex SHA-256 of `data`.
pub fn sha256_hex(data: &[u8]) -> String {
    use sha2::Digest;
    hex::encode(sha2::Sha256::digest(data))
}
