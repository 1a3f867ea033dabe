mod http;
pub mod payload;
mod provider;

pub use http::HttpForgeClient;
pub use provider::{GITHUB_API, base_url, headers};

use std::collections::VecDeque;

use serde_json::Value;

use crate::error::Result;
use crate::types::Forge;

/// One page of a paginated forge listing.
#[derive(Debug, Clone)]
pub struct Page {
    pub status: u16,
    /// `None` when the forge answered with anything but 200.
    pub body: Option<Value>,
    pub next: Option<u32>,
}

impl Page {
    #[must_use]
    pub fn empty(status: u16) -> Self {
        Self {
            status,
            body: None,
            next: None,
        }
    }
}

/// Read and write access to forge REST APIs.
///
/// Implementations retry a request once on a connection failure and return
/// [`crate::error::Error::Transient`] when the retry fails too. Non-200 answers
/// are not errors: pages come back empty and single fetches come back `None`.
pub trait ForgeClient: Send + Sync {
    fn fetch_page(&self, forge: &Forge, path: &str, page: u32) -> Result<Page>;
    fn get(&self, forge: &Forge, path: &str) -> Result<Option<Value>>;
    /// Returns the HTTP status the forge answered with.
    fn delete(&self, forge: &Forge, path: &str) -> Result<u16>;
}

impl dyn ForgeClient + '_ {
    /// Lazily walks every page of `path`, yielding one record at a time.
    ///
    /// With a `result_key` the records are read from that field of each page
    /// body (Redmine and Travis wrap their lists), otherwise the body itself
    /// must be an array.
    pub fn list<'a>(
        &'a self,
        forge: &'a Forge,
        path: &str,
        result_key: Option<&str>,
    ) -> Pages<'a> {
        Pages {
            client: self,
            forge,
            path: path.to_string(),
            result_key: result_key.map(str::to_string),
            next: Some(1),
            buffer: VecDeque::new(),
        }
    }
}

pub struct Pages<'a> {
    client: &'a dyn ForgeClient,
    forge: &'a Forge,
    path: String,
    result_key: Option<String>,
    next: Option<u32>,
    buffer: VecDeque<Value>,
}

impl Pages<'_> {
    fn records(&self, body: Value) -> Vec<Value> {
        let list = match &self.result_key {
            Some(key) => match body {
                Value::Object(mut map) => map.remove(key).unwrap_or(Value::Null),
                _ => Value::Null,
            },
            None => body,
        };
        match list {
            Value::Array(items) => items,
            _ => Vec::new(),
        }
    }
}

impl Iterator for Pages<'_> {
    type Item = Result<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(record) = self.buffer.pop_front() {
                return Some(Ok(record));
            }
            let page = self.next.take()?;
            match self.client.fetch_page(self.forge, &self.path, page) {
                Ok(fetched) => {
                    // A provider pointing back at a page already read ends the walk.
                    self.next = fetched.next.filter(|n| *n > page);
                    if let Some(body) = fetched.body {
                        let records = self.records(body);
                        self.buffer.extend(records);
                    }
                }
                Err(e) => return Some(Err(e)),
            }
        }
    }
}
