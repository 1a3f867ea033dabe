use std::time::Duration;

use reqwest::Url;
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde_json::Value;

use super::provider;
use super::{ForgeClient, Page};
use crate::error::{Error, Result};
use crate::types::Forge;

/// [`ForgeClient`] over blocking reqwest.
///
/// Forges configured with `verify = false` go through a second client that
/// accepts self-signed certificates.
#[derive(Clone)]
pub struct HttpForgeClient {
    client: Client,
    insecure: Client,
}

impl HttpForgeClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        let insecure = Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(true)
            .build()?;
        Ok(Self { client, insecure })
    }

    fn client_for(&self, forge: &Forge) -> &Client {
        if forge.verify {
            &self.client
        } else {
            &self.insecure
        }
    }

    fn url(forge: &Forge, path: &str) -> Result<Url> {
        let raw = format!("{}{}", provider::base_url(forge), path);
        Url::parse(&raw).map_err(|e| Error::Config(format!("invalid forge url '{raw}': {e}")))
    }

    /// Sends the request built by `build`, retrying once on a connection failure.
    fn send(&self, url: &Url, build: impl Fn() -> RequestBuilder) -> Result<Response> {
        match build().send() {
            Ok(resp) => Ok(resp),
            Err(e) if e.is_connect() || e.is_timeout() => {
                tracing::warn!("{} failed ({}), retrying once", url, e);
                build()
                    .send()
                    .map_err(|e| Error::Transient(format!("{url}: {e}")))
            }
            Err(e) => Err(Error::Http(e)),
        }
    }
}

impl ForgeClient for HttpForgeClient {
    fn fetch_page(&self, forge: &Forge, path: &str, page: u32) -> Result<Page> {
        let mut url = Self::url(forge, path)?;
        provider::paginate(forge.source, &mut url, page);
        let headers = provider::headers(forge)?;
        let client = self.client_for(forge);

        let resp = self.send(&url, || client.get(url.clone()).headers(headers.clone()))?;
        let status = resp.status();
        if !status.is_success() {
            tracing::warn!("{} answered {}, treating page as empty", url, status);
            return Ok(Page::empty(status.as_u16()));
        }

        let response_headers = resp.headers().clone();
        let body: Value = resp.json()?;
        let next = provider::next_page(forge.source, page, &response_headers, &body);
        Ok(Page {
            status: status.as_u16(),
            body: Some(body),
            next,
        })
    }

    fn get(&self, forge: &Forge, path: &str) -> Result<Option<Value>> {
        let url = Self::url(forge, path)?;
        let headers = provider::headers(forge)?;
        let client = self.client_for(forge);

        let resp = self.send(&url, || client.get(url.clone()).headers(headers.clone()))?;
        if !resp.status().is_success() {
            tracing::warn!("{} answered {}", url, resp.status());
            return Ok(None);
        }
        Ok(Some(resp.json()?))
    }

    fn delete(&self, forge: &Forge, path: &str) -> Result<u16> {
        let url = Self::url(forge, path)?;
        let headers = provider::headers(forge)?;
        let client = self.client_for(forge);

        let resp = self.send(&url, || client.delete(url.clone()).headers(headers.clone()))?;
        let status = resp.status();
        if !status.is_success() {
            tracing::warn!("DELETE {} answered {}", url, status);
        }
        Ok(status.as_u16())
    }
}
