use reqwest::Url;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::types::{Forge, ForgeSource};

pub const GITHUB_API: &str = "https://api.github.com";
const GITHUB_PREVIEW: &str = "application/vnd.github.drax-preview+json";

pub const PER_PAGE: u32 = 100;

/// Root every API path of `forge` is appended to.
#[must_use]
pub fn base_url(forge: &Forge) -> String {
    match forge.source {
        ForgeSource::Github => GITHUB_API.to_string(),
        ForgeSource::Gitlab => format!("{}/api/v4", forge.url.trim_end_matches('/')),
        ForgeSource::Redmine | ForgeSource::Travis => forge.url.trim_end_matches('/').to_string(),
    }
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|_| Error::Config("forge token contains invalid header characters".to_string()))
}

/// Authentication and media-type headers for a request to `forge`.
pub fn headers(forge: &Forge) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    let token = forge.token.as_deref().unwrap_or_default();

    match forge.source {
        ForgeSource::Github => {
            headers.insert(AUTHORIZATION, header_value(&format!("token {token}"))?);
            headers.insert(ACCEPT, HeaderValue::from_static(GITHUB_PREVIEW));
        }
        ForgeSource::Gitlab => {
            headers.insert(HeaderName::from_static("private-token"), header_value(token)?);
        }
        ForgeSource::Redmine => {
            headers.insert(
                HeaderName::from_static("x-redmine-api-key"),
                header_value(token)?,
            );
        }
        ForgeSource::Travis => {
            headers.insert(AUTHORIZATION, header_value(&format!("token {token}"))?);
            headers.insert(
                HeaderName::from_static("travis-api-version"),
                HeaderValue::from_static("3"),
            );
        }
    }
    Ok(headers)
}

/// Adds the query parameters selecting `page` (1-based) to `url`.
pub fn paginate(source: ForgeSource, url: &mut Url, page: u32) {
    let page = page.max(1);
    let mut query = url.query_pairs_mut();
    match source {
        ForgeSource::Github | ForgeSource::Gitlab => {
            query
                .append_pair("page", &page.to_string())
                .append_pair("per_page", &PER_PAGE.to_string());
        }
        ForgeSource::Redmine | ForgeSource::Travis => {
            query
                .append_pair("limit", &PER_PAGE.to_string())
                .append_pair("offset", &((page - 1) * PER_PAGE).to_string());
        }
    }
}

/// Page following `page`, as signalled by the provider.
pub fn next_page(source: ForgeSource, page: u32, headers: &HeaderMap, body: &Value) -> Option<u32> {
    match source {
        ForgeSource::Github => headers
            .get("link")
            .and_then(|v| v.to_str().ok())
            .and_then(github_next_page),
        ForgeSource::Gitlab => headers
            .get("x-next-page")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok()),
        ForgeSource::Redmine => {
            let total = body.get("total_count")?.as_u64()?;
            let seen = u64::from(page.max(1)) * u64::from(PER_PAGE);
            (seen < total).then_some(page.max(1) + 1)
        }
        ForgeSource::Travis => {
            let next = body.get("@pagination")?.get("next")?;
            (!next.is_null()).then_some(page.max(1) + 1)
        }
    }
}

/// Extracts the `page` parameter of the `rel="next"` entry of a Link header.
fn github_next_page(link: &str) -> Option<u32> {
    link.split(',')
        .find(|part| part.contains("rel=\"next\""))
        .and_then(|part| {
            let start = part.find('<')? + 1;
            let end = part.find('>')?;
            Url::parse(&part[start..end]).ok()
        })
        .and_then(|url| {
            url.query_pairs()
                .find(|(k, _)| k == "page")
                .and_then(|(_, v)| v.parse().ok())
        })
}
