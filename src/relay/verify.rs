use std::net::IpAddr;

use axum::http::HeaderMap;
use hmac::{Hmac, Mac};
use ipnet::IpNet;
use sha1::Sha1;

use super::{RelayError, event_header as header};
use crate::forge::GITHUB_API;
use crate::server::AppState;
use crate::types::{Forge, ForgeSource};

type HmacSha1 = Hmac<Sha1>;

/// Originating address: the first entry of `X-Forwarded-For`.
pub fn client_ip(headers: &HeaderMap) -> Option<IpAddr> {
    header(headers, "x-forwarded-for")?
        .split(',')
        .next()?
        .trim()
        .parse()
        .ok()
}

/// Checks `X-Hub-Signature` (`sha1=<hex>`) against an HMAC of the raw body.
pub fn verify_signature(
    headers: &HeaderMap,
    body: &[u8],
    secret: Option<&str>,
) -> Result<(), RelayError> {
    let signature =
        header(headers, "x-hub-signature").ok_or(RelayError::Unauthorized("no signature"))?;
    let (algorithm, signature) = signature
        .split_once('=')
        .ok_or(RelayError::Forbidden("wrong signature."))?;
    if algorithm != "sha1" {
        return Err(RelayError::UnsupportedAlgorithm);
    }
    let Some(secret) = secret else {
        tracing::error!("GitHub webhook secret is not configured");
        return Err(RelayError::Forbidden("wrong signature."));
    };

    let expected = hex::decode(signature).map_err(|_| RelayError::Forbidden("wrong signature."))?;
    let mut mac = HmacSha1::new_from_slice(secret.as_bytes())
        .map_err(|_| RelayError::Forbidden("wrong signature."))?;
    mac.update(body);
    mac.verify_slice(&expected)
        .map_err(|_| RelayError::Forbidden("wrong signature."))
}

/// The address must fall in one of the hook networks GitHub publishes.
pub(super) fn verify_github_source(state: &AppState, headers: &HeaderMap) -> Result<(), RelayError> {
    let ip = client_ip(headers).ok_or(RelayError::Unauthorized("not from github IP"))?;

    let forge = state
        .store
        .get_forge_by_source(ForgeSource::Github)?
        .unwrap_or_else(|| Forge {
            id: 0,
            name: "GitHub".to_string(),
            slug: "github".to_string(),
            source: ForgeSource::Github,
            url: GITHUB_API.to_string(),
            token: None,
            verify: true,
        });
    let meta = state
        .client
        .get(&forge, "/meta")?
        .ok_or(RelayError::Unauthorized("not from github IP"))?;

    let allowed = meta
        .get("hooks")
        .and_then(|hooks| hooks.as_array())
        .into_iter()
        .flatten()
        .filter_map(|net| net.as_str()?.parse::<IpNet>().ok())
        .any(|net| net.contains(&ip));
    if !allowed {
        return Err(RelayError::Unauthorized("not from github IP"));
    }
    Ok(())
}

/// The address must be inside the configured GitLab network and the
/// `X-Gitlab-Token` header must equal the shared token.
pub(super) fn verify_gitlab(state: &AppState, headers: &HeaderMap) -> Result<(), RelayError> {
    let network = state.settings.gitlab_net()?;
    if !client_ip(headers).is_some_and(|ip| network.contains(&ip)) {
        return Err(RelayError::Unauthorized("not from gitlab network"));
    }

    let token = header(headers, "x-gitlab-token").ok_or(RelayError::Unauthorized("no token"))?;
    match state.settings.gitlab_webhook_token.as_deref() {
        Some(expected) if expected == token => Ok(()),
        Some(_) => Err(RelayError::Forbidden("wrong token.")),
        None => {
            tracing::error!("GitLab webhook token is not configured");
            Err(RelayError::Forbidden("wrong token."))
        }
    }
}
