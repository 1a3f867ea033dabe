use reqwest::Url;

use crate::error::Result;
use crate::store::Store;
use crate::types::{ForgeSource, Namespace, Project};

const TRAVIS_WEB: &str = "https://travis-ci.org";

fn main_namespace(store: &dyn Store, project: &Project) -> Result<Option<Namespace>> {
    match project.main_namespace_id {
        Some(id) => store.get_namespace(id),
        None => Ok(None),
    }
}

fn forge_url(store: &dyn Store, project: &Project, source: ForgeSource) -> Result<Option<String>> {
    let Some(forge) = store.get_forge_by_source(source)? else {
        return Ok(None);
    };
    Ok(main_namespace(store, project)?.map(|ns| {
        format!("{}/{}/{}", forge.url.trim_end_matches('/'), ns.slug, project.slug)
    }))
}

pub fn url_github(store: &dyn Store, project: &Project) -> Result<Option<String>> {
    forge_url(store, project, ForgeSource::Github)
}

pub fn url_gitlab(store: &dyn Store, project: &Project) -> Result<Option<String>> {
    forge_url(store, project, ForgeSource::Gitlab)
}

/// Build page of the project on Travis; the web host is the API host
/// without its `api.` prefix.
pub fn url_travis(store: &dyn Store, project: &Project) -> Result<Option<String>> {
    let web = store
        .get_forge_by_source(ForgeSource::Travis)?
        .and_then(|forge| Url::parse(&forge.url).ok())
        .and_then(|url| {
            let host = url.host_str()?;
            Some(format!("{}://{}", url.scheme(), host.strip_prefix("api.").unwrap_or(host)))
        })
        .unwrap_or_else(|| TRAVIS_WEB.to_string());
    Ok(main_namespace(store, project)?.map(|ns| format!("{web}/{}/{}", ns.slug, project.slug)))
}
