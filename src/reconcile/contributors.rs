use git2::{Oid, Repository};

use super::Reconciler;
use crate::error::Result;
use crate::store::Store;
use crate::types::Project;

/// Whether `mail` looks like a deliverable address.
///
/// Placeholder addresses left by misconfigured git clients are shared by
/// unrelated people, so they must never merge two identities.
#[must_use]
pub fn is_valid_mail(mail: &str) -> bool {
    let Some((local, domain)) = mail.split_once('@') else {
        return false;
    };
    let domain = domain.to_ascii_lowercase();
    !local.is_empty()
        && !domain.contains('@')
        && !mail.chars().any(char::is_whitespace)
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !domain.contains("(none)")
        && !domain.starts_with("localhost")
        && !domain.ends_with(".local")
        && !domain.ends_with(".localdomain")
}

fn link_new(store: &dyn Store, name_id: i64, mail_id: Option<i64>) -> Result<i64> {
    let contributor = store.create_contributor()?;
    store.set_name_contributor(name_id, contributor.id)?;
    if let Some(mail_id) = mail_id {
        store.set_mail_contributor(mail_id, contributor.id)?;
    }
    Ok(contributor.id)
}

/// Resolves the contributor behind one `(name, mail)` authorship pair,
/// linking or merging identities as needed. Returns the contributor id.
pub fn resolve_contributor(store: &dyn Store, name: &str, mail: &str) -> Result<i64> {
    let (cname, name_created) = store.get_or_create_contributor_name(name)?;
    let (cmail, mail_created) = store.get_or_create_contributor_mail(mail, !is_valid_mail(mail))?;

    match (name_created, mail_created) {
        (true, true) => link_new(store, cname.id, Some(cmail.id)),
        (true, false) => match cmail.contributor_id {
            Some(owner) => {
                store.set_name_contributor(cname.id, owner)?;
                Ok(owner)
            }
            None => link_new(store, cname.id, Some(cmail.id)),
        },
        (false, true) => match cname.contributor_id {
            Some(owner) => {
                store.set_mail_contributor(cmail.id, owner)?;
                Ok(owner)
            }
            None => link_new(store, cname.id, Some(cmail.id)),
        },
        (false, false) => match (cname.contributor_id, cmail.contributor_id) {
            (Some(a), Some(b)) if a == b => Ok(a),
            (Some(a), _) if cmail.invalid => Ok(a),
            (None, _) if cmail.invalid => link_new(store, cname.id, None),
            (Some(a), None) => {
                store.set_mail_contributor(cmail.id, a)?;
                Ok(a)
            }
            (None, Some(b)) => {
                store.set_name_contributor(cname.id, b)?;
                Ok(b)
            }
            (Some(a), Some(b)) => {
                let (into, from) = (a.min(b), a.max(b));
                tracing::info!("Merging contributor {} into {}", from, into);
                store.merge_contributors(into, from)?;
                Ok(into)
            }
            (None, None) => link_new(store, cname.id, Some(cmail.id)),
        },
    }
}

impl Reconciler<'_> {
    /// Links every author of the history behind `tip` to `project`.
    pub(super) fn update_contributors(
        &self,
        git: &Repository,
        tip: Oid,
        project: &Project,
    ) -> Result<()> {
        for (name, mail) in self.mirrors.authors(git, tip)? {
            if name.is_empty() {
                continue;
            }
            let contributor = resolve_contributor(self.store, &name, &mail)?;
            self.store.add_contributor_project(contributor, project.id)?;
        }
        Ok(())
    }
}
