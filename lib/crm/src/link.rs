//! Links between messaging users and CRM users.
//!
//! Once a user has proven their phone number the link is remembered, so a
//! later session can re-open the CRM actor without asking for the contact
//! again. Links are kept in a small JSON object file keyed by external id.

use crate::error::LinkStoreError;
use deal_courier_core::{CrmUserId, ExternalUserId, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use tracing::{debug, warn};

/// File-backed map of external user id to CRM user id.
#[derive(Debug)]
pub struct LinkStore {
    path: PathBuf,
    links: RwLock<BTreeMap<ExternalUserId, CrmUserId>>,
}

impl LinkStore {
    /// Opens the store at `path`.
    ///
    /// A missing or unreadable file is not an error: the store starts empty
    /// and the file is recreated on the next save.
    #[must_use]
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let links = match std::fs::read_to_string(&path) {
            Ok(text) => match serde_json::from_str::<BTreeMap<ExternalUserId, CrmUserId>>(&text) {
                Ok(links) => links,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "user link file is corrupt, starting empty");
                    BTreeMap::new()
                }
            },
            Err(e) => {
                warn!(path = %path.display(), error = %e, "user link file not readable, starting empty");
                BTreeMap::new()
            }
        };
        debug!(count = links.len(), "loaded user links");
        Self {
            path,
            links: RwLock::new(links),
        }
    }

    /// Returns the file this store saves to.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Looks up the CRM user linked to an external user.
    #[must_use]
    pub fn get(&self, user: ExternalUserId) -> Option<CrmUserId> {
        self.links
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&user)
            .copied()
    }

    /// Links an external user to a CRM user, replacing any previous link.
    pub fn set(&self, user: ExternalUserId, crm_user: CrmUserId) {
        self.links
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(user, crm_user);
    }

    /// Forgets a link; returns whether one existed.
    pub fn remove(&self, user: ExternalUserId) -> bool {
        self.links
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&user)
            .is_some()
    }

    /// Returns the number of links.
    #[must_use]
    pub fn len(&self) -> usize {
        self.links.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Returns true if no links are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Writes all links to disk.
    pub fn save(&self) -> Result<(), LinkStoreError> {
        let text = {
            let links = self.links.read().unwrap_or_else(PoisonError::into_inner);
            serde_json::to_string_pretty(&*links).map_err(|e| LinkStoreError::Encode {
                reason: e.to_string(),
            })?
        };
        std::fs::write(&self.path, text).map_err(|e| LinkStoreError::Write {
            path: self.path.display().to_string(),
            reason: e.to_string(),
        })?;
        debug!(path = %self.path.display(), "saved user links");
        Ok(())
    }
}
