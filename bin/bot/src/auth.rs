//! Resolving Telegram users to CRM actors.
//!
//! A user proves who they are once by sharing their own phone contact. The
//! resulting CRM user id is remembered in the link store, so later sessions
//! are opened by id without asking again.

use deal_courier_core::{ExternalUserId, Result};
use deal_courier_crm::{CrmActor, CrmDirectory, CrmError, LinkStore};
use std::sync::Arc;
use tracing::{info, warn};

/// Normalizes a shared phone number to `+<digits>`.
///
/// Telegram reports numbers with or without the leading plus, depending on
/// the client.
#[must_use]
pub fn normalize_phone(phone: &str) -> String {
    let digits: String = phone.chars().filter(char::is_ascii_digit).collect();
    format!("+{digits}")
}

pub struct Authenticator {
    directory: Arc<dyn CrmDirectory>,
    links: Arc<LinkStore>,
}

impl Authenticator {
    #[must_use]
    pub fn new(directory: Arc<dyn CrmDirectory>, links: Arc<LinkStore>) -> Self {
        Self { directory, links }
    }

    /// Re-opens the CRM actor for a user linked earlier.
    ///
    /// Returns `None` for users who have not shared a contact yet.
    pub async fn resume(
        &self,
        user: ExternalUserId,
    ) -> Result<Option<Arc<dyn CrmActor>>, CrmError> {
        let Some(crm_user) = self.links.get(user) else {
            return Ok(None);
        };
        let actor = self.directory.authenticate_by_id(crm_user).await?;
        Ok(Some(actor))
    }

    /// Resolves a shared phone number and remembers the link.
    pub async fn link_by_phone(
        &self,
        user: ExternalUserId,
        phone: &str,
    ) -> Result<Arc<dyn CrmActor>, CrmError> {
        let phone = normalize_phone(phone);
        let actor = self.directory.authenticate_by_phone(&phone).await?;
        let crm_user = actor.profile().id;
        self.links.set(user, crm_user);
        info!(%user, %crm_user, "linked telegram user to crm user");
        if let Err(report) = self.links.save() {
            warn!(error = %report, "failed to save user links");
        }
        Ok(actor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{KNOWN_ID, OnePerson};
    use deal_courier_core::CrmUserId;

    fn authenticator(dir: &tempfile::TempDir) -> (Authenticator, Arc<LinkStore>) {
        let links = Arc::new(LinkStore::open(dir.path().join("links.json")));
        (
            Authenticator::new(Arc::new(OnePerson), Arc::clone(&links)),
            links,
        )
    }

    #[test]
    fn normalize_phone_adds_plus() {
        assert_eq!(normalize_phone("79990001122"), "+79990001122");
        assert_eq!(normalize_phone("+7 (999) 000-11-22"), "+79990001122");
    }

    #[tokio::test]
    async fn unknown_user_has_nothing_to_resume() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (auth, _) = authenticator(&dir);
        let resumed = auth.resume(ExternalUserId::new(5)).await.expect("resume");
        assert!(resumed.is_none());
    }

    #[tokio::test]
    async fn phone_link_is_remembered_and_saved() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (auth, links) = authenticator(&dir);
        let user = ExternalUserId::new(5);

        let actor = auth.link_by_phone(user, "79990001122").await.expect("link");
        assert_eq!(actor.profile().id, CrmUserId::new(KNOWN_ID));
        assert_eq!(links.get(user), Some(CrmUserId::new(KNOWN_ID)));

        let reopened = LinkStore::open(links.path());
        assert_eq!(reopened.get(user), Some(CrmUserId::new(KNOWN_ID)));

        let resumed = auth.resume(user).await.expect("resume").expect("linked");
        assert_eq!(resumed.profile().name, "Ivan");
    }

    #[tokio::test]
    async fn unknown_phone_is_not_linked() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (auth, links) = authenticator(&dir);
        let user = ExternalUserId::new(5);

        let err = auth
            .link_by_phone(user, "+10000000000")
            .await
            .err()
            .expect("should fail");
        assert!(err.to_string().contains("+10000000000"));
        assert!(links.is_empty());
    }
}
