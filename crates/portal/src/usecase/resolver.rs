use std::sync::Arc;

use app_core::error::AppError;
use serde_json::{Map, Value};

use crate::domain::entity::account::{Account, Portal};
use crate::domain::entity::document::Document;
use crate::outbound::records::RecordStore;

/// Finds the profile record behind an identity within one portal.
///
/// Lookup order: the record keyed by the handle, a record whose `uid` is the
/// handle, then records carrying the same email. Email matches bound to a
/// different identity are skipped. Among several email matches the most
/// recently created wins, ties broken by the smallest key.
#[derive(Clone)]
pub struct RecordResolver {
    records: Arc<dyn RecordStore>,
}

impl RecordResolver {
    pub fn new(records: Arc<dyn RecordStore>) -> Self {
        Self { records }
    }

    pub async fn resolve(&self, portal: Portal, handle: &str, email: &str) -> Result<Option<Account>, AppError> {
        let collection = portal.collection();

        if let Some(doc) = self.records.get(collection, handle).await? {
            return Ok(Some(Account::from_document(portal, &doc).with_identity(handle)));
        }

        if let Some(doc) = pick(self.records.find(collection, "uid", handle).await?) {
            return Ok(Some(Account::from_document(portal, &doc)));
        }

        let email = email.trim().to_lowercase();
        if email.is_empty() {
            return Ok(None);
        }

        let (matches, foreign): (Vec<Document>, Vec<Document>) = self
            .records
            .find(collection, "email", &email)
            .await?
            .into_iter()
            .partition(|doc| doc.str_field("uid").is_none_or(|uid| uid.is_empty() || uid == handle));
        if !foreign.is_empty() {
            tracing::warn!(collection, %email, count = foreign.len(), "email match is bound to another identity");
        }
        if matches.len() > 1 {
            tracing::warn!(collection, %email, count = matches.len(), "several records share an email");
        }
        let Some(doc) = pick(matches) else {
            return Ok(None);
        };

        let account = Account::from_document(portal, &doc);
        if account.identity.is_none() {
            self.link(collection, &doc.key, handle).await;
        }

        Ok(Some(account.with_identity(handle)))
    }

    /// Stamps the identity handle onto a record found by email. Best effort.
    async fn link(&self, collection: &str, key: &str, handle: &str) {
        let mut patch = Map::new();
        patch.insert("uid".to_string(), Value::String(handle.to_string()));
        match self.records.update(collection, key, patch).await {
            Ok(()) => tracing::info!(collection, key, "record linked to identity"),
            Err(err) => tracing::warn!(collection, key, error = %err, "failed to link record to identity"),
        }
    }
}

fn pick(mut docs: Vec<Document>) -> Option<Document> {
    docs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.key.cmp(&b.key)));
    docs.into_iter().next()
}
