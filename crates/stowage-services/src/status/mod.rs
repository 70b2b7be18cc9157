//! Read path for import status.

use std::sync::Arc;

use uuid::Uuid;

use stowage_core::models::ImportRequest;
use stowage_core::AppError;
use stowage_db::ImportStore;

/// Answers "what is my latest import and its state".
///
/// `Ok(None)` is the not-found signal for owners with no import history;
/// errors are reserved for transport and database failures. Reads never
/// block on the write path.
#[derive(Clone)]
pub struct ImportStatusService {
    store: Arc<dyn ImportStore>,
}

impl ImportStatusService {
    pub fn new(store: Arc<dyn ImportStore>) -> Self {
        Self { store }
    }

    #[tracing::instrument(skip(self))]
    pub async fn latest_for_owner(
        &self,
        owner_id: Uuid,
    ) -> Result<Option<ImportRequest>, AppError> {
        self.store.load_latest_by_owner(owner_id).await
    }
}
