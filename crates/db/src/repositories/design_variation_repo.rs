//! Repository for the design variations table.

use atelier_core::variation::DesignVariation;

use crate::client::{eq, PostgrestClient};
use crate::error::DbError;

pub struct DesignVariationRepo;

impl DesignVariationRepo {
    /// List every variation of a session, newest first.
    pub async fn list_by_session(
        client: &PostgrestClient,
        session_id: &str,
    ) -> Result<Vec<DesignVariation>, DbError> {
        client
            .select(
                &client.tables().variations,
                &[
                    ("session_id", eq(session_id)),
                    ("order", "created_at.desc".to_string()),
                ],
            )
            .await
    }
}
