//! Repository for the design sessions table.

use atelier_core::session::DesignSession;

use crate::client::{eq, PostgrestClient};
use crate::error::DbError;

/// Read access to design sessions. Sessions are created by the storefront
/// and mutated by generation workers, never by the studio.
pub struct DesignSessionRepo;

impl DesignSessionRepo {
    /// Find a session by id. Returns `None` if no row matches.
    pub async fn find_by_id(
        client: &PostgrestClient,
        id: &str,
    ) -> Result<Option<DesignSession>, DbError> {
        let rows: Vec<DesignSession> = client
            .select(
                &client.tables().sessions,
                &[("id", eq(id)), ("limit", "1".to_string())],
            )
            .await?;
        Ok(rows.into_iter().next())
    }
}
