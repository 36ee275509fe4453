//! Read side of the studio's backend seam.

use async_trait::async_trait;
use atelier_core::session::DesignSession;
use atelier_core::variation::DesignVariation;
use atelier_db::repositories::{DesignSessionRepo, DesignVariationRepo};
use atelier_db::{DbError, PostgrestClient};

/// Where sessions and their variations are read from.
#[async_trait]
pub trait SessionSource: Send + Sync {
    async fn fetch_session(&self, session_id: &str) -> Result<Option<DesignSession>, DbError>;

    /// All variations of a session, newest first.
    async fn list_variations(&self, session_id: &str) -> Result<Vec<DesignVariation>, DbError>;
}

pub struct PostgrestSource {
    client: PostgrestClient,
}

impl PostgrestSource {
    pub fn new(client: PostgrestClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SessionSource for PostgrestSource {
    async fn fetch_session(&self, session_id: &str) -> Result<Option<DesignSession>, DbError> {
        DesignSessionRepo::find_by_id(&self.client, session_id).await
    }

    async fn list_variations(&self, session_id: &str) -> Result<Vec<DesignVariation>, DbError> {
        DesignVariationRepo::list_by_session(&self.client, session_id).await
    }
}
