//! Repository for the fallback jobs table (`action` instead of `type`).

use crate::client::PostgrestClient;
use crate::error::DbError;
use crate::models::job::NewDesignJob;

pub struct DesignJobRepo;

impl DesignJobRepo {
    pub async fn create(client: &PostgrestClient, job: &NewDesignJob) -> Result<(), DbError> {
        client.insert(&client.tables().fallback_jobs, job).await
    }
}
