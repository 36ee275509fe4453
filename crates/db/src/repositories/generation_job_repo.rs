//! Repository for the primary generation jobs table.

use crate::client::PostgrestClient;
use crate::error::DbError;
use crate::models::job::NewGenerationJob;

pub struct GenerationJobRepo;

impl GenerationJobRepo {
    /// Insert a job row. The worker picks it up out of process.
    pub async fn create(client: &PostgrestClient, job: &NewGenerationJob) -> Result<(), DbError> {
        client.insert(&client.tables().generation_jobs, job).await
    }
}
