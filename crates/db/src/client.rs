//! Thin PostgREST client.
//!
//! Wraps [`reqwest`] with the Supabase headers and PostgREST error decoding.
//! Row filters use PostgREST operator syntax (`session_id=eq.<id>`).

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::{DbConfig, TableNames};
use crate::error::DbError;

/// Cheaply cloneable handle to a PostgREST endpoint.
#[derive(Clone)]
pub struct PostgrestClient {
    http: reqwest::Client,
    rest_url: String,
    api_key: String,
    bearer: String,
    tables: TableNames,
}

impl PostgrestClient {
    pub fn new(config: &DbConfig) -> Result<Self, DbError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            http,
            rest_url: config.rest_url(),
            api_key: config.api_key.clone(),
            bearer: config
                .access_token
                .clone()
                .unwrap_or_else(|| config.api_key.clone()),
            tables: config.tables.clone(),
        })
    }

    /// Table names this client was configured with.
    pub fn tables(&self) -> &TableNames {
        &self.tables
    }

    /// `GET /{table}?select=*&<filters>`.
    pub async fn select<T: DeserializeOwned>(
        &self,
        table: &str,
        filters: &[(&str, String)],
    ) -> Result<Vec<T>, DbError> {
        let response = self
            .request(reqwest::Method::GET, table)
            .query(&[("select", "*")])
            .query(filters)
            .send()
            .await?;

        let response = Self::ensure_success(response).await?;
        Ok(response.json::<Vec<T>>().await?)
    }

    /// `POST /{table}` with `Prefer: return=minimal`.
    pub async fn insert<B: Serialize + ?Sized>(&self, table: &str, row: &B) -> Result<(), DbError> {
        let response = self
            .request(reqwest::Method::POST, table)
            .header("Prefer", "return=minimal")
            .json(row)
            .send()
            .await?;

        Self::ensure_success(response).await?;
        Ok(())
    }

    /// `GET /` (the OpenAPI root). Used by health checks.
    pub async fn ping(&self) -> Result<(), DbError> {
        let response = self.request(reqwest::Method::GET, "").send().await?;
        Self::ensure_success(response).await?;
        Ok(())
    }

    // ---- private helpers ----

    fn request(&self, method: reqwest::Method, table: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, format!("{}/{table}", self.rest_url))
            .header("apikey", &self.api_key)
            .bearer_auth(&self.bearer)
    }

    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, DbError> {
        let status = response.status();
        if !status.is_success() {
            tracing::debug!(status = status.as_u16(), url = %response.url(), "PostgREST request rejected");
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(DbError::from_response_body(status.as_u16(), &body));
        }
        Ok(response)
    }
}

/// PostgREST equality filter value: `eq.<value>`.
pub fn eq(value: &str) -> String {
    format!("eq.{value}")
}
