use serde::Deserialize;

/// PostgreSQL / PostgREST codes meaning "the table or column you named does
/// not exist here".
const SCHEMA_MISMATCH_CODES: &[&str] = &[
    // undefined_table
    "42P01",
    // undefined_column
    "42703",
    // column not found in schema cache
    "PGRST204",
    // table not found in schema cache
    "PGRST205",
];

/// Errors from the PostgREST layer.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout, decoding).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// PostgREST answered with a non-2xx status.
    #[error("PostgREST error ({status}): {message}")]
    Api {
        status: u16,
        /// PostgreSQL SQLSTATE or `PGRSTxxx` code, when the body carried one.
        code: Option<String>,
        message: String,
    },
}

impl DbError {
    /// Whether the error means the target table or one of its columns does
    /// not exist under the name we used.
    pub fn is_schema_mismatch(&self) -> bool {
        match self {
            DbError::Api { status, code, .. } => match code {
                Some(code) => SCHEMA_MISMATCH_CODES.contains(&code.as_str()),
                None => *status == 404,
            },
            DbError::Request(_) => false,
        }
    }

    /// Build an [`DbError::Api`] from a status and raw response body.
    ///
    /// PostgREST error bodies look like
    /// `{"code":"42P01","message":"relation ... does not exist","details":null,"hint":null}`;
    /// anything else is kept verbatim as the message.
    pub fn from_response_body(status: u16, body: &str) -> Self {
        match serde_json::from_str::<PostgrestErrorBody>(body) {
            Ok(parsed) => DbError::Api {
                status,
                code: parsed.code,
                message: parsed.message.unwrap_or_else(|| body.to_string()),
            },
            Err(_) => DbError::Api {
                status,
                code: None,
                message: body.to_string(),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct PostgrestErrorBody {
    code: Option<String>,
    message: Option<String>,
}
