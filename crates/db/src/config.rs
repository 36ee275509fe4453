/// Names of the tables the studio reads and writes.
///
/// The job table name is not guaranteed across deployments, which is why
/// there is both a primary and a fallback job table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableNames {
    pub sessions: String,
    pub variations: String,
    pub generation_jobs: String,
    pub fallback_jobs: String,
}

impl Default for TableNames {
    fn default() -> Self {
        Self {
            sessions: "design_sessions".into(),
            variations: "design_variations".into(),
            generation_jobs: "generation_jobs".into(),
            fallback_jobs: "design_jobs".into(),
        }
    }
}

/// PostgREST connection settings loaded from environment variables.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Project URL, e.g. `https://abc.supabase.co` (no trailing `/rest/v1`).
    pub supabase_url: String,
    /// Project API key sent as the `apikey` header.
    pub api_key: String,
    /// Bearer token for row-level security. Defaults to `api_key`.
    pub access_token: Option<String>,
    /// Per-request timeout in seconds (default: `15`).
    pub request_timeout_secs: u64,
    pub tables: TableNames,
}

impl DbConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                      | Default             |
    /// |------------------------------|---------------------|
    /// | `SUPABASE_URL`               | required            |
    /// | `SUPABASE_ANON_KEY`          | required            |
    /// | `SUPABASE_SERVICE_ROLE_KEY`  | unset               |
    /// | `SUPABASE_TIMEOUT_SECS`      | `15`                |
    /// | `DESIGN_SESSIONS_TABLE`      | `design_sessions`   |
    /// | `DESIGN_VARIATIONS_TABLE`    | `design_variations` |
    /// | `GENERATION_JOBS_TABLE`      | `generation_jobs`   |
    /// | `FALLBACK_JOBS_TABLE`        | `design_jobs`       |
    pub fn from_env() -> Self {
        let supabase_url = std::env::var("SUPABASE_URL").expect("SUPABASE_URL must be set");
        let api_key = std::env::var("SUPABASE_ANON_KEY").expect("SUPABASE_ANON_KEY must be set");
        let access_token = std::env::var("SUPABASE_SERVICE_ROLE_KEY")
            .ok()
            .filter(|s| !s.is_empty());

        let request_timeout_secs: u64 = std::env::var("SUPABASE_TIMEOUT_SECS")
            .unwrap_or_else(|_| "15".into())
            .parse()
            .expect("SUPABASE_TIMEOUT_SECS must be a valid u64");

        let defaults = TableNames::default();
        let tables = TableNames {
            sessions: env_or("DESIGN_SESSIONS_TABLE", defaults.sessions),
            variations: env_or("DESIGN_VARIATIONS_TABLE", defaults.variations),
            generation_jobs: env_or("GENERATION_JOBS_TABLE", defaults.generation_jobs),
            fallback_jobs: env_or("FALLBACK_JOBS_TABLE", defaults.fallback_jobs),
        };

        Self {
            supabase_url,
            api_key,
            access_token,
            request_timeout_secs,
            tables,
        }
    }

    /// Base URL of the REST API, e.g. `https://abc.supabase.co/rest/v1`.
    pub fn rest_url(&self) -> String {
        format!("{}/rest/v1", self.supabase_url.trim_end_matches('/'))
    }
}

fn env_or(key: &str, default: String) -> String {
    std::env::var(key)
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default)
}
