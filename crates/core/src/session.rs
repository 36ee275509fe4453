//! Design session rows and storefront language tags.
//!
//! A [`DesignSession`] is created by the storefront when a customer submits
//! a prompt and is mutated afterwards only by the generation workers. The
//! counters and maxima are nullable because older rows (and rows the worker
//! has not touched yet) leave them unset.

use serde::{Deserialize, Serialize};

use crate::types::{RecordId, Timestamp};

// ---------------------------------------------------------------------------
// Language
// ---------------------------------------------------------------------------

/// Storefront locales. The URL prefix of every localized page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    Ko,
}

impl Language {
    /// Resolve a free-form language tag (`"ko"`, `"ko-KR"`, `"EN"`).
    ///
    /// Unknown or missing tags resolve to English.
    pub fn from_tag(tag: Option<&str>) -> Self {
        let primary = tag
            .and_then(|t| t.split(['-', '_']).next())
            .map(|t| t.trim().to_ascii_lowercase());

        match primary.as_deref() {
            Some("ko") => Language::Ko,
            _ => Language::En,
        }
    }

    /// Path segment used in storefront URLs.
    pub fn as_str(self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Ko => "ko",
        }
    }
}

// ---------------------------------------------------------------------------
// DesignSession
// ---------------------------------------------------------------------------

/// A row from the design sessions table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesignSession {
    pub id: RecordId,
    pub prompt: String,
    pub language: Option<String>,
    pub user_id: Option<RecordId>,
    pub regeneration_count: Option<u32>,
    pub upscale_count: Option<u32>,
    pub max_regenerations: Option<u32>,
    pub max_upscales: Option<u32>,
    /// Lifecycle tag written by the worker (e.g. `"generating"`, `"ready"`).
    pub status: Option<String>,
    pub created_at: Timestamp,
}

impl DesignSession {
    /// Storefront language for this session's navigation targets.
    pub fn language(&self) -> Language {
        Language::from_tag(self.language.as_deref())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
