//! Component resolution capability.
//!
//! The compiler depends on this trait abstractly so it can be driven by
//! a stub in tests and by the live `search_component` lookup in
//! production, without ever touching the transport directly.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use aeb_protocol::{Action, CommandMeta, CommandPort};

/// One ranked search hit for a keyword.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResolvedCandidate {
    pub library_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Failure of one keyword lookup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolveError {
    pub keyword: String,
    pub detail: String,
}

impl std::fmt::Display for ResolveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "lookup of '{}' failed: {}", self.keyword, self.detail)
    }
}

impl std::error::Error for ResolveError {}

/// Keyword → ranked candidate list.
#[async_trait::async_trait]
pub trait ComponentResolver: Send + Sync {
    async fn resolve(&self, keyword: &str) -> Result<Vec<ResolvedCandidate>, ResolveError>;
}

/// Production resolver: drives the peer's `search_component` action
/// through any [`CommandPort`].
pub struct SearchResolver<'a> {
    port: &'a dyn CommandPort,
}

impl<'a> SearchResolver<'a> {
    pub fn new(port: &'a dyn CommandPort) -> Self {
        Self { port }
    }
}

#[async_trait::async_trait]
impl ComponentResolver for SearchResolver<'_> {
    async fn resolve(&self, keyword: &str) -> Result<Vec<ResolvedCandidate>, ResolveError> {
        let outcome = self
            .port
            .issue(
                Action::SearchComponent,
                json!({ "keyword": keyword }),
                CommandMeta::default(),
            )
            .await;

        if !outcome.ok {
            return Err(ResolveError {
                keyword: keyword.to_string(),
                detail: outcome.error_text(),
            });
        }

        let candidates = outcome
            .result
            .as_ref()
            .and_then(|r| r.get("candidates"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        Ok(candidates
            .into_iter()
            .filter_map(|c| serde_json::from_value::<ResolvedCandidate>(c).ok())
            .collect())
    }
}
