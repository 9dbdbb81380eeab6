//! Builtin ability: search the host's own content.
//!
//! The model invokes this ability when a question is likely answered by
//! pages or documents published on the site. Matches are formatted as
//! concise text suitable for LLM consumption.

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::abilities::{require_authenticated, Ability, AbilityContext};
use crate::content::{ContentMatch, ContentSource};

/// Largest `limit` the model may ask for.
const MAX_LIMIT: u64 = 20;

pub struct SearchContentAbility {
    source: Arc<dyn ContentSource>,
    default_limit: usize,
    members_only: bool,
}

impl SearchContentAbility {
    pub fn new(source: Arc<dyn ContentSource>, default_limit: usize) -> Self {
        Self {
            source,
            default_limit,
            members_only: false,
        }
    }

    /// Hides the site's content from anonymous callers.
    pub fn members_only(mut self, members_only: bool) -> Self {
        self.members_only = members_only;
        self
    }

    /// Formats matches into an LLM-friendly string.
    fn format_results(query: &str, matches: &[ContentMatch]) -> String {
        if matches.is_empty() {
            return format!("No content found matching: {query}");
        }

        let mut output = format!("Found {} results for: {query}\n", matches.len());
        for (i, m) in matches.iter().enumerate() {
            output.push_str(&format!(
                "\n{}. {}\n   URL: {}\n   {}\n",
                i + 1,
                m.title,
                m.url,
                m.snippet,
            ));
        }
        output
    }
}

#[async_trait]
impl Ability for SearchContentAbility {
    fn name(&self) -> &str {
        "site/search-content"
    }

    fn description(&self) -> &str {
        "Search the site's published content (pages, posts, documents). Use this when the \
         user asks about something that is likely covered on this site. Returns titles, \
         URLs and short excerpts of the best matches."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Keywords to look for in the site's content"
                },
                "limit": {
                    "type": "integer",
                    "description": "Maximum number of results to return (1-20)"
                }
            },
            "required": ["query"]
        })
    }

    fn output_schema(&self) -> Value {
        json!({
            "type": "string",
            "description": "Numbered list of matches (title, URL, excerpt) or a no-results message"
        })
    }

    fn permitted(&self, context: &AbilityContext) -> bool {
        !self.members_only || require_authenticated(context)
    }

    async fn execute(&self, args: Value, _context: &AbilityContext) -> anyhow::Result<Value> {
        let query = args["query"]
            .as_str()
            .map(str::trim)
            .ok_or_else(|| anyhow::anyhow!("Missing required parameter: query"))?;
        if query.is_empty() {
            anyhow::bail!("Parameter 'query' must not be empty");
        }

        let limit = args["limit"]
            .as_u64()
            .map(|n| n.clamp(1, MAX_LIMIT) as usize)
            .unwrap_or(self.default_limit);

        debug!("Content search ({}): {query} (limit {limit})", self.source.name());

        let matches = self
            .source
            .search(query, limit)
            .await
            .context("content search failed")?;

        Ok(Value::String(Self::format_results(query, &matches)))
    }
}
