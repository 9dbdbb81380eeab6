use async_trait::async_trait;
use serde_json::{json, Value};

use crate::abilities::{Ability, AbilityContext};
use crate::config::SiteConfig;

/// Ability returning the site's public identity (name, description, URL).
pub struct SiteInfoAbility {
    site: SiteConfig,
}

impl SiteInfoAbility {
    pub fn new(site: SiteConfig) -> Self {
        Self { site }
    }
}

#[async_trait]
impl Ability for SiteInfoAbility {
    fn name(&self) -> &str {
        "site/get-info"
    }

    fn description(&self) -> &str {
        "Get basic information about this site: its name, tagline and address. \
         Use this when the user asks what the site is or how to reach it."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    fn output_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "name": {"type": "string"},
                "description": {"type": "string"},
                "url": {"type": "string"}
            }
        })
    }

    async fn execute(&self, _args: Value, _context: &AbilityContext) -> anyhow::Result<Value> {
        Ok(json!({
            "name": self.site.name,
            "description": self.site.description,
            "url": self.site.url,
        }))
    }
}
