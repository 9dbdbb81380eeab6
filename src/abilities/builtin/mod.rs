pub mod search_content;
pub mod site_info;

use std::sync::Arc;

use crate::config::Config;
use crate::content::ContentSource;

use super::Ability;

pub use search_content::SearchContentAbility;
pub use site_info::SiteInfoAbility;

/// Default number of search results when `[content]` is not configured.
const DEFAULT_SEARCH_LIMIT: usize = 5;

/// The abilities every bridge exposes, in registration order.
pub fn builtin_abilities(config: &Config, source: Arc<dyn ContentSource>) -> Vec<Box<dyn Ability>> {
    let limit = config
        .content
        .as_ref()
        .map(|c| c.max_results)
        .unwrap_or(DEFAULT_SEARCH_LIMIT);
    let members_only = config.content.as_ref().is_some_and(|c| c.members_only);

    let mut abilities: Vec<Box<dyn Ability>> = Vec::new();
    abilities.push(Box::new(
        SearchContentAbility::new(source, limit).members_only(members_only),
    ));
    abilities.push(Box::new(SiteInfoAbility::new(config.site.clone())));
    abilities
}
