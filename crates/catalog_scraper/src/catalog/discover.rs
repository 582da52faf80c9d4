//! Detail-page discovery from the catalog search page.

use super::error::ScrapeError;
use crate::config::SelectorConfig;
use scraper::{Html, Selector};
use std::collections::BTreeSet;
use std::sync::LazyLock;
use url::Url;

static LINK_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[id][href]").unwrap());

/// Collects the detail-page URLs linked from the search page.
///
/// Only anchors whose id starts with the configured prefix and whose href
/// contains the detail-page marker count. Links are resolved against `base`,
/// get the columns parameter appended, and are deduplicated.
pub fn discover_course_links(
    html: &str,
    base: &Url,
    selectors: &SelectorConfig,
    columns_param: &(String, String),
) -> Result<BTreeSet<Url>, ScrapeError> {
    let document = Html::parse_document(html);
    let mut links = BTreeSet::new();

    for anchor in document.select(&LINK_SELECTOR) {
        let (Some(id), Some(href)) = (anchor.value().id(), anchor.value().attr("href")) else {
            continue;
        };
        if !id.starts_with(&selectors.link_id_prefix)
            || !href.contains(&selectors.detail_path_marker)
        {
            continue;
        }

        let mut url = base.join(href.trim())?;
        url.query_pairs_mut()
            .append_pair(&columns_param.0, &columns_param.1);
        links.insert(url);
    }

    Ok(links)
}
