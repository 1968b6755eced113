//! Links from a task to the external dataset catalog. Only URLs are built
//! here; the catalog itself is never contacted.

use crate::{MetisError, Result};
use url::Url;

pub const DEFAULT_CATALOG_URL: &str = "http://uaf-4.t2.ucsd.edu/~namin/dis/";

const PREVIEW_HANDLER: &str = "handler.py";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupLinks {
    pub display: String,
    pub preview: String,
}

#[derive(Debug, Clone)]
pub struct Catalog {
    display_base: Url,
    preview_base: Url,
}

impl Catalog {
    pub fn parse(base: &str) -> Result<Self> {
        let invalid = |reason: String| MetisError::CatalogUrl {
            url: base.to_string(),
            reason,
        };
        let mut display_base = Url::parse(base.trim()).map_err(|err| invalid(err.to_string()))?;
        if display_base.cannot_be_a_base() {
            return Err(invalid("url cannot carry a path".to_string()));
        }
        display_base.set_query(None);
        display_base.set_fragment(None);
        if !display_base.path().ends_with('/') {
            let path = format!("{}/", display_base.path());
            display_base.set_path(&path);
        }
        let preview_base = display_base
            .join(PREVIEW_HANDLER)
            .map_err(|err| invalid(err.to_string()))?;
        Ok(Self {
            display_base,
            preview_base,
        })
    }

    pub fn links(&self, dataset: &str) -> LookupLinks {
        LookupLinks {
            display: with_query(&self.display_base, dataset),
            preview: with_query(&self.preview_base, dataset),
        }
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::parse(DEFAULT_CATALOG_URL).expect("default catalog url is valid")
    }
}

fn with_query(base: &Url, dataset: &str) -> String {
    let mut url = base.clone();
    url.query_pairs_mut()
        .append_pair("type", "basic")
        .append_pair("short", "short")
        .append_pair("query", dataset);
    url.into()
}
