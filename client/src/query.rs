//! Query parameters, the search response shape, and search URL construction.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::error::PrismicError;
use crate::http::RequestOptions;

/// Parameters of one document query. Unset fields fall back to the client's defaults.
#[derive(Debug, Clone, Default)]
pub struct QueryParams {
    /// Pins the ref; skips resolution and stale-ref cache invalidation.
    pub reference: Option<String>,
    /// Pre-formatted filters such as `[at(document.type, "page")]`, joined into `q`.
    pub filters: Vec<String>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub lang: Option<String>,
    pub orderings: Vec<String>,
    pub integration_fields_ref: Option<String>,
    pub access_token: Option<String>,
    /// Any other API parameter, sent as given.
    pub extra: BTreeMap<String, String>,
    pub options: RequestOptions,
}

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ref(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filters.push(filter.into());
        self
    }

    pub fn with_page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = Some(page_size);
        self
    }

    pub fn with_lang(mut self, lang: impl Into<String>) -> Self {
        self.lang = Some(lang.into());
        self
    }

    pub fn with_ordering(mut self, ordering: impl Into<String>) -> Self {
        self.orderings.push(ordering.into());
        self
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(name.into(), value.into());
        self
    }

    pub fn with_options(mut self, options: RequestOptions) -> Self {
        self.options = options;
        self
    }
}

/// One page of search results.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub page: u32,
    pub results_per_page: u32,
    pub results_size: u32,
    pub total_results_size: u32,
    pub total_pages: u32,
    pub next_page: Option<String>,
    pub prev_page: Option<String>,
    pub results: Vec<Value>,
}

/// Builds `{endpoint}/documents/search` for `reference`.
///
/// `defaults` are client-level API parameters; any parameter set on `params` replaces the
/// default of the same name. `ref` comes first and the rest are sorted, so equal queries
/// always produce equal URLs.
pub fn search_url(
    endpoint: &str,
    reference: &str,
    params: &QueryParams,
    defaults: &BTreeMap<String, String>,
) -> Result<String, PrismicError> {
    let mut url = Url::parse(&format!("{}/documents/search", endpoint.trim_end_matches('/')))
        .map_err(|e| PrismicError::Config(format!("invalid endpoint {endpoint}: {e}")))?;

    let mut pairs = defaults.clone();
    pairs.remove("ref");
    pairs.extend(params.extra.iter().map(|(k, v)| (k.clone(), v.clone())));
    if !params.filters.is_empty() {
        pairs.insert("q".into(), format!("[{}]", params.filters.concat()));
    }
    if let Some(page) = params.page {
        pairs.insert("page".into(), page.to_string());
    }
    if let Some(page_size) = params.page_size {
        pairs.insert("pageSize".into(), page_size.to_string());
    }
    if let Some(lang) = &params.lang {
        pairs.insert("lang".into(), lang.clone());
    }
    if !params.orderings.is_empty() {
        pairs.insert("orderings".into(), format!("[{}]", params.orderings.join(",")));
    }
    if let Some(fields_ref) = &params.integration_fields_ref {
        pairs.insert("integrationFieldsRef".into(), fields_ref.clone());
    }
    if let Some(token) = &params.access_token {
        pairs.insert("access_token".into(), token.clone());
    }

    {
        let mut query = url.query_pairs_mut();
        query.append_pair("ref", reference);
        for (name, value) in &pairs {
            query.append_pair(name, value);
        }
    }
    Ok(url.into())
}

/// Value of `name` in `url`'s query string.
pub fn query_param(url: &str, name: &str) -> Option<String> {
    Url::parse(url)
        .ok()?
        .query_pairs()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
}
