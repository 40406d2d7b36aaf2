//! The client facade: one repository, its metadata cache, ref state and dispatcher.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use env_config::ClientSettings;
use serde_json::Value;
use url::Url;

use crate::dispatch::{Dispatcher, DEFAULT_REQUEST_INTERVAL, DEFAULT_RETRY_AFTER};
use crate::endpoint::{is_non_cdn_endpoint, resolve_endpoint};
use crate::error::{error_from_response, ApiFailure, Endpoint, PrismicError};
use crate::http::{HttpClient, HttpRequest, ReqwestHttpClient, RequestOptions};
use crate::query::{search_url, Query, QueryParams};
use crate::refs::{RefResolver, RefSelection, RefSource, RequestLike};
use crate::repository::{MetadataCache, Ref, Repository, DEFAULT_METADATA_TTL};
use crate::retry::{Attempt, InvalidRefRetry};
use crate::throttle::ThrottledLog;

/// Client options. Everything has a default; the transport defaults to reqwest.
#[derive(Clone)]
pub struct ClientConfig {
    pub access_token: Option<String>,
    /// Initial manual ref. `None` reads the latest published content.
    pub reference: Option<RefSource>,
    /// API parameters added to every query unless the query sets them.
    pub default_params: BTreeMap<String, String>,
    /// Headers sent with every request unless the call sets them.
    pub default_headers: BTreeMap<String, String>,
    pub http_client: Option<Arc<dyn HttpClient>>,
    pub request_interval: Duration,
    pub metadata_ttl: Duration,
    pub retry_after_fallback: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            access_token: None,
            reference: None,
            default_params: BTreeMap::new(),
            default_headers: BTreeMap::new(),
            http_client: None,
            request_interval: DEFAULT_REQUEST_INTERVAL,
            metadata_ttl: DEFAULT_METADATA_TTL,
            retry_after_fallback: DEFAULT_RETRY_AFTER,
        }
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .field("reference", &self.reference)
            .field("default_params", &self.default_params)
            .field("default_headers", &self.default_headers)
            .field("custom_http_client", &self.http_client.is_some())
            .field("request_interval", &self.request_interval)
            .field("metadata_ttl", &self.metadata_ttl)
            .field("retry_after_fallback", &self.retry_after_fallback)
            .finish()
    }
}

impl ClientConfig {
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    pub fn with_ref(mut self, reference: impl Into<RefSource>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn with_default_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_params.insert(name.into(), value.into());
        self
    }

    pub fn with_default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.insert(name.into(), value.into());
        self
    }

    pub fn with_http_client(mut self, http_client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(http_client);
        self
    }

    pub fn with_request_interval(mut self, interval: Duration) -> Self {
        self.request_interval = interval;
        self
    }

    pub fn with_metadata_ttl(mut self, ttl: Duration) -> Self {
        self.metadata_ttl = ttl;
        self
    }

    pub fn with_retry_after_fallback(mut self, delay: Duration) -> Self {
        self.retry_after_fallback = delay;
        self
    }

    /// Applies loaded settings over `self`. Unset settings keep the current values.
    pub fn apply_settings(mut self, settings: &ClientSettings) -> Self {
        if let Some(token) = &settings.access_token {
            self.access_token = Some(token.clone());
        }
        if let Some(reference) = &settings.pinned_ref {
            self.reference = Some(RefSource::Literal(reference.clone()));
        }
        if let Some(interval) = settings.request_interval {
            self.request_interval = interval;
        }
        if let Some(ttl) = settings.metadata_ttl {
            self.metadata_ttl = ttl;
        }
        self
    }
}

/// Client for one repository's document API.
///
/// All state (flights, hostname queues, the metadata cache, ref selection, warning throttle)
/// belongs to this instance.
pub struct Client {
    endpoint: String,
    access_token: Option<String>,
    default_params: BTreeMap<String, String>,
    default_headers: BTreeMap<String, String>,
    dispatcher: Dispatcher,
    metadata: Arc<MetadataCache>,
    refs: RefResolver,
    warnings: ThrottledLog,
}

impl Client {
    /// `name_or_endpoint` is a repository name (`my-repo`) or a full API endpoint.
    pub fn new(name_or_endpoint: &str, config: ClientConfig) -> Result<Self, PrismicError> {
        let endpoint = resolve_endpoint(name_or_endpoint)?;
        let warnings = ThrottledLog::default();
        if is_non_cdn_endpoint(&endpoint) {
            warnings.warn(&format!(
                "The client was created with a non-CDN endpoint ({endpoint}). Convert it to the CDN endpoint for better performance."
            ));
        }

        let http_client = config
            .http_client
            .unwrap_or_else(|| Arc::new(ReqwestHttpClient::new()));
        let dispatcher = Dispatcher::new(http_client)
            .with_interval(config.request_interval)
            .with_retry_after_fallback(config.retry_after_fallback);

        let metadata_url = metadata_url(&endpoint, config.access_token.as_deref())?;
        let metadata = Arc::new(MetadataCache::new(
            dispatcher.clone(),
            metadata_url,
            config.metadata_ttl,
        ));
        let selection = config
            .reference
            .map(RefSelection::Manual)
            .unwrap_or_default();

        Ok(Self {
            endpoint,
            access_token: config.access_token,
            default_params: config.default_params,
            default_headers: config.default_headers,
            refs: RefResolver::new(Arc::clone(&metadata), selection),
            dispatcher,
            metadata,
            warnings,
        })
    }

    /// Builds a client from loaded settings; the repository setting is required.
    pub fn from_settings(settings: &ClientSettings, config: ClientConfig) -> Result<Self, PrismicError> {
        let repository = settings.repository.as_deref().ok_or_else(|| {
            PrismicError::Config(format!("{} is not set", env_config::ENV_REPOSITORY))
        })?;
        Self::new(repository, config.apply_settings(settings))
    }

    /// Loads settings for `app_name` (env > `.env` > XDG config) and builds a client.
    pub fn from_env(app_name: &str, override_dir: Option<&Path>) -> Result<Self, PrismicError> {
        let settings = env_config::load_settings(app_name, override_dir)
            .map_err(|e| PrismicError::Config(e.to_string()))?;
        Self::from_settings(&settings, ClientConfig::default())
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// The dispatcher behind this client, for raw or body-bearing requests.
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    fn options(&self, options: &RequestOptions) -> RequestOptions {
        options.merged_over(&self.default_headers)
    }

    pub async fn get_repository(&self, options: &RequestOptions) -> Result<Arc<Repository>, PrismicError> {
        self.metadata.get(&self.options(options)).await
    }

    pub async fn get_refs(&self, options: &RequestOptions) -> Result<Vec<Ref>, PrismicError> {
        Ok(self.get_repository(options).await?.refs.clone())
    }

    pub async fn get_ref_by_id(&self, id: &str, options: &RequestOptions) -> Result<Ref, PrismicError> {
        self.get_repository(options)
            .await?
            .ref_by_id(id)
            .cloned()
            .ok_or_else(|| {
                PrismicError::RefNotFound(ApiFailure::local(format!(
                    "Ref with ID \"{id}\" could not be found."
                )))
            })
    }

    pub async fn get_ref_by_label(&self, label: &str, options: &RequestOptions) -> Result<Ref, PrismicError> {
        self.get_repository(options)
            .await?
            .ref_by_label(label)
            .cloned()
            .ok_or_else(|| {
                PrismicError::RefNotFound(ApiFailure::local(format!(
                    "Ref with label \"{label}\" could not be found."
                )))
            })
    }

    pub async fn get_master_ref(&self, options: &RequestOptions) -> Result<Ref, PrismicError> {
        self.get_repository(options)
            .await?
            .master_ref()
            .cloned()
            .ok_or_else(|| {
                PrismicError::Other(ApiFailure::local(
                    "Invalid repository response: master ref could not be found",
                ))
            })
    }

    /// Every non-master ref.
    pub async fn get_releases(&self, options: &RequestOptions) -> Result<Vec<Ref>, PrismicError> {
        Ok(self.get_repository(options).await?.releases().cloned().collect())
    }

    pub async fn get_release_by_id(&self, id: &str, options: &RequestOptions) -> Result<Ref, PrismicError> {
        self.get_repository(options)
            .await?
            .release_by_id(id)
            .cloned()
            .ok_or_else(|| {
                PrismicError::ReleaseNotFound(ApiFailure::local(format!(
                    "Release with ID \"{id}\" could not be found."
                )))
            })
    }

    pub async fn get_release_by_label(&self, label: &str, options: &RequestOptions) -> Result<Ref, PrismicError> {
        self.get_repository(options)
            .await?
            .release_by_label(label)
            .cloned()
            .ok_or_else(|| {
                PrismicError::ReleaseNotFound(ApiFailure::local(format!(
                    "Release with label \"{label}\" could not be found."
                )))
            })
    }

    pub async fn get_tags(&self, options: &RequestOptions) -> Result<Vec<String>, PrismicError> {
        Ok(self.get_repository(options).await?.tags.clone())
    }

    pub fn query_latest_content(&self) {
        self.refs.select(RefSelection::LatestPublished);
    }

    pub fn query_content_from_release_by_id(&self, id: impl Into<String>) {
        self.refs.select(RefSelection::ReleaseById(id.into()));
    }

    pub fn query_content_from_release_by_label(&self, label: impl Into<String>) {
        self.refs.select(RefSelection::ReleaseByLabel(label.into()));
    }

    pub fn query_content_from_ref(&self, reference: impl Into<RefSource>) {
        self.refs.select(RefSelection::Manual(reference.into()));
    }

    pub fn enable_auto_previews(&self) {
        self.refs.enable_auto_previews();
    }

    /// Enables auto-previews, reading the preview cookie from `req` on every query.
    pub fn enable_auto_previews_from_req(&self, req: impl RequestLike + 'static) {
        self.refs.enable_auto_previews_from(Arc::new(req));
    }

    pub fn disable_auto_previews(&self) {
        self.refs.disable_auto_previews();
    }

    /// The ref the next query would read.
    pub async fn resolve_ref(&self, options: &RequestOptions) -> Result<String, PrismicError> {
        self.refs.resolve(&self.options(options)).await
    }

    /// The search URL `params` would be sent to, with its ref resolved.
    pub async fn build_query_url(&self, params: &QueryParams) -> Result<String, PrismicError> {
        let reference = match &params.reference {
            Some(reference) => reference.clone(),
            None => self.resolve_ref(&params.options).await?,
        };
        self.build_query_url_for(&reference, params).await
    }

    async fn build_query_url_for(&self, reference: &str, params: &QueryParams) -> Result<String, PrismicError> {
        let mut params = params.clone();
        if params.integration_fields_ref.is_none() {
            params.integration_fields_ref = self
                .get_repository(&params.options)
                .await?
                .integration_fields_ref
                .clone();
        }
        if params.access_token.is_none() {
            params.access_token = self.access_token.clone();
        }
        search_url(&self.endpoint, reference, &params, &self.default_params)
    }

    /// Runs a search query.
    ///
    /// A ref the API reports as invalid or expired is replaced by the master ref from the
    /// error message and the query is re-issued, up to three attempts in total. The metadata
    /// cache is invalidated first unless the query pinned its ref.
    pub async fn get(&self, params: QueryParams) -> Result<Query, PrismicError> {
        let mut params = params;
        let mut retry = InvalidRefRetry::new();
        loop {
            let reference = match &params.reference {
                Some(reference) => reference.clone(),
                None => self.resolve_ref(&params.options).await?,
            };
            let url = self.build_query_url_for(&reference, &params).await?;
            let err = match self.fetch_json(&url, &params.options).await {
                Ok(json) => return parse_query(&url, json),
                Err(err) => err,
            };
            match retry.next(&err) {
                Attempt::GiveUp => return Err(err),
                Attempt::Retry { master_ref, issue } => {
                    if params.reference.is_none() {
                        self.metadata.invalidate().await;
                    }
                    self.warnings.warn(&format!(
                        "The ref ({reference}) was {issue}. Now retrying with the latest master ref ({master_ref}). If you were previewing content, the response will not include draft content."
                    ));
                    params.reference = Some(master_ref);
                }
            }
        }
    }

    /// The first document matching `params`. Asks for one result per page unless paging is set.
    pub async fn get_first(&self, params: QueryParams) -> Result<Value, PrismicError> {
        let mut params = params;
        if params.page.is_none()
            && params.page_size.is_none()
            && !self.default_params.contains_key("pageSize")
        {
            params.page_size = Some(1);
        }
        let query = self.get(params).await?;
        query.results.into_iter().next().ok_or_else(|| {
            PrismicError::NotFound(ApiFailure::local("No documents were returned"))
        })
    }

    async fn fetch_json(&self, url: &str, options: &RequestOptions) -> Result<Value, PrismicError> {
        let request = HttpRequest::get(url)
            .with_header("accept", "application/json")
            .with_options(&self.options(options));
        let res = self.dispatcher.dispatch(request).await?;
        if !res.is_success() {
            return Err(error_from_response(url, &res, Endpoint::Documents));
        }
        res.json
            .clone()
            .ok_or_else(|| PrismicError::other("response is not valid JSON", url, None))
    }
}

fn parse_query(url: &str, json: Value) -> Result<Query, PrismicError> {
    serde_json::from_value(json.clone()).map_err(|e| {
        PrismicError::other(format!("unexpected query response shape: {e}"), url, Some(json))
    })
}

fn metadata_url(endpoint: &str, access_token: Option<&str>) -> Result<String, PrismicError> {
    let mut url = Url::parse(endpoint)
        .map_err(|e| PrismicError::Config(format!("invalid endpoint {endpoint}: {e}")))?;
    if let Some(token) = access_token {
        url.query_pairs_mut().append_pair("access_token", token);
    }
    Ok(url.into())
}
