//! Document loading for form schemas, UI schemas and initial data
//!
//! A [`Source::Location`] is a path relative to the config file or an
//! `http(s)` URL, parsed by extension (JSON when there is none). All locations
//! of one config are fetched concurrently, each distinct location once.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::try_join_all;
use indexmap::IndexMap;
use serde_json::Value;
use tracing::{debug, instrument};
use url::Url;

use crate::config::{Config, DocumentFormat, Source};
use crate::error::{Result, UrlformsError};
use crate::props::ResolvedForm;

/// Default timeout for HTTP requests (30 seconds)
const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

#[async_trait]
pub trait DocumentLoader: Send + Sync {
    /// Fetch and parse the document at `location`
    async fn load(&self, location: &str) -> Result<Value>;
}

/// Filesystem and HTTP loader
pub struct LocationLoader {
    base_dir: PathBuf,
    client: reqwest::Client,
}

impl LocationLoader {
    pub fn new(base_dir: impl Into<PathBuf>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .connect_timeout(Duration::from_secs(10))
            .redirect(reqwest::redirect::Policy::limited(5))
            .user_agent(concat!("urlforms/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| UrlformsError::Fetch {
                location: "<http client>".to_string(),
                details: e.to_string(),
            })?;
        Ok(Self {
            base_dir: base_dir.into(),
            client,
        })
    }

    /// Loader resolving paths next to `config_path`
    pub fn for_config(config_path: &Path) -> Result<Self> {
        let base = config_path.parent().map(Path::to_path_buf).unwrap_or_default();
        Self::new(base)
    }

    async fn fetch_text(&self, location: &str) -> Result<String> {
        let fetch_err = |details: String| UrlformsError::Fetch {
            location: location.to_string(),
            details,
        };

        match Url::parse(location) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {
                let response = self
                    .client
                    .get(url)
                    .send()
                    .await
                    .and_then(reqwest::Response::error_for_status)
                    .map_err(|e| fetch_err(e.to_string()))?;
                response.text().await.map_err(|e| fetch_err(e.to_string()))
            }
            Ok(url) if url.scheme() == "file" => {
                let path = url
                    .to_file_path()
                    .map_err(|_| fetch_err("not a local file URL".to_string()))?;
                read_file(&path).await.map_err(fetch_err)
            }
            // single-letter schemes are Windows drive letters
            Ok(url) if url.scheme().len() > 1 => Err(fetch_err(format!("unsupported scheme '{}'", url.scheme()))),
            _ => read_file(&self.base_dir.join(location)).await.map_err(fetch_err),
        }
    }
}

async fn read_file(path: &Path) -> std::result::Result<String, String> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|e| format!("{}: {e}", path.display()))
}

/// Format from the location's extension, ignoring any query or fragment
fn format_of(location: &str) -> DocumentFormat {
    let path = location.split(['?', '#']).next().unwrap_or(location);
    DocumentFormat::from_path(path).unwrap_or(DocumentFormat::Json)
}

#[async_trait]
impl DocumentLoader for LocationLoader {
    #[instrument(skip(self))]
    async fn load(&self, location: &str) -> Result<Value> {
        let text = self.fetch_text(location).await?;
        let value = format_of(location)
            .parse(&text)
            .map_err(|details| UrlformsError::DocumentParse {
                location: location.to_string(),
                details,
            })?;
        debug!(bytes = text.len(), "document loaded");
        Ok(value)
    }
}

/// Resolve every form's schema, UI schema and initial data
pub async fn resolve_forms(config: &Config, loader: &dyn DocumentLoader) -> Result<IndexMap<String, ResolvedForm>> {
    let sources = |spec: &crate::config::FormSpec| [spec.schema.clone(), spec.ui_schema.clone(), spec.form_data.clone()];

    let mut seen = HashSet::new();
    let locations: Vec<String> = config
        .forms
        .values()
        .flat_map(sources)
        .flatten()
        .filter_map(|source| match source {
            Source::Location(location) => Some(location),
            Source::Inline(_) => None,
        })
        .filter(|location| seen.insert(location.clone()))
        .collect();

    debug!(count = locations.len(), "fetching form documents");
    let loaded = try_join_all(locations.iter().map(|location| async move {
        let value = loader.load(location).await?;
        Ok::<_, UrlformsError>((location.clone(), value))
    }))
    .await?;
    let loaded: HashMap<String, Value> = loaded.into_iter().collect();

    let resolve = |source: &Option<Source>| -> Option<Value> {
        match source.as_ref()? {
            Source::Inline(value) => Some(value.clone()),
            Source::Location(location) => loaded.get(location).cloned(),
        }
    };

    Ok(config
        .forms
        .iter()
        .map(|(key, spec)| {
            let resolved = ResolvedForm {
                schema: resolve(&spec.schema),
                ui_schema: resolve(&spec.ui_schema),
                form_data: resolve(&spec.form_data),
            };
            (key.clone(), resolved)
        })
        .collect())
}
