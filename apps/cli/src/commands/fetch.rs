//! Fetch command implementation.

use anyhow::Context;
use lumen_resources::{
    BinderPhase, LocalHandle, ResourceBinder, ResourceCache, ResourceView, StaticCredentials, default_config_path, load_config,
};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// Environment variable consulted when no `--token` is given.
pub const TOKEN_ENV: &str = "LUMEN_TOKEN";

/// Options for the fetch command.
#[derive(Debug)]
pub struct FetchOptions {
    pub locators: Vec<String>,
    pub token: Option<String>,
    pub base_url: Option<String>,
    pub config: Option<PathBuf>,
    pub data_url: bool,
}

/// What one consumer saw, as printed.
#[derive(Debug, Serialize)]
struct FetchReport<'a> {
    locator: &'a str,
    key: Option<String>,
    status: BinderPhase,
    content_type: Option<String>,
    bytes: Option<usize>,
    handle_id: Option<u64>,
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data_url: Option<String>,
}

impl<'a> FetchReport<'a> {
    fn new(locator: &'a str, binder: &ResourceBinder, view: &ResourceView, with_data_url: bool) -> Self {
        let handle = view.handle.as_ref();
        Self {
            locator,
            key: binder.requested_key().map(|key| key.to_string()),
            status: binder.phase(),
            content_type: handle.map(|handle| handle.content_type().to_string()),
            bytes: handle.map(LocalHandle::len),
            handle_id: handle.map(LocalHandle::id),
            error: view.error.as_ref().map(ToString::to_string),
            data_url: if with_data_url {
                handle.and_then(LocalHandle::to_data_url)
            } else {
                None
            },
        }
    }
}

/// Execute the fetch command.
///
/// All locators are bound before any result is awaited, so locators naming
/// the same resource share one transfer.
pub async fn execute(options: FetchOptions) -> anyhow::Result<()> {
    let config_path = match options.config {
        Some(path) => path,
        None => default_config_path(&std::env::current_dir()?),
    };
    let mut config =
        load_config(&config_path).with_context(|| format!("Failed to load {}", config_path.display()))?;
    if let Some(base_url) = options.base_url {
        config.base_url = base_url;
    }

    let token = options
        .token
        .or_else(|| std::env::var(TOKEN_ENV).ok())
        .filter(|token| !token.trim().is_empty());
    let credentials = match token {
        Some(token) => StaticCredentials::new(token),
        None => {
            debug!("No access token supplied");
            StaticCredentials::anonymous()
        }
    };

    let cache = ResourceCache::from_config(&config, Arc::new(credentials))?;

    let binders: Vec<(&str, ResourceBinder)> = options
        .locators
        .iter()
        .map(|locator| {
            let binder = cache.bind();
            binder.observe(Some(locator));
            (locator.as_str(), binder)
        })
        .collect();

    let mut failed = 0;
    for (locator, binder) in &binders {
        let view = binder.settled().await;
        if binder.phase() != BinderPhase::Ready {
            failed += 1;
        }
        let report = FetchReport::new(locator, binder, &view, options.data_url);
        println!("{}", serde_json::to_string(&report)?);
    }

    let stats = cache.stats();
    info!(
        transfers = cache.coordinator().flights_started(),
        entries = stats.entries,
        hits = stats.hits,
        "Fetch complete"
    );

    if failed > 0 {
        anyhow::bail!("{} of {} resources failed", failed, binders.len());
    }
    Ok(())
}
