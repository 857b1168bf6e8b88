//! Lazily constructed, resettable provider slot.
//!
//! The composition root owns one [`ProviderHandle`] and passes it to whatever
//! serves requests. The provider is built on first use from the handle's
//! configuration and shared afterwards.

use std::sync::{Arc, RwLock};

use super::provider::{check_connection, ConnectionReport, DebateProvider, OpenAiDebateProvider, OPENAI_PROVIDER_NAME};
use crate::config::AppConfig;
use crate::error::ProviderError;

type ProviderFactory =
    Box<dyn Fn(&AppConfig) -> Result<Arc<dyn DebateProvider>, ProviderError> + Send + Sync>;

/// Owner of the process's debate provider.
///
/// `reset` is meant for configuration reloads and tests. Requests already
/// holding the previous provider keep using it until they finish.
pub struct ProviderHandle {
    config: AppConfig,
    factory: ProviderFactory,
    slot: RwLock<Option<Arc<dyn DebateProvider>>>,
}

impl std::fmt::Debug for ProviderHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderHandle")
            .field("initialized", &self.is_initialized())
            .finish_non_exhaustive()
    }
}

impl ProviderHandle {
    /// A handle that builds an [`OpenAiDebateProvider`] from `config`.
    pub fn new(config: AppConfig) -> Self {
        Self::with_factory(config, |config| {
            let provider = OpenAiDebateProvider::from_config(&config.provider, &config.debate)?;
            Ok(Arc::new(provider) as Arc<dyn DebateProvider>)
        })
    }

    /// A handle with a custom constructor.
    pub fn with_factory<F>(config: AppConfig, factory: F) -> Self
    where
        F: Fn(&AppConfig) -> Result<Arc<dyn DebateProvider>, ProviderError> + Send + Sync + 'static,
    {
        Self {
            config,
            factory: Box::new(factory),
            slot: RwLock::new(None),
        }
    }

    /// A handle that always hands out `provider`, even after `reset`.
    pub fn fixed(config: AppConfig, provider: Arc<dyn DebateProvider>) -> Self {
        Self::with_factory(config, move |_| Ok(Arc::clone(&provider)))
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Returns the provider, constructing it on first use.
    ///
    /// A failed construction leaves the slot empty so the next call retries.
    pub fn get(&self) -> Result<Arc<dyn DebateProvider>, ProviderError> {
        if let Some(provider) = self.read_slot().as_ref() {
            return Ok(Arc::clone(provider));
        }

        let mut slot = self.slot.write().unwrap_or_else(|e| e.into_inner());
        if let Some(provider) = slot.as_ref() {
            return Ok(Arc::clone(provider));
        }

        let provider = (self.factory)(&self.config)?;
        *slot = Some(Arc::clone(&provider));
        Ok(provider)
    }

    /// Drops the current provider; the next `get` builds a new one.
    pub fn reset(&self) {
        let mut slot = self.slot.write().unwrap_or_else(|e| e.into_inner());
        if slot.take().is_some() {
            tracing::debug!("Debate provider reset");
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.read_slot().is_some()
    }

    /// Smoke-tests the provider, reporting construction failures too.
    pub async fn check_connection(&self) -> ConnectionReport {
        match self.get() {
            Ok(provider) => check_connection(provider.as_ref()).await,
            Err(err) => ConnectionReport::unavailable(OPENAI_PROVIDER_NAME, &err),
        }
    }

    fn read_slot(&self) -> std::sync::RwLockReadGuard<'_, Option<Arc<dyn DebateProvider>>> {
        self.slot.read().unwrap_or_else(|e| e.into_inner())
    }
}
