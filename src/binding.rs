//! Per-consumer resource bindings
//!
//! A [`ResourceBinding`] is one UI binding's view over the shared
//! [`DataCache`]: it fetches once on activation (when its parameters are
//! present), mirrors `data`/`loading`/`error` for its caller, and offers a
//! manual `refresh`. Tearing a binding down discards only its own mirror;
//! the shared store and every other consumer are untouched, so
//! re-activating the same binding later may be served straight from cache.

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::cache::{DataCache, FetchError, FetchOptions};
use crate::key::Params;

type ApiFn = Arc<dyn Fn(Params) -> BoxFuture<'static, Result<Value, FetchError>> + Send + Sync>;

/// One consumer's live view of a cached resource
///
/// `T` is the shape this consumer decodes the payload into; the shared
/// store keeps the raw payload, so different bindings of the same resource
/// may decode into different types.
pub struct ResourceBinding<T> {
    cache: DataCache,
    resource: String,
    api_fn: ApiFn,
    /// `None` means the binding's dependencies are not ready yet; no
    /// fetch is issued until parameters are supplied.
    params: Option<Params>,
    data: Option<T>,
    loading: bool,
    error: Option<FetchError>,
    activated: bool,
}

impl<T: DeserializeOwned> ResourceBinding<T> {
    /// Creates a binding for one resource
    ///
    /// # Arguments
    /// * `cache` - The shared cache (a clone; all clones share state)
    /// * `resource` - Logical resource name (e.g. "lab-reports")
    /// * `api_fn` - Injected transport call for this resource
    /// * `params` - Parameters for this binding, or `None` while the
    ///   values it depends on are still absent
    pub fn new<F, Fut>(
        cache: DataCache,
        resource: impl Into<String>,
        api_fn: F,
        params: Option<Params>,
    ) -> Self
    where
        F: Fn(Params) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, FetchError>> + Send + 'static,
    {
        Self {
            cache,
            resource: resource.into(),
            api_fn: Arc::new(move |p| api_fn(p).boxed()),
            params,
            data: None,
            loading: false,
            error: None,
            activated: false,
        }
    }

    /// First activation of the binding
    ///
    /// Fetches once if the parameters are present; later calls are no-ops
    /// until the binding is deactivated. A binding created without
    /// parameters activates without fetching.
    pub async fn activate(&mut self) -> Result<(), FetchError> {
        if self.activated {
            return Ok(());
        }
        self.activated = true;
        if self.params.is_none() {
            return Ok(());
        }
        self.fetch(false).await
    }

    /// Fetches through the shared cache, updating the local mirror
    ///
    /// With `force` the cache is bypassed and the entry overwritten on
    /// success. A failure sets the local `error` and is re-raised for the
    /// immediate caller to surface.
    pub async fn fetch(&mut self, force: bool) -> Result<(), FetchError> {
        let Some(params) = self.params.clone() else {
            return Ok(());
        };

        self.loading = true;
        self.error = None;

        let api_fn = Arc::clone(&self.api_fn);
        let result = self
            .cache
            .fetch_with_cache(
                &self.resource,
                move |p| api_fn(p),
                &params,
                FetchOptions {
                    force,
                    ..FetchOptions::default()
                },
            )
            .await;
        self.loading = false;

        match result {
            Ok(value) => match serde_json::from_value::<T>((*value).clone()) {
                Ok(decoded) => {
                    self.data = Some(decoded);
                    Ok(())
                }
                Err(err) => {
                    let err = FetchError::from(err);
                    self.error = Some(err.clone());
                    Err(err)
                }
            },
            Err(err) => {
                self.error = Some(err.clone());
                Err(err)
            }
        }
    }

    /// Forced re-fetch of this binding's resource
    pub async fn refresh(&mut self) -> Result<(), FetchError> {
        self.fetch(true).await
    }

    /// Supplies or withdraws the binding's parameters
    ///
    /// Does not fetch by itself; callers follow up with [`Self::fetch`]
    /// or re-activation as appropriate.
    pub fn set_params(&mut self, params: Option<Params>) {
        self.params = params;
    }

    /// The last successfully decoded payload, if any
    pub fn data(&self) -> Option<&T> {
        self.data.as_ref()
    }

    /// True while this binding has a fetch in progress
    pub fn loading(&self) -> bool {
        self.loading
    }

    /// The last fetch or decode failure, cleared by the next fetch
    pub fn error(&self) -> Option<&FetchError> {
        self.error.as_ref()
    }

    /// Tears the binding down
    ///
    /// Resets only this consumer's mirror; the shared cache keeps its
    /// entries, so a later re-activation may hit the cache.
    pub fn deactivate(&mut self) {
        self.data = None;
        self.loading = false;
        self.error = None;
        self.activated = false;
    }
}
