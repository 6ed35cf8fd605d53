//! Scoped resource guards.
//!
//! A guard owns the release of one remote resource. Release happens
//! exactly once: explicitly through [`Guard::release`], or from `Drop` when
//! the owning scope unwinds or its future is cancelled. Guards nest
//! naturally; inner scopes finish, and release, before outer ones.

use crate::error::{Error, ResourceKind, Result};
use async_trait::async_trait;
use std::future::Future;

/// A remote resource with a matching release call.
#[async_trait]
pub trait Releasable: Clone + Send + Sync + 'static {
    /// Kind and id, for logging.
    fn resource(&self) -> (ResourceKind, String);

    /// Delete or close the resource.
    async fn release(&self) -> Result<()>;
}

/// Releases its resource when dropped, unless released explicitly first.
pub struct Guard<R: Releasable> {
    resource: Option<R>,
}

impl<R: Releasable> Guard<R> {
    pub fn new(resource: R) -> Self {
        Self {
            resource: Some(resource),
        }
    }

    /// The guarded resource, until it has been released.
    pub fn get(&self) -> Option<&R> {
        self.resource.as_ref()
    }

    /// Release now.
    ///
    /// The call runs on its own task, so cancelling the awaiting future
    /// leaves it to finish in the background instead of aborting it.
    pub async fn release(mut self) -> Result<()> {
        let Some(resource) = self.resource.take() else {
            return Ok(());
        };
        let (kind, id) = resource.resource();
        tokio::spawn(async move { release_once(&resource).await })
            .await
            .unwrap_or_else(|e| Err(Error::transport(format!("release of {kind} {id} aborted: {e}"))))
    }

    /// Give up ownership without releasing.
    pub fn disarm(mut self) -> Option<R> {
        self.resource.take()
    }
}

impl<R: Releasable> Drop for Guard<R> {
    fn drop(&mut self) {
        let Some(resource) = self.resource.take() else {
            return;
        };
        let (kind, id) = resource.resource();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                tracing::debug!(kind = %kind, id = %id, "Releasing abandoned resource in background");
                handle.spawn(async move {
                    if let Err(e) = release_once(&resource).await {
                        tracing::warn!(kind = %kind, id = %id, error = %e, "Background release failed");
                    }
                });
            }
            Err(_) => {
                tracing::warn!(kind = %kind, id = %id, "No async runtime to release resource; it leaks");
            }
        }
    }
}

/// Release, treating an already-missing resource as released.
async fn release_once<R: Releasable>(resource: &R) -> Result<()> {
    match resource.release().await {
        Err(e) if e.is_not_found() => {
            let (kind, id) = resource.resource();
            tracing::debug!(kind = %kind, id = %id, "Resource already released");
            Ok(())
        }
        other => other,
    }
}

/// Run `body` with `resource`, then release it.
pub(crate) async fn scoped<R, T, E, F, Fut>(resource: R, body: F) -> std::result::Result<T, E>
where
    R: Releasable,
    E: From<Error>,
    F: FnOnce(R) -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
{
    let guard = Guard::new(resource.clone());
    let outcome = body(resource.clone()).await;
    let cleanup = guard.release().await;
    settle(resource.resource(), outcome, cleanup)
}

/// Combine a body outcome with the cleanup outcome. The body's error wins.
pub(crate) fn settle<T, E: From<Error>>(
    (kind, id): (ResourceKind, String),
    outcome: std::result::Result<T, E>,
    cleanup: Result<()>,
) -> std::result::Result<T, E> {
    match (outcome, cleanup) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(e)) => {
            tracing::warn!(kind = %kind, id = %id, error = %e, "Release failed");
            Err(e.into())
        }
        (Err(primary), Err(e)) => {
            tracing::warn!(kind = %kind, id = %id, error = %e, "Release failed after scope error");
            Err(primary)
        }
        (Err(primary), Ok(())) => Err(primary),
    }
}
