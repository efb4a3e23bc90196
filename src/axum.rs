//! Axum integration utilities.
//!
//! [`RequirePermissionLayer`] gates a route on one permission over one
//! entity. Authentication is up to the application: some earlier layer must
//! insert an [`AuthContext`] into the request extensions.

use std::future::poll_fn;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use crate::cache::Cache;
use crate::engine::{Decision, Engine};
use crate::error::Error;
use crate::permission::PermissionKey;
use crate::store::{AssignmentRepository, HierarchySource};
use crate::types::{EntityRef, PrincipalId};

use ::axum::body::Body;
use ::axum::http::{Request, StatusCode};
use ::axum::response::{IntoResponse, Response};
use ::tower::{Layer, Service};

/// Authenticated caller of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    /// Principal identifier.
    pub principal: PrincipalId,
}

impl AuthContext {
    /// Creates a context for `principal`.
    pub fn new(principal: PrincipalId) -> Self {
        Self { principal }
    }
}

type EntityResolver = Arc<dyn Fn(&Request<Body>) -> Option<EntityRef> + Send + Sync>;

/// Middleware layer that requires a permission on the entity a request targets.
pub struct RequirePermissionLayer<R, H, C> {
    engine: Arc<Engine<R, H, C>>,
    permission: PermissionKey,
    resolve: EntityResolver,
}

impl<R, H, C> Clone for RequirePermissionLayer<R, H, C> {
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
            permission: self.permission.clone(),
            resolve: Arc::clone(&self.resolve),
        }
    }
}

impl<R, H, C> RequirePermissionLayer<R, H, C> {
    /// Creates a layer that finds the target entity with `resolve`.
    ///
    /// Requests for which `resolve` returns `None` are rejected.
    pub fn new<F>(engine: Arc<Engine<R, H, C>>, permission: PermissionKey, resolve: F) -> Self
    where
        F: Fn(&Request<Body>) -> Option<EntityRef> + Send + Sync + 'static,
    {
        Self {
            engine,
            permission,
            resolve: Arc::new(resolve),
        }
    }

    /// Creates a layer that always checks against `entity`.
    pub fn for_entity(
        engine: Arc<Engine<R, H, C>>,
        permission: PermissionKey,
        entity: EntityRef,
    ) -> Self {
        Self::new(engine, permission, move |_| Some(entity.clone()))
    }
}

impl<R, H, C, Inner> Layer<Inner> for RequirePermissionLayer<R, H, C> {
    type Service = RequirePermissionService<Inner, R, H, C>;

    fn layer(&self, inner: Inner) -> Self::Service {
        RequirePermissionService {
            inner,
            gate: self.clone(),
        }
    }
}

/// Middleware service that enforces a permission check.
pub struct RequirePermissionService<Inner, R, H, C> {
    inner: Inner,
    gate: RequirePermissionLayer<R, H, C>,
}

impl<Inner: Clone, R, H, C> Clone for RequirePermissionService<Inner, R, H, C> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            gate: self.gate.clone(),
        }
    }
}

impl<Inner, R, H, C> Service<Request<Body>> for RequirePermissionService<Inner, R, H, C>
where
    Inner: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    Inner::Future: Send + 'static,
    R: AssignmentRepository + 'static,
    H: HierarchySource + 'static,
    C: Cache + 'static,
{
    type Response = Response;
    type Error = Inner::Error;
    type Future = Pin<Box<dyn std::future::Future<Output = Result<Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let mut inner = self.inner.clone();
        let gate = self.gate.clone();

        Box::pin(async move {
            let context = req.extensions().get::<AuthContext>().cloned();
            let Some(context) = context else {
                return Ok((StatusCode::UNAUTHORIZED, "missing auth context").into_response());
            };
            let Some(entity) = (gate.resolve)(&req) else {
                return Ok((StatusCode::FORBIDDEN, "forbidden").into_response());
            };

            match gate
                .engine
                .check(&context.principal, &entity, &gate.permission)
                .await
            {
                Ok(Decision::Allow) => {
                    poll_fn(|cx| inner.poll_ready(cx)).await?;
                    inner.call(req).await
                }
                Ok(Decision::Deny) => Ok((StatusCode::FORBIDDEN, "forbidden").into_response()),
                Err(err @ Error::DependencyUnavailable { .. }) => {
                    tracing::warn!(error = %err, %entity, "authorization dependency unavailable");
                    Ok((StatusCode::SERVICE_UNAVAILABLE, "authorization unavailable").into_response())
                }
                Err(err) => {
                    tracing::error!(
                        error = %err,
                        permission = %gate.permission,
                        "authorization misconfigured"
                    );
                    Ok((StatusCode::INTERNAL_SERVER_ERROR, "auth error").into_response())
                }
            }
        })
    }
}
