//! Handler type erasure.
//!
//! The router stores handlers of different concrete types side by side, so
//! each one is wrapped and stored as a trait object:
//!
//! ```text
//! fn edit(ctx: &mut RequestContext) -> Result<Response, Error>   ← user writes this
//!        ↓ table.route(Method::Get, "/positions/{id:digits}", [..], edit)
//! Arc::new(FnHandler(edit))                                      ← heap-allocated wrapper
//!        ↓ stored as BoxedHandler = Arc<dyn ErasedHandler>
//! handler.call(&mut ctx)  after the pipeline passes              ← one vtable dispatch
//! ```
//!
//! Handlers are synchronous. The server runs each request on a blocking
//! worker, so a handler may call into blocking collaborators directly.

use std::sync::Arc;

use crate::context::RequestContext;
use crate::error::Error;
use crate::response::{IntoResponse, Response};

pub(crate) trait ErasedHandler {
    fn call(&self, ctx: &mut RequestContext) -> Result<Response, Error>;
}

/// A type-erased handler shared across concurrent requests.
pub(crate) type BoxedHandler = Arc<dyn ErasedHandler + Send + Sync + 'static>;

/// Bridges a handler closure to [`ErasedHandler`].
struct FnHandler<F>(F);

impl<F> ErasedHandler for FnHandler<F>
where
    F: Fn(&mut RequestContext) -> Result<Response, Error> + Send + Sync,
{
    fn call(&self, ctx: &mut RequestContext) -> Result<Response, Error> {
        (self.0)(ctx)
    }
}

/// Erases `handler`, converting whatever it returns into a [`Response`].
pub(crate) fn boxed<F, R>(handler: F) -> BoxedHandler
where
    F: Fn(&mut RequestContext) -> Result<R, Error> + Send + Sync + 'static,
    R: IntoResponse,
{
    Arc::new(FnHandler(move |ctx: &mut RequestContext| {
        handler(ctx).map(IntoResponse::into_response)
    }))
}
