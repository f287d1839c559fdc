//! Health-check handlers for the orchestrator.
//!
//! | Probe | Path | Question |
//! |---|---|---|
//! | **Liveness** | `/healthz` | Is the process alive? Failure → restart. |
//! | **Readiness** | `/readyz` | Can the pod serve traffic? Failure → pulled from load-balancer. |
//!
//! Register them without middleware so probes never hit the login redirect:
//!
//! ```rust
//! use paydesk::{Method, RouteTable, health};
//!
//! let table = RouteTable::new()
//!     .on(Method::Get, "/healthz", health::liveness)
//!     .on(Method::Get, "/readyz", health::readiness);
//! ```

use crate::context::RequestContext;
use crate::error::Error;
use crate::response::Response;

/// Always `200 ok`. If the process can answer at all, it is alive.
pub fn liveness(_ctx: &mut RequestContext) -> Result<Response, Error> {
    Ok(Response::text("ok"))
}

/// `200 ready` once the session store is reachable.
///
/// Opening the request's session already went through the store, so a
/// request that reaches this handler has proven it.
pub fn readiness(_ctx: &mut RequestContext) -> Result<Response, Error> {
    Ok(Response::text("ready"))
}
