use http::StatusCode;
use tracing::warn;

use crate::auth::PermissionKey;
use crate::context::RequestContext;
use crate::error::Error;
use crate::middleware::{Middleware, Outcome};

/// Requires the current user to hold `key` in the current tenant.
///
/// Denial is a 403 rendered in place. A resolver failure is returned as an
/// error for the dispatcher to turn into a 500.
pub struct RequirePermission {
    key: PermissionKey,
}

impl RequirePermission {
    pub fn new(key: PermissionKey) -> Self {
        Self { key }
    }

    pub fn key(&self) -> &PermissionKey { &self.key }
}

impl Middleware for RequirePermission {
    fn name(&self) -> &'static str { "permission" }

    fn execute(&self, ctx: &mut RequestContext) -> Result<Outcome, Error> {
        let gate = ctx.auth();
        if gate.has_permission(&self.key)? {
            return Ok(Outcome::Continue);
        }

        let user = gate.user_id().map_or_else(|| "-".to_owned(), |u| u.to_string());
        let tenant = gate.tenant_id().map_or_else(|| "-".to_owned(), |t| t.to_string());
        warn!(
            permission = %self.key,
            user_id = %user,
            tenant_id = %tenant,
            path = ctx.path(),
            "permission denied",
        );
        Ok(Outcome::Terminal(ctx.respond(
            StatusCode::FORBIDDEN,
            "You do not have permission to perform this action.",
        )))
    }
}
