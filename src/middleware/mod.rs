//! Middleware layer.
//!
//! A route lists its middleware as spec strings (`"auth"`,
//! `"permission:config:manage_positions"`). At dispatch time each spec is
//! resolved through the [`MiddlewareRegistry`] into a [`Middleware`]
//! instance with its argument already bound, and the resulting [`Pipeline`]
//! runs them in declaration order:
//!
//! ```text
//! auth ──Continue──▶ csrf ──Continue──▶ permission ──Continue──▶ handler
//!   │                  │                    │
//!   ▼                  ▼                    ▼
//! 302 /login          403                  403        (Terminal: nothing after runs)
//! ```
//!
//! A middleware turns its own expected failures into [`Outcome::Terminal`].
//! Anything unexpected is returned as an [`Error`] and is not handled here:
//! it propagates to the dispatcher's top-level boundary.

mod auth;
mod csrf;
mod permission;

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use tracing::debug;

use crate::config::Config;
use crate::context::RequestContext;
use crate::error::Error;
use crate::response::Response;

pub use auth::{RedirectIfAuthenticated, RequireAuth};
pub use csrf::VerifyCsrf;
pub use permission::RequirePermission;

/// Result of one pipeline stage.
#[derive(Debug)]
pub enum Outcome {
    /// Proceed to the next stage.
    Continue,
    /// Stop here and send this response as-is.
    Terminal(Response),
}

/// One pipeline stage.
pub trait Middleware: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    fn execute(&self, ctx: &mut RequestContext) -> Result<Outcome, Error>;
}

// ── MiddlewareSpec ────────────────────────────────────────────────────────────

/// A middleware reference as written in the route table: a name and an
/// optional argument, separated by the first `:`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MiddlewareSpec {
    name: String,
    argument: Option<String>,
}

impl MiddlewareSpec {
    pub fn name(&self) -> &str { &self.name }
    pub fn argument(&self) -> Option<&str> { self.argument.as_deref() }
}

impl FromStr for MiddlewareSpec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, argument) = match s.split_once(':') {
            Some((name, arg)) => (name, Some(arg.to_owned())),
            None => (s, None),
        };
        if name.is_empty() {
            return Err(Error::UnknownMiddleware(s.to_owned()));
        }
        Ok(Self { name: name.to_owned(), argument })
    }
}

impl fmt::Display for MiddlewareSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.argument {
            Some(arg) => write!(f, "{}:{arg}", self.name),
            None => f.write_str(&self.name),
        }
    }
}

// ── Registry ──────────────────────────────────────────────────────────────────

type Factory = Box<dyn Fn(Option<&str>) -> Result<Arc<dyn Middleware>, Error> + Send + Sync>;

/// Maps middleware names to factories.
#[derive(Default)]
pub struct MiddlewareRegistry {
    factories: HashMap<String, Factory>,
}

impl MiddlewareRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in middleware:
    ///
    /// | Name | Argument | Middleware |
    /// |---|---|---|
    /// | `auth` | — | [`RequireAuth`] |
    /// | `guest` | — | [`RedirectIfAuthenticated`] |
    /// | `csrf` | — | [`VerifyCsrf`] |
    /// | `permission` | `resource:action` | [`RequirePermission`] |
    pub fn with_defaults(config: &Config) -> Self {
        let login_path = config.login_path.clone();
        let home_path = config.home_path.clone();
        Self::new()
            .register("auth", move |arg| {
                no_argument("auth", arg)?;
                Ok(Arc::new(RequireAuth::new(&login_path)) as Arc<dyn Middleware>)
            })
            .register("guest", move |arg| {
                no_argument("guest", arg)?;
                Ok(Arc::new(RedirectIfAuthenticated::new(&home_path)) as Arc<dyn Middleware>)
            })
            .register("csrf", |arg| {
                no_argument("csrf", arg)?;
                Ok(Arc::new(VerifyCsrf) as Arc<dyn Middleware>)
            })
            .register("permission", |arg| {
                let key = arg.ok_or_else(|| Error::MiddlewareArgument {
                    name: "permission".into(),
                    reason: "requires a `resource:action` argument".into(),
                })?;
                Ok(Arc::new(RequirePermission::new(key.parse()?)) as Arc<dyn Middleware>)
            })
    }

    /// Adds or replaces the factory for `name`.
    pub fn register<F>(mut self, name: &str, factory: F) -> Self
    where
        F: Fn(Option<&str>) -> Result<Arc<dyn Middleware>, Error> + Send + Sync + 'static,
    {
        self.factories.insert(name.to_owned(), Box::new(factory));
        self
    }

    pub fn resolve(&self, spec: &MiddlewareSpec) -> Result<Arc<dyn Middleware>, Error> {
        let factory = self.factories
            .get(spec.name())
            .ok_or_else(|| Error::UnknownMiddleware(spec.name().to_owned()))?;
        factory(spec.argument())
    }
}

fn no_argument(name: &str, arg: Option<&str>) -> Result<(), Error> {
    match arg {
        None => Ok(()),
        Some(arg) => Err(Error::MiddlewareArgument {
            name: name.to_owned(),
            reason: format!("takes no argument, got `{arg}`"),
        }),
    }
}

// ── Pipeline ──────────────────────────────────────────────────────────────────

/// An ordered list of resolved middleware for one request.
pub struct Pipeline {
    stages: Vec<Arc<dyn Middleware>>,
}

impl Pipeline {
    pub fn new(stages: Vec<Arc<dyn Middleware>>) -> Self {
        Self { stages }
    }

    /// Resolves every spec, preserving order.
    pub fn build(registry: &MiddlewareRegistry, specs: &[MiddlewareSpec]) -> Result<Self, Error> {
        let stages = specs.iter()
            .map(|spec| registry.resolve(spec))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(stages))
    }

    /// Runs stages in order until one is terminal.
    pub fn run(&self, ctx: &mut RequestContext) -> Result<Outcome, Error> {
        for stage in &self.stages {
            if let Outcome::Terminal(response) = stage.execute(ctx)? {
                debug!(
                    middleware = stage.name(),
                    status = response.status_code().as_u16(),
                    "pipeline halted",
                );
                return Ok(Outcome::Terminal(response));
            }
        }
        Ok(Outcome::Continue)
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}
