//! Route table compilation and request routing.
//!
//! Patterns are literal segments plus whole-segment placeholders:
//!
//! | Placeholder | Matches |
//! |---|---|
//! | `{id}` | any non-empty segment |
//! | `{id:digits}` | one or more ASCII digits |
//!
//! Every route is compiled once, at startup, into its own [`matchit`] tree.
//! Lookup walks a method's routes in declaration order and returns the first
//! whose tree matches and whose placeholder constraints all hold. A segment
//! that fails its constraint does not match; the lookup moves on and, if
//! nothing else matches, the request is a 404.

use std::collections::HashMap;

use matchit::Router as MatchitRouter;

use crate::context::RequestContext;
use crate::error::Error;
use crate::handler::{self, BoxedHandler};
use crate::method::Method;
use crate::middleware::MiddlewareSpec;
use crate::response::IntoResponse;

// ── RouteTable ────────────────────────────────────────────────────────────────

struct RouteDef {
    method: Method,
    pattern: String,
    middleware: Vec<String>,
    handler: BoxedHandler,
}

/// The declared, not yet compiled, route table. Order matters: earlier
/// routes win.
///
/// ```rust
/// # use paydesk::{Error, Method, RequestContext, RouteTable};
/// # fn dashboard(_: &mut RequestContext) -> Result<&'static str, Error> { Ok("") }
/// # fn edit(_: &mut RequestContext) -> Result<&'static str, Error> { Ok("") }
/// RouteTable::new()
///     .route(Method::Get, "/", ["auth"], dashboard)
///     .route(
///         Method::Get,
///         "/positions/update/{id:digits}",
///         ["auth", "csrf", "permission:config:manage_positions"],
///         edit,
///     );
/// ```
#[derive(Default)]
pub struct RouteTable {
    defs: Vec<RouteDef>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a route with no middleware.
    pub fn on<F, R>(self, method: Method, pattern: &str, handler: F) -> Self
    where
        F: Fn(&mut RequestContext) -> Result<R, Error> + Send + Sync + 'static,
        R: IntoResponse,
    {
        self.route(method, pattern, std::iter::empty::<&str>(), handler)
    }

    /// Register a route guarded by `middleware`, given as spec strings
    /// (`"auth"`, `"permission:config:manage_positions"`) in execution order.
    pub fn route<F, R, I, S>(mut self, method: Method, pattern: &str, middleware: I, handler: F) -> Self
    where
        F: Fn(&mut RequestContext) -> Result<R, Error> + Send + Sync + 'static,
        R: IntoResponse,
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.defs.push(RouteDef {
            method,
            pattern: pattern.to_owned(),
            middleware: middleware.into_iter().map(|s| s.as_ref().to_owned()).collect(),
            handler: handler::boxed(handler),
        });
        self
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }
}

// ── Pattern compilation ───────────────────────────────────────────────────────

/// What a placeholder segment accepts.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Constraint {
    Any,
    Digits,
}

impl Constraint {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "digits" => Some(Self::Digits),
            _ => None,
        }
    }

    pub fn accepts(self, segment: &str) -> bool {
        match self {
            Self::Any => !segment.is_empty(),
            Self::Digits => !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit()),
        }
    }
}

/// Splits `pattern` into the matchit path and its placeholder constraints.
fn compile_pattern(pattern: &str) -> Result<(String, Vec<(String, Constraint)>), Error> {
    let invalid = |reason: &str| Error::InvalidRoute {
        pattern: pattern.to_owned(),
        reason: reason.to_owned(),
    };

    if !pattern.starts_with('/') {
        return Err(invalid("must start with `/`"));
    }

    let mut path = String::with_capacity(pattern.len());
    let mut placeholders: Vec<(String, Constraint)> = Vec::new();

    for segment in pattern.split('/').skip(1) {
        path.push('/');
        let Some(inner) = segment.strip_prefix('{').and_then(|s| s.strip_suffix('}')) else {
            if segment.contains(['{', '}']) {
                return Err(invalid("placeholders must span a whole segment"));
            }
            path.push_str(segment);
            continue;
        };

        let (name, constraint) = match inner.split_once(':') {
            Some((name, c)) => {
                let constraint = Constraint::parse(c)
                    .ok_or_else(|| invalid(&format!("unknown constraint `{c}`")))?;
                (name, constraint)
            }
            None => (inner, Constraint::Any),
        };
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(invalid(&format!("bad placeholder name `{name}`")));
        }
        if placeholders.iter().any(|(n, _)| n == name) {
            return Err(invalid(&format!("duplicate placeholder `{name}`")));
        }

        path.push('{');
        path.push_str(name);
        path.push('}');
        placeholders.push((name.to_owned(), constraint));
    }

    Ok((path, placeholders))
}

// ── Route ─────────────────────────────────────────────────────────────────────

/// A compiled route. Immutable.
pub struct Route {
    method: Method,
    pattern: String,
    middleware: Vec<MiddlewareSpec>,
    handler: BoxedHandler,
    matcher: MatchitRouter<()>,
    constraints: Vec<(String, Constraint)>,
}

impl Route {
    fn compile(def: RouteDef) -> Result<Self, Error> {
        let (path, constraints) = compile_pattern(&def.pattern)?;
        let mut matcher = MatchitRouter::new();
        matcher.insert(path, ()).map_err(|e| Error::InvalidRoute {
            pattern: def.pattern.clone(),
            reason: e.to_string(),
        })?;
        let middleware = def.middleware.iter()
            .map(|s| s.parse())
            .collect::<Result<Vec<MiddlewareSpec>, Error>>()?;
        Ok(Self {
            method: def.method,
            pattern: def.pattern,
            middleware,
            handler: def.handler,
            matcher,
            constraints,
        })
    }

    pub fn method(&self) -> Method { self.method }
    pub fn pattern(&self) -> &str { &self.pattern }
    pub fn middleware(&self) -> &[MiddlewareSpec] { &self.middleware }

    pub(crate) fn handler(&self) -> &BoxedHandler { &self.handler }

    fn matches(&self, path: &str) -> Option<HashMap<String, String>> {
        let matched = self.matcher.at(path).ok()?;
        let params: HashMap<String, String> = matched.params.iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        let satisfied = self.constraints.iter().all(|(name, constraint)| {
            params.get(name).is_some_and(|v| constraint.accepts(v))
        });
        satisfied.then_some(params)
    }
}

/// A successful resolution: the route and its extracted placeholders.
pub struct RouteMatch<'a> {
    pub route: &'a Route,
    pub params: HashMap<String, String>,
}

// ── Router ────────────────────────────────────────────────────────────────────

/// The compiled route table. Build once at startup; shared read-only by all
/// workers.
pub struct Router {
    routes: HashMap<Method, Vec<Route>>,
}

impl Router {
    /// Compiles every pattern and middleware spec in `table`.
    pub fn compile(table: RouteTable) -> Result<Self, Error> {
        let mut routes: HashMap<Method, Vec<Route>> = HashMap::new();
        for def in table.defs {
            let route = Route::compile(def)?;
            routes.entry(route.method).or_default().push(route);
        }
        Ok(Self { routes })
    }

    /// First route, in declaration order, matching `method` and `path`.
    ///
    /// `HEAD` without a matching `HEAD` route is answered by the `GET` route
    /// for the same path; the dispatcher drops the body.
    pub fn resolve(&self, method: Method, path: &str) -> Option<RouteMatch<'_>> {
        self.find(method, path).or_else(|| match method {
            Method::Head => self.find(Method::Get, path),
            _ => None,
        })
    }

    fn find(&self, method: Method, path: &str) -> Option<RouteMatch<'_>> {
        self.routes.get(&method)?.iter().find_map(|route| {
            route.matches(path).map(|params| RouteMatch { route, params })
        })
    }

    pub fn routes(&self) -> impl Iterator<Item = &Route> {
        self.routes.values().flatten()
    }
}
