//! Route table.
//!
//! Routes are `(pattern, method) -> handler` bindings stored in a radix tree. Patterns are
//! literal paths with two kinds of parameters:
//!
//! * `{name}` matches one or more characters up to the next `/`
//! * `{*}` matches the rest of the path, `/` included, and is reported under the name `*`
//!
//! When several patterns match a path, the most specific one wins: every literal character
//! counts far more than any parameter, and wildcards count less than single-segment
//! parameters.
//!
//! ```
//! use http::Method;
//! use tern_http::router::Router;
//!
//! let mut router = Router::new();
//! router.add("/users/{id}", Method::GET, "user").unwrap();
//! router.add("/users/{id}/posts/{*}", Method::GET, "posts").unwrap();
//!
//! let found = router.lookup("/users/42/posts/a/b").unwrap();
//! assert_eq!(found.handler(&Method::GET), Some(&"posts"));
//! assert_eq!(found.param("id"), Some("42"));
//! assert_eq!(found.param("*"), Some("a/b"));
//! ```

mod node;

use http::Method;
use node::{parse_pattern, Node};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RouteError {
    #[error("empty parameter name in route {pattern:?}")]
    EmptyParamName { pattern: String },

    #[error("unbalanced braces in route {pattern:?}")]
    UnclosedParam { pattern: String },

    #[error("parameters must be separated by literal text in route {pattern:?}")]
    AdjacentParams { pattern: String },
}

#[derive(Debug, Clone)]
pub struct Router<H> {
    root: Node<H>,
}

impl<H> Default for Router<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H> Router<H> {
    pub fn new() -> Self {
        Self { root: Node::root() }
    }

    /// Binds `handler` to `pattern` for `method`, replacing any previous binding.
    pub fn add(&mut self, pattern: &str, method: Method, handler: H) -> Result<(), RouteError> {
        let pattern = normalize(pattern);
        let pieces = parse_pattern(&pattern)?;
        let node = self.root.insert(&pieces);

        match node.handlers.iter_mut().find(|(m, _)| *m == method) {
            Some(entry) => {
                debug!(pattern = %pattern, method = %method, "replacing route");
                entry.1 = handler;
            }
            None => node.handlers.push((method, handler)),
        }
        Ok(())
    }

    /// Binds the same handler for several methods.
    pub fn add_methods(&mut self, pattern: &str, methods: &[Method], handler: H) -> Result<(), RouteError>
    where
        H: Clone,
    {
        for method in methods {
            self.add(pattern, method.clone(), handler.clone())?;
        }
        Ok(())
    }

    /// Removes the binding of `pattern` for `method`, returning its handler.
    pub fn remove(&mut self, pattern: &str, method: &Method) -> Option<H> {
        let pattern = normalize(pattern);
        let node = self.root.find_exact_mut(&pattern)?;
        let index = node.handlers.iter().position(|(m, _)| m == method)?;
        Some(node.handlers.remove(index).1)
    }

    /// Whether a route with exactly this pattern has any handler.
    pub fn contains(&mut self, pattern: &str) -> bool {
        let pattern = normalize(pattern);
        self.root.find_exact_mut(&pattern).is_some_and(|node| !node.handlers.is_empty())
    }

    /// Finds the most specific route matching a decoded request path.
    pub fn lookup(&self, path: &str) -> Option<RouteMatch<'_, H>> {
        let path = trim_trailing_slash(path);
        self.root.lookup(path).map(|(node, params)| RouteMatch { pattern: &node.path, params, handlers: &node.handlers })
    }

    /// Every method registered on any route, in first registration order.
    pub fn all_methods(&self) -> Vec<Method> {
        let mut methods = Vec::new();
        self.root.visit(&mut |node| {
            for (method, _) in &node.handlers {
                if !methods.contains(method) {
                    methods.push(method.clone());
                }
            }
        });
        methods
    }
}

/// The route selected for a path, with the parameters captured along the way.
#[derive(Debug)]
pub struct RouteMatch<'r, H> {
    pattern: &'r str,
    params: Vec<(String, String)>,
    handlers: &'r [(Method, H)],
}

impl<'r, H> RouteMatch<'r, H> {
    pub fn pattern(&self) -> &'r str {
        self.pattern
    }

    /// Captured parameters in path order.
    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }

    pub fn into_params(self) -> Vec<(String, String)> {
        self.params
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.iter().find(|(n, _)| n == name).map(|(_, v)| v.as_str())
    }

    pub fn handler(&self, method: &Method) -> Option<&'r H> {
        self.handlers.iter().find(|(m, _)| m == method).map(|(_, h)| h)
    }

    /// Methods this route answers, in registration order.
    pub fn methods(&self) -> impl Iterator<Item = &'r Method> + use<'r, H> {
        self.handlers.iter().map(|(m, _)| m)
    }
}

/// Ensures a leading `/` and strips a trailing one, except for the root.
fn normalize(pattern: &str) -> String {
    let pattern = trim_trailing_slash(pattern);
    if pattern.starts_with('/') { pattern.to_string() } else { format!("/{pattern}") }
}

fn trim_trailing_slash(path: &str) -> &str {
    match path.strip_suffix('/') {
        Some(trimmed) if !trimmed.is_empty() => trimmed,
        _ => path,
    }
}
