//! Request to endpoint matching
//!
//! Templates are compared segment by segment. A segment written `{name}`,
//! `:name` or `*` matches any single request segment; every other segment
//! must match literally. Empty segments (leading, trailing or doubled
//! slashes) are ignored on both sides, and a query string on the request
//! path is dropped before matching.

use crate::error::{AuthzError, Result};
use crate::types::ApiEndpoint;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param,
}

/// Parsed path template, e.g. `/widgets/{id}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteTemplate {
    raw: String,
    segments: Vec<Segment>,
}

impl RouteTemplate {
    pub fn parse(template: &str) -> Self {
        let segments = split_path(template)
            .map(|segment| {
                let is_param = segment == "*"
                    || segment.starts_with(':')
                    || (segment.starts_with('{') && segment.ends_with('}'));

                if is_param {
                    Segment::Param
                } else {
                    Segment::Literal(segment.to_string())
                }
            })
            .collect();

        Self {
            raw: template.to_string(),
            segments,
        }
    }

    /// Whether a concrete request path fits this template
    pub fn matches(&self, path: &str) -> bool {
        let mut requested = split_path(strip_query(path));

        for segment in &self.segments {
            let Some(actual) = requested.next() else {
                return false;
            };

            if let Segment::Literal(expected) = segment {
                if expected != actual {
                    return false;
                }
            }
        }

        requested.next().is_none()
    }

    /// Number of literal segments; more literals means a more specific route
    pub fn literal_count(&self) -> usize {
        self.segments
            .iter()
            .filter(|s| matches!(s, Segment::Literal(_)))
            .count()
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for RouteTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

fn split_path(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

fn strip_query(path: &str) -> &str {
    path.split(['?', '#']).next().unwrap_or(path)
}

/// Active endpoints with their parsed templates
#[derive(Debug, Clone, Default)]
pub struct EndpointCatalog {
    routes: Vec<(ApiEndpoint, RouteTemplate)>,
}

impl EndpointCatalog {
    /// Build a catalog; deprecated endpoints are left out
    pub fn new(endpoints: impl IntoIterator<Item = ApiEndpoint>) -> Self {
        let mut routes: Vec<_> = endpoints
            .into_iter()
            .filter(ApiEndpoint::is_active)
            .map(|endpoint| {
                let template = RouteTemplate::parse(&endpoint.path);
                (endpoint, template)
            })
            .collect();

        routes.sort_by_key(|(endpoint, _)| endpoint.id);

        Self { routes }
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Most specific endpoint matching the request
    ///
    /// Among several matches the one with the most literal segments wins;
    /// ties go to the lowest endpoint id.
    pub fn find(&self, method: &str, path: &str) -> Option<&ApiEndpoint> {
        let mut best: Option<(&ApiEndpoint, usize)> = None;

        for (endpoint, template) in &self.routes {
            if !endpoint.method.eq_ignore_ascii_case(method) || !template.matches(path) {
                continue;
            }

            let literals = template.literal_count();
            // Routes are sorted by id, so strict comparison keeps the lowest id
            if best.map_or(true, |(_, current)| literals > current) {
                best = Some((endpoint, literals));
            }
        }

        best.map(|(endpoint, _)| endpoint)
    }
}

/// Configured public route: `"METHOD /path"` or `"/path"` for any method
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicRoute {
    method: Option<String>,
    template: RouteTemplate,
}

impl PublicRoute {
    pub fn parse(entry: &str) -> Result<Self> {
        let parts: Vec<&str> = entry.split_whitespace().collect();

        let (method, path) = match parts.as_slice() {
            [path] => (None, *path),
            [method, path] => {
                if !method.chars().all(|c| c.is_ascii_alphabetic()) {
                    return Err(AuthzError::InvalidInput(format!(
                        "invalid HTTP method in public endpoint '{}'",
                        entry
                    )));
                }
                (Some(method.to_ascii_uppercase()), *path)
            }
            _ => {
                return Err(AuthzError::InvalidInput(format!(
                    "public endpoint must be 'METHOD /path' or '/path', got '{}'",
                    entry
                )))
            }
        };

        if !path.starts_with('/') {
            return Err(AuthzError::InvalidInput(format!(
                "public endpoint path must start with '/', got '{}'",
                entry
            )));
        }

        Ok(Self {
            method,
            template: RouteTemplate::parse(path),
        })
    }

    pub fn matches(&self, method: &str, path: &str) -> bool {
        let method_ok = self
            .method
            .as_deref()
            .map_or(true, |m| m.eq_ignore_ascii_case(method));

        method_ok && self.template.matches(path)
    }
}

impl fmt::Display for PublicRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.method {
            Some(method) => write!(f, "{} {}", method, self.template),
            None => write!(f, "{}", self.template),
        }
    }
}
