//! Authorization check interface
//!
//! The narrow function the routing layer calls once per request.
//!
//! # Pipeline
//!
//! ```text
//! (principal, method, path)
//!     → configured public routes ──────────────────────────→ allow
//!     → endpoint catalog (cache-first) ── no match ────────→ deny
//!     → endpoint marked public ───────────────────────────→ allow
//!     → resolver (cache-first) → code ∈ bundle.api_codes ─→ allow | deny
//!                                     ↓
//!                                 [Metrics]
//! ```
//!
//! Every internal failure becomes a deny.

pub mod decision;
pub mod matcher;
pub mod metrics;

pub use decision::{AccessDecision, Decision, DecisionReason};
pub use matcher::{EndpointCatalog, PublicRoute, RouteTemplate};
pub use metrics::{EngineMetrics, MetricsCollector};

use crate::error::{AuthzError, Result};
use crate::resolver::{PermissionBundle, PermissionResolver};
use crate::types::{ApiEndpoint, Principal};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::{debug, error};

/// Parsed route table and the endpoint list it was built from
type ParsedCatalog = (Arc<Vec<ApiEndpoint>>, Arc<EndpointCatalog>);

/// Per-request authorization gate
pub struct Authorizer {
    resolver: Arc<PermissionResolver>,

    /// Routes allowed without consulting either store
    public_routes: Vec<PublicRoute>,

    metrics: Arc<MetricsCollector>,

    /// Rebuilt only when the resolver hands out a different catalog
    parsed: RwLock<Option<ParsedCatalog>>,
}

impl Authorizer {
    pub fn new(resolver: Arc<PermissionResolver>) -> Self {
        Self {
            resolver,
            public_routes: Vec::new(),
            metrics: Arc::new(MetricsCollector::new()),
            parsed: RwLock::new(None),
        }
    }

    /// Add configured public routes (`"METHOD /path"` or `"/path"`)
    pub fn with_public_endpoints<S: AsRef<str>>(mut self, entries: &[S]) -> Result<Self> {
        for entry in entries {
            self.public_routes.push(PublicRoute::parse(entry.as_ref())?);
        }
        Ok(self)
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn resolver(&self) -> &Arc<PermissionResolver> {
        &self.resolver
    }

    pub fn metrics(&self) -> &Arc<MetricsCollector> {
        &self.metrics
    }

    /// Allow or deny; never fails
    pub async fn authorize(&self, principal: &Principal, method: &str, path: &str) -> Decision {
        self.check(principal, method, path).await.decision()
    }

    /// Authorize with diagnostics
    pub async fn check(&self, principal: &Principal, method: &str, path: &str) -> AccessDecision {
        let start = Instant::now();

        let decision = self.evaluate(principal, method, path).await;

        match decision.reason {
            DecisionReason::StoreUnavailable => error!(
                principal_id = principal.id,
                method,
                path,
                reason = %decision.reason,
                "Access denied, permission store unavailable"
            ),
            reason if !decision.allowed => debug!(
                principal_id = principal.id,
                method,
                path,
                reason = %reason,
                "Access denied"
            ),
            _ => debug!(principal_id = principal.id, method, path, "Access allowed"),
        }

        self.metrics.record(&decision, start.elapsed()).await;
        decision
    }

    /// Resolve a principal's bundle for menu/button rendering
    pub async fn resolve(&self, principal: &Principal) -> Result<PermissionBundle> {
        self.resolver.resolve(principal).await
    }

    /// Prometheus text for engine and cache counters
    pub async fn export_metrics(&self) -> String {
        let cache_stats = self.resolver.cache().stats();
        self.metrics.export_prometheus(Some(&cache_stats)).await
    }

    async fn evaluate(&self, principal: &Principal, method: &str, path: &str) -> AccessDecision {
        if self.public_routes.iter().any(|r| r.matches(method, path)) {
            return AccessDecision::new(DecisionReason::PublicEndpoint);
        }

        let catalog = match self.catalog().await {
            Ok(catalog) => catalog,
            Err(e) => return Self::failure(e),
        };

        let Some(endpoint) = catalog.find(method, path) else {
            let unknown = AuthzError::UnknownEndpoint {
                method: method.to_string(),
                path: path.to_string(),
            };
            debug!("{}", unknown);
            return AccessDecision::new(DecisionReason::UnknownEndpoint);
        };

        if endpoint.is_public {
            return AccessDecision::new(DecisionReason::PublicEndpoint).with_endpoint(endpoint.id);
        }

        let Some(code) = endpoint.permission_code.as_deref().filter(|c| !c.is_empty()) else {
            return AccessDecision::new(DecisionReason::MissingPermissionCode)
                .with_endpoint(endpoint.id);
        };

        if !principal.is_active {
            return AccessDecision::new(DecisionReason::InactivePrincipal)
                .with_endpoint(endpoint.id)
                .with_permission_code(code);
        }

        let reason = match self.resolver.resolve(principal).await {
            Ok(bundle) if bundle.has_api(code) => DecisionReason::Granted,
            Ok(_) => DecisionReason::NotGranted,
            Err(e) => return Self::failure(e).with_endpoint(endpoint.id),
        };

        AccessDecision::new(reason)
            .with_endpoint(endpoint.id)
            .with_permission_code(code)
    }

    /// Route table for the current endpoint catalog
    async fn catalog(&self) -> Result<Arc<EndpointCatalog>> {
        let endpoints = self.resolver.endpoint_catalog().await?;

        if let Some((source, parsed)) = self.parsed.read().await.as_ref() {
            if Arc::ptr_eq(source, &endpoints) {
                return Ok(Arc::clone(parsed));
            }
        }

        let parsed = Arc::new(EndpointCatalog::new(endpoints.iter().cloned()));
        debug!(routes = parsed.len(), "Rebuilt endpoint route table");

        *self.parsed.write().await = Some((endpoints, Arc::clone(&parsed)));
        Ok(parsed)
    }

    /// Fail closed on any internal error
    fn failure(err: AuthzError) -> AccessDecision {
        error!(error = %err, "Authorization failed internally");
        AccessDecision::new(DecisionReason::StoreUnavailable)
    }
}
