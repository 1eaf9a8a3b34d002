//! Route catalog — merges the fixed static route list with routes discovered
//! from the Bookline data API.
//!
//! Discovery is best-effort: a failed or malformed catalog query degrades the
//! run to the static-only list. Route strings are not de-duplicated; a
//! duplicate overwrites its artifact deterministically (last writer wins).

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

/// Marketing, auth, and onboarding pages — known at build time, rendered in
/// this order before any dynamic routes.
pub const STATIC_ROUTES: &[&str] = &[
    "/",
    "/features",
    "/pricing",
    "/about",
    "/contact",
    "/login",
    "/signup",
    "/onboarding?plan=starter",
    "/onboarding?plan=pro",
];

/// The two catalog collections that contribute dynamic routes, queried in
/// this order. Each active record yields one `/<collection>/<slug>` route.
pub const COLLECTIONS: &[&str] = &["services", "professionals"];

/// A catalog record projected to the two columns the pipeline needs.
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogRecord {
    pub id: String,
    pub slug: String,
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog query failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("catalog response malformed: {0}")]
    Malformed(String),
}

/// Read-only access to the catalog collections. Abstracted so tests can
/// inject stub or failing sources.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Fetch the `(id, slug)` projection of a collection's active records,
    /// in source order.
    async fn active_records(&self, collection: &str) -> Result<Vec<CatalogRecord>, CatalogError>;
}

/// Catalog source backed by the hosted data API (PostgREST-style read-only
/// queries, `is_active` filtered server-side).
pub struct HttpCatalog {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpCatalog {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self, CatalogError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }
}

#[async_trait]
impl CatalogSource for HttpCatalog {
    async fn active_records(&self, collection: &str) -> Result<Vec<CatalogRecord>, CatalogError> {
        let url = format!(
            "{}/rest/v1/{collection}?select=id,slug&is_active=eq.true",
            self.base_url
        );
        let records = self
            .client
            .get(&url)
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .send()
            .await?
            .error_for_status()?
            .json::<Vec<CatalogRecord>>()
            .await
            .map_err(|e| CatalogError::Malformed(e.to_string()))?;
        debug!(collection, count = records.len(), "catalog collection fetched");
        Ok(records)
    }
}

/// Build the full ordered route list: static routes first, then one route per
/// active record of each collection, in collection order.
///
/// Never fails — any discovery error is logged and the static-only list is
/// returned instead.
pub async fn build_routes<C>(static_routes: &[String], catalog: &C) -> Vec<String>
where
    C: CatalogSource + ?Sized,
{
    let mut routes: Vec<String> = static_routes.to_vec();
    match dynamic_routes(catalog).await {
        Ok(dynamic) => routes.extend(dynamic),
        Err(e) => {
            warn!(err = %e, "dynamic route discovery failed — continuing with static routes only");
        }
    }
    routes
}

async fn dynamic_routes<C>(catalog: &C) -> Result<Vec<String>, CatalogError>
where
    C: CatalogSource + ?Sized,
{
    let mut routes = Vec::new();
    for collection in COLLECTIONS {
        let records = catalog.active_records(collection).await?;
        routes.extend(
            records
                .iter()
                .map(|r| format!("/{collection}/{}", r.slug)),
        );
    }
    Ok(routes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct StubCatalog {
        collections: HashMap<&'static str, Vec<CatalogRecord>>,
    }

    struct FailingCatalog;

    #[async_trait]
    impl CatalogSource for StubCatalog {
        async fn active_records(
            &self,
            collection: &str,
        ) -> Result<Vec<CatalogRecord>, CatalogError> {
            Ok(self.collections.get(collection).cloned().unwrap_or_default())
        }
    }

    #[async_trait]
    impl CatalogSource for FailingCatalog {
        async fn active_records(&self, _: &str) -> Result<Vec<CatalogRecord>, CatalogError> {
            Err(CatalogError::Malformed("connection refused".into()))
        }
    }

    fn record(id: &str, slug: &str) -> CatalogRecord {
        CatalogRecord {
            id: id.to_string(),
            slug: slug.to_string(),
        }
    }

    fn static_routes() -> Vec<String> {
        STATIC_ROUTES.iter().map(|r| r.to_string()).collect()
    }

    #[tokio::test]
    async fn static_routes_come_first_then_services_then_professionals() {
        let catalog = StubCatalog {
            collections: HashMap::from([
                ("services", vec![record("s1", "haircut")]),
                ("professionals", vec![record("p1", "jane")]),
            ]),
        };

        let routes = build_routes(&static_routes(), &catalog).await;

        let mut expected = static_routes();
        expected.push("/services/haircut".to_string());
        expected.push("/professionals/jane".to_string());
        assert_eq!(routes, expected);
    }

    #[tokio::test]
    async fn discovery_failure_degrades_to_static_only() {
        let routes = build_routes(&static_routes(), &FailingCatalog).await;
        assert_eq!(routes, static_routes());
    }

    #[tokio::test]
    async fn collection_source_order_is_preserved_without_sorting() {
        let catalog = StubCatalog {
            collections: HashMap::from([
                (
                    "services",
                    vec![record("s2", "zebra-wash"), record("s1", "haircut")],
                ),
                ("professionals", vec![]),
            ]),
        };

        let routes = build_routes(&static_routes(), &catalog).await;
        let dynamic = &routes[STATIC_ROUTES.len()..];
        assert_eq!(dynamic, ["/services/zebra-wash", "/services/haircut"]);
    }
}
