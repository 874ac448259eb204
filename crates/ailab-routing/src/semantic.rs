//! Centroid-based semantic routing.
//!
//! Every route with examples gets a centroid: the mean embedding of its
//! examples.  An input is routed to the route whose centroid has the highest
//! cosine similarity with the input embedding.

use std::sync::Arc;

use ailab_agent::EmbeddingModel;
use serde::Serialize;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::error::{Result, RoutingError};
use crate::route::Route;
use crate::similarity::{centroid, cosine_similarity};

/// Similarity of an input to one route.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteScore {
    pub route: String,
    pub score: f32,
}

/// Routes inputs by nearest example centroid.
pub struct SemanticRouter {
    embedder: Arc<dyn EmbeddingModel>,
    /// Routes that have at least one example, in registration order.
    routes: Vec<Route>,
    centroids: OnceCell<Vec<Vec<f32>>>,
}

impl std::fmt::Debug for SemanticRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SemanticRouter")
            .field("embedder", &self.embedder.model_id())
            .field("routes", &self.routes.len())
            .field("warm", &self.centroids.initialized())
            .finish()
    }
}

impl SemanticRouter {
    /// Build a router over the routes that carry examples.
    ///
    /// Fails when no route has an example.
    pub fn new(embedder: Arc<dyn EmbeddingModel>, routes: &[Route]) -> Result<Self> {
        let routes: Vec<Route> = routes
            .iter()
            .filter(|r| !r.examples.is_empty())
            .cloned()
            .collect();
        if routes.is_empty() {
            return Err(RoutingError::Empty {
                what: "semantic route examples",
            });
        }
        Ok(Self {
            embedder,
            routes,
            centroids: OnceCell::new(),
        })
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// Embed every example and compute the centroids.  Runs once; later
    /// calls return the cached vectors.
    pub async fn centroids(&self) -> Result<&[Vec<f32>]> {
        let centroids = self
            .centroids
            .get_or_try_init(|| async {
                let mut out = Vec::with_capacity(self.routes.len());
                for route in &self.routes {
                    let vectors = self.embedder.embed_many(&route.examples).await?;
                    out.push(centroid(&vectors)?);
                }
                info!(
                    routes = out.len(),
                    embedder = self.embedder.model_id(),
                    "route centroids computed"
                );
                Ok::<_, RoutingError>(out)
            })
            .await?;
        Ok(centroids)
    }

    /// Score `input` against every route, best first.
    pub async fn scores(&self, input: &str) -> Result<Vec<RouteScore>> {
        let centroids = self.centroids().await?;
        let query = self.embedder.embed(input).await?;

        let mut scores = self
            .routes
            .iter()
            .zip(centroids)
            .map(|(route, c)| {
                Ok(RouteScore {
                    route: route.name.clone(),
                    score: cosine_similarity(&query, c)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        // Stable sort: equal scores keep registration order.
        scores.sort_by(|a, b| b.score.total_cmp(&a.score));
        Ok(scores)
    }

    /// The best route for `input`.
    pub async fn route(&self, input: &str) -> Result<RouteScore> {
        let best = self
            .scores(input)
            .await?
            .into_iter()
            .next()
            .ok_or(RoutingError::Empty { what: "route scores" })?;
        debug!(route = %best.route, score = best.score, "semantic match");
        Ok(best)
    }
}
