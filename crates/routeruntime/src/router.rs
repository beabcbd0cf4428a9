use crate::retry::{with_retry, Attempt};
use crate::{EmbeddingGateway, RouteTable, ShortcutRule};
use routecore::{RetryPolicy, RouteLabel, RunError};
use tokio_util::sync::CancellationToken;

/// Literal-phrase overrides, checked before any embedding is computed
#[derive(Debug, Clone, Default)]
pub struct ShortcutClassifier {
    rules: Vec<ShortcutRule>,
}

impl ShortcutClassifier {
    pub fn new(rules: Vec<ShortcutRule>) -> Self {
        Self { rules }
    }

    /// First rule whose phrase occurs verbatim (case-sensitive) in `input`
    pub fn classify(&self, input: &str) -> Option<RouteLabel> {
        self.rules
            .iter()
            .find(|rule| input.contains(&rule.phrase))
            .map(|rule| rule.route)
    }
}

/// Mean embedding of a route's example utterances
#[derive(Debug, Clone)]
pub struct RouteCentroid {
    pub label: RouteLabel,
    pub vector: Vec<f32>,
}

/// Nearest-centroid classifier over embedding vectors
///
/// Scores are cosine similarities. The highest score wins; on a tie the
/// centroid added first wins. Below `min_similarity`, or with no centroids,
/// the default route is returned.
#[derive(Debug, Clone)]
pub struct SemanticRouter {
    dimension: usize,
    default_route: RouteLabel,
    min_similarity: f32,
    centroids: Vec<RouteCentroid>,
}

impl SemanticRouter {
    pub fn new(dimension: usize, default_route: RouteLabel) -> Self {
        Self {
            dimension,
            default_route,
            min_similarity: 0.0,
            centroids: Vec::new(),
        }
    }

    pub fn with_min_similarity(mut self, min_similarity: f32) -> Self {
        self.min_similarity = min_similarity;
        self
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn centroids(&self) -> &[RouteCentroid] {
        &self.centroids
    }

    /// Add a route from example vectors; routes without examples are skipped
    pub fn add_route(&mut self, label: RouteLabel, examples: &[Vec<f32>]) -> Result<(), RunError> {
        if examples.is_empty() {
            return Ok(());
        }

        let mut centroid = vec![0.0f32; self.dimension];
        for example in examples {
            self.check_vector(example)?;
            for (acc, x) in centroid.iter_mut().zip(example) {
                *acc += x;
            }
        }
        let n = examples.len() as f32;
        centroid.iter_mut().for_each(|x| *x /= n);

        self.centroids.push(RouteCentroid {
            label,
            vector: centroid,
        });
        Ok(())
    }

    /// Build a router by embedding every utterance in `table`, in table order
    pub async fn train(
        gateway: &dyn EmbeddingGateway,
        table: &RouteTable,
        min_similarity: f32,
        retry: &RetryPolicy,
    ) -> Result<Self, RunError> {
        let mut router = SemanticRouter::new(gateway.dimension(), table.default_route)
            .with_min_similarity(min_similarity);
        let cancel = CancellationToken::new();

        for entry in &table.routes {
            let mut examples = Vec::with_capacity(entry.utterances.len());
            for utterance in &entry.utterances {
                let embed = || gateway.embed(utterance);
                let vector = with_retry(retry, &cancel, "embed utterance", |_, _| {}, embed)
                    .await
                    .map_err(|e| match e {
                        Attempt::Failed(err) => RunError::Gateway(err),
                        Attempt::Cancelled => RunError::Cancelled,
                    })?;
                examples.push(vector);
            }
            router.add_route(entry.label, &examples)?;
        }

        tracing::info!(
            routes = router.centroids.len(),
            dimension = router.dimension,
            gateway = gateway.name(),
            "Trained semantic router"
        );
        Ok(router)
    }

    pub fn route(&self, vector: &[f32]) -> Result<RouteLabel, RunError> {
        let best = self
            .scores(vector)?
            .into_iter()
            .fold(None::<(RouteLabel, f32)>, |best, (label, score)| match best {
                Some((_, top)) if score <= top => best,
                _ if score.is_nan() => best,
                _ => Some((label, score)),
            });

        let label = match best {
            Some((label, score)) if score >= self.min_similarity => {
                tracing::debug!(route = %label, score, "Semantic route selected");
                label
            }
            _ => {
                tracing::debug!(
                    route = %self.default_route,
                    "No route above threshold, using default"
                );
                self.default_route
            }
        };
        Ok(label)
    }

    /// Similarity of `vector` to every centroid, in centroid order
    pub fn scores(&self, vector: &[f32]) -> Result<Vec<(RouteLabel, f32)>, RunError> {
        self.check_vector(vector)?;
        Ok(self
            .centroids
            .iter()
            .map(|c| (c.label, cosine(vector, &c.vector)))
            .collect())
    }

    fn check_vector(&self, vector: &[f32]) -> Result<(), RunError> {
        if vector.is_empty() || vector.len() != self.dimension {
            return Err(RunError::InvalidVector {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        Ok(())
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    dot / (na * nb)
}
