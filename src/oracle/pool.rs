//! Bounded, timed access to the oracle
//!
//! The oracle is a slow external service, so batches fan out over a
//! `JoinSet` with a semaphore capping in-flight calls. Results come back
//! in input order regardless of completion order.

use super::{ClassificationOracle, MergeDecision, OracleError, ParentSelection};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

pub const DEFAULT_CONCURRENCY: usize = 15;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Clone)]
pub struct OraclePool {
    oracle: Arc<dyn ClassificationOracle>,
    semaphore: Arc<Semaphore>,
    timeout: Duration,
}

impl OraclePool {
    pub fn new(oracle: Arc<dyn ClassificationOracle>) -> Self {
        Self {
            oracle,
            semaphore: Arc::new(Semaphore::new(DEFAULT_CONCURRENCY)),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Cap the number of concurrent oracle calls
    pub fn with_concurrency(mut self, limit: usize) -> Self {
        self.semaphore = Arc::new(Semaphore::new(limit.max(1)));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn oracle(&self) -> &Arc<dyn ClassificationOracle> {
        &self.oracle
    }

    // === Single calls ===

    pub async fn select_parent(
        &self,
        child: &str,
        candidates: &[String],
    ) -> Result<ParentSelection, OracleError> {
        self.guarded(self.oracle.select_parent(child, candidates)).await
    }

    pub async fn suggest_hierarchy_chain(
        &self,
        item: &str,
        context: &str,
    ) -> Result<Vec<String>, OracleError> {
        self.guarded(self.oracle.suggest_hierarchy_chain(item, context))
            .await
    }

    pub async fn resolve_semantic_root(&self, name: &str) -> Result<String, OracleError> {
        self.guarded(self.oracle.resolve_semantic_root(name)).await
    }

    pub async fn decide_merge(&self, a: &str, b: &str) -> Result<MergeDecision, OracleError> {
        self.guarded(self.oracle.decide_merge(a, b)).await
    }

    // === Batches ===

    /// `(child, candidates)` → selection, in input order
    pub async fn select_parents(
        &self,
        requests: Vec<(String, Vec<String>)>,
    ) -> Vec<Result<ParentSelection, OracleError>> {
        self.fan_out(requests, |oracle, (child, candidates)| async move {
            oracle.select_parent(&child, &candidates).await
        })
        .await
    }

    /// `(item, context)` → chain, in input order
    pub async fn suggest_hierarchy_chains(
        &self,
        requests: Vec<(String, String)>,
    ) -> Vec<Result<Vec<String>, OracleError>> {
        self.fan_out(requests, |oracle, (item, context)| async move {
            oracle.suggest_hierarchy_chain(&item, &context).await
        })
        .await
    }

    /// `(a, b)` → decision, in input order
    pub async fn decide_merges(
        &self,
        pairs: Vec<(String, String)>,
    ) -> Vec<Result<MergeDecision, OracleError>> {
        self.fan_out(pairs, |oracle, (a, b)| async move {
            oracle.decide_merge(&a, &b).await
        })
        .await
    }

    /// name → root answer, in input order
    pub async fn resolve_semantic_roots(&self, names: Vec<String>) -> Vec<Result<String, OracleError>> {
        self.fan_out(names, |oracle, name| async move {
            oracle.resolve_semantic_root(&name).await
        })
        .await
    }

    async fn guarded<T, F>(&self, call: F) -> Result<T, OracleError>
    where
        F: Future<Output = Result<T, OracleError>>,
    {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| OracleError::Internal("oracle pool closed".to_string()))?;
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(OracleError::Timeout(self.timeout)),
        }
    }

    async fn fan_out<T, R, F, Fut>(&self, inputs: Vec<T>, call: F) -> Vec<Result<R, OracleError>>
    where
        T: Send + 'static,
        R: Send + 'static,
        F: Fn(Arc<dyn ClassificationOracle>, T) -> Fut,
        Fut: Future<Output = Result<R, OracleError>> + Send + 'static,
    {
        let total = inputs.len();
        let mut tasks = JoinSet::new();
        for (index, input) in inputs.into_iter().enumerate() {
            let semaphore = Arc::clone(&self.semaphore);
            let timeout = self.timeout;
            let pending = call(Arc::clone(&self.oracle), input);
            tasks.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return (index, Err(OracleError::Internal("oracle pool closed".to_string())));
                };
                let result = match tokio::time::timeout(timeout, pending).await {
                    Ok(result) => result,
                    Err(_) => Err(OracleError::Timeout(timeout)),
                };
                (index, result)
            });
        }

        let mut slots: Vec<Option<Result<R, OracleError>>> = (0..total).map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => slots[index] = Some(result),
                Err(e) => tracing::warn!(error = %e, "oracle task failed to join"),
            }
        }

        slots
            .into_iter()
            .map(|slot| {
                slot.unwrap_or_else(|| Err(OracleError::Internal("oracle task aborted".to_string())))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::ScriptedOracle;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Records the peak number of overlapping calls.
    struct SlowOracle {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        delay: Duration,
    }

    impl SlowOracle {
        fn new(delay: Duration) -> Self {
            Self {
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                delay,
            }
        }
    }

    #[async_trait]
    impl ClassificationOracle for SlowOracle {
        async fn select_parent(
            &self,
            _child: &str,
            candidates: &[String],
        ) -> Result<ParentSelection, OracleError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(ParentSelection::new(candidates[0].clone()))
        }

        async fn suggest_hierarchy_chain(&self, _: &str, _: &str) -> Result<Vec<String>, OracleError> {
            tokio::time::sleep(self.delay).await;
            Ok(Vec::new())
        }

        async fn resolve_semantic_root(&self, _: &str) -> Result<String, OracleError> {
            Err(OracleError::NoAnswer("slow".to_string()))
        }

        async fn decide_merge(&self, _: &str, _: &str) -> Result<MergeDecision, OracleError> {
            Ok(MergeDecision::keep_apart())
        }
    }

    #[tokio::test]
    async fn batch_results_keep_input_order() {
        let oracle = ScriptedOracle::available()
            .with_parent("A", "PA")
            .with_parent("C", "PC");
        let pool = OraclePool::new(Arc::new(oracle)).with_concurrency(2);
        let results = pool
            .select_parents(vec![
                ("A".to_string(), vec!["PA".to_string()]),
                ("B".to_string(), vec!["PB".to_string()]),
                ("C".to_string(), vec!["PC".to_string()]),
            ])
            .await;
        assert_eq!(results[0].as_ref().unwrap().parent, "PA");
        assert!(matches!(results[1], Err(OracleError::NoAnswer(_))));
        assert_eq!(results[2].as_ref().unwrap().parent, "PC");
    }

    #[tokio::test]
    async fn concurrency_is_capped() {
        let oracle = Arc::new(SlowOracle::new(Duration::from_millis(20)));
        let pool = OraclePool::new(oracle.clone()).with_concurrency(3);
        let requests = (0..10)
            .map(|i| (format!("child-{}", i), vec!["parent".to_string()]))
            .collect();
        let results = pool.select_parents(requests).await;
        assert!(results.iter().all(Result::is_ok));
        assert!(oracle.peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn slow_calls_time_out() {
        let oracle = Arc::new(SlowOracle::new(Duration::from_millis(200)));
        let pool = OraclePool::new(oracle).with_timeout(Duration::from_millis(10));
        let result = pool.suggest_hierarchy_chain("x", "").await;
        assert!(matches!(result, Err(OracleError::Timeout(_))));
    }
}
