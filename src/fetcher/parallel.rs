use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::app::{LivehubError, Result};

/// Runs one task per key with at most `workers` in flight.
///
/// A failing task only fails its own key; results come back in key order.
#[derive(Clone)]
pub struct ParallelFetcher {
    semaphore: Arc<Semaphore>,
}

impl ParallelFetcher {
    pub fn with_workers(workers: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(workers.max(1))),
        }
    }

    pub async fn fetch_all<K, T, F, Fut>(&self, keys: Vec<K>, task: F) -> Vec<(K, Result<T>)>
    where
        K: Clone + Send + 'static,
        T: Send + 'static,
        F: Fn(K) -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let mut handles = Vec::with_capacity(keys.len());

        for key in keys {
            let semaphore = self.semaphore.clone();
            let fut = task(key.clone());

            let handle = tokio::spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| LivehubError::Other(format!("Worker pool closed: {}", e)))?;
                fut.await
            });

            handles.push((key, handle));
        }

        let mut results = Vec::with_capacity(handles.len());
        for (key, handle) in handles {
            match handle.await {
                Ok(result) => results.push((key, result)),
                Err(e) => {
                    tracing::error!("Task join error: {}", e);
                    results.push((key, Err(LivehubError::Other(format!("Task failed: {}", e)))));
                }
            }
        }

        results
    }
}
