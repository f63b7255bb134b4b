//! Collection cleanup.
//!
//! Two structurally separate paths share only the enumeration step:
//! [`plan`] lists what would be deleted and performs zero mutations, while
//! [`purge`] actually deletes. The caller selects the path explicitly;
//! there is no flag inside these functions that could flip one into the
//! other.

use tracing::info;

use crate::bench::is_benchmark_collection;
use crate::error::BenchError;
use crate::provider::Provider;

/// Benchmark collections currently visible to the provider's credentials.
async fn enumerate(provider: &dyn Provider) -> Result<Vec<String>, BenchError> {
    let targets = provider
        .list_collections()
        .await?
        .into_iter()
        .filter(|name| is_benchmark_collection(name))
        .collect();
    Ok(targets)
}

/// Dry run: logs each collection a purge would delete and returns them.
pub async fn plan(provider: &dyn Provider) -> Result<Vec<String>, BenchError> {
    let targets = enumerate(provider).await?;
    for name in &targets {
        info!(provider = provider.name(), collection = %name, "Would delete");
    }
    info!(
        provider = provider.name(),
        count = targets.len(),
        "Dry run only; pass --wet to delete"
    );
    Ok(targets)
}

/// Deletes every benchmark collection, returning the deleted names.
pub async fn purge(provider: &dyn Provider) -> Result<Vec<String>, BenchError> {
    let targets = enumerate(provider).await?;
    for name in &targets {
        provider.delete_collection(name).await?;
        info!(provider = provider.name(), collection = %name, "Deleted");
    }
    Ok(targets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::memory::MemoryProvider;

    async fn seeded_provider() -> MemoryProvider {
        let p = MemoryProvider::new();
        p.setup("x-100k").await.unwrap();
        p.setup("x-1m").await.unwrap();
        p.setup("unrelated").await.unwrap();
        p
    }

    #[tokio::test]
    async fn plan_deletes_nothing() {
        let p = seeded_provider().await;
        let targets = plan(&p).await.unwrap();
        assert_eq!(targets, vec!["x-100k", "x-1m"]);
        assert_eq!(
            p.list_collections().await.unwrap(),
            vec!["unrelated", "x-100k", "x-1m"]
        );
    }

    #[tokio::test]
    async fn purge_deletes_exactly_the_benchmark_collections() {
        let p = seeded_provider().await;
        let deleted = purge(&p).await.unwrap();
        assert_eq!(deleted, vec!["x-100k", "x-1m"]);
        assert_eq!(p.list_collections().await.unwrap(), vec!["unrelated"]);
    }

    #[tokio::test]
    async fn purge_with_no_targets_is_a_no_op() {
        let p = MemoryProvider::new();
        p.setup("keep-me").await.unwrap();
        assert!(purge(&p).await.unwrap().is_empty());
        assert_eq!(p.list_collections().await.unwrap(), vec!["keep-me"]);
    }
}
