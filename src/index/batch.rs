use super::{index_file, StreamIndex};
use crate::config::IndexConfig;
use crate::error::{Result, TsIndexError};
use futures::stream::{self, StreamExt};
use log::{error, info};
use std::path::PathBuf;
use std::sync::Arc;

/// Indexes several files on tokio's blocking pool.
///
/// At most `config.max_parallel_scans` files are scanned at once. Scans share
/// nothing, so one failing file does not affect the others. Results come back
/// in the order of `paths`.
pub async fn index_files<I>(paths: I, config: IndexConfig) -> Result<Vec<Result<StreamIndex>>>
where
    I: IntoIterator<Item = PathBuf>,
{
    config.validate()?;
    let limit = config.max_parallel_scans;
    let config = Arc::new(config);

    let mut results: Vec<(usize, Result<StreamIndex>)> = stream::iter(paths.into_iter().enumerate())
        .map(|(i, path)| {
            let config = Arc::clone(&config);
            async move {
                let display = path.display().to_string();
                let result = tokio::task::spawn_blocking(move || index_file(&path, &config, None))
                    .await
                    .map_err(|e| TsIndexError::Task(e.to_string()))
                    .and_then(|r| r);
                if let Err(e) = &result {
                    error!("indexing {} failed: {}", display, e);
                }
                (i, result)
            }
        })
        .buffer_unordered(limit)
        .collect()
        .await;

    results.sort_by_key(|(i, _)| *i);
    info!("indexed {} files", results.len());
    Ok(results.into_iter().map(|(_, r)| r).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_files_fail_individually() {
        let paths = vec![
            PathBuf::from("/nonexistent/a.ts"),
            PathBuf::from("/nonexistent/b.ts"),
        ];
        let results = index_files(paths, IndexConfig::default()).await.unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| matches!(r, Err(TsIndexError::Io(_)))));
    }

    #[tokio::test]
    async fn test_rejects_invalid_config() {
        let config = IndexConfig {
            max_parallel_scans: 0,
            ..IndexConfig::default()
        };
        assert!(index_files(Vec::new(), config).await.is_err());
    }
}
