//! Seat definition loading and caching.
//!
//! A [`SeatConfigSource`] produces the raw config document; [`SeatTableCache`]
//! validates it once and hands out the shared result. A failed load is not
//! cached, so the next caller tries again.

use std::sync::Arc;

use chorus_types::batch::BatchOptions;
use chorus_types::config::SeatConfigFile;
use chorus_types::error::ConfigError;
use chorus_types::seat::SeatTable;
use tokio::sync::OnceCell;

/// Where seat definitions come from (a TOML file, an in-memory value, ...).
pub trait SeatConfigSource: Send + Sync + 'static {
    /// Short description for logs, e.g. the file path.
    fn describe(&self) -> String;

    fn load(
        &self,
    ) -> impl std::future::Future<Output = Result<SeatConfigFile, ConfigError>> + Send;
}

/// A fixed, in-memory config document.
#[derive(Debug, Clone, Default)]
pub struct StaticSeatSource {
    config: SeatConfigFile,
}

impl StaticSeatSource {
    pub fn new(config: SeatConfigFile) -> Self {
        Self { config }
    }
}

impl SeatConfigSource for StaticSeatSource {
    fn describe(&self) -> String {
        "built-in defaults".to_string()
    }

    async fn load(&self) -> Result<SeatConfigFile, ConfigError> {
        Ok(self.config.clone())
    }
}

/// Validated seat table plus the batch defaults from the same document.
#[derive(Debug, Clone)]
pub struct LoadedSeats {
    pub table: SeatTable,
    pub batch_defaults: BatchOptions,
}

/// Load-once cache over a [`SeatConfigSource`].
pub struct SeatTableCache<S> {
    source: S,
    cell: OnceCell<Arc<LoadedSeats>>,
}

impl<S: SeatConfigSource> SeatTableCache<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            cell: OnceCell::new(),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// The validated seat table, loading it on first use.
    pub async fn get(&self) -> Result<Arc<LoadedSeats>, ConfigError> {
        self.cell
            .get_or_try_init(|| async {
                let config = self.source.load().await?;
                let (table, batch_defaults) = config.into_parts()?;
                tracing::info!(
                    source = %self.source.describe(),
                    seats = table.len(),
                    synthesis_seat = %table.synthesis_seat(),
                    "seat table loaded"
                );
                Ok(Arc::new(LoadedSeats {
                    table,
                    batch_defaults,
                }))
            })
            .await
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicU32, Ordering};

    use chorus_types::seat::Seat;

    /// Source that fails a fixed number of times before succeeding.
    struct Flaky {
        failures_left: AtomicU32,
        loads: AtomicU32,
    }

    impl SeatConfigSource for Flaky {
        fn describe(&self) -> String {
            "flaky".to_string()
        }

        async fn load(&self) -> Result<SeatConfigFile, ConfigError> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            if self.failures_left.load(Ordering::SeqCst) > 0 {
                self.failures_left.fetch_sub(1, Ordering::SeqCst);
                return Err(ConfigError::Read {
                    path: "seats.toml".to_string(),
                    message: "No such file or directory".to_string(),
                });
            }
            Ok(SeatConfigFile::default())
        }
    }

    #[tokio::test]
    async fn test_static_source_loads_defaults() {
        let cache = SeatTableCache::new(StaticSeatSource::default());
        let loaded = cache.get().await.unwrap();
        assert_eq!(loaded.table.len(), 3);
        assert_eq!(loaded.table.synthesis_seat(), Seat::Conversational);
        assert_eq!(loaded.batch_defaults.max_concurrency, 3);
    }

    #[tokio::test]
    async fn test_loaded_once() {
        let cache = SeatTableCache::new(Flaky {
            failures_left: AtomicU32::new(0),
            loads: AtomicU32::new(0),
        });
        let a = cache.get().await.unwrap();
        let b = cache.get().await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.source().loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_load_is_not_cached() {
        let cache = SeatTableCache::new(Flaky {
            failures_left: AtomicU32::new(1),
            loads: AtomicU32::new(0),
        });
        assert!(matches!(cache.get().await, Err(ConfigError::Read { .. })));
        assert!(cache.get().await.is_ok());
        assert_eq!(cache.source().loads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_invalid_document_is_config_error() {
        let mut config = SeatConfigFile::default();
        config.seats.remove(&Seat::Creative);
        let cache = SeatTableCache::new(StaticSeatSource::new(config));
        assert_eq!(
            cache.get().await.unwrap_err(),
            ConfigError::MissingSeat(Seat::Creative)
        );
    }
}
