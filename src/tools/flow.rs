//! Scoped adapter lifecycle: connect, act, disconnect.

use crate::db::{AdapterRegistry, DatabaseAdapter};
use crate::error::DbResult;
use crate::models::ConnectionConfig;
use futures_util::future::BoxFuture;
use tracing::{debug, warn};

/// Run `action` against a freshly connected adapter for `config`.
///
/// The adapter is created from the registry, connected, handed to `action`
/// and then disconnected whatever the outcome. Connect failures are returned
/// as-is after the half-open adapter has been torn down.
///
/// The closure receives the adapter by mutable reference and must return a
/// boxed future borrowing it; move owned inputs into the closure:
///
/// ```ignore
/// let result = with_adapter(&registry, &config, move |adapter| {
///     Box::pin(async move { adapter.execute_query(&sql, &params).await })
/// })
/// .await?;
/// ```
pub async fn with_adapter<T, F>(
    registry: &AdapterRegistry,
    config: &ConnectionConfig,
    action: F,
) -> DbResult<T>
where
    F: for<'a> FnOnce(&'a mut dyn DatabaseAdapter) -> BoxFuture<'a, DbResult<T>>,
{
    let mut adapter = registry.create(config)?;

    let result = match adapter.connect(config).await {
        Ok(()) => action(adapter.as_mut()).await,
        Err(e) => {
            warn!(db_type = %config.db_type, error = %e, "Connect failed");
            Err(e)
        }
    };

    adapter.disconnect().await;
    debug!(db_type = %config.db_type, ok = result.is_ok(), "Adapter released");
    result
}
