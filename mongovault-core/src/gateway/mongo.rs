/*!
MongoDB gateway adapter over the official driver.
*/

use super::{DocumentStore, DocumentStream};
use crate::{ConnectionConfig, Result, VaultError};
use async_trait::async_trait;
use bson::{doc, Document};
use futures::{StreamExt, TryStreamExt};
use mongodb::options::{ClientOptions, CountOptions};
use mongodb::Client;
use mongovault_retry::{permanent_error, transient_error, RetryError};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Gateway to a live MongoDB deployment
///
/// Construct with [`MongoStore::connect`], which applies the configured
/// timeouts and verifies liveness with an explicit ping before handing the
/// session out as usable.
#[derive(Debug, Clone)]
pub struct MongoStore {
    client: Client,
}

impl MongoStore {
    /// Establish a session against the configured server
    ///
    /// The liveness probe is retried briefly through the probe backoff
    /// policy; a server that stays unreachable surfaces as
    /// [`VaultError::ConnectionUnavailable`] or [`VaultError::ServerTimeout`]
    /// depending on how the driver failed, since the remediation differs
    /// (check the address vs. check server load or the VPN).
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        config.validate()?;

        info!("Connecting to {}:{}", config.host, config.port);
        let mut options = ClientOptions::parse(config.connection_string())
            .await
            .map_err(map_driver_error)?;
        options.app_name = Some("mongovault".to_string());
        options.connect_timeout = Some(config.connect_timeout);
        options.server_selection_timeout = Some(config.server_selection_timeout);

        let client = Client::with_options(options).map_err(map_driver_error)?;

        debug!("Verifying liveness with ping");
        let probe_client = client.clone();
        mongovault_retry::with_backoff("ping", move |_attempt| {
            let client = probe_client.clone();
            Box::pin(async move {
                match client
                    .database("admin")
                    .run_command(doc! { "ping": 1 }, None)
                    .await
                {
                    Ok(_) => Ok(()),
                    Err(err) => {
                        let mapped = map_driver_error(err);
                        if mapped.is_connection_error() {
                            Err(transient_error!("ping", mapped))
                        } else {
                            Err(permanent_error!("ping", mapped))
                        }
                    }
                }
            })
        })
        .await
        .map_err(unwrap_probe_error)?;

        info!("Connected to {}:{}", config.host, config.port);
        Ok(Self { client })
    }
}

#[async_trait]
impl DocumentStore for MongoStore {
    async fn ping(&self) -> Result<()> {
        self.client
            .database("admin")
            .run_command(doc! { "ping": 1 }, None)
            .await
            .map(|_| ())
            .map_err(map_driver_error)
    }

    async fn collection_names(&self, database: &str) -> Result<Vec<String>> {
        self.client
            .database(database)
            .list_collection_names(None)
            .await
            .map_err(map_driver_error)
    }

    async fn count_documents(
        &self,
        database: &str,
        collection: &str,
        budget: Duration,
    ) -> Result<Option<u64>> {
        let coll = self
            .client
            .database(database)
            .collection::<Document>(collection);
        let options = CountOptions::builder().max_time(budget).build();

        match coll.count_documents(None, options).await {
            Ok(count) => Ok(Some(count)),
            Err(err) => {
                warn!(
                    "Could not count documents in '{}' within {:?}: {}",
                    collection, budget, err
                );
                Ok(None)
            }
        }
    }

    async fn open_cursor(&self, database: &str, collection: &str) -> Result<DocumentStream> {
        let coll = self
            .client
            .database(database)
            .collection::<Document>(collection);
        let cursor = coll.find(None, None).await.map_err(map_driver_error)?;
        Ok(cursor.map_err(map_driver_error).boxed())
    }

    async fn insert_batch(
        &self,
        database: &str,
        collection: &str,
        batch: Vec<Document>,
    ) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        self.client
            .database(database)
            .collection::<Document>(collection)
            .insert_many(batch, None)
            .await
            .map(|_| ())
            .map_err(map_driver_error)
    }

    async fn drop_collection(&self, database: &str, collection: &str) -> Result<()> {
        self.client
            .database(database)
            .collection::<Document>(collection)
            .drop(None)
            .await
            .map_err(map_driver_error)
    }
}

/// Classify a driver error into the engine's taxonomy
fn map_driver_error(err: mongodb::error::Error) -> VaultError {
    use mongodb::error::ErrorKind;

    match err.kind.as_ref() {
        ErrorKind::ServerSelection { message, .. } => VaultError::server_timeout(message.clone()),
        ErrorKind::DnsResolve { message, .. } => {
            VaultError::connection_unavailable(message.clone())
        }
        ErrorKind::Io(_) => VaultError::connection_unavailable(err.to_string()),
        _ => VaultError::database(err.to_string()),
    }
}

/// Recover the underlying [`VaultError`] from a finished retry loop
fn unwrap_probe_error(err: RetryError) -> VaultError {
    let source = match err {
        RetryError::RetriesExhausted { source, .. }
        | RetryError::Transient { source, .. }
        | RetryError::Permanent { source, .. } => source,
    };
    match source.downcast::<VaultError>() {
        Ok(inner) => *inner,
        Err(other) => VaultError::connection_unavailable(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unwrap_probe_error_recovers_vault_error() {
        let err = RetryError::Permanent {
            operation: "ping",
            source: Box::new(VaultError::server_timeout("no server selected")),
        };
        assert!(matches!(
            unwrap_probe_error(err),
            VaultError::ServerTimeout(_)
        ));
    }

    #[test]
    fn test_unwrap_probe_error_foreign_source() {
        let err = RetryError::RetriesExhausted {
            operation: "ping",
            source: Box::new(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "refused",
            )),
        };
        assert!(matches!(
            unwrap_probe_error(err),
            VaultError::ConnectionUnavailable(_)
        ));
    }
}
