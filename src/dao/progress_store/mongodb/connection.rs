use mongodb::{Client, Database, bson::doc};
use tokio::time::sleep;
use tracing::{debug, warn};

use super::{
    config::MongoConfig,
    error::{MongoDaoError, MongoResult},
};

/// Build a client for `config` and wait until its database answers a ping.
///
/// Pings follow `config.retry`; the error of the last one is reported once
/// the attempts run out.
pub async fn establish_connection(config: &MongoConfig) -> MongoResult<(Client, Database)> {
    let client = Client::with_options(config.options.clone())
        .map_err(|source| MongoDaoError::ClientConstruction { source })?;
    let database = client.database(&config.database_name);

    let mut backoff = config.retry.backoff();
    let mut attempts = 1;
    while let Err(source) = database.run_command(doc! { "ping": 1 }).await {
        let Some(delay) = backoff.next() else {
            return Err(MongoDaoError::InitialPing { attempts, source });
        };
        warn!(
            database = %config.database_name,
            attempts,
            delay_ms = delay.as_millis() as u64,
            error = %source,
            "MongoDB not reachable yet, retrying"
        );
        sleep(delay).await;
        attempts += 1;
    }

    debug!(database = %config.database_name, attempts, "MongoDB connection established");
    Ok((client, database))
}
