use std::{iter, time::Duration};

use mongodb::{
    Client, Database, bson::doc, error::Error as MongoError, options::ClientOptions,
};
use tokio::time::sleep;
use tracing::debug;

use super::error::{MongoDaoError, MongoResult};

const DEFAULT_DATABASE: &str = "counting";

/// Backoff schedule for the first ping after a client is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Doubling delays capped at `max_delay`.
    fn delays(self) -> impl Iterator<Item = Duration> {
        iter::successors(Some(self.initial_delay), move |delay| {
            Some((*delay * 2).min(self.max_delay))
        })
    }
}

/// Parsed connection string, target database and connect retry schedule.
#[derive(Clone)]
pub struct MongoConfig {
    options: ClientOptions,
    database_name: String,
    retry: RetryPolicy,
}

impl MongoConfig {
    /// Parse `uri`; the database defaults to `counting`.
    pub async fn from_uri(uri: &str, db_name: Option<&str>) -> MongoResult<Self> {
        let options = ClientOptions::parse(uri)
            .await
            .map_err(|source| MongoDaoError::InvalidUri {
                uri: uri.to_owned(),
                source,
            })?;

        Ok(Self {
            options,
            database_name: db_name.unwrap_or(DEFAULT_DATABASE).to_owned(),
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn database_name(&self) -> &str {
        &self.database_name
    }

    /// Build a client and wait, with backoff, until the server answers a ping.
    pub async fn connect(&self) -> MongoResult<(Client, Database)> {
        let client = Client::with_options(self.options.clone())
            .map_err(|source| MongoDaoError::ClientConstruction { source })?;
        let database = client.database(&self.database_name);

        let mut delays = self.retry.delays();
        let mut attempts = 0;
        loop {
            attempts += 1;
            match ping(&database).await {
                Ok(()) => return Ok((client, database)),
                Err(source) if attempts >= self.retry.max_attempts => {
                    return Err(MongoDaoError::InitialPing { attempts, source });
                }
                Err(err) => {
                    let delay = delays.next().unwrap_or(self.retry.max_delay);
                    debug!(attempts, ?delay, error = %err, "MongoDB ping failed; retrying");
                    sleep(delay).await;
                }
            }
        }
    }
}

pub(super) async fn ping(database: &Database) -> Result<(), MongoError> {
    database.run_command(doc! { "ping": 1 }).await.map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_double_up_to_the_cap() {
        let policy = RetryPolicy {
            max_attempts: 5,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
        };

        let delays: Vec<_> = policy.delays().take(5).collect();
        assert_eq!(
            delays,
            [100, 200, 400, 500, 500].map(Duration::from_millis)
        );
    }

    #[tokio::test]
    async fn database_defaults_when_not_given() {
        let config = MongoConfig::from_uri("mongodb://localhost:27017", None)
            .await
            .unwrap();
        assert_eq!(config.database_name(), "counting");

        let config = MongoConfig::from_uri("mongodb://localhost:27017", Some("counting_test"))
            .await
            .unwrap();
        assert_eq!(config.database_name(), "counting_test");
    }

    #[tokio::test]
    async fn malformed_uri_is_rejected() {
        assert!(matches!(
            MongoConfig::from_uri("not-a-uri", None).await,
            Err(MongoDaoError::InvalidUri { .. })
        ));
    }
}
