use std::{env, time::Duration};

use mongodb::options::ClientOptions;

use super::error::{MongoDaoError, MongoResult};

const DEFAULT_DATABASE: &str = "evolution_town";

/// How the initial connection keeps pinging a server that is not up yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectRetry {
    /// Total number of pings, the first one included. Zero is treated as one.
    pub attempts: u32,
    /// Wait after the first failed ping; doubled after each further failure.
    pub initial_backoff: Duration,
    /// Upper bound of a single wait.
    pub max_backoff: Duration,
}

impl Default for ConnectRetry {
    fn default() -> Self {
        Self {
            attempts: 10,
            initial_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(5),
        }
    }
}

impl ConnectRetry {
    /// Waits between consecutive pings, one fewer than the number of attempts.
    pub fn backoff(&self) -> impl Iterator<Item = Duration> {
        let max = self.max_backoff;
        std::iter::successors(Some(self.initial_backoff.min(max)), move |delay| {
            Some(delay.saturating_mul(2).min(max))
        })
        .take(self.attempts.saturating_sub(1) as usize)
    }
}

#[derive(Clone)]
pub struct MongoConfig {
    pub options: ClientOptions,
    pub database_name: String,
    pub retry: ConnectRetry,
}

impl MongoConfig {
    pub async fn from_uri(uri: &str, db_name: Option<&str>) -> MongoResult<Self> {
        let database_name = db_name.unwrap_or(DEFAULT_DATABASE).to_owned();
        let options =
            ClientOptions::parse(uri)
                .await
                .map_err(|source| MongoDaoError::InvalidUri {
                    uri: uri.to_owned(),
                    source,
                })?;

        Ok(Self {
            options,
            database_name,
            retry: ConnectRetry::default(),
        })
    }

    pub fn with_retry(mut self, retry: ConnectRetry) -> Self {
        self.retry = retry;
        self
    }

    /// Read `MONGO_URI` (required), `MONGO_DB` and `MONGO_CONNECT_ATTEMPTS` (optional).
    pub async fn from_env() -> MongoResult<Self> {
        let uri =
            env::var("MONGO_URI").map_err(|_| MongoDaoError::MissingEnvVar { var: "MONGO_URI" })?;
        let db = env::var("MONGO_DB").ok();
        let mut retry = ConnectRetry::default();
        if let Ok(raw) = env::var("MONGO_CONNECT_ATTEMPTS") {
            retry.attempts = parse_attempts(&raw)?;
        }
        Ok(Self::from_uri(&uri, db.as_deref()).await?.with_retry(retry))
    }
}

fn parse_attempts(raw: &str) -> MongoResult<u32> {
    raw.trim()
        .parse::<u32>()
        .ok()
        .filter(|attempts| *attempts > 0)
        .ok_or_else(|| MongoDaoError::InvalidEnvVar {
            var: "MONGO_CONNECT_ATTEMPTS",
            value: raw.to_owned(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_backoff_doubles_up_to_the_cap() {
        let delays: Vec<_> = ConnectRetry::default().backoff().collect();
        let millis: Vec<_> = delays.iter().map(Duration::as_millis).collect();
        assert_eq!(
            millis,
            vec![250, 500, 1_000, 2_000, 4_000, 5_000, 5_000, 5_000, 5_000]
        );
    }

    #[test]
    fn single_attempt_never_waits() {
        for attempts in [0, 1] {
            let retry = ConnectRetry {
                attempts,
                ..ConnectRetry::default()
            };
            assert_eq!(retry.backoff().count(), 0);
        }
    }

    #[test]
    fn initial_backoff_above_the_cap_is_clamped() {
        let retry = ConnectRetry {
            attempts: 3,
            initial_backoff: Duration::from_secs(30),
            max_backoff: Duration::from_secs(2),
        };
        assert!(retry.backoff().all(|delay| delay == Duration::from_secs(2)));
    }

    #[test]
    fn connect_attempts_must_be_a_positive_integer() {
        assert_eq!(parse_attempts(" 3 ").unwrap(), 3);
        for raw in ["0", "-1", "many"] {
            assert!(matches!(
                parse_attempts(raw),
                Err(MongoDaoError::InvalidEnvVar { .. })
            ));
        }
    }
}
