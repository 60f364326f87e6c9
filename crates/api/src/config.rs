use std::str::FromStr;
use std::time::Duration;

use meritum_events::{COMPLETION_GROUP_ID, COMPLETION_TOPIC, JOB_REQUESTS_TOPIC};

use crate::auth::jwt::JwtConfig;
use crate::ws::{ConnectionPolicy, PumpConfig, OUTBOUND_CAPACITY};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{key} must be {expected}, got '{value}'")]
    Invalid {
        key: &'static str,
        value: String,
        expected: &'static str,
    },
}

/// Which broker implementation backs the producer and consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerBackend {
    /// In-process queues. Nothing leaves the process.
    Memory,
    /// Kafka via `rdkafka` (requires the `kafka` cargo feature).
    Kafka,
}

impl FromStr for BrokerBackend {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "kafka" => Ok(Self::Kafka),
            _ => Err(()),
        }
    }
}

/// Broker connection and topic settings.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    pub backend: BrokerBackend,
    /// Comma-separated bootstrap servers for the Kafka backend.
    pub kafka_brokers: String,
    pub job_requests_topic: String,
    pub completion_topic: String,
    pub completion_group_id: String,
    pub publish_timeout: Duration,
    pub backoff_initial: Duration,
    pub backoff_max: Duration,
}

/// Real-time connection settings.
#[derive(Debug, Clone)]
pub struct WsConfig {
    pub policy: ConnectionPolicy,
    /// Outbound buffer size per connection, in messages.
    pub outbound_capacity: usize,
    pub pong_wait: Duration,
    pub write_wait: Duration,
}

impl WsConfig {
    pub fn pump_config(&self) -> PumpConfig {
        PumpConfig::new(self.pong_wait, self.write_wait)
    }
}

/// Server configuration loaded from environment variables.
///
/// All fields except the JWT secret have defaults suitable for local
/// development.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `8080`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// How long shutdown waits for each background task (default: `30`).
    pub shutdown_timeout_secs: u64,
    pub jwt: JwtConfig,
    pub broker: BrokerConfig,
    pub ws: WsConfig,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                       | Default                        |
    /// |-------------------------------|--------------------------------|
    /// | `HOST`                        | `0.0.0.0`                      |
    /// | `PORT`                        | `8080`                         |
    /// | `CORS_ORIGINS`                | `http://localhost:5173`        |
    /// | `REQUEST_TIMEOUT_SECS`        | `30`                           |
    /// | `SHUTDOWN_TIMEOUT_SECS`       | `30`                           |
    /// | `JWT_SECRET`                  | **required**                   |
    /// | `BROKER`                      | `memory`                       |
    /// | `KAFKA_BROKER_URL`            | `kafka:29092`                  |
    /// | `JOB_REQUESTS_TOPIC`          | `latex-compilation-requests`   |
    /// | `COMPLETION_TOPIC`            | `latex-compilation-results`    |
    /// | `COMPLETION_GROUP_ID`         | `api-completion-consumers`     |
    /// | `PUBLISH_TIMEOUT_SECS`        | `10`                           |
    /// | `CONSUMER_BACKOFF_INITIAL_MS` | `2000`                         |
    /// | `CONSUMER_BACKOFF_MAX_MS`     | `30000`                        |
    /// | `WS_CONNECTION_POLICY`        | `replace`                      |
    /// | `WS_OUTBOUND_CAPACITY`        | `256`                          |
    /// | `WS_PONG_WAIT_SECS`           | `60`                           |
    /// | `WS_WRITE_WAIT_SECS`          | `10`                           |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_fn(|key| std::env::var(key))
    }

    /// Testable constructor that accepts an environment lookup function.
    pub fn from_env_fn<F>(env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Result<String, std::env::VarError>,
    {
        let var = |key: &str, default: &str| env(key).unwrap_or_else(|_| default.to_string());

        let host = var("HOST", "0.0.0.0");
        let port: u16 = parse(&env, "PORT", 8080, "a valid u16")?;

        let cors_origins: Vec<String> = var("CORS_ORIGINS", "http://localhost:5173")
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if let Some(bad) = cors_origins
            .iter()
            .find(|o| o.parse::<axum::http::HeaderValue>().is_err())
        {
            return Err(ConfigError::Invalid {
                key: "CORS_ORIGINS",
                value: bad.clone(),
                expected: "a comma-separated list of origins",
            });
        }

        let request_timeout_secs = parse(&env, "REQUEST_TIMEOUT_SECS", 30, "a valid u64")?;
        let shutdown_timeout_secs = parse(&env, "SHUTDOWN_TIMEOUT_SECS", 30, "a valid u64")?;

        let secret = env("JWT_SECRET")
            .ok()
            .filter(|s| !s.is_empty())
            .ok_or(ConfigError::Missing("JWT_SECRET"))?;
        let jwt = JwtConfig::new(secret);

        let backend_raw = var("BROKER", "memory");
        let backend = backend_raw
            .parse::<BrokerBackend>()
            .map_err(|()| ConfigError::Invalid {
                key: "BROKER",
                value: backend_raw.clone(),
                expected: "one of 'memory', 'kafka'",
            })?;

        let broker = BrokerConfig {
            backend,
            kafka_brokers: var("KAFKA_BROKER_URL", "kafka:29092"),
            job_requests_topic: var("JOB_REQUESTS_TOPIC", JOB_REQUESTS_TOPIC),
            completion_topic: var("COMPLETION_TOPIC", COMPLETION_TOPIC),
            completion_group_id: var("COMPLETION_GROUP_ID", COMPLETION_GROUP_ID),
            publish_timeout: Duration::from_secs(parse(
                &env,
                "PUBLISH_TIMEOUT_SECS",
                10,
                "a valid u64",
            )?),
            backoff_initial: Duration::from_millis(parse(
                &env,
                "CONSUMER_BACKOFF_INITIAL_MS",
                2000,
                "a valid u64",
            )?),
            backoff_max: Duration::from_millis(parse(
                &env,
                "CONSUMER_BACKOFF_MAX_MS",
                30_000,
                "a valid u64",
            )?),
        };

        let policy_raw = var("WS_CONNECTION_POLICY", "replace");
        let policy = policy_raw
            .parse::<ConnectionPolicy>()
            .map_err(|()| ConfigError::Invalid {
                key: "WS_CONNECTION_POLICY",
                value: policy_raw.clone(),
                expected: "one of 'replace', 'fanout'",
            })?;

        let outbound_capacity: usize = parse(
            &env,
            "WS_OUTBOUND_CAPACITY",
            OUTBOUND_CAPACITY,
            "a positive integer",
        )?;
        if outbound_capacity == 0 {
            return Err(ConfigError::Invalid {
                key: "WS_OUTBOUND_CAPACITY",
                value: "0".into(),
                expected: "a positive integer",
            });
        }

        let ws = WsConfig {
            policy,
            outbound_capacity,
            pong_wait: Duration::from_secs(positive(&env, "WS_PONG_WAIT_SECS", 60)?),
            write_wait: Duration::from_secs(positive(&env, "WS_WRITE_WAIT_SECS", 10)?),
        };

        Ok(Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            shutdown_timeout_secs,
            jwt,
            broker,
            ws,
        })
    }
}

fn parse<F, T>(env: &F, key: &'static str, default: T, expected: &'static str) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
    T: FromStr,
{
    match env(key) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
            key,
            value: raw,
            expected,
        }),
        Err(_) => Ok(default),
    }
}

/// Whole seconds that must be non-zero. A zero pong wait yields a zero ping
/// period and a zero write wait fails every write.
fn positive<F>(env: &F, key: &'static str, default: u64) -> Result<u64, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    match parse(env, key, default, "a positive integer")? {
        0 => Err(ConfigError::Invalid {
            key,
            value: "0".into(),
            expected: "a positive integer",
        }),
        n => Ok(n),
    }
}
