//! Remote store connection configuration.

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Connection parameters for the backing store, supplied once at startup by
/// the bootstrap layer. Connection failure is the bootstrap layer's problem;
/// nothing below it retries connection establishment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct StoreConfig {
    /// Store host name or address
    #[validate(length(min = 1_u64))]
    pub host: String,

    /// Store port
    #[validate(range(min = 1_u16))]
    pub port: u16,

    /// Logical database index, part of every notification channel id
    #[validate(range(min = 0_i64, max = 15_i64))]
    pub database: i64,

    /// Optional auth password
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 6379,
            database: 0,
            password: None,
        }
    }
}

impl StoreConfig {
    /// Connection URL in `redis://` form.
    pub fn url(&self) -> String {
        match &self.password {
            Some(password) => format!(
                "redis://:{}@{}:{}/{}",
                password, self.host, self.port, self.database
            ),
            None => format!("redis://{}:{}/{}", self.host, self.port, self.database),
        }
    }
}
