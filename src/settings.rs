//! Application settings.
//!
//! Read from an optional `settings.toml` next to the binary, then from
//! `TRICOUNT__SECTION__KEY` environment variables (a `.env` file is loaded
//! first). `MONGODB_URI` is still honoured when no database uri is set.
use config::{builder::DefaultState, Config, ConfigBuilder, ConfigError, Environment, File};
use serde::Deserialize;

use crate::settlement::{Tolerance, DEFAULT_EPSILON, DEFAULT_PRECISION};

/// Past this many decimals `10^precision` loses integer exactness in an f64.
pub const MAX_PRECISION: u32 = 15;

#[derive(Debug, Deserialize)]
pub struct Server {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for Server {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    String::from("0.0.0.0")
}

fn default_port() -> u16 {
    8080
}

#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseKind {
    #[default]
    Mongo,
    Memory,
}

#[derive(Debug, Deserialize)]
pub struct Database {
    #[serde(default)]
    pub kind: DatabaseKind,
    pub uri: Option<String>,
    #[serde(default = "default_database_name")]
    pub name: String,
}

impl Default for Database {
    fn default() -> Self {
        Self {
            kind: DatabaseKind::default(),
            uri: None,
            name: default_database_name(),
        }
    }
}

fn default_database_name() -> String {
    String::from("Tricount")
}

#[derive(Debug, Deserialize)]
pub struct Engine {
    #[serde(default = "default_epsilon")]
    pub epsilon: f64,
    #[serde(default = "default_precision")]
    pub precision: u32,
}

impl Default for Engine {
    fn default() -> Self {
        Self {
            epsilon: DEFAULT_EPSILON,
            precision: DEFAULT_PRECISION,
        }
    }
}

fn default_epsilon() -> f64 {
    DEFAULT_EPSILON
}

fn default_precision() -> u32 {
    DEFAULT_PRECISION
}

impl Engine {
    pub fn tolerance(&self) -> Tolerance {
        Tolerance::new(self.epsilon, self.precision)
    }
}

#[derive(Debug, Deserialize)]
pub struct Auth {
    /// Key material for password hashing.
    pub secret: String,
}

#[derive(Debug, Deserialize)]
pub struct Log {
    #[serde(default = "default_level")]
    pub level: String,
}

impl Default for Log {
    fn default() -> Self {
        Self {
            level: default_level(),
        }
    }
}

fn default_level() -> String {
    String::from("info")
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: Server,
    #[serde(default)]
    pub database: Database,
    #[serde(default)]
    pub engine: Engine,
    pub auth: Auth,
    #[serde(default)]
    pub log: Log,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        let builder = Config::builder()
            .add_source(File::with_name("settings").required(false))
            .add_source(Environment::with_prefix("TRICOUNT").separator("__"));

        let mut settings = Self::from_builder(builder)?;
        if settings.database.uri.is_none() {
            settings.database.uri = std::env::var("MONGODB_URI").ok();
        }
        Ok(settings)
    }

    pub fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
        let settings: Self = builder.build()?.try_deserialize()?;
        let epsilon = settings.engine.epsilon;
        if epsilon.is_nan() || epsilon < 0.0 {
            return Err(ConfigError::Message(format!(
                "engine.epsilon must be a non-negative number, got {epsilon}"
            )));
        }
        let precision = settings.engine.precision;
        if precision > MAX_PRECISION {
            return Err(ConfigError::Message(format!(
                "engine.precision must be at most {MAX_PRECISION}, got {precision}"
            )));
        }
        Ok(settings)
    }
}
