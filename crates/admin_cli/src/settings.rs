//! Settings for the admin CLI, read from an optional TOML file and
//! `ERARIO__*` environment variables (`ERARIO__APP__LEVEL=debug`).
//!
//! ```toml
//! [app]
//! level = "info"
//!
//! [database]
//! sqlite = "./erario.db"
//!
//! [ledger]
//! organization_code = "43022"
//! paid_total_policy = "active_only"
//! max_number_attempts = 5
//! ```
use std::path::Path;

use config::{Config, ConfigError, Environment, File, FileFormat};
use engine::{EngineOptions, OrganizationCode, PaidTotalPolicy};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct App {
    pub level: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Database {
    Memory,
    Sqlite(String),
}

impl Database {
    pub fn url(&self) -> String {
        match self {
            Database::Memory => String::from("sqlite::memory:"),
            Database::Sqlite(path) => format!("sqlite:{path}?mode=rwc"),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Ledger {
    pub organization_code: String,
    pub paid_total_policy: PaidTotalPolicy,
    pub max_number_attempts: u32,
}

impl Default for Ledger {
    fn default() -> Self {
        let options = EngineOptions::default();
        Self {
            organization_code: options.organization_code.as_str().to_string(),
            paid_total_policy: options.paid_total_policy,
            max_number_attempts: options.max_number_attempts,
        }
    }
}

impl Ledger {
    pub fn engine_options(&self) -> Result<EngineOptions, engine::EngineError> {
        Ok(EngineOptions {
            organization_code: self.organization_code.parse::<OrganizationCode>()?,
            paid_total_policy: self.paid_total_policy,
            max_number_attempts: self.max_number_attempts,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub app: App,
    pub database: Option<Database>,
    #[serde(default)]
    pub ledger: Ledger,
}

impl Settings {
    pub fn new(path: &Path) -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .set_default("app.level", "info")?
            .add_source(
                File::from(path)
                    .format(FileFormat::Toml)
                    .required(false),
            )
            .add_source(Environment::with_prefix("ERARIO").separator("__"))
            .build()?;

        settings.try_deserialize()
    }

    /// Connection string, `DATABASE_URL` style. Defaults to `./erario.db`.
    pub fn database_url(&self) -> String {
        match &self.database {
            Some(database) => database.url(),
            None => Database::Sqlite(String::from("./erario.db")).url(),
        }
    }
}
