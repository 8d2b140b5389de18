// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 34334;

const MAIN_DB_FILENAME: &str = "main_db.txt";
const PRIV_USERS_DB_FILENAME: &str = "priv_user_db.txt";
const NORM_USERS_DB_FILENAME: &str = "norm_user_db.txt";
const JOURNAL_FILENAME: &str = "recovery_data.txt";
const LOG_DIRNAME: &str = "logs";

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
#[serde(default)]
pub struct Config {
    /// Listener parameters.
    pub server: ServerConfig,
    /// Runtime knobs that never travel over the wire.
    pub runtime: RuntimeConfig,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ServerConfig {
    #[serde(rename = "Bind")]
    /// Listen address; the service binds every interface by default.
    pub bind: String,
    #[serde(rename = "Port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct RuntimeConfig {
    #[serde(rename = "ResourcesDir")]
    /// Directory holding the snapshots, the journal and the logs.
    pub resources_dir: PathBuf,

    #[serde(rename = "SessionReadTimeout", with = "serde_secs")]
    /// Idle read bound per session; an expiry closes the session.
    pub session_read_timeout: Duration,
    #[serde(rename = "SocketWriteTimeout", with = "serde_secs")]
    pub socket_write_timeout: Duration,

    #[serde(rename = "FailedLoginSleep", with = "serde_secs")]
    /// Delay applied before every authentication-failure response.
    pub failed_login_sleep: Duration,
    #[serde(rename = "MaxLoginAttempts")]
    /// Login attempts per connection before TOO_MANY_TRY.
    pub max_login_attempts: u32,

    #[serde(rename = "JournalQueueDepth")]
    /// Bound of the mutation queue feeding the journal writer.
    pub journal_queue_depth: usize,

    #[serde(rename = "StoreWriteDeadline", with = "serde_secs")]
    /// Per-coordinator writer-acquire deadline during shutdown.
    pub store_write_deadline: Duration,
    #[serde(rename = "ShutdownDeadline", with = "serde_secs")]
    /// Global deadline from the shutdown trigger to forced exit.
    pub shutdown_deadline: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            resources_dir: PathBuf::from("server_resources"),
            session_read_timeout: Duration::from_secs(300),
            socket_write_timeout: Duration::from_secs(10),
            failed_login_sleep: Duration::from_secs(5),
            max_login_attempts: 5,
            journal_queue_depth: 64,
            store_write_deadline: Duration::from_secs(12),
            shutdown_deadline: Duration::from_secs(30),
        }
    }
}

impl Config {
    /// Loads the configuration from YAML, validates it, and returns the
    /// ready-to-use value.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let s = fs::read_to_string(path)?;
        let mut cfg: Config =
            serde_yaml::from_str(&s).context("failed to parse config YAML")?;
        cfg.validate_and_normalize()?;
        Ok(cfg)
    }

    /// Validates invariants and normalizes derived fields.
    pub fn validate_and_normalize(&mut self) -> Result<()> {
        ensure!(!self.server.bind.is_empty(), "Bind must not be empty");
        ensure!(
            self.runtime.max_login_attempts >= 1,
            "MaxLoginAttempts must be >= 1"
        );
        ensure!(
            self.runtime.journal_queue_depth >= 1,
            "JournalQueueDepth must be >= 1"
        );
        ensure!(
            self.runtime.shutdown_deadline >= self.runtime.store_write_deadline,
            "ShutdownDeadline must cover StoreWriteDeadline"
        );
        Ok(())
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.server.bind, self.server.port)
    }

    pub fn main_db_path(&self) -> PathBuf {
        self.runtime.resources_dir.join(MAIN_DB_FILENAME)
    }

    pub fn priv_users_db_path(&self) -> PathBuf {
        self.runtime.resources_dir.join(PRIV_USERS_DB_FILENAME)
    }

    pub fn norm_users_db_path(&self) -> PathBuf {
        self.runtime.resources_dir.join(NORM_USERS_DB_FILENAME)
    }

    pub fn journal_path(&self) -> PathBuf {
        self.runtime.resources_dir.join(JOURNAL_FILENAME)
    }

    pub fn log_dir(&self) -> PathBuf {
        self.runtime.resources_dir.join(LOG_DIRNAME)
    }
}

/// Serde helpers for representing `Duration` as a number of seconds.
mod serde_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }
    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(d)?;
        Ok(Duration::from_secs(secs))
    }
}
