//! # Logging Configuration
//!
//! Logging of the topic and user operators.
//!
//! Logging is either declared inline (logger name -> level) or read from a key of an
//! existing ConfigMap. Either way the controller renders a log4j2 properties document
//! into the manager's logging ConfigMap.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Log level
///
/// Levels follow the log4j2 hierarchy: TRACE is the most verbose, OFF disables logging.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, PartialOrd, Ord, JsonSchema,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    Fatal,
    Off,
}

impl LogLevel {
    /// Check if a log level should be emitted
    ///
    /// Returns true if the requested level is at least as severe as the configured level.
    pub fn should_log(&self, requested_level: &LogLevel) -> bool {
        *self != LogLevel::Off && requested_level >= self
    }

    /// Name of the level in a log4j2 properties document
    pub fn as_log4j(&self) -> &'static str {
        match self {
            LogLevel::Trace => "TRACE",
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
            LogLevel::Fatal => "FATAL",
            LogLevel::Off => "OFF",
        }
    }
}

/// Logging configuration of one manager
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum Logging {
    /// Loggers declared in the custom resource
    Inline {
        /// Logger name to level, `rootLogger.level` sets the root logger
        #[serde(default)]
        loggers: BTreeMap<String, LogLevel>,
    },
    /// Complete log4j2 configuration read from an existing ConfigMap
    External {
        #[serde(rename = "valueFrom")]
        value_from: ExternalLoggingSource,
    },
}

/// Source of an external logging configuration
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExternalLoggingSource {
    pub config_map_key_ref: ConfigMapKeyRef,
}

/// Reference to a key of a ConfigMap in the cluster namespace
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConfigMapKeyRef {
    pub name: String,
    pub key: String,
}
