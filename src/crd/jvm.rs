//! # JVM Options
//!
//! JVM tuning of a manager container, rendered into environment variables.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const DEFAULT_JVM_DEBUG_PORT: u16 = 5005;

/// JVM options of a manager container
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct JvmOptions {
    /// `-Xms` option, e.g. `256m`
    #[serde(default, rename = "-Xms")]
    pub xms: Option<String>,
    /// `-Xmx` option, e.g. `1g`
    #[serde(default, rename = "-Xmx")]
    pub xmx: Option<String>,
    /// `-XX` options. `true`/`false` values become `-XX:+Name`/`-XX:-Name`
    #[serde(default, rename = "-XX")]
    pub xx: BTreeMap<String, String>,
    #[serde(default)]
    pub gc_logging_enabled: bool,
    /// Passed to the JVM with `-D`
    #[serde(default)]
    pub java_system_properties: Vec<SystemProperty>,
    #[serde(default)]
    pub jvm_debug: bool,
    #[serde(default)]
    pub jvm_debug_suspend: bool,
    #[serde(default)]
    pub jvm_debug_port: Option<u16>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, JsonSchema)]
pub struct SystemProperty {
    pub name: String,
    pub value: String,
}

impl JvmOptions {
    /// Validate heap sizes (`^[0-9]+[mMgG]?$`)
    pub fn validate(&self) -> Result<(), String> {
        for (option, value) in [("-Xms", &self.xms), ("-Xmx", &self.xmx)] {
            if let Some(value) = value {
                if !is_heap_size(value) {
                    return Err(format!("{option} value '{value}' is not a valid heap size"));
                }
            }
        }
        Ok(())
    }

    /// Value of the `JAVA_OPTS` variable, None when no option is set
    pub fn java_opts(&self) -> Option<String> {
        let mut opts = Vec::new();
        if let Some(xms) = &self.xms {
            opts.push(format!("-Xms{xms}"));
        }
        if let Some(xmx) = &self.xmx {
            opts.push(format!("-Xmx{xmx}"));
        }
        for (name, value) in &self.xx {
            match value.as_str() {
                "true" => opts.push(format!("-XX:+{name}")),
                "false" => opts.push(format!("-XX:-{name}")),
                _ => opts.push(format!("-XX:{name}={value}")),
            }
        }
        if self.jvm_debug {
            opts.push(format!(
                "-agentlib:jdwp=transport=dt_socket,server=y,suspend={},address=*:{}",
                if self.jvm_debug_suspend { "y" } else { "n" },
                self.jvm_debug_port.unwrap_or(DEFAULT_JVM_DEBUG_PORT)
            ));
        }
        (!opts.is_empty()).then(|| opts.join(" "))
    }

    /// Value of the `JAVA_SYSTEM_PROPERTIES` variable, None when empty
    pub fn java_system_properties(&self) -> Option<String> {
        (!self.java_system_properties.is_empty()).then(|| {
            self.java_system_properties
                .iter()
                .map(|p| format!("-D{}={}", p.name, p.value))
                .collect::<Vec<_>>()
                .join(" ")
        })
    }
}

fn is_heap_size(value: &str) -> bool {
    let digits = value.trim_end_matches(['m', 'M', 'g', 'G']);
    // at most one unit suffix
    value.len() - digits.len() <= 1
        && !digits.is_empty()
        && digits.chars().all(|c| c.is_ascii_digit())
}
