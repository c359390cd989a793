//! log4j2 configuration of the managers.

use crate::crd::LogLevel;
use std::collections::BTreeMap;

const ROOT_LOGGER_KEY: &str = "rootLogger.level";

/// Render a log4j2 properties document from inline loggers
///
/// `rootLogger.level` overrides the root level (INFO by default). Every other entry
/// is a logger name. Output is ordered so equal input renders byte-identical text.
pub fn render_log4j2(config_name: &str, loggers: &BTreeMap<String, LogLevel>) -> String {
    let root_level = loggers
        .get(ROOT_LOGGER_KEY)
        .copied()
        .unwrap_or_default();

    let mut lines = vec![
        format!("name = {config_name}"),
        "monitorInterval = 30".to_string(),
        "appender.console.type = Console".to_string(),
        "appender.console.name = STDOUT".to_string(),
        "appender.console.layout.type = PatternLayout".to_string(),
        "appender.console.layout.pattern = %d{yyyy-MM-dd HH:mm:ss} %-5p %c{1}:%L - %m%n"
            .to_string(),
        format!("rootLogger.level = {}", root_level.as_log4j()),
        "rootLogger.appenderRefs = stdout".to_string(),
        "rootLogger.appenderRef.console.ref = STDOUT".to_string(),
        "rootLogger.additivity = false".to_string(),
    ];

    for (name, level) in loggers.iter().filter(|(k, _)| *k != ROOT_LOGGER_KEY) {
        let id = logger_id(name);
        lines.push(format!("logger.{id}.name = {name}"));
        lines.push(format!("logger.{id}.level = {}", level.as_log4j()));
    }

    let mut document = lines.join("\n");
    document.push('\n');
    document
}

/// log4j2 logger ids may not contain dots
fn logger_id(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}
