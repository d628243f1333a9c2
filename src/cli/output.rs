//! Output formatting for CLI commands
//!
//! JSON and YAML work for every command. Table output is rendered per data
//! type; credentials are always masked.

use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::Serialize;

use crate::secrets::{FlatKeys, KeyQuota, RotationState, UsageMetrics};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum OutputFormat {
    Json,
    Yaml,
    #[default]
    Table,
}

/// Print data as JSON
pub fn print_json<T: Serialize>(data: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(data).context("Failed to serialize to JSON")?;
    println!("{}", json);
    Ok(())
}

/// Print data as YAML
pub fn print_yaml<T: Serialize>(data: &T) -> Result<()> {
    let yaml = serde_yaml::to_string(data).context("Failed to serialize to YAML")?;
    println!("{}", yaml);
    Ok(())
}

/// Print structured data, using `table` for the table format
pub fn print_with<T: Serialize>(data: &T, format: OutputFormat, table: impl FnOnce(&T)) -> Result<()> {
    match format {
        OutputFormat::Json => print_json(data),
        OutputFormat::Yaml => print_yaml(data),
        OutputFormat::Table => {
            table(data);
            Ok(())
        }
    }
}

/// Show the first four and last four characters of a credential.
pub fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}

/// Truncate string to maximum length with ellipsis
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Print a horizontal separator line
pub fn print_separator(width: usize) {
    println!("{}", "-".repeat(width));
}

/// Print a table header
pub fn print_table_header(columns: &[(&str, usize)]) {
    println!();
    let mut header = String::new();
    for (name, width) in columns {
        header.push_str(&format!("{:<width$} ", name, width = width));
    }
    println!("{}", header.trim());

    let total_width: usize = columns.iter().map(|(_, w)| w + 1).sum();
    print_separator(total_width.saturating_sub(1));
}

/// Masked copy of the flat key view, safe to print.
pub fn masked_keys(keys: &FlatKeys) -> FlatKeys {
    FlatKeys {
        groq_api_key_1: keys.groq_api_key_1.as_deref().map(mask_key),
        groq_api_key_2: keys.groq_api_key_2.as_deref().map(mask_key),
        mistral_api_key: keys.mistral_api_key.as_deref().map(mask_key),
    }
}

pub fn print_keys_table(keys: &FlatKeys) {
    print_table_header(&[("Variable", 16), ("Value", 24)]);
    let rows = [
        ("groqApiKey1", &keys.groq_api_key_1),
        ("groqApiKey2", &keys.groq_api_key_2),
        ("mistralApiKey", &keys.mistral_api_key),
    ];
    for (name, value) in rows {
        println!("{:<16} {}", name, value.as_deref().unwrap_or("(unset)"));
    }
}

pub fn print_quota_table(quota: &[KeyQuota]) {
    if quota.is_empty() {
        println!("No Groq accounts configured");
        return;
    }
    print_table_header(&[
        ("Account", 16),
        ("Today", 8),
        ("Limit", 8),
        ("Remaining", 10),
        ("Health", 10),
        ("Available", 10),
        ("Active", 6),
    ]);
    for q in quota {
        let limit = q.daily_limit.map_or("-".to_string(), |l| l.to_string());
        let remaining = q.remaining.map_or("-".to_string(), |r| r.to_string());
        println!(
            "{:<16} {:<8} {:<8} {:<10} {:<10} {:<10} {}",
            truncate(&q.id, 16),
            q.requests_today,
            limit,
            remaining,
            q.health.to_string(),
            if q.available { "yes" } else { "no" },
            if q.active { "*" } else { "" }
        );
    }
}

pub fn print_state_table(state: &RotationState) {
    println!("Active key:     {}", state.active_key.as_deref().unwrap_or("-"));
    println!("Rotation index: {}", state.rotation_index);
    println!("Failure count:  {}", state.failure_count);
    println!("Health:         {}", state.health_status.status);
    if let Some(at) = state.last_rotated_at {
        println!("Last rotated:   {}", at.to_rfc3339());
    }
    if state.key_health.is_empty() {
        return;
    }
    print_table_header(&[("Key", 16), ("Status", 10), ("Errors", 8), ("Last error", 40)]);
    for (id, health) in &state.key_health {
        println!(
            "{:<16} {:<10} {:<8} {}",
            truncate(id, 16),
            health.status.to_string(),
            health.error_count,
            truncate(health.last_error.as_deref().unwrap_or("-"), 40)
        );
    }
}

pub fn print_metrics_table(metrics: &UsageMetrics) {
    println!("Total requests: {}", metrics.total_requests);
    println!("Errors:         {}", metrics.error_count);
    if metrics.usage_by_key.is_empty() {
        return;
    }
    print_table_header(&[("Key", 16), ("Requests", 10), ("Errors", 8), ("Today", 8), ("Last used", 25)]);
    for (id, usage) in &metrics.usage_by_key {
        println!(
            "{:<16} {:<10} {:<8} {:<8} {}",
            truncate(id, 16),
            usage.requests,
            usage.errors,
            usage.requests_today,
            usage.last_used_at.map_or("-".to_string(), |t| t.to_rfc3339())
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_key() {
        assert_eq!(mask_key("gsk_abcdefghijklmnop"), "gsk_...mnop");
        assert_eq!(mask_key("short"), "*****");
        assert_eq!(mask_key(""), "");
    }

    #[test]
    fn test_masked_keys_hide_values() {
        let keys = FlatKeys {
            groq_api_key_1: Some("gsk_1234567890abcdef".to_string()),
            groq_api_key_2: None,
            mistral_api_key: Some("mistral-secret-value".to_string()),
        };
        let masked = masked_keys(&keys);
        assert_eq!(masked.groq_api_key_1.as_deref(), Some("gsk_...cdef"));
        assert_eq!(masked.groq_api_key_2, None);
        assert!(!serde_json::to_string(&masked).unwrap().contains("secret-value"));
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("hello", 10), "hello");
        assert_eq!(truncate("hello world", 8), "hello...");
        assert_eq!(truncate("hello", 3), "...");
    }

    #[test]
    fn test_print_formats() {
        let metrics = UsageMetrics::default();
        assert!(print_with(&metrics, OutputFormat::Json, print_metrics_table).is_ok());
        assert!(print_with(&metrics, OutputFormat::Yaml, print_metrics_table).is_ok());
        assert!(print_with(&metrics, OutputFormat::Table, print_metrics_table).is_ok());
    }
}
