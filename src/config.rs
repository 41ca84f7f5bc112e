//! Typed views over the sections of `openclaw.json` this tool touches.
//!
//! Every struct keeps the keys it does not model in `extra`, so an overlay
//! round-trip never drops or rewrites unrelated configuration. Modelled keys
//! are read leniently: a stored value of an unexpected shape reads as unset
//! and is left in place unless the patch overwrites it.

use clap::ValueEnum;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

pub const BROWSER: &[&str] = &["browser"];
pub const PLUGIN_ENTRIES: &[&str] = &["plugins", "entries"];
pub const TELEGRAM: &[&str] = &["channels", "telegram"];
pub const AGENT_DEFAULTS: &[&str] = &["agents", "defaults"];
pub const GATEWAY: &[&str] = &["gateway"];

/// Reads a modelled key; a value that does not fit `T` becomes `None`.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let raw = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(raw).ok())
}

/// `plugins.entries.<id>`
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct PluginEntry {
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowserSection {
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub default_profile: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DmPolicy {
    Pairing,
    Allowlist,
    Open,
    Disabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupPolicy {
    Open,
    Allowlist,
    Disabled,
}

/// `channels.telegram`. Per-account settings live under `accounts`, which is
/// left in `extra` and patched through [`TelegramAccount`].
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelegramChannel {
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub bot_token: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub dm_policy: Option<DmPolicy>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub allow_from: Option<Vec<String>>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub group_policy: Option<GroupPolicy>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `channels.telegram.accounts.<id>`
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelegramAccount {
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub bot_token: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ThinkingLevel {
    Off,
    Minimal,
    Low,
    Medium,
    High,
    Xhigh,
}

impl ThinkingLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            ThinkingLevel::Off => "off",
            ThinkingLevel::Minimal => "minimal",
            ThinkingLevel::Low => "low",
            ThinkingLevel::Medium => "medium",
            ThinkingLevel::High => "high",
            ThinkingLevel::Xhigh => "xhigh",
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentDefaults {
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub thinking_default: Option<ThinkingLevel>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct GatewaySection {
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn telegram_channel_keeps_unknown_keys() {
        let raw = json!({
            "enabled": true,
            "dmPolicy": "pairing",
            "streamMode": "partial",
            "accounts": { "work": { "botToken": "x" } }
        });
        let channel: TelegramChannel = serde_json::from_value(raw).unwrap();
        assert_eq!(channel.dm_policy, Some(DmPolicy::Pairing));
        assert_eq!(channel.extra["streamMode"], json!("partial"));
        assert!(channel.extra.contains_key("accounts"));

        let back = serde_json::to_value(&channel).unwrap();
        assert_eq!(back["accounts"]["work"]["botToken"], json!("x"));
        assert!(back.get("botToken").is_none());
    }

    #[test]
    fn thinking_level_wire_names() {
        assert_eq!(serde_json::to_value(ThinkingLevel::Xhigh).unwrap(), json!("xhigh"));
        assert_eq!(ThinkingLevel::Minimal.as_str(), "minimal");
        let parsed: ThinkingLevel = serde_json::from_value(json!("high")).unwrap();
        assert_eq!(parsed, ThinkingLevel::High);
    }

    #[test]
    fn unexpected_shapes_read_as_unset() {
        let entry: PluginEntry = serde_json::from_value(json!({ "enabled": "yes" })).unwrap();
        assert_eq!(entry.enabled, None);

        let channel: TelegramChannel = serde_json::from_value(json!({
            "allowFrom": [123456789],
            "dmPolicy": "everyone",
            "enabled": true
        }))
        .unwrap();
        assert_eq!(channel.allow_from, None);
        assert_eq!(channel.dm_policy, None);
        assert_eq!(channel.enabled, Some(true));
        assert!(!channel.extra.contains_key("allowFrom"));

        let defaults: AgentDefaults =
            serde_json::from_value(json!({ "thinkingDefault": "max" })).unwrap();
        assert_eq!(defaults.thinking_default, None);
    }

    #[test]
    fn explicit_null_reads_as_unset() {
        let gateway: GatewaySection = serde_json::from_value(json!({ "port": null })).unwrap();
        assert_eq!(gateway.port, None);
    }
}
