//! Patches applied to a profile document. Each one is idempotent and reports
//! whether it changed anything, so repeated runs can tell "newly applied"
//! from "already applied".

use crate::config::{
    AGENT_DEFAULTS, AgentDefaults, BROWSER, BrowserSection, DmPolicy, GATEWAY, GatewaySection,
    GroupPolicy, PLUGIN_ENTRIES, PluginEntry, TELEGRAM, TelegramAccount, TelegramChannel,
    ThinkingLevel,
};
use crate::discovery::PluginDescriptor;
use crate::document::ProfileDocument;
use crate::error::ReconcileError;
use crate::utils::DEFAULT_GATEWAY_PORT;
use tracing::warn;

pub const DEFAULT_BROWSER_PROFILE: &str = "chrome";
pub const DEFAULT_ACCOUNT: &str = "default";
const TELEGRAM_PLUGIN: &str = "telegram";

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EnableTally {
    pub newly_enabled: usize,
    pub already_enabled: usize,
}

impl std::ops::AddAssign for EnableTally {
    fn add_assign(&mut self, other: Self) {
        self.newly_enabled += other.newly_enabled;
        self.already_enabled += other.already_enabled;
    }
}

/// Sets `enabled = true` on one `plugins.entries.<id>` record. Returns
/// `true` when the plugin was not already enabled.
pub fn enable_plugin(doc: &mut ProfileDocument, id: &str) -> Result<bool, ReconcileError> {
    let entry_path: Vec<&str> = PLUGIN_ENTRIES.iter().copied().chain([id]).collect();
    doc.overlay(&entry_path, |entry: &mut PluginEntry| {
        let already = entry.enabled == Some(true);
        entry.enabled = Some(true);
        !already
    })
}

pub fn enable_plugins(
    doc: &mut ProfileDocument,
    plugins: &[PluginDescriptor],
) -> Result<EnableTally, ReconcileError> {
    let mut tally = EnableTally::default();
    for plugin in plugins {
        if enable_plugin(doc, &plugin.id)? {
            tally.newly_enabled += 1;
        } else {
            tally.already_enabled += 1;
        }
    }
    Ok(tally)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowserChange {
    pub newly_enabled: bool,
    pub default_profile_set: bool,
    pub default_profile: String,
}

impl BrowserChange {
    pub fn changed(&self) -> bool {
        self.newly_enabled || self.default_profile_set
    }
}

/// Turns on the browser relay. An existing `defaultProfile` is kept.
pub fn enable_browser(doc: &mut ProfileDocument) -> Result<BrowserChange, ReconcileError> {
    doc.overlay(BROWSER, |browser: &mut BrowserSection| {
        let newly_enabled = browser.enabled != Some(true);
        browser.enabled = Some(true);
        let default_profile_set = browser.default_profile.is_none();
        let default_profile = browser
            .default_profile
            .get_or_insert_with(|| DEFAULT_BROWSER_PROFILE.to_string())
            .clone();
        BrowserChange {
            newly_enabled,
            default_profile_set,
            default_profile,
        }
    })
}

/// `gateway.port`, or the default when unset or unreadable. Read-only.
pub fn gateway_port(doc: &ProfileDocument) -> u16 {
    match doc.view::<GatewaySection>(GATEWAY) {
        Ok(section) => section.and_then(|g| g.port).unwrap_or(DEFAULT_GATEWAY_PORT),
        Err(e) => {
            warn!(error = %e, "Ignoring unreadable gateway section");
            DEFAULT_GATEWAY_PORT
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelegramSetup {
    pub plugin_newly_enabled: bool,
    pub channel_newly_enabled: bool,
    pub token_changed: bool,
    pub account: String,
}

impl TelegramSetup {
    pub fn changed(&self) -> bool {
        self.plugin_newly_enabled || self.channel_newly_enabled || self.token_changed
    }
}

/// Enables the Telegram plugin and channel and stores the bot token. The
/// `default` account keeps its token on the channel itself; other accounts
/// go under `accounts.<id>`.
pub fn configure_telegram(
    doc: &mut ProfileDocument,
    bot_token: &str,
    account: &str,
) -> Result<TelegramSetup, ReconcileError> {
    if bot_token.trim().is_empty() {
        return Err(ReconcileError::InvalidInput("bot token must not be empty".into()));
    }
    if account.is_empty() {
        return Err(ReconcileError::InvalidInput("account id must not be empty".into()));
    }

    let plugin_newly_enabled = enable_plugin(doc, TELEGRAM_PLUGIN)?;

    let (channel_newly_enabled, mut token_changed) =
        doc.overlay(TELEGRAM, |channel: &mut TelegramChannel| {
            let newly = channel.enabled != Some(true);
            channel.enabled = Some(true);
            let mut token_changed = false;
            if account == DEFAULT_ACCOUNT {
                token_changed = channel.bot_token.as_deref() != Some(bot_token);
                channel.bot_token = Some(bot_token.to_string());
            }
            (newly, token_changed)
        })?;

    if account != DEFAULT_ACCOUNT {
        let account_path: Vec<&str> =
            TELEGRAM.iter().copied().chain(["accounts", account]).collect();
        token_changed = doc.overlay(&account_path, |acct: &mut TelegramAccount| {
            let changed = acct.bot_token.as_deref() != Some(bot_token);
            acct.bot_token = Some(bot_token.to_string());
            changed
        })?;
    }

    Ok(TelegramSetup {
        plugin_newly_enabled,
        channel_newly_enabled,
        token_changed,
        account: account.to_string(),
    })
}

/// Restricts Telegram DMs to `allow_from` and disables groups. `allowFrom`
/// is replaced outright. Returns `true` when any of the three fields changed.
pub fn lockdown_telegram(
    doc: &mut ProfileDocument,
    allow_from: &[String],
) -> Result<bool, ReconcileError> {
    if allow_from.is_empty() {
        return Err(ReconcileError::InvalidInput("allow-list needs at least one user id".into()));
    }
    if let Some(blank) = allow_from.iter().find(|id| id.trim().is_empty()) {
        return Err(ReconcileError::InvalidInput(format!("invalid user id {blank:?}")));
    }

    doc.overlay(TELEGRAM, |channel: &mut TelegramChannel| {
        let changed = channel.dm_policy != Some(DmPolicy::Allowlist)
            || channel.allow_from.as_deref() != Some(allow_from)
            || channel.group_policy != Some(GroupPolicy::Disabled);
        channel.dm_policy = Some(DmPolicy::Allowlist);
        channel.allow_from = Some(allow_from.to_vec());
        channel.group_policy = Some(GroupPolicy::Disabled);
        changed
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThinkingChange {
    pub previous: Option<ThinkingLevel>,
    pub level: ThinkingLevel,
}

impl ThinkingChange {
    pub fn changed(&self) -> bool {
        self.previous != Some(self.level)
    }
}

pub fn set_thinking_level(
    doc: &mut ProfileDocument,
    level: ThinkingLevel,
) -> Result<ThinkingChange, ReconcileError> {
    doc.overlay(AGENT_DEFAULTS, |defaults: &mut AgentDefaults| {
        let previous = defaults.thinking_default.replace(level);
        ThinkingChange { previous, level }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::PluginCategory;
    use serde_json::{Value, json};
    use std::path::Path;

    fn doc(value: Value) -> ProfileDocument {
        ProfileDocument::parse_or_empty(&value.to_string(), Path::new("fixture.json"))
    }

    fn plugin(id: &str, category: PluginCategory) -> PluginDescriptor {
        PluginDescriptor {
            id: id.to_string(),
            category,
            name: id.to_string(),
            description: String::new(),
        }
    }

    #[test]
    fn enabling_twice_counts_already_enabled() {
        let plugins = [
            plugin("telegram", PluginCategory::Channel),
            plugin("lobster", PluginCategory::Tool),
        ];
        let mut d = doc(json!({
            "plugins": { "entries": { "lobster": { "enabled": true, "config": { "x": 1 } } } }
        }));

        let first = enable_plugins(&mut d, &plugins).unwrap();
        assert_eq!(first, EnableTally { newly_enabled: 1, already_enabled: 1 });
        let after_first = d.clone();

        let second = enable_plugins(&mut d, &plugins).unwrap();
        assert_eq!(second, EnableTally { newly_enabled: 0, already_enabled: 2 });
        assert_eq!(d, after_first);
        assert_eq!(d.get(&["plugins", "entries", "lobster", "config"]), Some(&json!({ "x": 1 })));
    }

    #[test]
    fn disabled_entry_is_newly_enabled() {
        let mut d = doc(json!({ "plugins": { "entries": { "discord": { "enabled": false } } } }));
        assert!(enable_plugin(&mut d, "discord").unwrap());
        assert_eq!(d.get(&["plugins", "entries", "discord", "enabled"]), Some(&json!(true)));
    }

    #[test]
    fn unrelated_keys_survive_every_patch() {
        let original = json!({
            "meta": { "lastTouchedVersion": "2026.2.3" },
            "session": { "dmScope": "per-channel-peer" },
            "channels": { "whatsapp": { "dmPolicy": "open", "allowFrom": ["*"] } }
        });
        let mut d = doc(original.clone());
        enable_browser(&mut d).unwrap();
        configure_telegram(&mut d, "123456:ABCDEF", "default").unwrap();
        lockdown_telegram(&mut d, &["111".to_string()]).unwrap();
        set_thinking_level(&mut d, ThinkingLevel::High).unwrap();

        for key in ["meta", "session"] {
            assert_eq!(d.get(&[key]), original.get(key));
        }
        assert_eq!(d.get(&["channels", "whatsapp"]), original.pointer("/channels/whatsapp"));
    }

    #[test]
    fn browser_keeps_existing_default_profile() {
        let mut d = doc(json!({ "browser": { "defaultProfile": "openclaw" } }));
        let change = enable_browser(&mut d).unwrap();
        assert!(change.newly_enabled);
        assert!(!change.default_profile_set);
        assert_eq!(change.default_profile, "openclaw");

        let again = enable_browser(&mut d).unwrap();
        assert!(!again.changed());
    }

    #[test]
    fn browser_on_empty_document() {
        let mut d = ProfileDocument::new();
        let change = enable_browser(&mut d).unwrap();
        assert!(change.newly_enabled && change.default_profile_set);
        assert_eq!(
            d.into_value(),
            json!({ "browser": { "enabled": true, "defaultProfile": "chrome" } })
        );
    }

    #[test]
    fn gateway_port_defaults_and_reads() {
        let d = ProfileDocument::new();
        assert_eq!(gateway_port(&d), 18789);
        assert!(d.as_map().is_empty());
        assert_eq!(gateway_port(&doc(json!({ "gateway": { "port": 9000 } }))), 9000);
        assert_eq!(gateway_port(&doc(json!({ "gateway": { "port": "nine" } }))), 18789);
    }

    #[test]
    fn telegram_default_account_token_on_channel() {
        let mut d = ProfileDocument::new();
        let setup = configure_telegram(&mut d, "123456:ABCDEF", "default").unwrap();
        assert!(setup.changed());
        assert_eq!(
            d.into_value(),
            json!({
                "plugins": { "entries": { "telegram": { "enabled": true } } },
                "channels": { "telegram": { "enabled": true, "botToken": "123456:ABCDEF" } }
            })
        );
    }

    #[test]
    fn telegram_named_account_token_under_accounts() {
        let mut d = doc(json!({
            "channels": {
                "telegram": { "botToken": "old", "accounts": { "home": { "name": "Home" } } }
            }
        }));
        let setup = configure_telegram(&mut d, "999:work", "work").unwrap();
        assert!(setup.token_changed);
        assert_eq!(d.get(&["channels", "telegram", "botToken"]), Some(&json!("old")));
        assert_eq!(
            d.get(&["channels", "telegram", "accounts", "work", "botToken"]),
            Some(&json!("999:work"))
        );
        assert_eq!(
            d.get(&["channels", "telegram", "accounts", "home"]),
            Some(&json!({ "name": "Home" }))
        );

        let again = configure_telegram(&mut d, "999:work", "work").unwrap();
        assert!(!again.changed());
    }

    #[test]
    fn telegram_setup_rejects_blank_token() {
        let mut d = ProfileDocument::new();
        assert!(matches!(
            configure_telegram(&mut d, "  ", "default"),
            Err(ReconcileError::InvalidInput(_))
        ));
        assert!(d.as_map().is_empty());
    }

    #[test]
    fn allow_list_is_replaced_not_merged() {
        let mut d = doc(json!({
            "channels": {
                "telegram": { "dmPolicy": "pairing", "groupPolicy": "open", "enabled": true }
            }
        }));
        assert!(lockdown_telegram(&mut d, &["111".to_string()]).unwrap());
        assert!(lockdown_telegram(&mut d, &["222".to_string(), "333".to_string()]).unwrap());
        assert_eq!(d.get(&["channels", "telegram", "allowFrom"]), Some(&json!(["222", "333"])));
        assert_eq!(d.get(&["channels", "telegram", "dmPolicy"]), Some(&json!("allowlist")));
        assert_eq!(d.get(&["channels", "telegram", "groupPolicy"]), Some(&json!("disabled")));
        assert_eq!(d.get(&["channels", "telegram", "enabled"]), Some(&json!(true)));

        assert!(!lockdown_telegram(&mut d, &["222".to_string(), "333".to_string()]).unwrap());
    }

    #[test]
    fn allow_list_requires_ids() {
        let mut d = ProfileDocument::new();
        assert!(lockdown_telegram(&mut d, &[]).is_err());
        assert!(lockdown_telegram(&mut d, &[" ".to_string()]).is_err());
        assert!(d.as_map().is_empty());
    }

    #[test]
    fn thinking_level_reports_previous() {
        let mut d = doc(json!({
            "agents": {
                "defaults": { "model": "anthropic/claude-opus-4", "thinkingDefault": "low" }
            }
        }));
        let change = set_thinking_level(&mut d, ThinkingLevel::Xhigh).unwrap();
        assert_eq!(change.previous, Some(ThinkingLevel::Low));
        assert!(change.changed());
        assert_eq!(d.get(&["agents", "defaults", "thinkingDefault"]), Some(&json!("xhigh")));
        assert_eq!(
            d.get(&["agents", "defaults", "model"]),
            Some(&json!("anthropic/claude-opus-4"))
        );
        assert!(!set_thinking_level(&mut d, ThinkingLevel::Xhigh).unwrap().changed());
    }

    #[test]
    fn string_enabled_flag_is_overwritten() {
        let mut d = doc(json!({ "plugins": { "entries": { "discord": { "enabled": "true" } } } }));
        assert!(enable_plugin(&mut d, "discord").unwrap());
        assert_eq!(d.get(&["plugins", "entries", "discord", "enabled"]), Some(&json!(true)));
        assert!(!enable_plugin(&mut d, "discord").unwrap());
    }

    #[test]
    fn numeric_allow_list_is_replaced() {
        let mut d = doc(json!({
            "channels": { "telegram": { "allowFrom": [123456789], "dmPolicy": "allowlist" } }
        }));
        assert!(lockdown_telegram(&mut d, &["123456789".to_string()]).unwrap());
        assert_eq!(
            d.get(&["channels", "telegram", "allowFrom"]),
            Some(&json!(["123456789"]))
        );
        assert_eq!(d.get(&["channels", "telegram", "groupPolicy"]), Some(&json!("disabled")));
    }

    #[test]
    fn telegram_setup_leaves_numeric_allow_list_alone() {
        let mut d = doc(json!({
            "channels": { "telegram": { "allowFrom": [123456789], "groupPolicy": "everyone" } }
        }));
        let setup = configure_telegram(&mut d, "123456:ABCDEF", "default").unwrap();
        assert!(setup.channel_newly_enabled && setup.token_changed);
        assert_eq!(
            d.get(&["channels", "telegram"]),
            Some(&json!({
                "allowFrom": [123456789],
                "groupPolicy": "everyone",
                "enabled": true,
                "botToken": "123456:ABCDEF"
            }))
        );
    }

    #[test]
    fn unknown_thinking_level_is_replaced() {
        let mut d = doc(json!({ "agents": { "defaults": { "thinkingDefault": "max" } } }));
        let change = set_thinking_level(&mut d, ThinkingLevel::High).unwrap();
        assert_eq!(change.previous, None);
        assert!(change.changed());
        assert_eq!(d.get(&["agents", "defaults", "thinkingDefault"]), Some(&json!("high")));
    }
}
