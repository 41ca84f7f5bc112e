mod config;
mod discovery;
mod document;
mod error;
mod patches;
mod profile;
mod utils;

use crate::config::ThinkingLevel;
use crate::discovery::{BundleRootChain, PluginDescriptor, discover_bundled_plugins};
use crate::patches::{DEFAULT_ACCOUNT, EnableTally};
use crate::profile::{
    Profile, ProfileOutcome, ProfileSelector, RunSummary, WriteOptions, reconcile_all,
};
use crate::utils::{DerivedPorts, mask_secret};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "clawprofile")]
#[command(about = "Reconcile OpenClaw default and dev profiles", long_about = None)]
struct Cli {
    /// Directory holding .openclaw/ and .openclaw-dev/ (defaults to the user's home)
    #[arg(long, global = true, env = "CLAWPROFILE_HOME")]
    home: Option<PathBuf>,

    /// Restrict changes to one profile
    #[arg(
        long,
        global = true,
        value_enum,
        default_value_t = ProfileSelector::All,
        env = "CLAWPROFILE_PROFILE"
    )]
    profile: ProfileSelector,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Bundled plugin catalog
    Plugins {
        /// Repo checkout that ships extensions/ (overrides auto-detection)
        #[arg(long, env = "REPO_ROOT")]
        repo_root: Option<PathBuf>,

        #[command(subcommand)]
        action: PluginAction,
    },
    /// Enable the browser relay for the Chrome extension
    Browser,
    /// Telegram channel configuration
    Telegram {
        #[command(subcommand)]
        action: TelegramAction,
    },
    /// Set the default thinking level for agents
    Think {
        #[arg(value_enum)]
        level: ThinkingLevel,
    },
}

#[derive(Subcommand)]
enum PluginAction {
    /// Print the discovered plugins without touching any profile
    List,
    /// Enable every bundled plugin in each profile
    EnableAll,
}

#[derive(Subcommand)]
enum TelegramAction {
    /// Store the bot token and enable the Telegram plugin and channel
    Setup {
        /// Telegram Bot API token from @BotFather
        bot_token: String,

        /// Account id; "default" keeps the token on the channel itself
        #[arg(default_value = DEFAULT_ACCOUNT)]
        account: String,
    },
    /// Only let the given user ids DM the bot, and disable groups
    Lockdown {
        /// Telegram user ids (message @userinfobot to find yours)
        #[arg(required = true, num_args = 1..)]
        user_ids: Vec<String>,
    },
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Plugins { repo_root, action } => {
            let root = BundleRootChain::standard(repo_root.clone()).locate()?;
            let plugins = discover_bundled_plugins(&root)?;
            print_catalog(&plugins);
            if let PluginAction::EnableAll = action {
                enable_all(&profiles(&cli)?, &plugins)?;
            }
        }
        Commands::Browser => enable_browser_relay(&profiles(&cli)?)?,
        Commands::Telegram { action } => match action {
            TelegramAction::Setup { bot_token, account } => {
                setup_telegram(&profiles(&cli)?, bot_token, account)?
            }
            TelegramAction::Lockdown { user_ids } => {
                lockdown_telegram(&profiles(&cli)?, user_ids)?
            }
        },
        Commands::Think { level } => set_thinking_level(&profiles(&cli)?, *level)?,
    }

    Ok(())
}

fn profiles(cli: &Cli) -> anyhow::Result<Vec<Profile>> {
    let home = resolve_home(cli.home.clone())?;
    debug!(home = ?home, "Resolved profile home");
    Ok(Profile::discover(&home, cli.profile))
}

/// `--home`, then `$HOME`, then the passwd entry of the current user.
fn resolve_home(explicit: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    if let Some(home) = explicit.filter(|p| !p.as_os_str().is_empty()) {
        return Ok(home);
    }
    if let Some(home) = std::env::var_os("HOME").filter(|h| !h.is_empty()) {
        return Ok(PathBuf::from(home));
    }
    let uid = nix::unistd::Uid::current();
    match nix::unistd::User::from_uid(uid)? {
        Some(user) => Ok(user.dir),
        None => anyhow::bail!("Cannot determine home directory for uid {}", uid),
    }
}

fn print_catalog(plugins: &[PluginDescriptor]) {
    println!("Found {} bundled plugins:\n", plugins.len());
    let mut current = None;
    for plugin in plugins {
        if current != Some(plugin.category) {
            current = Some(plugin.category);
            println!("  [{}]", plugin.category.label());
        }
        let desc = if plugin.description.is_empty() {
            String::new()
        } else {
            format!(" - {}", plugin.description)
        };
        println!("    {:30} {}{}", plugin.id, plugin.name, desc);
    }
    println!();
}

/// Prints skip and failure lines, then turns any failed profile into an error.
fn finish<C>(summary: &RunSummary<C>) -> anyhow::Result<()> {
    for report in &summary.reports {
        match &report.outcome {
            ProfileOutcome::Skipped => {
                println!("  [SKIP] {} (not found)", report.profile.path.display())
            }
            ProfileOutcome::Failed(e) => {
                println!("  [FAIL] {}: {}", report.profile.path.display(), e)
            }
            ProfileOutcome::Applied(_) => {}
        }
    }
    let failed = summary.failed();
    if failed > 0 {
        anyhow::bail!("{} profile(s) could not be updated", failed);
    }
    Ok(())
}

fn enable_all(profiles: &[Profile], plugins: &[PluginDescriptor]) -> anyhow::Result<()> {
    let summary = reconcile_all(profiles, WriteOptions::SKIP_MISSING, |doc| {
        patches::enable_plugins(doc, plugins)
    })?;

    let mut total = EnableTally::default();
    for (profile, tally) in summary.applied() {
        println!(
            "  [{}] Enabled {} new, {} already enabled",
            profile.name, tally.newly_enabled, tally.already_enabled
        );
        total += *tally;
    }
    finish(&summary)?;

    info!(newly = total.newly_enabled, already = total.already_enabled, "Plugins enabled");
    println!("\n[DONE] All {} plugins enabled.", plugins.len());
    println!("Restart Gateway (bot full) for changes to take effect.");
    println!(
        "\nNote: Channel plugins (telegram, discord, etc.) need tokens/config to actually connect."
    );
    println!("Tool/utility plugins will be available immediately after restart.");
    Ok(())
}

fn enable_browser_relay(profiles: &[Profile]) -> anyhow::Result<()> {
    let summary = reconcile_all(profiles, WriteOptions::SKIP_MISSING, |doc| {
        let change = patches::enable_browser(doc)?;
        Ok((change, patches::gateway_port(doc)))
    })?;

    for (profile, (change, _)) in summary.applied() {
        let state = if change.changed() { "updated" } else { "already enabled" };
        println!(
            "  [OK] {} ({}, defaultProfile = {})",
            profile.path.display(),
            state,
            change.default_profile
        );
    }
    finish(&summary)?;

    let mut relay_ports = Vec::new();
    for (profile, (_, gateway)) in summary.applied() {
        println!("\n  [{}]", profile.name);
        println!("  Gateway port:       {}", gateway);
        match DerivedPorts::from_gateway(*gateway) {
            Some(ports) => {
                println!("  Browser control:    {}", ports.control);
                println!("  Extension relay:    {}", ports.relay);
                relay_ports.push(ports.relay);
            }
            None => println!("  Browser control:    n/a (gateway port too high)"),
        }
    }

    println!("\n[DONE] Browser relay enabled.");
    println!("Restart Gateway (bot full) for changes to take effect.");
    if let Some(relay) = relay_ports.first() {
        println!("Chrome extension should connect to http://127.0.0.1:{}/", relay);
    }
    Ok(())
}

fn setup_telegram(profiles: &[Profile], bot_token: &str, account: &str) -> anyhow::Result<()> {
    println!("[tg-setup] Configuring Telegram bot (token: {})", mask_secret(bot_token));

    let options = WriteOptions::CREATE_MISSING.restricted();
    let summary = reconcile_all(profiles, options, |doc| {
        patches::configure_telegram(doc, bot_token, account)
    })?;

    for (profile, setup) in summary.applied() {
        println!("[tg-setup] Updated: {}", profile.path.display());
        println!("[tg-setup]   telegram.enabled = true");
        println!(
            "[tg-setup]   telegram plugin enabled = true{}",
            if setup.plugin_newly_enabled { "" } else { " (already)" }
        );
        println!(
            "[tg-setup]   account = {}{}",
            setup.account,
            if setup.token_changed { "" } else { " (token unchanged)" }
        );
    }
    finish(&summary)?;

    println!();
    println!("[tg-setup] Done! Telegram channel configured.");
    println!("[tg-setup] Next steps:");
    println!("[tg-setup]   1. Start the gateway:  bot gateway  (or  bot full)");
    println!("[tg-setup]   2. Check status:        bot tg-status");
    println!("[tg-setup]   3. Send /start to your bot in Telegram");
    println!("[tg-setup]   4. Approve pairing:     bot pair-list  ->  bot pair-approve <code>");
    Ok(())
}

fn lockdown_telegram(profiles: &[Profile], user_ids: &[String]) -> anyhow::Result<()> {
    println!("[tg-lockdown] Locking Telegram bot to user IDs: {:?}", user_ids);

    let summary = reconcile_all(profiles, WriteOptions::CREATE_MISSING, |doc| {
        patches::lockdown_telegram(doc, user_ids)
    })?;

    for (profile, changed) in summary.applied() {
        let state = if *changed { "Updated" } else { "Unchanged" };
        println!("[tg-lockdown] {}: {}", state, profile.path.display());
        println!("[tg-lockdown]   dmPolicy = allowlist");
        println!("[tg-lockdown]   allowFrom = {:?}", user_ids);
        println!("[tg-lockdown]   groupPolicy = disabled");
    }
    finish(&summary)?;

    println!();
    println!("[tg-lockdown] Done! Only the specified users can DM the bot.");
    println!("[tg-lockdown] Groups are disabled. Restart gateway to apply.");
    Ok(())
}

fn set_thinking_level(profiles: &[Profile], level: ThinkingLevel) -> anyhow::Result<()> {
    let options = WriteOptions::SKIP_MISSING.restricted();
    let summary = reconcile_all(profiles, options, |doc| patches::set_thinking_level(doc, level))?;

    for (profile, change) in summary.applied() {
        match change.previous {
            Some(previous) if !change.changed() => {
                let path = profile.path.display();
                println!("thinkingDefault already {} in {}", previous.as_str(), path)
            }
            _ => println!("Set thinkingDefault={} in {}", level.as_str(), profile.path.display()),
        }
    }
    finish(&summary)?;

    println!("\nDone! Default thinking level: {}", level.as_str());
    println!(
        "Note: for existing sessions, switch via the Thinking dropdown in the UI, \
         or send /think <level>"
    );
    Ok(())
}
