//! Bundled plugin discovery: locate the repo that ships `extensions/`, read
//! every plugin manifest under it and build a sorted catalog.

use crate::error::ReconcileError;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

pub const MANIFEST_FILE: &str = "openclaw.plugin.json";
pub const EXTENSIONS_DIR: &str = "extensions";
const PACKAGE_FILE: &str = "package.json";
const CARGO_TARGET_DIR: &str = "target";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PluginCategory {
    Channel,
    ProviderAuth,
    Skill,
    Memory,
    Tool,
}

impl PluginCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            PluginCategory::Channel => "channel",
            PluginCategory::ProviderAuth => "provider-auth",
            PluginCategory::Skill => "skill",
            PluginCategory::Memory => "memory",
            PluginCategory::Tool => "tool",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            PluginCategory::Channel => "Channel (chat platform)",
            PluginCategory::ProviderAuth => "Provider Auth (model access)",
            PluginCategory::Skill => "Skill",
            PluginCategory::Memory => "Memory",
            PluginCategory::Tool => "Tool / Utility",
        }
    }
}

impl fmt::Display for PluginCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification rules, checked top to bottom; the first rule with a
/// truthy field wins. Anything unmatched is a tool.
const CLASSIFICATION_RULES: &[(&[&str], PluginCategory)] = &[
    (&["channel", "channels"], PluginCategory::Channel),
    (&["providerAuth"], PluginCategory::ProviderAuth),
    (&["skill"], PluginCategory::Skill),
    (&["memory"], PluginCategory::Memory),
];

pub fn classify(manifest: &Map<String, Value>) -> PluginCategory {
    CLASSIFICATION_RULES
        .iter()
        .find(|(fields, _)| fields.iter().any(|f| manifest.get(*f).is_some_and(is_truthy)))
        .map(|(_, category)| *category)
        .unwrap_or(PluginCategory::Tool)
}

/// Null, `false`, zero and empty strings/arrays/objects count as unset.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Identity fields are kept raw so an oddly typed value falls back to a
/// default instead of dropping the manifest.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Manifest {
    id: Option<Value>,
    display_name: Option<Value>,
    description: Option<Value>,
    #[serde(flatten)]
    fields: Map<String, Value>,
}

/// Strings and numbers are usable as text; anything else counts as absent.
fn text_field(value: Option<Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginDescriptor {
    pub id: String,
    pub category: PluginCategory,
    pub name: String,
    pub description: String,
}

impl PluginDescriptor {
    /// Builds a descriptor from manifest text. The id falls back to the name
    /// of the directory holding the manifest.
    pub fn from_manifest(text: &str, manifest_path: &Path) -> Result<Self, ManifestError> {
        let manifest: Manifest = serde_json::from_str(text).map_err(ManifestError::Parse)?;
        let id = match text_field(manifest.id) {
            Some(id) => id,
            None => manifest_path
                .parent()
                .and_then(Path::file_name)
                .map(|n| n.to_string_lossy().into_owned())
                .filter(|n| !n.is_empty())
                .ok_or(ManifestError::MissingId)?,
        };
        Ok(Self {
            category: classify(&manifest.fields),
            name: text_field(manifest.display_name).unwrap_or_else(|| id.clone()),
            description: text_field(manifest.description).unwrap_or_default(),
            id,
        })
    }
}

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("invalid manifest: {0}")]
    Parse(serde_json::Error),
    #[error("manifest has no id and no parent directory name")]
    MissingId,
}

/// Scans `<root>/extensions` for manifests. Unreadable or invalid manifests
/// are skipped; an empty result is an error of its own.
///
/// When two manifests share an id the first one in file-name order is kept.
pub fn discover_bundled_plugins(root: &Path) -> Result<Vec<PluginDescriptor>, ReconcileError> {
    let extensions_dir = root.join(EXTENSIONS_DIR);
    if !extensions_dir.is_dir() {
        return Err(ReconcileError::MissingBundleRoot {
            searched: vec![root.to_path_buf()],
        });
    }

    let mut plugins = Vec::new();
    let mut seen = HashSet::new();

    for entry in WalkDir::new(&extensions_dir).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Error accessing directory entry: {}", e);
                continue;
            }
        };
        if !entry.file_type().is_file() || entry.file_name() != MANIFEST_FILE {
            continue;
        }

        let path = entry.path();
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) => {
                warn!(manifest = ?path, error = %e, "Skipping unreadable manifest");
                continue;
            }
        };
        let plugin = match PluginDescriptor::from_manifest(&text, path) {
            Ok(plugin) => plugin,
            Err(e) => {
                warn!(manifest = ?path, error = %e, "Skipping manifest");
                continue;
            }
        };

        if !seen.insert(plugin.id.clone()) {
            warn!(
                plugin = %plugin.id,
                manifest = ?path,
                "Duplicate plugin id, keeping the first manifest"
            );
            continue;
        }
        debug!(plugin = %plugin.id, category = %plugin.category, "Discovered plugin");
        plugins.push(plugin);
    }

    if plugins.is_empty() {
        return Err(ReconcileError::EmptyCatalog { extensions_dir });
    }

    plugins.sort_by(|a, b| (a.category.as_str(), &a.id).cmp(&(b.category.as_str(), &b.id)));
    info!(count = plugins.len(), "Plugin catalog built");
    Ok(plugins)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootSource {
    Override,
    ToolLocation,
    WorkingDir,
}

/// Ordered list of places the bundle root may live; the first valid one wins.
#[derive(Debug, Default)]
pub struct BundleRootChain {
    candidates: Vec<(RootSource, PathBuf)>,
}

impl BundleRootChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override, then the directories around the executable (see
    /// [`tool_location_candidates`]), then the working directory.
    pub fn standard(override_root: Option<PathBuf>) -> Self {
        let mut chain = Self::new();
        if let Some(root) = override_root.filter(|p| !p.as_os_str().is_empty()) {
            chain = chain.with(RootSource::Override, root);
        }
        if let Ok(exe) = std::env::current_exe() {
            let exe = exe.canonicalize().unwrap_or(exe);
            for candidate in tool_location_candidates(&exe) {
                chain = chain.with(RootSource::ToolLocation, candidate);
            }
        }
        if let Ok(cwd) = std::env::current_dir() {
            chain = chain.with(RootSource::WorkingDir, cwd);
        }
        chain
    }

    pub fn with(mut self, source: RootSource, path: PathBuf) -> Self {
        self.candidates.push((source, path));
        self
    }

    pub fn locate(&self) -> Result<PathBuf, ReconcileError> {
        for (source, candidate) in &self.candidates {
            if is_bundle_root(candidate) {
                info!(root = ?candidate, source = ?source, "Found repo root");
                return Ok(candidate.clone());
            }
            debug!(candidate = ?candidate, source = ?source, "Not a repo root");
        }
        Err(ReconcileError::MissingBundleRoot {
            searched: self.candidates.iter().map(|(_, p)| p.clone()).collect(),
        })
    }
}

/// The executable's directory and its parent. A binary inside a cargo
/// `target/` directory also gets the three directories above `target/`.
fn tool_location_candidates(exe: &Path) -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    let Some(dir) = exe.parent() else {
        return candidates;
    };
    candidates.extend(dir.ancestors().take(2).map(Path::to_path_buf));

    let target = dir
        .ancestors()
        .find(|a| a.file_name().is_some_and(|n| n == CARGO_TARGET_DIR));
    if let Some(target) = target {
        for ancestor in target.ancestors().skip(1).take(3) {
            if !candidates.iter().any(|c| c == ancestor) {
                candidates.push(ancestor.to_path_buf());
            }
        }
    }
    candidates
}

fn is_bundle_root(candidate: &Path) -> bool {
    candidate.join(EXTENSIONS_DIR).is_dir() && candidate.join(PACKAGE_FILE).is_file()
}
