//! Load, overlay and persist one `openclaw.json` document.

use crate::error::ReconcileError;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::fs;
use std::io::ErrorKind;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Mode applied to the config directories this tool creates.
const CONFIG_DIR_MODE: u32 = 0o700;

const MAX_SYMLINK_HOPS: usize = 40;

/// A profile's JSON document, held as a generic map so keys this tool does
/// not know about survive untouched and in their original order.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ProfileDocument {
    root: Map<String, Value>,
}

impl ProfileDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads `path`. A missing file, or one that does not hold a JSON object,
    /// yields an empty document instead of an error.
    pub fn load(path: &Path) -> Result<Self, ReconcileError> {
        match fs::read_to_string(path) {
            Ok(text) => Ok(Self::parse_or_empty(&text, path)),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = ?path, "Profile file absent, starting from an empty document");
                Ok(Self::new())
            }
            Err(e) => Err(ReconcileError::io(path, e)),
        }
    }

    /// Repair path for malformed profiles: anything that is not a JSON object
    /// is replaced by an empty document.
    pub fn parse_or_empty(text: &str, origin: &Path) -> Self {
        match serde_json::from_str::<Value>(text) {
            Ok(Value::Object(root)) => Self { root },
            Ok(other) => {
                warn!(
                    path = ?origin,
                    kind = json_kind(&other),
                    "Profile is not a JSON object, replacing with an empty document"
                );
                Self::new()
            }
            Err(e) => {
                warn!(
                    path = ?origin,
                    error = %e,
                    "Profile is not valid JSON, replacing with an empty document"
                );
                Self::new()
            }
        }
    }

    #[cfg(test)]
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.root
    }

    #[cfg(test)]
    pub fn into_value(self) -> Value {
        Value::Object(self.root)
    }

    /// Value at `path`, if every segment exists.
    pub fn get(&self, path: &[&str]) -> Option<&Value> {
        let (first, rest) = path.split_first()?;
        let mut current = self.root.get(*first)?;
        for key in rest {
            current = current.as_object()?.get(*key)?;
        }
        Some(current)
    }

    /// Object at `path`, creating missing intermediate objects. Siblings of
    /// every segment are left as they are; a segment holding a non-object
    /// value is replaced by an empty object.
    pub fn ensure_object(&mut self, path: &[&str]) -> &mut Map<String, Value> {
        let mut current = &mut self.root;
        for key in path {
            let slot = current
                .entry(key.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !slot.is_object() {
                warn!(
                    key = %key,
                    kind = json_kind(slot),
                    "Replacing non-object value with an empty section"
                );
                *slot = Value::Object(Map::new());
            }
            current = match slot {
                Value::Object(map) => map,
                _ => unreachable!("slot was just made an object"),
            };
        }
        current
    }

    /// Typed read of the section at `path`. Never creates anything; an
    /// absent section is `None`.
    pub fn view<T>(&self, path: &[&str]) -> Result<Option<T>, ReconcileError>
    where
        T: DeserializeOwned,
    {
        match self.get(path) {
            None => Ok(None),
            Some(value) => serde_json::from_value(value.clone())
                .map(Some)
                .map_err(|source| ReconcileError::MismatchedSection {
                    section: path.join("."),
                    source,
                }),
        }
    }

    /// Deserializes the section at `path` into `T`, hands it to `patch`, and
    /// merges the result back key by key. Keys already present keep their
    /// position; keys `T` leaves unset are never removed.
    pub fn overlay<T, R>(
        &mut self,
        path: &[&str],
        patch: impl FnOnce(&mut T) -> R,
    ) -> Result<R, ReconcileError>
    where
        T: DeserializeOwned + Serialize,
    {
        let section = path.join(".");
        let slot = self.ensure_object(path);
        let mut typed: T = serde_json::from_value(Value::Object(slot.clone()))
            .map_err(|source| ReconcileError::MismatchedSection {
                section: section.clone(),
                source,
            })?;

        let result = patch(&mut typed);

        match serde_json::to_value(&typed)? {
            Value::Object(fields) => {
                for (key, value) in fields {
                    slot.insert(key, value);
                }
            }
            other => {
                return Err(ReconcileError::InvalidInput(format!(
                    "overlay for '{section}' produced {} instead of an object",
                    json_kind(&other)
                )));
            }
        }
        Ok(result)
    }

    /// Pretty JSON with two-space indentation and a trailing newline.
    pub fn render(&self) -> Result<String, ReconcileError> {
        let mut text = serde_json::to_string_pretty(&self.root)?;
        text.push('\n');
        Ok(text)
    }

    /// Writes the document to `path` through a sibling temp file and a rename,
    /// so a failed write never leaves a truncated profile behind. A symlinked
    /// profile is written through the link: the temp file goes next to the
    /// link's target and replaces that.
    ///
    /// The replacement keeps the permissions of the file it replaces unless
    /// `mode` asks for specific ones.
    pub fn persist(&self, path: &Path, mode: Option<u32>) -> Result<(), ReconcileError> {
        let text = self.render()?;
        let target = resolve_symlink(path)?;

        if let Some(dir) = target.parent().filter(|d| !d.as_os_str().is_empty()) {
            if !dir.exists() {
                fs::create_dir_all(dir).map_err(|e| ReconcileError::io(dir, e))?;
                // Fix permissions: chmod 700 (rwx------)
                fs::set_permissions(dir, fs::Permissions::from_mode(CONFIG_DIR_MODE))
                    .map_err(|e| ReconcileError::io(dir, e))?;
            }
        }

        let file_name = target
            .file_name()
            .ok_or_else(|| {
                ReconcileError::InvalidInput(format!("{} is not a file path", path.display()))
            })?
            .to_string_lossy();
        let tmp_name = format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4().simple());
        let tmp_path = target.with_file_name(tmp_name);

        let result = write_replacement(&tmp_path, &target, &text, mode);
        if result.is_err() {
            let _ = fs::remove_file(&tmp_path);
        }
        result
    }
}

/// The file a write to `path` should land in. Follows symlink chains,
/// including dangling ones, resolving relative links against their directory.
fn resolve_symlink(path: &Path) -> Result<PathBuf, ReconcileError> {
    let mut target = path.to_path_buf();
    for _ in 0..MAX_SYMLINK_HOPS {
        match fs::symlink_metadata(&target) {
            Ok(meta) if meta.file_type().is_symlink() => {
                let link = fs::read_link(&target).map_err(|e| ReconcileError::io(&target, e))?;
                target = match target.parent() {
                    Some(dir) if link.is_relative() => dir.join(link),
                    _ => link,
                };
            }
            _ => return Ok(target),
        }
    }
    Err(ReconcileError::InvalidInput(format!(
        "too many levels of symbolic links at {}",
        path.display()
    )))
}

fn write_replacement(
    tmp_path: &Path,
    path: &Path,
    text: &str,
    mode: Option<u32>,
) -> Result<(), ReconcileError> {
    fs::write(tmp_path, text).map_err(|e| ReconcileError::io(tmp_path, e))?;

    let permissions = match mode {
        Some(mode) => Some(fs::Permissions::from_mode(mode)),
        None => fs::metadata(path).ok().map(|m| m.permissions()),
    };
    if let Some(permissions) = permissions {
        fs::set_permissions(tmp_path, permissions)
            .map_err(|e| ReconcileError::io(tmp_path, e))?;
    }

    fs::rename(tmp_path, path).map_err(|e| ReconcileError::io(path, e))?;
    debug!(path = ?path, bytes = text.len(), "Profile written");
    Ok(())
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
