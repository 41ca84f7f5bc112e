//! Profile locations and the load / patch / persist cycle run across them.

use crate::document::ProfileDocument;
use crate::error::ReconcileError;
use clap::ValueEnum;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

pub const CONFIG_FILE: &str = "openclaw.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileName {
    Default,
    Dev,
}

impl ProfileName {
    pub fn dir_name(self) -> &'static str {
        match self {
            ProfileName::Default => ".openclaw",
            ProfileName::Dev => ".openclaw-dev",
        }
    }
}

impl fmt::Display for ProfileName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// Which profiles a command touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ProfileSelector {
    #[default]
    All,
    Default,
    Dev,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    pub name: ProfileName,
    pub path: PathBuf,
}

impl Profile {
    pub fn under(home: &Path, name: ProfileName) -> Self {
        Self {
            name,
            path: home.join(name.dir_name()).join(CONFIG_FILE),
        }
    }

    /// Profiles under `home`, default first.
    pub fn discover(home: &Path, selector: ProfileSelector) -> Vec<Profile> {
        let names: &[ProfileName] = match selector {
            ProfileSelector::All => &[ProfileName::Default, ProfileName::Dev],
            ProfileSelector::Default => &[ProfileName::Default],
            ProfileSelector::Dev => &[ProfileName::Dev],
        };
        names.iter().map(|name| Profile::under(home, *name)).collect()
    }
}

/// What to do when a profile file does not exist yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingProfile {
    Skip,
    Create,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOptions {
    pub missing: MissingProfile,
    /// File mode forced on every written profile, e.g. `0o600` for secrets.
    pub mode: Option<u32>,
}

impl WriteOptions {
    pub const SKIP_MISSING: WriteOptions = WriteOptions {
        missing: MissingProfile::Skip,
        mode: None,
    };

    pub const CREATE_MISSING: WriteOptions = WriteOptions {
        missing: MissingProfile::Create,
        mode: None,
    };

    pub fn restricted(self) -> Self {
        Self {
            mode: Some(0o600),
            ..self
        }
    }
}

/// Loads `path` (empty document if absent or malformed), applies `patch`,
/// and writes the result back. The patch's return value describes what it
/// changed.
pub fn reconcile<C, F>(path: &Path, mode: Option<u32>, patch: F) -> Result<C, ReconcileError>
where
    F: FnOnce(&mut ProfileDocument) -> Result<C, ReconcileError>,
{
    let mut document = ProfileDocument::load(path)?;
    let changes = patch(&mut document)?;
    document.persist(path, mode)?;
    Ok(changes)
}

#[derive(Debug)]
pub enum ProfileOutcome<C> {
    Applied(C),
    Skipped,
    Failed(ReconcileError),
}

#[derive(Debug)]
pub struct ProfileReport<C> {
    pub profile: Profile,
    pub outcome: ProfileOutcome<C>,
}

impl<C> ProfileReport<C> {
    pub fn applied(&self) -> Option<&C> {
        match &self.outcome {
            ProfileOutcome::Applied(changes) => Some(changes),
            _ => None,
        }
    }
}

/// Per-profile outcomes of one [`reconcile_all`] run.
#[derive(Debug)]
pub struct RunSummary<C> {
    pub reports: Vec<ProfileReport<C>>,
}

impl<C> RunSummary<C> {
    pub fn applied(&self) -> impl Iterator<Item = (&Profile, &C)> {
        self.reports.iter().filter_map(|r| r.applied().map(|c| (&r.profile, c)))
    }

    pub fn failed(&self) -> usize {
        self.reports
            .iter()
            .filter(|r| matches!(r.outcome, ProfileOutcome::Failed(_)))
            .count()
    }
}

/// Runs [`reconcile`] once per profile. A failing profile does not stop the
/// others. Fails with [`ReconcileError::NoProfiles`] only when every profile
/// was skipped as missing.
pub fn reconcile_all<C, F>(
    profiles: &[Profile],
    options: WriteOptions,
    mut patch: F,
) -> Result<RunSummary<C>, ReconcileError>
where
    F: FnMut(&mut ProfileDocument) -> Result<C, ReconcileError>,
{
    let mut reports = Vec::with_capacity(profiles.len());

    for profile in profiles {
        let outcome = if options.missing == MissingProfile::Skip && !profile.path.exists() {
            info!(profile = %profile.name, path = ?profile.path, "Profile not found, skipping");
            ProfileOutcome::Skipped
        } else {
            match reconcile(&profile.path, options.mode, &mut patch) {
                Ok(changes) => {
                    info!(profile = %profile.name, path = ?profile.path, "Profile reconciled");
                    ProfileOutcome::Applied(changes)
                }
                Err(e) => {
                    error!(
                        profile = %profile.name,
                        path = ?profile.path,
                        error = %e,
                        "Failed to reconcile profile"
                    );
                    ProfileOutcome::Failed(e)
                }
            }
        };
        reports.push(ProfileReport {
            profile: profile.clone(),
            outcome,
        });
    }

    if reports.iter().all(|r| matches!(r.outcome, ProfileOutcome::Skipped)) {
        warn!("No profile files found");
        return Err(ReconcileError::NoProfiles {
            searched: profiles.iter().map(|p| p.path.clone()).collect(),
        });
    }

    Ok(RunSummary { reports })
}
