//! Workspace on disk.
//!
//! Packages live at `<root>/<name without namespace>/package.json`. The
//! workspace also owns the package changelogs and the deferred action
//! scripts written next to each manifest.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, info};

use super::{ManifestStore, Publisher};
use crate::error::TandemError;
use crate::graph::Namespace;
use crate::manifest::Manifest;
use crate::publish::DeferredAction;
use crate::publish::script::{self, VERSION_PLACEHOLDER};

pub const MANIFEST_FILE: &str = "package.json";
pub const DEFAULT_CHANGELOG_FILE: &str = "CHANGELOG.md";
pub const DEFAULT_PUBLISH_COMMAND: &str = "yarn publish --new-version {version}";

#[derive(Debug, Clone)]
pub struct FsWorkspace {
    root: PathBuf,
    namespace: Namespace,
    changelog_file: String,
    publish_command: String,
}

impl FsWorkspace {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, namespace: Namespace) -> Self {
        Self {
            root: root.into(),
            namespace,
            changelog_file: DEFAULT_CHANGELOG_FILE.to_string(),
            publish_command: DEFAULT_PUBLISH_COMMAND.to_string(),
        }
    }

    #[must_use]
    pub fn with_changelog_file(mut self, file: &str) -> Self {
        self.changelog_file = file.to_string();
        self
    }

    #[must_use]
    pub fn with_publish_command(mut self, command: &str) -> Self {
        self.publish_command = command.to_string();
        self
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub const fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// Directory expected to hold the package `name`.
    #[must_use]
    pub fn package_dir(&self, name: &str) -> PathBuf {
        self.root.join(self.namespace.strip(name))
    }

    /// Read the manifest in `dir`, whatever its name.
    ///
    /// # Errors
    ///
    /// Returns [`TandemError::Manifest`] when the file is missing or invalid.
    pub fn manifest_at(dir: &Path) -> Result<Manifest, TandemError> {
        let path = dir.join(MANIFEST_FILE);
        let raw = fs::read_to_string(&path).map_err(|e| TandemError::Manifest {
            path: path.clone(),
            message: e.to_string(),
        })?;
        let location = fs::canonicalize(dir).unwrap_or_else(|_| dir.to_path_buf());
        Manifest::from_json(&raw, &location)
    }

    /// Names of managed packages found directly under the workspace root.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the root cannot be listed.
    pub fn package_names(&self) -> Result<Vec<String>, TandemError> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let dir = entry?.path();
            if !dir.join(MANIFEST_FILE).is_file() {
                continue;
            }
            match Self::manifest_at(&dir) {
                Ok(manifest) if manifest.name.starts_with(&self.namespace.0) => {
                    names.push(manifest.name);
                }
                Ok(_) => {}
                Err(err) => debug!(dir = %dir.display(), %err, "skipping unreadable manifest"),
            }
        }
        names.sort_unstable();
        Ok(names)
    }

    /// Path of a pending deferred script of `name`, if one exists.
    #[must_use]
    pub fn pending_script(&self, name: &str, file: &str) -> Option<PathBuf> {
        let path = self.package_dir(name).join(file);
        path.is_file().then_some(path)
    }
}

fn stage_error(package: &str, what: &'static str, err: &io::Error) -> TandemError {
    TandemError::Stage {
        package: package.to_string(),
        what,
        message: err.to_string(),
    }
}

fn make_executable(path: &Path) -> io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perm = fs::metadata(path)?.permissions();
        perm.set_mode(0o755);
        fs::set_permissions(path, perm)?;
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}

impl ManifestStore for FsWorkspace {
    fn load_manifest(&self, name: &str) -> Result<Option<Manifest>, TandemError> {
        let dir = self.package_dir(name);
        if !dir.join(MANIFEST_FILE).is_file() {
            return Ok(None);
        }

        let manifest = Self::manifest_at(&dir)?;
        if manifest.name != name {
            debug!(
                requested = name,
                found = %manifest.name,
                dir = %dir.display(),
                "manifest name does not match"
            );
            return Ok(None);
        }
        Ok(Some(manifest))
    }

    fn write_manifest(&self, manifest: &Manifest) -> Result<(), TandemError> {
        let path = manifest.location.join(MANIFEST_FILE);
        fs::write(&path, manifest.to_json()?)
            .map_err(|e| stage_error(&manifest.name, "manifest", &e))?;
        debug!(package = %manifest.name, path = %path.display(), "wrote manifest");
        Ok(())
    }

    fn append_changelog(&self, location: &Path, entry: &str) -> Result<(), TandemError> {
        let path = location.join(&self.changelog_file);
        let package = location.display().to_string();
        let existing = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(stage_error(&package, "changelog", &e)),
        };
        fs::write(&path, format!("{entry}\n{existing}"))
            .map_err(|e| stage_error(&package, "changelog", &e))
    }
}

impl Publisher for FsWorkspace {
    fn stage_action(&self, manifest: &Manifest, action: &DeferredAction) -> Result<(), TandemError> {
        let path = manifest.location.join(script::file_name(action));
        fs::write(&path, script::render(action, &self.publish_command))
            .and_then(|()| make_executable(&path))
            .map_err(|e| stage_error(&manifest.name, "deferred action", &e))?;
        debug!(package = %manifest.name, script = %path.display(), "wrote deferred action");
        Ok(())
    }

    fn publish_package(&self, manifest: &Manifest) -> Result<(), TandemError> {
        let command = self
            .publish_command
            .replace(VERSION_PLACEHOLDER, &manifest.version);
        let output = Command::new("sh")
            .args(["-c", &command])
            .current_dir(&manifest.location)
            .output()
            .map_err(|e| stage_error(&manifest.name, "publish", &e))?;

        if !output.status.success() {
            return Err(TandemError::Stage {
                package: manifest.name.clone(),
                what: "publish",
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        info!(package = %manifest.name, version = %manifest.version, "published");
        Ok(())
    }
}
