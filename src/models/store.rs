//! Atomic persistence of artifact bundles.
//!
//! Layout under the artifacts root:
//!
//! ```text
//! CURRENT                       name of the published bundle directory
//! bundle-<run_id>/manifest.json metadata + sha256 of every artifact
//! bundle-<run_id>/encoder.json
//! bundle-<run_id>/scaler.json
//! bundle-<run_id>/classifier.json
//! ```
//!
//! A bundle is written into a hidden staging directory, renamed into place,
//! and only then published by swapping `CURRENT`. Readers never observe a
//! partially written bundle. Staging directories abandoned by interrupted
//! saves are swept once they are older than [`STALE_STAGING_AGE`].

use crate::error::{PipelineError, Result};
use crate::models::bundle::{ArtifactBundle, BundleMetadata};
use crate::models::forest::RandomForest;
use crate::preprocessing::{EncoderMap, StandardScaler};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const CURRENT_POINTER: &str = "CURRENT";
pub const MANIFEST_FILE: &str = "manifest.json";

pub const ENCODER_ARTIFACT: &str = "encoder";
pub const SCALER_ARTIFACT: &str = "scaler";
pub const CLASSIFIER_ARTIFACT: &str = "classifier";

/// Staging directories untouched for this long belong to a dead save.
pub const STALE_STAGING_AGE: Duration = Duration::from_secs(60 * 60);

const BUNDLE_PREFIX: &str = "bundle-";
const STAGING_SUFFIX: &str = ".staging";

/// Manifest entry for one artifact file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactEntry {
    pub file: String,
    pub sha256: String,
    pub bytes: u64,
}

/// Contents of `manifest.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub metadata: BundleMetadata,
    pub artifacts: BTreeMap<String, ArtifactEntry>,
}

/// Reads and writes bundles under one artifacts root directory
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn bundle_dir_name(run_id: &Uuid) -> String {
        format!("{}{}", BUNDLE_PREFIX, run_id)
    }

    /// Where the bundle of `run_id` lives once published.
    pub fn bundle_dir(&self, run_id: &Uuid) -> PathBuf {
        self.root.join(Self::bundle_dir_name(run_id))
    }

    fn staging_dir(&self, run_id: &Uuid) -> PathBuf {
        self.root
            .join(format!(".{}{}", Self::bundle_dir_name(run_id), STAGING_SUFFIX))
    }

    /// Persist a bundle and publish it as current.
    ///
    /// Any failure leaves the previously published bundle untouched.
    pub fn save(&self, bundle: &ArtifactBundle) -> Result<PathBuf> {
        let run_id = bundle.metadata().run_id;
        let dir_name = Self::bundle_dir_name(&run_id);
        let final_dir = self.root.join(&dir_name);
        let staging = self.staging_dir(&run_id);

        if final_dir.exists() {
            return Err(PipelineError::artifact_persist(
                "bundle",
                format!("{} already exists", final_dir.display()),
            ));
        }

        self.sweep_staging(STALE_STAGING_AGE);

        fs::create_dir_all(&staging).map_err(|e| {
            PipelineError::artifact_persist("bundle", format!("{}: {}", staging.display(), e))
        })?;

        if let Err(e) = self.write_staged(bundle, &staging) {
            discard(&staging);
            return Err(e);
        }

        if let Err(e) = fs::rename(&staging, &final_dir) {
            discard(&staging);
            return Err(PipelineError::artifact_persist(
                "bundle",
                format!("rename into {}: {}", final_dir.display(), e),
            ));
        }

        self.publish(&dir_name, &run_id)?;

        info!(
            run_id = %run_id,
            path = %final_dir.display(),
            "Artifact bundle published"
        );
        Ok(final_dir)
    }

    fn write_staged(&self, bundle: &ArtifactBundle, staging: &Path) -> Result<()> {
        let mut artifacts = BTreeMap::new();

        let encoder = encode(ENCODER_ARTIFACT, bundle.encoders(), true)?;
        artifacts.insert(
            ENCODER_ARTIFACT.to_string(),
            write_artifact(staging, ENCODER_ARTIFACT, &encoder)?,
        );

        let scaler = encode(SCALER_ARTIFACT, bundle.scaler(), true)?;
        artifacts.insert(
            SCALER_ARTIFACT.to_string(),
            write_artifact(staging, SCALER_ARTIFACT, &scaler)?,
        );

        let classifier = encode(CLASSIFIER_ARTIFACT, bundle.classifier(), false)?;
        artifacts.insert(
            CLASSIFIER_ARTIFACT.to_string(),
            write_artifact(staging, CLASSIFIER_ARTIFACT, &classifier)?,
        );

        let manifest = Manifest {
            metadata: bundle.metadata().clone(),
            artifacts,
        };
        let bytes = encode("manifest", &manifest, true)?;
        write_synced(&staging.join(MANIFEST_FILE), &bytes)
            .map_err(|e| PipelineError::artifact_persist("manifest", e))?;

        sync_dir(staging);
        Ok(())
    }

    /// Swap the `CURRENT` pointer via write-to-temp-then-rename.
    fn publish(&self, dir_name: &str, run_id: &Uuid) -> Result<()> {
        let pointer = self.root.join(CURRENT_POINTER);
        let tmp = self
            .root
            .join(format!(".{}.tmp.{}", CURRENT_POINTER, run_id));

        write_synced(&tmp, dir_name.as_bytes())
            .map_err(|e| PipelineError::artifact_persist("bundle", format!("pointer: {}", e)))?;
        if let Err(e) = fs::rename(&tmp, &pointer) {
            let _ = fs::remove_file(&tmp);
            return Err(PipelineError::artifact_persist(
                "bundle",
                format!("pointer swap: {}", e),
            ));
        }
        sync_dir(&self.root);
        Ok(())
    }

    /// Remove staging directories last modified at least `older_than` ago.
    ///
    /// Returns how many were removed. Younger ones may belong to a save that
    /// is still running and are left alone.
    pub fn sweep_staging(&self, older_than: Duration) -> usize {
        let Ok(entries) = fs::read_dir(&self.root) else {
            return 0;
        };

        let mut removed = 0;
        for entry in entries.flatten() {
            let is_staging = entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.starts_with('.') && name.ends_with(STAGING_SUFFIX));
            let Ok(meta) = entry.metadata() else {
                continue;
            };
            if !is_staging || !meta.is_dir() {
                continue;
            }

            let age = meta
                .modified()
                .map(|t| t.elapsed().unwrap_or_default())
                .unwrap_or_default();
            if age >= older_than && discard(&entry.path()) {
                removed += 1;
            }
        }

        if removed > 0 {
            info!(removed = removed, "Removed abandoned staging directories");
        }
        removed
    }

    /// Delete superseded bundles, keeping the `keep` most recent ones.
    ///
    /// Only bundles created before the published one are candidates, so a
    /// newer bundle that another trainer is about to publish survives.
    /// Directories without a readable manifest are left untouched.
    pub fn prune(&self, keep: usize) -> Result<usize> {
        let current = self.current_dir()?;
        let published_at = read_manifest(&current)?.metadata.created_at;

        let entries = fs::read_dir(&self.root).map_err(|e| {
            PipelineError::artifact_persist("bundle", format!("{}: {}", self.root.display(), e))
        })?;

        let mut superseded = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            let is_bundle = entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.starts_with(BUNDLE_PREFIX));
            if !is_bundle || path == current || !path.is_dir() {
                continue;
            }
            match read_manifest(&path) {
                Ok(manifest) if manifest.metadata.created_at < published_at => {
                    superseded.push((manifest.metadata.created_at, path));
                }
                Ok(_) => {}
                Err(e) => debug!(path = %path.display(), error = %e, "Not pruning unreadable bundle"),
            }
        }

        // newest first
        superseded.sort_by(|a, b| b.0.cmp(&a.0));

        let mut removed = 0;
        for (_, path) in superseded.into_iter().skip(keep) {
            match fs::remove_dir_all(&path) {
                Ok(()) => removed += 1,
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to prune bundle"),
            }
        }

        if removed > 0 {
            info!(removed = removed, kept = keep, "Pruned superseded bundles");
        }
        Ok(removed)
    }

    /// Directory of the currently published bundle.
    pub fn current_dir(&self) -> Result<PathBuf> {
        let pointer = self.root.join(CURRENT_POINTER);
        let content = fs::read_to_string(&pointer).map_err(|e| {
            PipelineError::artifact_load(
                "bundle",
                format!("no published bundle at {}: {}", pointer.display(), e),
            )
        })?;

        let dir_name = content.trim();
        if !is_plain_name(dir_name) {
            return Err(PipelineError::artifact_load(
                "bundle",
                format!("invalid bundle pointer '{}'", dir_name),
            ));
        }
        Ok(self.root.join(dir_name))
    }

    /// Load the published bundle; fails if any artifact is missing or corrupt.
    pub fn load(&self) -> Result<ArtifactBundle> {
        let dir = self.current_dir()?;
        self.load_dir(&dir)
    }

    /// Load a bundle from a specific bundle directory.
    pub fn load_dir(&self, dir: &Path) -> Result<ArtifactBundle> {
        info!(path = %dir.display(), "Loading artifact bundle");

        let manifest = read_manifest(dir)?;

        let encoders: EncoderMap = read_artifact(dir, &manifest, ENCODER_ARTIFACT)?;
        let scaler: StandardScaler = read_artifact(dir, &manifest, SCALER_ARTIFACT)?;
        let classifier: RandomForest = read_artifact(dir, &manifest, CLASSIFIER_ARTIFACT)?;

        let bundle = ArtifactBundle::from_parts(manifest.metadata, encoders, scaler, classifier)?;

        info!(
            run_id = %bundle.metadata().run_id,
            trees = bundle.classifier().trees().len(),
            "Artifact bundle loaded"
        );
        Ok(bundle)
    }
}

fn read_manifest(dir: &Path) -> Result<Manifest> {
    let bytes = fs::read(dir.join(MANIFEST_FILE))
        .map_err(|e| PipelineError::artifact_load("manifest", e))?;
    serde_json::from_slice(&bytes).map_err(|e| PipelineError::artifact_load("manifest", e))
}

fn encode<T: Serialize>(artifact: &str, value: &T, pretty: bool) -> Result<Vec<u8>> {
    let bytes = if pretty {
        serde_json::to_vec_pretty(value)
    } else {
        serde_json::to_vec(value)
    };
    bytes.map_err(|e| PipelineError::artifact_persist(artifact, e))
}

fn write_artifact(staging: &Path, artifact: &str, bytes: &[u8]) -> Result<ArtifactEntry> {
    let file = format!("{}.json", artifact);
    let path = staging.join(&file);
    write_synced(&path, bytes).map_err(|e| {
        PipelineError::artifact_persist(artifact, format!("{}: {}", path.display(), e))
    })?;

    debug!(artifact = %artifact, bytes = bytes.len(), "Artifact staged");
    Ok(ArtifactEntry {
        file,
        sha256: sha256_hex(bytes),
        bytes: bytes.len() as u64,
    })
}

fn read_artifact<T: DeserializeOwned>(dir: &Path, manifest: &Manifest, artifact: &str) -> Result<T> {
    let entry = manifest
        .artifacts
        .get(artifact)
        .ok_or_else(|| PipelineError::artifact_load(artifact, "not listed in manifest"))?;
    if !is_plain_name(&entry.file) {
        return Err(PipelineError::artifact_load(
            artifact,
            format!("invalid file name '{}'", entry.file),
        ));
    }

    let path = dir.join(&entry.file);
    let bytes = fs::read(&path).map_err(|e| {
        PipelineError::artifact_load(artifact, format!("{}: {}", path.display(), e))
    })?;

    let digest = sha256_hex(&bytes);
    if digest != entry.sha256 {
        return Err(PipelineError::artifact_load(
            artifact,
            format!("checksum mismatch (expected {}, found {})", entry.sha256, digest),
        ));
    }

    serde_json::from_slice(&bytes).map_err(|e| PipelineError::artifact_load(artifact, e))
}

pub(crate) fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

fn sync_dir(dir: &Path) {
    if let Ok(handle) = fs::File::open(dir) {
        let _ = handle.sync_all();
    }
}

fn discard(staging: &Path) -> bool {
    match fs::remove_dir_all(staging) {
        Ok(()) => true,
        Err(e) => {
            warn!(path = %staging.display(), error = %e, "Failed to remove staging directory");
            false
        }
    }
}

fn is_plain_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains('/')
        && !name.contains('\\')
}
