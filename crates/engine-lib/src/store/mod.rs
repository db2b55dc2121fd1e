//! Artifact store: atomic generation publish and tolerant reload
//!
//! Layout under the store root:
//!
//! ```text
//! CURRENT                  name of the active generation
//! gen-<epoch-millis>/
//!     model_A.json         candidate pipelines (either may be absent)
//!     model_B.json
//!     model.json           copy of the selected best pipeline
//!     manifest.json
//! ```
//!
//! A generation is staged in a private directory, renamed into place and
//! only then made visible by replacing `CURRENT`. Readers resolve `CURRENT`
//! once, so a load never mixes files from two generations. Without a
//! `CURRENT` pointer the root itself is read as a flat layout.

pub mod manifest;

pub use manifest::{
    BestSelection, EnsembleScores, EnsembleSection, KFoldInfo, Manifest, ModelReport, SplitInfo,
    WeightPair,
};

use crate::error::EngineError;
use crate::models::Candidate;
use crate::training::TrainedPipeline;
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, info, warn};

pub const CURRENT_POINTER: &str = "CURRENT";
pub const MANIFEST_FILE: &str = "manifest.json";
pub const BEST_MODEL_FILE: &str = "model.json";
const GENERATION_PREFIX: &str = "gen-";

pub fn pipeline_file(candidate: Candidate) -> String {
    format!("model_{}.json", candidate)
}

/// Configuration for the artifact store
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Directory holding generations and the `CURRENT` pointer
    pub root: PathBuf,
    /// Generations retained after a successful publish (at least 1)
    pub generations_to_keep: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./data/models"),
            generations_to_keep: 3,
        }
    }
}

/// Whatever could be read from the active generation
#[derive(Debug, Default, Clone)]
pub struct LoadedArtifacts {
    pub generation: Option<String>,
    pub a: Option<Arc<TrainedPipeline>>,
    pub b: Option<Arc<TrainedPipeline>>,
    pub manifest: Option<Manifest>,
    /// Artifacts that existed but could not be used
    pub issues: Vec<EngineError>,
}

/// Result of a successful publish
#[derive(Debug, Clone)]
pub struct PublishedGeneration {
    pub name: String,
    pub version: DateTime<Utc>,
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationInfo {
    pub name: String,
    pub created_millis: i64,
    pub current: bool,
}

pub struct ArtifactStore {
    config: StoreConfig,
    /// Serializes publishers and remembers the last version handed out
    publish_lock: Mutex<Option<DateTime<Utc>>>,
    /// Readers hold it shared while resolving a generation; publish takes it
    /// exclusively only to swap `CURRENT` and prune
    swap_lock: RwLock<()>,
}

impl ArtifactStore {
    pub fn new(config: StoreConfig) -> Result<Self> {
        fs::create_dir_all(&config.root)
            .with_context(|| format!("Failed to create model directory {:?}", config.root))?;
        Ok(Self {
            config,
            publish_lock: Mutex::new(None),
            swap_lock: RwLock::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.config.root
    }

    /// Atomically publish a new generation.
    ///
    /// The manifest version is regenerated here and the pipeline checksums are
    /// recorded in it. On any failure the previous generation stays active.
    pub fn persist(
        &self,
        a: Option<&TrainedPipeline>,
        b: Option<&TrainedPipeline>,
        mut manifest: Manifest,
    ) -> Result<PublishedGeneration> {
        let pipelines: Vec<(Candidate, &TrainedPipeline)> = [(Candidate::A, a), (Candidate::B, b)]
            .into_iter()
            .filter_map(|(c, p)| p.map(|p| (c, p)))
            .collect();
        if pipelines.is_empty() {
            bail!("refusing to publish a generation without any pipeline");
        }
        for (slot, pipe) in &pipelines {
            if pipe.candidate != *slot {
                bail!("pipeline for slot {} was trained as {}", slot, pipe.candidate);
            }
        }
        let best_key = manifest.best.selected_key.clone();
        let best = pipelines
            .iter()
            .find(|(c, _)| c.key() == best_key)
            .map(|(_, p)| *p)
            .with_context(|| format!("best key '{}' has no pipeline in this generation", best_key))?;

        let mut last_version = self.publish_lock.lock().unwrap_or_else(|p| p.into_inner());

        let previous = [*last_version, self.current_manifest_version()]
            .into_iter()
            .flatten()
            .max();
        let mut version = Manifest::next_version(previous);
        let mut name = generation_name(version);
        while self.config.root.join(&name).exists() {
            version += Duration::milliseconds(1);
            name = generation_name(version);
        }
        manifest.version = version;

        let staging = self
            .config
            .root
            .join(format!(".staging-{}", uuid::Uuid::new_v4()));
        let final_dir = self.config.root.join(&name);

        let staged = self.stage(&staging, &pipelines, best, &mut manifest);
        let staged = staged.and_then(|_| {
            fs::rename(&staging, &final_dir)
                .with_context(|| format!("Failed to move {:?} to {:?}", staging, final_dir))?;
            sync_dir(&self.config.root)
        });
        if let Err(e) = staged {
            if let Err(cleanup) = fs::remove_dir_all(&staging) {
                if cleanup.kind() != ErrorKind::NotFound {
                    warn!(path = %staging.display(), error = %cleanup, "Failed to remove staging directory");
                }
            }
            return Err(e);
        }

        {
            let _swap = self.swap_lock.write().unwrap_or_else(|p| p.into_inner());
            write_atomic(&self.config.root.join(CURRENT_POINTER), name.as_bytes())?;
            sync_dir(&self.config.root)?;
            self.prune(&name);
        }
        *last_version = Some(version);

        info!(
            generation = %name,
            version = %manifest.version_label(),
            best = %best_key,
            has_a = a.is_some(),
            has_b = b.is_some(),
            "Published artifact generation"
        );

        Ok(PublishedGeneration {
            name,
            version,
            path: final_dir,
        })
    }

    fn stage(
        &self,
        staging: &Path,
        pipelines: &[(Candidate, &TrainedPipeline)],
        best: &TrainedPipeline,
        manifest: &mut Manifest,
    ) -> Result<()> {
        fs::create_dir_all(staging)
            .with_context(|| format!("Failed to create staging directory {:?}", staging))?;

        manifest.checksums.clear();
        for (candidate, pipe) in pipelines {
            let file = pipeline_file(*candidate);
            let bytes = serde_json::to_vec(pipe)
                .with_context(|| format!("Failed to serialize pipeline {}", candidate))?;
            write_atomic(&staging.join(&file), &bytes)?;
            manifest.checksums.insert(file, compute_checksum(&bytes));
        }

        let best_bytes = serde_json::to_vec(best).context("Failed to serialize best pipeline")?;
        write_atomic(&staging.join(BEST_MODEL_FILE), &best_bytes)?;
        manifest
            .checksums
            .insert(BEST_MODEL_FILE.to_string(), compute_checksum(&best_bytes));

        let manifest_bytes =
            serde_json::to_vec_pretty(manifest).context("Failed to serialize manifest")?;
        write_atomic(&staging.join(MANIFEST_FILE), &manifest_bytes)?;
        sync_dir(staging)
    }

    /// Load the active generation; any subset of artifacts may be missing or unusable
    pub fn load(&self) -> LoadedArtifacts {
        let _swap = self.swap_lock.read().unwrap_or_else(|p| p.into_inner());
        let mut loaded = LoadedArtifacts::default();

        let dir = match self.resolve_current() {
            Ok(Some(name)) => {
                let dir = self.config.root.join(&name);
                if !dir.is_dir() {
                    loaded.issues.push(EngineError::ArtifactCorruption {
                        artifact: CURRENT_POINTER.to_string(),
                        reason: format!("generation {} does not exist", name),
                    });
                    return loaded;
                }
                loaded.generation = Some(name);
                dir
            }
            Ok(None) => self.config.root.clone(),
            Err(e) => {
                loaded.issues.push(e);
                return loaded;
            }
        };

        match read_optional(&dir.join(MANIFEST_FILE)) {
            Ok(Some(bytes)) => match serde_json::from_slice::<Manifest>(&bytes) {
                Ok(m) => loaded.manifest = Some(m),
                Err(e) => loaded.issues.push(EngineError::ArtifactCorruption {
                    artifact: MANIFEST_FILE.to_string(),
                    reason: e.to_string(),
                }),
            },
            Ok(None) => {}
            Err(e) => loaded.issues.push(EngineError::ArtifactCorruption {
                artifact: MANIFEST_FILE.to_string(),
                reason: e.to_string(),
            }),
        }

        for candidate in Candidate::ALL {
            match self.load_pipeline(&dir, candidate, loaded.manifest.as_ref()) {
                Ok(Some(pipe)) => match candidate {
                    Candidate::A => loaded.a = Some(Arc::new(pipe)),
                    Candidate::B => loaded.b = Some(Arc::new(pipe)),
                },
                Ok(None) => {}
                Err(e) => loaded.issues.push(e),
            }
        }

        for issue in &loaded.issues {
            warn!(error = %issue, "Artifact treated as absent");
        }
        debug!(
            generation = ?loaded.generation,
            has_a = loaded.a.is_some(),
            has_b = loaded.b.is_some(),
            manifest = loaded.manifest.is_some(),
            "Loaded artifacts"
        );
        loaded
    }

    fn load_pipeline(
        &self,
        dir: &Path,
        candidate: Candidate,
        manifest: Option<&Manifest>,
    ) -> std::result::Result<Option<TrainedPipeline>, EngineError> {
        let file = pipeline_file(candidate);
        let corrupt = |reason: String| EngineError::ArtifactCorruption {
            artifact: file.clone(),
            reason,
        };

        let Some(bytes) = read_optional(&dir.join(&file)).map_err(|e| corrupt(e.to_string()))?
        else {
            return Ok(None);
        };

        if let Some(expected) = manifest.and_then(|m| m.checksums.get(&file)) {
            let actual = compute_checksum(&bytes);
            if &actual != expected {
                return Err(corrupt(format!(
                    "checksum mismatch: expected {}, got {}",
                    expected, actual
                )));
            }
        }

        let pipe: TrainedPipeline =
            serde_json::from_slice(&bytes).map_err(|e| corrupt(e.to_string()))?;
        if pipe.candidate != candidate {
            return Err(corrupt(format!("file holds candidate {}", pipe.candidate)));
        }
        Ok(Some(pipe))
    }

    fn resolve_current(&self) -> std::result::Result<Option<String>, EngineError> {
        let corrupt = |reason: String| EngineError::ArtifactCorruption {
            artifact: CURRENT_POINTER.to_string(),
            reason,
        };
        let Some(bytes) = read_optional(&self.config.root.join(CURRENT_POINTER))
            .map_err(|e| corrupt(e.to_string()))?
        else {
            return Ok(None);
        };
        let name = String::from_utf8(bytes).map_err(|e| corrupt(e.to_string()))?;
        let name = name.trim();
        if parse_generation(name).is_none() {
            return Err(corrupt(format!("invalid generation name '{}'", name)));
        }
        Ok(Some(name.to_string()))
    }

    fn current_manifest_version(&self) -> Option<DateTime<Utc>> {
        let name = self.resolve_current().ok().flatten()?;
        let bytes = read_optional(&self.config.root.join(name).join(MANIFEST_FILE))
            .ok()
            .flatten()?;
        serde_json::from_slice::<Manifest>(&bytes)
            .ok()
            .map(|m| m.version)
    }

    /// Retained generations, newest first
    pub fn list_generations(&self) -> Result<Vec<GenerationInfo>> {
        let current = self.resolve_current().ok().flatten();
        let mut gens: Vec<GenerationInfo> = fs::read_dir(&self.config.root)
            .with_context(|| format!("Failed to list {:?}", self.config.root))?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_dir())
            .filter_map(|entry| {
                let name = entry.file_name().to_string_lossy().into_owned();
                parse_generation(&name).map(|millis| GenerationInfo {
                    current: current.as_deref() == Some(name.as_str()),
                    name,
                    created_millis: millis,
                })
            })
            .collect();
        gens.sort_by(|a, b| b.created_millis.cmp(&a.created_millis));
        Ok(gens)
    }

    /// Remove generations beyond the retention limit; failures are logged only
    fn prune(&self, current: &str) {
        let gens = match self.list_generations() {
            Ok(g) => g,
            Err(e) => {
                warn!(error = %e, "Failed to list generations for pruning");
                return;
            }
        };
        let keep = self.config.generations_to_keep.max(1);
        for stale in gens.iter().skip(keep).filter(|g| g.name != current) {
            let path = self.config.root.join(&stale.name);
            match fs::remove_dir_all(&path) {
                Ok(()) => debug!(generation = %stale.name, "Pruned old generation"),
                Err(e) => warn!(
                    path = %path.display(),
                    error = %e,
                    "Failed to remove old generation"
                ),
            }
        }
    }
}

fn generation_name(version: DateTime<Utc>) -> String {
    format!("{}{}", GENERATION_PREFIX, version.timestamp_millis())
}

fn parse_generation(name: &str) -> Option<i64> {
    name.strip_prefix(GENERATION_PREFIX)?.parse().ok()
}

fn read_optional(path: &Path) -> std::io::Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Write to a sibling temp file, fsync, then rename over `path`
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .context("artifact path has no file name")?;
    let temp_path = path.with_file_name(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4()));

    let mut file = File::create(&temp_path)
        .with_context(|| format!("Failed to create temp file {:?}", temp_path))?;
    file.write_all(bytes)
        .with_context(|| format!("Failed to write {:?}", temp_path))?;
    file.sync_all().context("Failed to sync artifact file")?;

    if let Err(e) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(e).with_context(|| format!("Failed to rename {:?} to {:?}", temp_path, path));
    }
    Ok(())
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> Result<()> {
    File::open(dir)
        .and_then(|d| d.sync_all())
        .with_context(|| format!("Failed to sync directory {:?}", dir))
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> Result<()> {
    Ok(())
}

/// Compute SHA256 checksum of data
pub fn compute_checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::{Dataset, ElasticNetFamily, EstimatorFamily, RandomForestFamily};
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn pipeline(candidate: Candidate) -> TrainedPipeline {
        let data = Dataset::synthetic(40, 9);
        let family: Box<dyn EstimatorFamily> = match candidate {
            Candidate::A => Box::new(ElasticNetFamily::default()),
            Candidate::B => Box::new(RandomForestFamily::new(3)),
        };
        let params = family.grid().combinations()[0].clone();
        TrainedPipeline::fit(candidate, family.as_ref(), &data.features(), &data.targets(), &params)
            .unwrap()
    }

    fn manifest(best: &str) -> Manifest {
        Manifest {
            version: Utc::now(),
            features: crate::models::FeatureVector::columns(),
            split: SplitInfo {
                test_fraction: 0.2,
                seed: 42,
            },
            kfold: KFoldInfo {
                k: 5,
                seed: 42,
                shuffled: true,
            },
            per_model: BTreeMap::new(),
            best: BestSelection {
                selected_key: best.to_string(),
                selection_metric: "test_mae".to_string(),
            },
            ensemble: EnsembleSection::default(),
            mode: None,
            run_id: None,
            checksums: BTreeMap::new(),
        }
    }

    fn store(dir: &TempDir, keep: usize) -> ArtifactStore {
        ArtifactStore::new(StoreConfig {
            root: dir.path().to_path_buf(),
            generations_to_keep: keep,
        })
        .unwrap()
    }

    #[test]
    fn test_empty_store_loads_nothing() {
        let dir = TempDir::new().unwrap();
        let loaded = store(&dir, 3).load();
        assert!(loaded.a.is_none() && loaded.b.is_none() && loaded.manifest.is_none());
        assert!(loaded.issues.is_empty());
    }

    #[test]
    fn test_persist_then_load() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir, 3);
        let (a, b) = (pipeline(Candidate::A), pipeline(Candidate::B));
        let published = store.persist(Some(&a), Some(&b), manifest("B")).unwrap();

        assert!(published.path.join(BEST_MODEL_FILE).is_file());
        let loaded = store.load();
        assert_eq!(loaded.generation.as_deref(), Some(published.name.as_str()));
        assert_eq!(loaded.a.as_deref(), Some(&a));
        assert_eq!(loaded.b.as_deref(), Some(&b));
        let m = loaded.manifest.unwrap();
        assert_eq!(m.version, published.version);
        assert_eq!(m.checksums.len(), 3);
    }

    #[test]
    fn test_versions_increase() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir, 5);
        let a = pipeline(Candidate::A);
        let first = store.persist(Some(&a), None, manifest("A")).unwrap();
        let second = store.persist(Some(&a), None, manifest("A")).unwrap();
        assert!(second.version > first.version);
        assert_ne!(first.name, second.name);
    }

    #[test]
    fn test_corrupt_b_does_not_block_a() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir, 3);
        let (a, b) = (pipeline(Candidate::A), pipeline(Candidate::B));
        let published = store.persist(Some(&a), Some(&b), manifest("A")).unwrap();

        fs::write(published.path.join(pipeline_file(Candidate::B)), b"{not json").unwrap();
        let loaded = store.load();
        assert!(loaded.a.is_some());
        assert!(loaded.b.is_none());
        assert!(loaded.manifest.is_some());
        assert_eq!(
            loaded.issues[0].warning_tags(),
            vec!["ARTIFACT_CORRUPT:model_B.json".to_string()]
        );
    }

    #[test]
    fn test_checksum_mismatch_is_corruption() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir, 3);
        let a = pipeline(Candidate::A);
        let published = store.persist(Some(&a), None, manifest("A")).unwrap();

        // Valid JSON for a different pipeline still fails the checksum
        let mut other = a.clone();
        other.params.clear();
        fs::write(
            published.path.join(pipeline_file(Candidate::A)),
            serde_json::to_vec(&other).unwrap(),
        )
        .unwrap();
        let loaded = store.load();
        assert!(loaded.a.is_none());
        assert_eq!(loaded.issues.len(), 1);
    }

    #[test]
    fn test_failed_publish_keeps_previous_generation() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir, 3);
        let a = pipeline(Candidate::A);
        let good = store.persist(Some(&a), None, manifest("A")).unwrap();

        assert!(store.persist(Some(&a), None, manifest("B")).is_err());
        assert!(store.persist(None, None, manifest("A")).is_err());

        let loaded = store.load();
        assert_eq!(loaded.generation.as_deref(), Some(good.name.as_str()));
        assert_eq!(store.list_generations().unwrap().len(), 1);
        let leftovers = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(".staging"))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn test_prune_keeps_newest() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir, 2);
        let a = pipeline(Candidate::A);
        let mut names = Vec::new();
        for _ in 0..4 {
            names.push(store.persist(Some(&a), None, manifest("A")).unwrap().name);
        }
        let gens = store.list_generations().unwrap();
        assert_eq!(gens.len(), 2);
        assert_eq!(gens[0].name, names[3]);
        assert!(gens[0].current);
        assert_eq!(gens[1].name, names[2]);
    }

    #[test]
    fn test_flat_layout_without_pointer() {
        let dir = TempDir::new().unwrap();
        let a = pipeline(Candidate::A);
        fs::write(
            dir.path().join(pipeline_file(Candidate::A)),
            serde_json::to_vec(&a).unwrap(),
        )
        .unwrap();
        let loaded = store(&dir, 3).load();
        assert!(loaded.generation.is_none());
        assert!(loaded.a.is_some());
        assert!(loaded.b.is_none());
        assert!(loaded.manifest.is_none());
    }

    #[test]
    fn test_dangling_pointer() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(CURRENT_POINTER), "gen-123").unwrap();
        let loaded = store(&dir, 3).load();
        assert!(loaded.a.is_none());
        assert_eq!(loaded.issues.len(), 1);
    }

    #[test]
    fn test_checksum() {
        assert_eq!(
            compute_checksum(b"hello world"),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }
}
