//! Training dataset loading, synthesis and splitting
//!
//! Rows come either from a CSV file (`type,floorAreaM2,builtYear,energy_kwh,target`)
//! or from a seeded synthetic generator. Both build their feature vectors
//! with the serving [`FeaturePipeline`]. Splits and folds are deterministic
//! for a given seed.

use crate::models::{BuildingRequest, BuildingType, FeatureVector, TrainingRecord};
use crate::predictor::FeaturePipeline;
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::path::{Path, PathBuf};

/// Default seed for synthesis, splitting and fold assignment
pub const DEFAULT_SEED: u64 = 42;

const REQUIRED_COLUMNS: [&str; 5] = ["type", "floorAreaM2", "builtYear", "energy_kwh", "target"];

#[derive(Debug, Deserialize)]
struct CsvRow {
    #[serde(rename = "type")]
    building_type: String,
    #[serde(rename = "floorAreaM2")]
    floor_area_m2: f64,
    #[serde(rename = "builtYear")]
    built_year: f64,
    energy_kwh: f64,
    target: f64,
}

/// `Some` only for integral values inside the `i32` range
fn whole_year(value: f64) -> Option<i32> {
    let in_range = value >= f64::from(i32::MIN) && value <= f64::from(i32::MAX);
    (value.fract() == 0.0 && in_range).then_some(value as i32)
}

/// Where training rows come from
#[derive(Debug, Clone, PartialEq)]
pub enum DatasetSource {
    /// CSV file; falls back to synthesis when the file does not exist
    Csv(PathBuf),
    Synthetic { rows: usize, seed: u64 },
}

impl DatasetSource {
    /// Resolve the source into concrete rows
    pub fn load(&self, synthetic_rows: usize) -> Result<Dataset> {
        match self {
            DatasetSource::Csv(path) if path.is_file() => Dataset::from_csv(path),
            DatasetSource::Csv(path) => {
                tracing::info!(
                    path = %path.display(),
                    rows = synthetic_rows,
                    "Training CSV not found, using synthetic dataset"
                );
                Ok(Dataset::synthetic(synthetic_rows, DEFAULT_SEED))
            }
            DatasetSource::Synthetic { rows, seed } => Ok(Dataset::synthetic(*rows, *seed)),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            DatasetSource::Csv(path) => format!("csv:{}", path.display()),
            DatasetSource::Synthetic { rows, seed } => format!("synthetic:{}:{}", rows, seed),
        }
    }
}

/// Labelled training rows
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub records: Vec<TrainingRecord>,
}

impl Dataset {
    pub fn new(records: Vec<TrainingRecord>) -> Self {
        Self { records }
    }

    /// Load a dataset from a CSV file with a header row
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read CSV file {}", path.display()))?;
        Self::parse_csv(&content)
    }

    /// Parse CSV text with a header row.
    ///
    /// Each row is turned into a [`BuildingRequest`] and run through the
    /// serving [`FeaturePipeline`], so derived columns and defaults match
    /// inference exactly. Extra columns are ignored.
    pub fn parse_csv(content: &str) -> Result<Self> {
        let pipeline = FeaturePipeline::new();
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .comment(Some(b'#'))
            .from_reader(content.as_bytes());

        let headers = reader.headers().context("Failed to read CSV header")?.clone();
        for name in REQUIRED_COLUMNS {
            if !headers.iter().any(|h| h == name) {
                bail!("CSV header is missing required column '{}'", name);
            }
        }

        let mut records = Vec::new();
        for (idx, row) in reader.deserialize::<CsvRow>().enumerate() {
            let row = row.with_context(|| format!("Record {}: malformed row", idx + 1))?;
            let Some(built_year) = whole_year(row.built_year) else {
                bail!(
                    "Record {}: builtYear must be a whole year, got {}",
                    idx + 1,
                    row.built_year
                );
            };
            if !row.target.is_finite() {
                bail!("Record {}: target must be finite", idx + 1);
            }

            let request = BuildingRequest {
                building_type: Some(row.building_type),
                floor_area_m2: Some(row.floor_area_m2),
                built_year: Some(built_year),
                energy_kwh: Some(row.energy_kwh),
                ..Default::default()
            };
            records.push(TrainingRecord {
                features: pipeline.derive(&request),
                target: row.target,
            });
        }

        if records.is_empty() {
            bail!("Dataset is empty");
        }
        Ok(Self { records })
    }

    /// Seeded synthetic dataset mirroring the reference building population
    pub fn synthetic(rows: usize, seed: u64) -> Self {
        const TYPE_MIX: [(BuildingType, f64, f64); 4] = [
            (BuildingType::Factory, 0.35, 2.5),
            (BuildingType::Hospital, 0.15, -0.5),
            (BuildingType::School, 0.25, 1.0),
            (BuildingType::Office, 0.25, 0.0),
        ];

        let pipeline = FeaturePipeline::new();
        let mut rng = StdRng::seed_from_u64(seed);
        let records = (0..rows)
            .map(|_| {
                let draw: f64 = rng.gen();
                let mut acc = 0.0;
                let mut picked = TYPE_MIX[TYPE_MIX.len() - 1];
                for entry in TYPE_MIX {
                    acc += entry.1;
                    if draw < acc {
                        picked = entry;
                        break;
                    }
                }
                let (building_type, _, bias) = picked;

                let floor_area_m2: f64 = rng.gen_range(300.0..8000.0);
                let built_year: i32 = rng.gen_range(1980..=2020);
                let energy_kwh: f64 = rng.gen_range(50_000.0..2_000_000.0);

                let features = pipeline.derive(&BuildingRequest {
                    building_type: Some(building_type.as_str().to_string()),
                    floor_area_m2: Some(floor_area_m2),
                    built_year: Some(built_year),
                    energy_kwh: Some(energy_kwh),
                    ..Default::default()
                });

                let base = 8.0
                    + 0.015 * (features.eui_kwh_m2y - 200.0)
                    + 0.0004 * (floor_area_m2 - 2000.0)
                    + 0.01 * (2005 - built_year) as f64;
                let target = (base + bias + 2.5 * standard_normal(&mut rng)).clamp(4.0, 35.0);

                TrainingRecord { features, target }
            })
            .collect();

        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn features(&self) -> Vec<FeatureVector> {
        self.records.iter().map(|r| r.features.clone()).collect()
    }

    pub fn targets(&self) -> Vec<f64> {
        self.records.iter().map(|r| r.target).collect()
    }

    pub fn subset(&self, indices: &[usize]) -> Dataset {
        Dataset {
            records: indices.iter().map(|&i| self.records[i].clone()).collect(),
        }
    }

    /// Shuffled train/test split; the test side gets `ceil(n * test_fraction)` rows
    pub fn split(&self, test_fraction: f64, seed: u64) -> Result<(Dataset, Dataset)> {
        if !(0.0..1.0).contains(&test_fraction) || test_fraction == 0.0 {
            bail!("test fraction must be in (0, 1), got {}", test_fraction);
        }
        let n = self.len();
        let n_test = (n as f64 * test_fraction).ceil() as usize;
        if n_test == 0 || n_test >= n {
            bail!("dataset of {} rows is too small to split", n);
        }

        let mut indices: Vec<usize> = (0..n).collect();
        indices.shuffle(&mut StdRng::seed_from_u64(seed));
        let (test_idx, train_idx) = indices.split_at(n_test);
        Ok((self.subset(train_idx), self.subset(test_idx)))
    }
}

/// One train/validation partition of a k-fold split
#[derive(Debug, Clone)]
pub struct Fold {
    pub train: Vec<usize>,
    pub validation: Vec<usize>,
}

/// Shuffled k-fold partition of `n` rows; the first `n % k` folds get one extra row
pub fn kfold_indices(n: usize, k: usize, seed: u64) -> Result<Vec<Fold>> {
    if k < 2 {
        bail!("fold count must be at least 2, got {}", k);
    }
    if n < k {
        bail!("cannot split {} rows into {} folds", n, k);
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.shuffle(&mut StdRng::seed_from_u64(seed));

    let base = n / k;
    let extra = n % k;
    let mut folds = Vec::with_capacity(k);
    let mut start = 0;
    for i in 0..k {
        let size = base + usize::from(i < extra);
        let validation = order[start..start + size].to_vec();
        let train = order[..start]
            .iter()
            .chain(order[start + size..].iter())
            .copied()
            .collect();
        folds.push(Fold { train, validation });
        start += size;
    }
    Ok(folds)
}

/// Box-Muller draw from N(0, 1)
fn standard_normal<R: Rng>(rng: &mut R) -> f64 {
    let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
    let u2: f64 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}
