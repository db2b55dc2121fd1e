//! Estimator families, hyperparameter grids and trained pipelines

use super::forest::{ForestConfig, RandomForest};
use super::linear::{ElasticNet, ElasticNetConfig};
use super::preprocess::Preprocessor;
use crate::error::{EngineError, EngineResult};
use crate::models::{Candidate, FeatureVector};
use crate::predictor::SavingModel;
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// One hyperparameter value; `Unbounded` serializes as `null`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Unbounded,
    Int(i64),
    Float(f64),
}

impl ParamValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Int(v) => Some(*v as f64),
            ParamValue::Float(v) => Some(*v),
            ParamValue::Unbounded => None,
        }
    }

    pub fn as_usize(&self) -> Option<usize> {
        match self {
            ParamValue::Int(v) if *v >= 0 => Some(*v as usize),
            _ => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Unbounded => f.write_str("None"),
            ParamValue::Int(v) => write!(f, "{}", v),
            ParamValue::Float(v) => write!(f, "{}", v),
        }
    }
}

pub type HyperParams = BTreeMap<String, ParamValue>;

pub fn format_params(params: &HyperParams) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(",")
}

/// Ordered hyperparameter axes; enumeration keeps the first axis outermost
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamGrid {
    axes: Vec<(String, Vec<ParamValue>)>,
}

impl ParamGrid {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn axis(mut self, name: &str, values: Vec<ParamValue>) -> Self {
        self.axes.push((name.to_string(), values));
        self
    }

    pub fn len(&self) -> usize {
        if self.axes.is_empty() {
            return 0;
        }
        self.axes.iter().map(|(_, v)| v.len()).product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Full cartesian product in deterministic order
    pub fn combinations(&self) -> Vec<HyperParams> {
        if self.is_empty() {
            return Vec::new();
        }
        let mut combos: Vec<HyperParams> = vec![HyperParams::new()];
        for (name, values) in &self.axes {
            combos = combos
                .into_iter()
                .flat_map(|base| {
                    values.iter().map(move |v| {
                        let mut next = base.clone();
                        next.insert(name.clone(), *v);
                        next
                    })
                })
                .collect();
        }
        combos
    }
}

/// A fitted estimator of any supported family
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FittedEstimator {
    ElasticNet(ElasticNet),
    RandomForest(RandomForest),
}

impl FittedEstimator {
    pub fn predict(&self, row: &[f64]) -> f64 {
        match self {
            FittedEstimator::ElasticNet(m) => m.predict(row),
            FittedEstimator::RandomForest(m) => m.predict(row),
        }
    }
}

/// Capability set the trainer relies on: a name, a grid and `fit`
pub trait EstimatorFamily: Send + Sync {
    fn name(&self) -> &'static str;

    fn grid(&self) -> ParamGrid;

    fn fit(&self, x: &[Vec<f64>], y: &[f64], params: &HyperParams) -> Result<FittedEstimator>;
}

/// Candidate A: regularized linear regression
#[derive(Debug, Clone)]
pub struct ElasticNetFamily {
    pub max_iter: usize,
    pub tol: f64,
    grid: ParamGrid,
}

impl Default for ElasticNetFamily {
    fn default() -> Self {
        let floats = |v: &[f64]| v.iter().map(|x| ParamValue::Float(*x)).collect();
        Self {
            max_iter: 50_000,
            tol: 1e-4,
            grid: ParamGrid::new()
                .axis("alpha", floats(&[0.05, 0.1, 0.5, 1.0]))
                .axis("l1_ratio", floats(&[0.2, 0.5, 0.8, 1.0])),
        }
    }
}

impl ElasticNetFamily {
    pub fn with_grid(mut self, grid: ParamGrid) -> Self {
        self.grid = grid;
        self
    }
}

impl EstimatorFamily for ElasticNetFamily {
    fn name(&self) -> &'static str {
        "ElasticNet"
    }

    fn grid(&self) -> ParamGrid {
        self.grid.clone()
    }

    fn fit(&self, x: &[Vec<f64>], y: &[f64], params: &HyperParams) -> Result<FittedEstimator> {
        let config = ElasticNetConfig {
            alpha: require_f64(params, "alpha")?,
            l1_ratio: require_f64(params, "l1_ratio")?,
            max_iter: self.max_iter,
            tol: self.tol,
        };
        Ok(FittedEstimator::ElasticNet(ElasticNet::fit(x, y, &config)?))
    }
}

/// Candidate B: bootstrap tree ensemble
#[derive(Debug, Clone)]
pub struct RandomForestFamily {
    pub n_trees: usize,
    pub seed: u64,
    grid: ParamGrid,
}

impl RandomForestFamily {
    pub fn new(n_trees: usize) -> Self {
        let ints = |v: &[i64]| v.iter().map(|x| ParamValue::Int(*x)).collect::<Vec<_>>();
        let mut depths = vec![ParamValue::Unbounded];
        depths.extend(ints(&[6, 10, 14]));
        Self {
            n_trees,
            seed: 42,
            grid: ParamGrid::new()
                .axis("max_depth", depths)
                .axis("min_samples_leaf", ints(&[1, 2, 5])),
        }
    }

    pub fn with_grid(mut self, grid: ParamGrid) -> Self {
        self.grid = grid;
        self
    }
}

impl Default for RandomForestFamily {
    fn default() -> Self {
        Self::new(200)
    }
}

impl EstimatorFamily for RandomForestFamily {
    fn name(&self) -> &'static str {
        "RandomForest"
    }

    fn grid(&self) -> ParamGrid {
        self.grid.clone()
    }

    fn fit(&self, x: &[Vec<f64>], y: &[f64], params: &HyperParams) -> Result<FittedEstimator> {
        let max_depth = match params.get("max_depth") {
            None | Some(ParamValue::Unbounded) => None,
            Some(v) => Some(
                v.as_usize()
                    .ok_or_else(|| anyhow!("max_depth must be a non-negative integer, got {}", v))?,
            ),
        };
        let min_samples_leaf = params
            .get("min_samples_leaf")
            .and_then(ParamValue::as_usize)
            .unwrap_or(1);
        let config = ForestConfig {
            n_trees: self.n_trees,
            max_depth,
            min_samples_leaf,
            seed: self.seed,
        };
        Ok(FittedEstimator::RandomForest(RandomForest::fit(x, y, &config)?))
    }
}

fn require_f64(params: &HyperParams, name: &str) -> Result<f64> {
    params
        .get(name)
        .and_then(ParamValue::as_f64)
        .with_context(|| format!("missing numeric hyperparameter '{}'", name))
}

/// Immutable preprocessing + estimator unit for one candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainedPipeline {
    pub candidate: Candidate,
    pub family: String,
    pub params: HyperParams,
    pub preprocessor: Preprocessor,
    pub estimator: FittedEstimator,
    pub trained_at: DateTime<Utc>,
}

impl TrainedPipeline {
    /// Fit preprocessing and estimator on the given rows
    pub fn fit(
        candidate: Candidate,
        family: &dyn EstimatorFamily,
        rows: &[FeatureVector],
        targets: &[f64],
        params: &HyperParams,
    ) -> Result<Self> {
        let preprocessor = Preprocessor::fit(rows)?;
        let x = preprocessor.transform_all(rows)?;
        let estimator = family
            .fit(&x, targets, params)
            .with_context(|| format!("{} fit failed with {}", family.name(), format_params(params)))?;
        Ok(Self {
            candidate,
            family: family.name().to_string(),
            params: params.clone(),
            preprocessor,
            estimator,
            trained_at: Utc::now(),
        })
    }

    /// Feature columns this pipeline was fitted on
    pub fn columns(&self) -> &[String] {
        &self.preprocessor.columns
    }

    /// Raw estimator output (unclamped)
    pub fn predict_raw(&self, fv: &FeatureVector) -> EngineResult<f64> {
        let row = self.preprocessor.transform(fv).map_err(|e| match e {
            EngineError::SchemaMismatch {
                expected, actual, ..
            } => EngineError::SchemaMismatch {
                candidate: Some(self.candidate),
                expected,
                actual,
            },
            other => EngineError::PredictionExecution {
                candidate: self.candidate,
                reason: other.to_string(),
            },
        })?;
        let value = self.estimator.predict(&row);
        if !value.is_finite() {
            return Err(EngineError::PredictionExecution {
                candidate: self.candidate,
                reason: "non-finite output".to_string(),
            });
        }
        Ok(value)
    }

    pub fn predict_many(&self, rows: &[FeatureVector]) -> EngineResult<Vec<f64>> {
        rows.iter().map(|r| self.predict_raw(r)).collect()
    }
}

impl SavingModel for TrainedPipeline {
    fn candidate(&self) -> Candidate {
        self.candidate
    }

    fn predict_pct(&self, features: &FeatureVector) -> EngineResult<f64> {
        self.predict_raw(features)
    }
}
