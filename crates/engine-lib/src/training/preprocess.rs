//! Column preprocessing fitted inside every trained pipeline
//!
//! Numeric columns are standard-scaled, the building type is one-hot
//! encoded over [`BuildingType::ALL`]. The fitted column list is stored and
//! checked on every transform.

use crate::error::{EngineError, EngineResult};
use crate::models::{BuildingType, FeatureVector};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScaledColumn {
    pub name: String,
    pub mean: f64,
    pub scale: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OneHotColumn {
    pub name: String,
    pub categories: Vec<BuildingType>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preprocessor {
    /// Feature columns the pipeline was fitted on, in order
    pub columns: Vec<String>,
    pub numeric: Vec<ScaledColumn>,
    pub categorical: Vec<OneHotColumn>,
}

impl Preprocessor {
    /// Fit scaling statistics on the given rows
    pub fn fit(rows: &[FeatureVector]) -> EngineResult<Self> {
        if rows.is_empty() {
            return Err(EngineError::TrainingStep(
                "cannot fit preprocessing on zero rows".to_string(),
            ));
        }
        let n = rows.len() as f64;

        let mut numeric = Vec::new();
        let mut categorical = Vec::new();
        for column in FeatureVector::COLUMNS {
            if FeatureVector::CATEGORICAL.contains(&column) {
                categorical.push(OneHotColumn {
                    name: column.to_string(),
                    categories: BuildingType::ALL.to_vec(),
                });
                continue;
            }
            let values: Vec<f64> = rows.iter().filter_map(|r| r.numeric(column)).collect();
            let mean = values.iter().sum::<f64>() / n;
            let std = (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt();
            numeric.push(ScaledColumn {
                name: column.to_string(),
                mean,
                scale: if std > 0.0 && std.is_finite() { std } else { 1.0 },
            });
        }

        Ok(Self {
            columns: FeatureVector::columns(),
            numeric,
            categorical,
        })
    }

    /// Width of a transformed row
    pub fn width(&self) -> usize {
        self.numeric.len()
            + self
                .categorical
                .iter()
                .map(|c| c.categories.len())
                .sum::<usize>()
    }

    /// Verify the vector layout matches the fitted column list
    pub fn check_schema(&self) -> EngineResult<()> {
        if self.columns.iter().map(String::as_str).eq(FeatureVector::COLUMNS) {
            Ok(())
        } else {
            Err(EngineError::SchemaMismatch {
                candidate: None,
                expected: self.columns.clone(),
                actual: FeatureVector::columns(),
            })
        }
    }

    pub fn transform(&self, fv: &FeatureVector) -> EngineResult<Vec<f64>> {
        self.check_schema()?;

        let mut row = Vec::with_capacity(self.width());
        for col in &self.numeric {
            let value = fv.numeric(&col.name).ok_or_else(|| self.mismatch())?;
            row.push((value - col.mean) / col.scale);
        }
        for col in &self.categorical {
            let value = fv.category(&col.name).ok_or_else(|| self.mismatch())?;
            row.extend(
                col.categories
                    .iter()
                    .map(|c| if *c == value { 1.0 } else { 0.0 }),
            );
        }
        Ok(row)
    }

    pub fn transform_all(&self, rows: &[FeatureVector]) -> EngineResult<Vec<Vec<f64>>> {
        rows.iter().map(|r| self.transform(r)).collect()
    }

    fn mismatch(&self) -> EngineError {
        EngineError::SchemaMismatch {
            candidate: None,
            expected: self.columns.clone(),
            actual: FeatureVector::columns(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(t: BuildingType, floor: f64, year: i32) -> FeatureVector {
        FeatureVector {
            building_type: t,
            floor_area_m2: floor,
            built_year: year,
            energy_kwh: floor * 200.0,
            eui_kwh_m2y: 200.0,
        }
    }

    #[test]
    fn test_fit_and_transform() {
        let rows = vec![
            row(BuildingType::Office, 1000.0, 1990),
            row(BuildingType::School, 3000.0, 2010),
        ];
        let pre = Preprocessor::fit(&rows).unwrap();
        assert_eq!(pre.columns, FeatureVector::columns());
        assert_eq!(pre.width(), 4 + BuildingType::ALL.len());

        let x = pre.transform(&rows[0]).unwrap();
        // floor area: mean 2000, std 1000
        assert!((x[0] + 1.0).abs() < 1e-12);
        // constant eui column keeps unit scale
        assert_eq!(x[3], 0.0);
        let one_hot = &x[4..];
        assert_eq!(one_hot.iter().sum::<f64>(), 1.0);
        assert_eq!(one_hot[3], 1.0);
    }

    #[test]
    fn test_column_drift_is_rejected() {
        let rows = vec![row(BuildingType::Office, 1000.0, 1990)];
        let mut pre = Preprocessor::fit(&rows).unwrap();
        pre.columns.swap(1, 2);
        let err = pre.transform(&rows[0]).unwrap_err();
        assert!(matches!(err, EngineError::SchemaMismatch { .. }));
    }

    #[test]
    fn test_empty_fit_fails() {
        assert!(Preprocessor::fit(&[]).is_err());
    }
}
