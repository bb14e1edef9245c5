//! Logistic scoring model and its on-disk artifact.
//!
//! Training happens elsewhere; this crate consumes a frozen model. The
//! artifact is a small JSON document carrying the weights, the intercept
//! and, optionally, the per-feature standardization the model was trained
//! under. Standardization runs client-side so the server only ever sees
//! ciphertexts of already-prepared features.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Trained logistic model: one weight per feature plus an intercept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearModel {
    pub coefficients: Vec<f64>,
    pub intercept: f64,
}

impl LinearModel {
    pub fn feature_count(&self) -> usize {
        self.coefficients.len()
    }

    /// w·x + b over the prepared feature vector.
    pub fn affine(&self, features: &[f64]) -> f64 {
        self.coefficients
            .iter()
            .zip(features)
            .map(|(w, x)| w * x)
            .sum::<f64>()
            + self.intercept
    }
}

/// Per-feature standardization learned at training time.
///
/// Transforms raw feature `x_i` to `(x_i - mean_i) / scale_i`. A stored
/// scale of zero marks a constant feature and divides by one instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureScaler {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

impl FeatureScaler {
    pub fn transform(&self, raw: &[f64]) -> Result<Vec<f64>> {
        if raw.len() != self.mean.len() || self.mean.len() != self.scale.len() {
            return Err(Error::MalformedInput(format!(
                "scaler over {} features applied to {}",
                self.mean.len(),
                raw.len()
            )));
        }
        Ok(raw
            .iter()
            .zip(self.mean.iter().zip(&self.scale))
            .map(|(x, (m, s))| {
                let divisor = if *s == 0.0 { 1.0 } else { *s };
                (x - m) / divisor
            })
            .collect())
    }
}

/// The complete model file: weights plus optional preprocessing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub model: LinearModel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scaler: Option<FeatureScaler>,
}

impl ModelArtifact {
    /// Load and validate a JSON model artifact.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the JSON document
    ///
    /// # Returns
    ///
    /// The artifact, or [`Error::MalformedInput`] when the document does
    /// not parse or describes an unusable model.
    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let artifact: Self = serde_json::from_str(&text)
            .map_err(|e| Error::MalformedInput(format!("model artifact: {e}")))?;
        artifact.validate()?;
        Ok(artifact)
    }

    /// Write the artifact as pretty-printed JSON.
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let text = serde_json::to_string_pretty(self)
            .map_err(|e| Error::MalformedInput(format!("model artifact: {e}")))?;
        fs::write(path, text)?;
        Ok(())
    }

    pub fn feature_count(&self) -> usize {
        self.model.feature_count()
    }

    /// Standardize a raw feature vector into what the model was trained on.
    ///
    /// Identity (minus the length check) when the artifact carries no
    /// scaler.
    pub fn prepared_features(&self, raw: &[f64]) -> Result<Vec<f64>> {
        if raw.len() != self.model.feature_count() {
            return Err(Error::MalformedInput(format!(
                "model expects {} features, got {}",
                self.model.feature_count(),
                raw.len()
            )));
        }
        match &self.scaler {
            Some(scaler) => scaler.transform(raw),
            None => Ok(raw.to_vec()),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.model.coefficients.is_empty() {
            return Err(Error::MalformedInput(
                "model artifact carries no coefficients".into(),
            ));
        }
        let finite = self.model.coefficients.iter().all(|c| c.is_finite())
            && self.model.intercept.is_finite();
        if !finite {
            return Err(Error::MalformedInput(
                "model artifact carries non-finite weights".into(),
            ));
        }
        if let Some(scaler) = &self.scaler {
            if scaler.mean.len() != self.model.feature_count()
                || scaler.scale.len() != self.model.feature_count()
            {
                return Err(Error::MalformedInput(format!(
                    "scaler over {} features attached to a {}-feature model",
                    scaler.mean.len(),
                    self.model.feature_count()
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_artifact() -> ModelArtifact {
        ModelArtifact {
            model: LinearModel {
                coefficients: vec![0.8, -0.3, 1.1],
                intercept: -0.2,
            },
            scaler: Some(FeatureScaler {
                mean: vec![10.0, 0.0, -4.0],
                scale: vec![2.0, 0.0, 0.5],
            }),
        }
    }

    #[test]
    fn test_affine_combination() {
        let model = LinearModel {
            coefficients: vec![0.5, 0.25],
            intercept: 0.1,
        };
        assert!((model.affine(&[2.0, 4.0]) - 2.1).abs() < 1e-12);
    }

    #[test]
    fn test_transform_standardizes_and_guards_zero_scale() {
        let artifact = sample_artifact();
        let prepared = artifact.prepared_features(&[12.0, 3.0, -4.5]).unwrap();
        assert!((prepared[0] - 1.0).abs() < 1e-12);
        // zero scale leaves the centered value untouched
        assert!((prepared[1] - 3.0).abs() < 1e-12);
        assert!((prepared[2] + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_feature_count_mismatch_rejected() {
        let artifact = sample_artifact();
        assert!(matches!(
            artifact.prepared_features(&[1.0, 2.0]),
            Err(Error::MalformedInput(_))
        ));
    }

    #[test]
    fn test_missing_scaler_is_identity() {
        let mut artifact = sample_artifact();
        artifact.scaler = None;
        let raw = [12.0, 3.0, -4.5];
        assert_eq!(artifact.prepared_features(&raw).unwrap(), raw.to_vec());
    }

    #[test]
    fn test_json_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        let artifact = sample_artifact();
        artifact.save_json(&path).unwrap();
        let loaded = ModelArtifact::load_json(&path).unwrap();
        assert_eq!(loaded, artifact);
    }

    #[test]
    fn test_load_rejects_unusable_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        fs::write(&path, r#"{"model":{"coefficients":[],"intercept":0.0}}"#).unwrap();
        assert!(matches!(
            ModelArtifact::load_json(&path),
            Err(Error::MalformedInput(_))
        ));
        fs::write(&path, "not json").unwrap();
        assert!(matches!(
            ModelArtifact::load_json(&path),
            Err(Error::MalformedInput(_))
        ));
    }
}
