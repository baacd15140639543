//! Regression models scoring band-power feature vectors
//!
//! A model is bound to a metric and a classifier, then goes through
//! `prepare -> predict* -> release`. Built-in coefficients exist for the
//! concentration and relaxation metrics; `UserDefined` models read theirs
//! from a JSON file.

use focus_core::{invalid_arguments, FocusError, FocusResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Mental state a model estimates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Concentration,
    Relaxation,
    UserDefined,
}

/// Model family used to score features
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classifier {
    /// Logistic regression, score in [0, 1]
    Regression,
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Metric::Concentration => "concentration",
            Metric::Relaxation => "relaxation",
            Metric::UserDefined => "user_defined",
        };
        f.write_str(name)
    }
}

impl fmt::Display for Classifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Classifier::Regression => f.write_str("regression"),
        }
    }
}

/// What to load on `prepare`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelParams {
    pub metric: Metric,
    pub classifier: Classifier,
    /// Coefficient file, overrides the built-in set
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl ModelParams {
    pub fn new(metric: Metric, classifier: Classifier) -> Self {
        Self {
            metric,
            classifier,
            file: None,
        }
    }

    pub fn with_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.file = Some(file.into());
        self
    }
}

impl Default for ModelParams {
    fn default() -> Self {
        Self::new(Metric::Concentration, Classifier::Regression)
    }
}

/// Logistic regression coefficients over `means ++ deviations`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionCoefficients {
    pub intercept: f64,
    pub weights: Vec<f64>,
}

impl RegressionCoefficients {
    /// Coefficients shipped for a metric
    ///
    /// Band order is delta, theta, alpha, beta, gamma: concentration rises
    /// with beta and gamma and falls with alpha and theta, relaxation the
    /// other way round.
    pub fn builtin(metric: Metric) -> Option<Self> {
        match metric {
            Metric::Concentration => Some(Self {
                intercept: 0.2,
                weights: vec![
                    -1.0, -2.5, -3.0, 4.0, 2.0,
                    0.5, 0.5, 0.5, 0.5, 0.5,
                ],
            }),
            Metric::Relaxation => Some(Self {
                intercept: -0.3,
                weights: vec![
                    -0.5, 1.5, 4.0, -3.5, -2.0,
                    0.5, 0.5, 0.5, 0.5, 0.5,
                ],
            }),
            Metric::UserDefined => None,
        }
    }

    pub fn from_file(path: &Path) -> FocusResult<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| FocusError::ModelFileError {
            reason: format!("cannot read {}: {}", path.display(), e),
        })?;
        let coefficients: Self = serde_json::from_str(&json).map_err(|e| FocusError::ModelFileError {
            reason: format!("cannot parse {}: {}", path.display(), e),
        })?;
        coefficients.validate().map_err(|e| FocusError::ModelFileError {
            reason: format!("{}: {}", path.display(), e),
        })?;
        Ok(coefficients)
    }

    pub fn validate(&self) -> FocusResult<()> {
        if self.weights.is_empty() {
            return Err(invalid_arguments!("model has no weights"));
        }
        if !self.intercept.is_finite() || self.weights.iter().any(|w| !w.is_finite()) {
            return Err(invalid_arguments!("model coefficients must be finite"));
        }
        Ok(())
    }

    /// Sigmoid of the linear response
    pub fn score(&self, features: &[f64]) -> f64 {
        let z = self.intercept
            + self.weights.iter().zip(features).map(|(w, x)| w * x).sum::<f64>();
        1.0 / (1.0 + (-z).exp())
    }
}

/// Metric/classifier model with an explicit lifecycle
#[derive(Debug)]
pub struct MlModel {
    params: ModelParams,
    coefficients: Option<RegressionCoefficients>,
}

impl MlModel {
    pub fn new(params: ModelParams) -> Self {
        Self {
            params,
            coefficients: None,
        }
    }

    /// Load coefficients; a prepared model stays as is
    pub fn prepare(&mut self) -> FocusResult<()> {
        if self.coefficients.is_some() {
            tracing::debug!(metric = %self.params.metric, "Model already prepared");
            return Ok(());
        }

        let coefficients = match (&self.params.file, self.params.classifier) {
            (Some(path), Classifier::Regression) => RegressionCoefficients::from_file(path)?,
            (None, Classifier::Regression) => RegressionCoefficients::builtin(self.params.metric)
                .ok_or_else(|| FocusError::UnsupportedModel {
                    metric: self.params.metric.to_string(),
                    classifier: self.params.classifier.to_string(),
                })?,
        };

        tracing::info!(
            metric = %self.params.metric,
            classifier = %self.params.classifier,
            features = coefficients.weights.len(),
            "Model prepared"
        );
        self.coefficients = Some(coefficients);
        Ok(())
    }

    /// Score one feature vector
    pub fn predict(&self, features: &[f64]) -> FocusResult<f64> {
        let coefficients = self.coefficients.as_ref().ok_or(FocusError::ModelNotPrepared)?;

        if features.len() != coefficients.weights.len() {
            return Err(invalid_arguments!(
                "model expects {} features, got {}",
                coefficients.weights.len(),
                features.len()
            ));
        }
        if features.iter().any(|v| !v.is_finite()) {
            return Err(invalid_arguments!("feature vector contains non-finite values"));
        }

        Ok(coefficients.score(features))
    }

    /// Drop the loaded coefficients; releasing twice is a no-op
    pub fn release(&mut self) -> FocusResult<()> {
        if self.coefficients.take().is_some() {
            tracing::info!(metric = %self.params.metric, "Model released");
        }
        Ok(())
    }

    pub fn is_prepared(&self) -> bool {
        self.coefficients.is_some()
    }

    pub fn params(&self) -> &ModelParams {
        &self.params
    }

    /// Expected feature vector length once prepared
    pub fn feature_len(&self) -> Option<usize> {
        self.coefficients.as_ref().map(|c| c.weights.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one_hot(band: usize) -> Vec<f64> {
        let mut features = vec![0.0; 10];
        features[band] = 1.0;
        features
    }

    fn temp_model_file(name: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("focus-{}-{}.json", name, std::process::id()));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_concentration_scores() {
        let mut model = MlModel::new(ModelParams::default());
        model.prepare().unwrap();
        assert_eq!(model.feature_len(), Some(10));

        let alpha = model.predict(&one_hot(2)).unwrap();
        let beta = model.predict(&one_hot(3)).unwrap();
        assert!((alpha - 0.0573).abs() < 1e-3, "alpha score {}", alpha);
        assert!((beta - 0.9852).abs() < 1e-3, "beta score {}", beta);
    }

    #[test]
    fn test_relaxation_prefers_alpha() {
        let mut model = MlModel::new(ModelParams::new(Metric::Relaxation, Classifier::Regression));
        model.prepare().unwrap();
        assert!(model.predict(&one_hot(2)).unwrap() > model.predict(&one_hot(3)).unwrap());
    }

    #[test]
    fn test_lifecycle() {
        let mut model = MlModel::new(ModelParams::default());
        assert_eq!(model.predict(&one_hot(0)), Err(FocusError::ModelNotPrepared));

        model.prepare().unwrap();
        model.prepare().unwrap();
        assert!(model.is_prepared());

        model.release().unwrap();
        assert_eq!(model.predict(&one_hot(0)), Err(FocusError::ModelNotPrepared));
        model.release().unwrap();
        assert!(!model.is_prepared());
    }

    #[test]
    fn test_predict_validates_features() {
        let mut model = MlModel::new(ModelParams::default());
        model.prepare().unwrap();
        assert!(matches!(model.predict(&[0.1; 9]), Err(FocusError::InvalidArguments { .. })));
        let mut features = one_hot(1);
        features[4] = f64::NAN;
        assert!(model.predict(&features).is_err());
    }

    #[test]
    fn test_user_defined_requires_file() {
        let mut model = MlModel::new(ModelParams::new(Metric::UserDefined, Classifier::Regression));
        assert!(matches!(model.prepare(), Err(FocusError::UnsupportedModel { .. })));
        assert!(!model.is_prepared());
    }

    #[test]
    fn test_coefficients_from_file() {
        let path = temp_model_file("model-ok", r#"{"intercept": 0.0, "weights": [1.0, -1.0]}"#);
        let params = ModelParams::new(Metric::UserDefined, Classifier::Regression).with_file(&path);
        let mut model = MlModel::new(params);
        model.prepare().unwrap();

        assert!((model.predict(&[0.0, 0.0]).unwrap() - 0.5).abs() < 1e-12);
        assert!(model.predict(&[2.0, 0.0]).unwrap() > 0.8);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_bad_model_files() {
        let missing = ModelParams::default().with_file("/nonexistent/focus-model.json");
        assert!(matches!(MlModel::new(missing).prepare(), Err(FocusError::ModelFileError { .. })));

        let path = temp_model_file("model-bad", r#"{"intercept": 0.0, "weights": []}"#);
        let empty = ModelParams::default().with_file(&path);
        assert!(matches!(MlModel::new(empty).prepare(), Err(FocusError::ModelFileError { .. })));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_params_json() {
        let params = ModelParams::default();
        let json = serde_json::to_string(&params).unwrap();
        assert!(json.contains("\"concentration\""));
        assert_eq!(serde_json::from_str::<ModelParams>(&json).unwrap(), params);
    }
}
