use crate::classifier::PredictionResult;
use crate::resolver::LabelResolver;
use thiserror::Error;

pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.60;

#[derive(Error, Debug)]
pub enum GateError {
    #[error("Confidence threshold {0} is outside [0, 1]")]
    InvalidThreshold(f32),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConfidenceDecision {
    Valid {
        label: String,
        confidence_percent: f64,
    },
    Invalid {
        confidence_percent: f64,
    },
}

impl ConfidenceDecision {
    pub fn confidence_percent(&self) -> f64 {
        match self {
            ConfidenceDecision::Valid {
                confidence_percent, ..
            }
            | ConfidenceDecision::Invalid { confidence_percent } => *confidence_percent,
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, ConfidenceDecision::Valid { .. })
    }
}

/// Accepts a prediction only when its confidence reaches the threshold.
#[derive(Debug, Clone)]
pub struct ConfidenceGate {
    threshold: f32,
    resolver: LabelResolver,
}

impl ConfidenceGate {
    pub fn new(threshold: f32, resolver: LabelResolver) -> Result<Self, GateError> {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(GateError::InvalidThreshold(threshold));
        }
        Ok(Self {
            threshold,
            resolver,
        })
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// A confidence equal to the threshold is accepted.
    pub fn gate(&self, result: &PredictionResult) -> ConfidenceDecision {
        let confidence_percent = to_percent(result.confidence);

        if result.confidence < self.threshold {
            return ConfidenceDecision::Invalid { confidence_percent };
        }

        ConfidenceDecision::Valid {
            label: self.resolver.resolve(result.class_id).to_string(),
            confidence_percent,
        }
    }
}

/// `confidence * 100`, rounded to two decimals.
pub fn to_percent(confidence: f32) -> f64 {
    (confidence as f64 * 10_000.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::LabelCatalog;
    use crate::resolver::UNKNOWN_LABEL;
    use std::sync::Arc;

    fn gate() -> ConfidenceGate {
        let catalog = LabelCatalog::from_class_indices([
            ("1000".to_string(), 0),
            ("50000".to_string(), 3),
        ])
        .unwrap();
        ConfidenceGate::new(
            DEFAULT_CONFIDENCE_THRESHOLD,
            LabelResolver::new(Arc::new(catalog)),
        )
        .unwrap()
    }

    #[test]
    fn test_confidence_at_threshold_is_valid() {
        let decision = gate().gate(&PredictionResult {
            class_id: 0,
            confidence: 0.60,
        });

        assert_eq!(
            decision,
            ConfidenceDecision::Valid {
                label: "1000".to_string(),
                confidence_percent: 60.0,
            }
        );
    }

    #[test]
    fn test_confidence_below_threshold_is_invalid() {
        let decision = gate().gate(&PredictionResult {
            class_id: 3,
            confidence: 0.59,
        });

        assert_eq!(
            decision,
            ConfidenceDecision::Invalid {
                confidence_percent: 59.0
            }
        );
        assert!(!decision.is_valid());
    }

    #[test]
    fn test_confident_prediction_resolves_label() {
        let decision = gate().gate(&PredictionResult {
            class_id: 3,
            confidence: 0.92,
        });

        assert_eq!(
            decision,
            ConfidenceDecision::Valid {
                label: "50000".to_string(),
                confidence_percent: 92.0,
            }
        );
        assert_eq!(decision.confidence_percent(), 92.0);
    }

    #[test]
    fn test_confident_unknown_class_uses_fallback_label() {
        let decision = gate().gate(&PredictionResult {
            class_id: 42,
            confidence: 0.99,
        });

        assert_eq!(
            decision,
            ConfidenceDecision::Valid {
                label: UNKNOWN_LABEL.to_string(),
                confidence_percent: 99.0,
            }
        );
    }

    #[test]
    fn test_percent_rounds_to_two_decimals() {
        assert_eq!(to_percent(0.123456), 12.35);
        assert_eq!(to_percent(1.0), 100.0);
        assert_eq!(to_percent(0.0), 0.0);
    }

    #[test]
    fn test_threshold_outside_unit_range_is_rejected() {
        let resolver = gate().resolver;
        assert!(matches!(
            ConfidenceGate::new(1.5, resolver.clone()),
            Err(GateError::InvalidThreshold(_))
        ));
        assert!(ConfidenceGate::new(f32::NAN, resolver.clone()).is_err());
        assert!(ConfidenceGate::new(0.0, resolver).is_ok());
    }
}
