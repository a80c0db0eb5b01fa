// THEORY:
// The `pipeline` module is the analysis layer's public face. It defines the closed set
// of analysis kinds, the typed `Verdict` each kind produces, and the severity buckets
// used when verdicts are persisted for human triage.
//
// Key architectural principles:
// 1.  **Closed set of kinds**: every analysis is a variant of `Analysis`, carrying its
//     own dispatch rate and its own way of turning an image into a `Verdict`. Adding
//     a kind means adding a variant; the scheduler and the worker stay unchanged.
// 2.  **Independence**: kinds never read each other's output. The pipeline runs each
//     selected kind on the same image and collects whatever succeeds. A failing kind
//     is reported back as a failure for that frame and nothing else.
// 3.  **Pure triage**: severity is a deterministic function of (flagged, confidence)
//     and never influences whether a verdict is kept.

use crate::classifier::Classifier;
use crate::config::{AnalysisRates, FireConfig};
use crate::core_modules::fire_detector::FireDetector;
use crate::error::AnalysisError;
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Classifier label that marks a violence verdict as flagged.
pub const VIOLENT_LABEL: &str = "violent";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisKind {
    Violence,
    Fire,
}

impl fmt::Display for AnalysisKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnalysisKind::Violence => f.write_str("violence"),
            AnalysisKind::Fire => f.write_str("fire"),
        }
    }
}

/// Kind-specific payload attached to a verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum VerdictDetails {
    Violence { class: String, confidence: f64 },
    Fire { fire_fraction: f64, threshold: f64 },
}

/// Result of one analysis kind on one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub kind: AnalysisKind,
    /// Categorical result label (e.g. "violent", "fire", "no_fire").
    pub label: String,
    /// Confidence in [0, 1].
    pub confidence: f64,
    pub flagged: bool,
    pub details: VerdictDetails,
}

/// Triage bucket for a persisted verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Nothing,
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn bucket(flagged: bool, confidence: f64) -> Self {
        if !flagged {
            Severity::Nothing
        } else if confidence > 0.8 {
            Severity::High
        } else if confidence > 0.6 {
            Severity::Medium
        } else {
            Severity::Low
        }
    }

    pub fn of(verdict: &Verdict) -> Self {
        Self::bucket(verdict.flagged, verdict.confidence)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Severity::Nothing => "nothing",
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        };
        f.write_str(name)
    }
}

/// One analysis kind with its dispatch rate.
pub enum Analysis {
    Violence {
        classifier: Arc<dyn Classifier>,
        fps: f64,
    },
    Fire {
        detector: FireDetector,
        fps: f64,
    },
}

impl Analysis {
    pub fn kind(&self) -> AnalysisKind {
        match self {
            Analysis::Violence { .. } => AnalysisKind::Violence,
            Analysis::Fire { .. } => AnalysisKind::Fire,
        }
    }

    /// Maximum dispatch rate in frames per second.
    pub fn fps(&self) -> f64 {
        match self {
            Analysis::Violence { fps, .. } | Analysis::Fire { fps, .. } => *fps,
        }
    }

    pub fn analyze(&self, image: &RgbImage) -> Result<Verdict, AnalysisError> {
        match self {
            Analysis::Violence { classifier, .. } => {
                let classification = classifier.classify(image)?;
                let confidence = classification.confidence;
                if !(0.0..=1.0).contains(&confidence) {
                    return Err(AnalysisError::InvalidConfidence(confidence));
                }
                Ok(Verdict {
                    kind: AnalysisKind::Violence,
                    flagged: classification.label.eq_ignore_ascii_case(VIOLENT_LABEL),
                    details: VerdictDetails::Violence {
                        class: classification.label.clone(),
                        confidence,
                    },
                    label: classification.label,
                    confidence,
                })
            }
            Analysis::Fire { detector, .. } => {
                let reading = detector.scan(image);
                Ok(Verdict {
                    kind: AnalysisKind::Fire,
                    label: if reading.flagged { "fire" } else { "no_fire" }.to_string(),
                    confidence: reading.fraction,
                    flagged: reading.flagged,
                    details: VerdictDetails::Fire {
                        fire_fraction: reading.fraction,
                        threshold: detector.config().threshold,
                    },
                })
            }
        }
    }
}

impl fmt::Debug for Analysis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Analysis")
            .field("kind", &self.kind())
            .field("fps", &self.fps())
            .finish()
    }
}

/// Verdicts and per-kind failures for one frame.
#[derive(Debug, Default)]
pub struct PipelineOutcome {
    pub verdicts: Vec<Verdict>,
    pub failures: Vec<(AnalysisKind, AnalysisError)>,
}

/// The configured analysis kinds, shared read-only by all camera workers.
#[derive(Debug)]
pub struct AnalysisPipeline {
    analyses: Vec<Analysis>,
}

impl AnalysisPipeline {
    pub fn new(analyses: Vec<Analysis>) -> Self {
        Self { analyses }
    }

    /// Reference pipeline: fire always, violence when a classifier is available.
    pub fn standard(classifier: Option<Arc<dyn Classifier>>, rates: &AnalysisRates, fire: FireConfig) -> Self {
        let mut analyses = Vec::with_capacity(2);
        if let Some(classifier) = classifier {
            analyses.push(Analysis::Violence {
                classifier,
                fps: rates.violence_fps,
            });
        }
        analyses.push(Analysis::Fire {
            detector: FireDetector::new(fire),
            fps: rates.fire_fps,
        });
        Self::new(analyses)
    }

    /// Each configured kind with its rate, in configuration order.
    pub fn rates(&self) -> Vec<(AnalysisKind, f64)> {
        self.analyses.iter().map(|a| (a.kind(), a.fps())).collect()
    }

    pub fn kinds(&self) -> Vec<AnalysisKind> {
        self.analyses.iter().map(Analysis::kind).collect()
    }

    /// Runs each selected kind once on `image`; kinds not configured are ignored.
    pub fn run(&self, selected: &[AnalysisKind], image: &RgbImage) -> PipelineOutcome {
        let mut outcome = PipelineOutcome::default();
        for analysis in self.analyses.iter().filter(|a| selected.contains(&a.kind())) {
            match analysis.analyze(image) {
                Ok(verdict) => outcome.verdicts.push(verdict),
                Err(e) => outcome.failures.push((analysis.kind(), e)),
            }
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::Classification;
    use crate::error::ClassifierError;
    use image::Rgb;

    struct FixedClassifier(Result<(&'static str, f64), ()>);

    impl Classifier for FixedClassifier {
        fn classify(&self, _image: &RgbImage) -> Result<Classification, ClassifierError> {
            match self.0 {
                Ok((label, confidence)) => Ok(Classification::new(label, confidence)),
                Err(()) => Err(ClassifierError::Unavailable("model offline".into())),
            }
        }
    }

    fn pipeline_with(classifier: FixedClassifier) -> AnalysisPipeline {
        AnalysisPipeline::standard(
            Some(Arc::new(classifier)),
            &AnalysisRates::default(),
            FireConfig::default(),
        )
    }

    fn grey_image() -> RgbImage {
        RgbImage::from_pixel(8, 8, Rgb([128, 128, 128]))
    }

    #[test]
    fn severity_buckets_follow_confidence_when_flagged() {
        assert_eq!(Severity::bucket(true, 0.85), Severity::High);
        assert_eq!(Severity::bucket(true, 0.65), Severity::Medium);
        assert_eq!(Severity::bucket(true, 0.3), Severity::Low);
        assert_eq!(Severity::bucket(false, 0.99), Severity::Nothing);
    }

    #[test]
    fn severity_boundaries_are_exclusive() {
        assert_eq!(Severity::bucket(true, 0.8), Severity::Medium);
        assert_eq!(Severity::bucket(true, 0.6), Severity::Low);
    }

    #[test]
    fn violent_label_is_flagged_case_insensitively() {
        let pipeline = pipeline_with(FixedClassifier(Ok(("Violent", 0.9))));
        let outcome = pipeline.run(&[AnalysisKind::Violence], &grey_image());
        assert_eq!(outcome.verdicts.len(), 1);
        let verdict = &outcome.verdicts[0];
        assert!(verdict.flagged);
        assert_eq!(verdict.label, "Violent");
        assert_eq!(Severity::of(verdict), Severity::High);
    }

    #[test]
    fn non_violent_label_is_not_flagged() {
        let pipeline = pipeline_with(FixedClassifier(Ok(("non_violent", 0.97))));
        let outcome = pipeline.run(&[AnalysisKind::Violence], &grey_image());
        assert!(!outcome.verdicts[0].flagged);
        assert_eq!(Severity::of(&outcome.verdicts[0]), Severity::Nothing);
    }

    #[test]
    fn out_of_range_confidence_is_an_analysis_error() {
        let pipeline = pipeline_with(FixedClassifier(Ok(("violent", 1.7))));
        let outcome = pipeline.run(&[AnalysisKind::Violence], &grey_image());
        assert!(outcome.verdicts.is_empty());
        assert!(matches!(outcome.failures[0].1, AnalysisError::InvalidConfidence(_)));
    }

    #[test]
    fn one_failing_kind_does_not_block_the_other() {
        let pipeline = pipeline_with(FixedClassifier(Err(())));
        let outcome = pipeline.run(&[AnalysisKind::Violence, AnalysisKind::Fire], &grey_image());
        assert_eq!(outcome.verdicts.len(), 1);
        assert_eq!(outcome.verdicts[0].kind, AnalysisKind::Fire);
        assert_eq!(outcome.verdicts[0].label, "no_fire");
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].0, AnalysisKind::Violence);
    }

    #[test]
    fn pipeline_without_classifier_only_offers_fire() {
        let pipeline = AnalysisPipeline::standard(None, &AnalysisRates::default(), FireConfig::default());
        assert_eq!(pipeline.kinds(), vec![AnalysisKind::Fire]);
        let outcome = pipeline.run(&[AnalysisKind::Violence], &grey_image());
        assert!(outcome.verdicts.is_empty());
        assert!(outcome.failures.is_empty());
    }

    #[test]
    fn verdict_details_serialize_with_a_type_tag() {
        let details = VerdictDetails::Fire {
            fire_fraction: 0.1,
            threshold: 0.05,
        };
        let json = serde_json::to_value(&details).unwrap();
        assert_eq!(json["type"], "fire");
        assert_eq!(json["threshold"], 0.05);
    }
}
