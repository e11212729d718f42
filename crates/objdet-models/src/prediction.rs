//! Detector prediction models.
//!
//! Field values are kept exactly as the detector printed them. The serialized
//! names (`Object`, `Confidence`, `Geometry`, ...) are part of the public JSON
//! contract and must not change.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Axis-aligned box reported by the detector, as `top,left bottom,right`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "PascalCase")]
pub struct BoundingBox {
    pub top: String,
    pub left: String,
    pub bottom: String,
    pub right: String,
}

impl BoundingBox {
    pub fn new(
        top: impl Into<String>,
        left: impl Into<String>,
        bottom: impl Into<String>,
        right: impl Into<String>,
    ) -> Self {
        Self {
            top: top.into(),
            left: left.into(),
            bottom: bottom.into(),
            right: right.into(),
        }
    }

    /// Numeric view as `[top, left, bottom, right]`.
    ///
    /// Returns `None` if any coordinate is not a number.
    pub fn as_f64(&self) -> Option<[f64; 4]> {
        Some([
            self.top.parse().ok()?,
            self.left.parse().ok()?,
            self.bottom.parse().ok()?,
            self.right.parse().ok()?,
        ])
    }
}

/// Geometry block of a prediction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "PascalCase")]
pub struct Geometry {
    pub bounding_box: BoundingBox,
    pub size: String,
}

impl Geometry {
    pub fn size_f64(&self) -> Option<f64> {
        self.size.parse().ok()
    }
}

/// One detected object instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Prediction {
    /// Class label, e.g. `dog`
    #[serde(rename = "Object")]
    pub label: String,
    /// Confidence on a 0-100 scale, usually with a trailing `%`
    #[serde(rename = "Confidence")]
    pub confidence: String,
    #[serde(rename = "Geometry")]
    pub geometry: Geometry,
}

impl Prediction {
    /// Create a new prediction.
    pub fn new(
        label: impl Into<String>,
        confidence: impl Into<String>,
        bounding_box: BoundingBox,
        size: impl Into<String>,
    ) -> Self {
        Self {
            label: label.into(),
            confidence: confidence.into(),
            geometry: Geometry {
                bounding_box,
                size: size.into(),
            },
        }
    }

    pub fn bounding_box(&self) -> &BoundingBox {
        &self.geometry.bounding_box
    }

    /// Confidence as a number on the 0-100 scale, ignoring a trailing `%`.
    pub fn confidence_percent(&self) -> Option<f64> {
        self.confidence
            .strip_suffix('%')
            .unwrap_or(&self.confidence)
            .parse()
            .ok()
    }

    /// Render the prediction back into the detector's report line format.
    pub fn to_report_line(&self) -> String {
        let bbox = self.bounding_box();
        format!(
            "{} {} - Bounding Box: {},{} {},{} - Size: {}",
            self.label,
            self.confidence,
            bbox.top,
            bbox.left,
            bbox.bottom,
            bbox.right,
            self.geometry.size
        )
    }
}

impl fmt::Display for Prediction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_report_line())
    }
}

/// Ordered predictions for one image, in the order the detector reported them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct DetectionResult(pub Vec<Prediction>);

impl DetectionResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, prediction: Prediction) {
        self.0.push(prediction);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Prediction> {
        self.0.iter()
    }

    pub fn into_inner(self) -> Vec<Prediction> {
        self.0
    }
}

impl From<Vec<Prediction>> for DetectionResult {
    fn from(predictions: Vec<Prediction>) -> Self {
        Self(predictions)
    }
}

impl IntoIterator for DetectionResult {
    type Item = Prediction;
    type IntoIter = std::vec::IntoIter<Prediction>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a DetectionResult {
    type Item = &'a Prediction;
    type IntoIter = std::slice::Iter<'a, Prediction>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
