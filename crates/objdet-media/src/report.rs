//! Detector report parsing.
//!
//! A report is a header line containing `Predicted`, followed by one line per
//! detected object:
//!
//! ```text
//! uploads/dog.jpg: Predicted in 0.5 seconds.
//! dog 87% - Bounding Box: 10,20 110,220 - Size: 500
//! ```
//!
//! Grammar of a prediction line (segments split on the literal `" - "`):
//!
//! ```text
//! line       := detection " - " geometry " - " size
//! detection  := label SP confidence       ; confidence is the last token
//! geometry   := word+ SP pair SP pair     ; top,left then bottom,right
//! size       := word+ SP number
//! pair       := number "," number
//! confidence := number ["%"]
//! ```
//!
//! Leading words of the geometry and size segments are ignored, so both
//! `Bounding Box: 10,20 110,220` and `Bounding Box 10,20 110,220` parse.
//! Trailing colons on the label and confidence are dropped, so `dog: 87%`
//! and `dog 87%` give the same prediction.
//!
//! The label is every token before the confidence, not just the first one,
//! so multi-word class names such as `traffic light` survive intact.
//! A single malformed line fails the whole report.

use objdet_models::{BoundingBox, DetectionResult, Prediction};
use tracing::debug;

use crate::error::{MediaError, MediaResult};

/// Marker the first report line must contain.
pub const HEADER_MARKER: &str = "Predicted";

const SEGMENT_DELIMITER: &str = " - ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    ExpectHeader,
    ExpectPrediction,
}

/// Parse a full detector report.
///
/// Blank lines after the header are skipped. Predictions keep report order.
pub fn parse_report(text: &str) -> MediaResult<DetectionResult> {
    let mut state = State::ExpectHeader;
    let mut result = DetectionResult::new();

    for (index, line) in text.lines().enumerate() {
        match state {
            State::ExpectHeader => {
                if !line.contains(HEADER_MARKER) {
                    return Err(MediaError::malformed_report("no predictions header found"));
                }
                state = State::ExpectPrediction;
            }
            State::ExpectPrediction => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let prediction = parse_prediction_line(line)
                    .map_err(|reason| MediaError::malformed_line(index + 1, line, reason))?;
                debug!(line = index + 1, prediction = %prediction, "Parsed prediction");
                result.push(prediction);
            }
        }
    }

    if state == State::ExpectHeader {
        return Err(MediaError::malformed_report("no predictions header found"));
    }

    Ok(result)
}

/// Parse one prediction line. The error is a human-readable reason.
pub fn parse_prediction_line(line: &str) -> Result<Prediction, String> {
    let segments: Vec<&str> = line.split(SEGMENT_DELIMITER).collect();
    let [detection, geometry, size] = segments.as_slice() else {
        return Err(format!(
            "expected 3 segments separated by '{}', found {}",
            SEGMENT_DELIMITER.trim(),
            segments.len()
        ));
    };

    let (label, confidence) = parse_detection(detection)?;
    let bounding_box = parse_geometry(geometry)?;
    let size = parse_size(size)?;

    Ok(Prediction::new(label, confidence, bounding_box, size))
}

fn parse_detection(segment: &str) -> Result<(String, String), String> {
    let tokens: Vec<&str> = segment.split_whitespace().collect();
    let Some((confidence, label)) = tokens.split_last().filter(|(_, label)| !label.is_empty()) else {
        return Err(format!("expected '<label> <confidence>', got {:?}", segment));
    };

    // darknet writes `label: confidence`; the colon is not part of either value
    let label: Vec<&str> = label
        .iter()
        .map(|token| token.trim_end_matches(':'))
        .filter(|token| !token.is_empty())
        .collect();
    if label.is_empty() {
        return Err(format!("missing label in {:?}", segment));
    }

    let confidence = confidence.trim_end_matches(':');
    let value = confidence.strip_suffix('%').unwrap_or(confidence);
    if !is_number(value) {
        return Err(format!("confidence {:?} is not a number", confidence));
    }

    Ok((label.join(" "), confidence.to_string()))
}

fn parse_geometry(segment: &str) -> Result<BoundingBox, String> {
    let tokens: Vec<&str> = segment.split_whitespace().collect();
    if tokens.len() < 3 {
        return Err(format!(
            "expected '<word> <top>,<left> <bottom>,<right>', got {:?}",
            segment
        ));
    }

    let (top, left) = parse_pair(tokens[tokens.len() - 2])?;
    let (bottom, right) = parse_pair(tokens[tokens.len() - 1])?;
    Ok(BoundingBox::new(top, left, bottom, right))
}

fn parse_pair(token: &str) -> Result<(&str, &str), String> {
    let Some((first, second)) = token.split_once(',') else {
        return Err(format!("expected a comma pair, got {:?}", token));
    };
    if !is_number(first) || !is_number(second) {
        return Err(format!("coordinate pair {:?} is not numeric", token));
    }
    Ok((first, second))
}

fn parse_size(segment: &str) -> Result<String, String> {
    let tokens: Vec<&str> = segment.split_whitespace().collect();
    let size = match tokens.as_slice() {
        [_, .., last] => *last,
        _ => return Err(format!("expected '<word> <size>', got {:?}", segment)),
    };
    if !is_number(size) {
        return Err(format!("size {:?} is not a number", size));
    }
    Ok(size.to_string())
}

fn is_number(value: &str) -> bool {
    value.parse::<f64>().map(f64::is_finite).unwrap_or(false)
}
