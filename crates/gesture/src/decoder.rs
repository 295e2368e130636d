//! Arg-max decoding of the classifier output

use std::fmt;

use inference_engine::{DType, TensorView};
use serde::Serialize;
use tracing::{debug, info};

use crate::labels::{self, GESTURE_COUNT};
use crate::PipelineError;

/// Winning class of one inference; always a valid label index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ClassIndex(usize);

impl ClassIndex {
    /// Wrap `index` if it addresses the label table
    pub fn new(index: usize) -> Option<Self> {
        (index < GESTURE_COUNT).then_some(Self(index))
    }

    pub fn index(&self) -> usize {
        self.0
    }

    pub fn label(&self) -> &'static str {
        labels::GESTURES[self.0]
    }
}

impl fmt::Display for ClassIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Index of the largest value. Ties go to the earliest index.
pub fn argmax(values: &[f32]) -> Option<usize> {
    let (first, rest) = values.split_first()?;
    let mut best = 0;
    let mut best_value = *first;
    for (offset, &value) in rest.iter().enumerate() {
        if value > best_value {
            best = offset + 1;
            best_value = value;
        }
    }
    Some(best)
}

/// Check the output holds exactly one float logit per gesture, ignoring a
/// leading batch dimension of 1
pub fn check_output(output: &TensorView<'_>) -> Result<(), PipelineError> {
    if output.dtype() != DType::F32 {
        return Err(PipelineError::ShapeMismatch(format!(
            "output {} is {:?}, expected F32",
            output.info().name,
            output.dtype()
        )));
    }
    let classes = match output.shape() {
        [1, n] | [n] => *n,
        other => {
            return Err(PipelineError::ShapeMismatch(format!(
                "output {} has shape {:?}, expected [1, {}]",
                output.info().name,
                other,
                GESTURE_COUNT
            )))
        }
    };
    if classes != GESTURE_COUNT {
        return Err(PipelineError::ShapeMismatch(format!(
            "output {} has {} classes, expected {}",
            output.info().name,
            classes,
            GESTURE_COUNT
        )));
    }
    Ok(())
}

/// Turns output logits into a class index and keeps the most recent one
#[derive(Debug, Default)]
pub struct ResultDecoder {
    last: Option<ClassIndex>,
}

impl ResultDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode the output tensor and persist the winner
    pub fn decode(&mut self, output: &TensorView<'_>) -> Result<ClassIndex, PipelineError> {
        check_output(output)?;
        let logits = output
            .as_f32()
            .map_err(|e| PipelineError::ShapeMismatch(e.to_string()))?;
        for (index, logit) in logits.iter().enumerate() {
            debug!("logit[{}] = {:.4}", index, logit);
        }

        let class = argmax(logits)
            .and_then(ClassIndex::new)
            .ok_or_else(|| PipelineError::ShapeMismatch("empty output".to_string()))?;
        info!("Detected gesture: {} (class {})", class, class.index());
        self.last = Some(class);
        Ok(class)
    }

    /// Most recent detection, `None` until the first successful decode
    pub fn last(&self) -> Option<ClassIndex> {
        self.last
    }

    /// Label of the most recent detection, or [`labels::NO_GESTURE`]
    pub fn last_label(&self) -> &'static str {
        self.last.map_or(labels::NO_GESTURE, |class| class.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_argmax_prefers_first_tie() {
        assert_eq!(argmax(&[0.1, 0.9, 0.3]), Some(1));
        assert_eq!(argmax(&[0.5, 0.5, 0.1]), Some(0));
        assert_eq!(argmax(&[-3.0, -1.0, -1.0]), Some(1));
        assert_eq!(argmax(&[]), None);
    }

    #[test]
    fn test_class_index_bounds() {
        assert_eq!(ClassIndex::new(13).map(|c| c.label()), Some("stop"));
        assert!(ClassIndex::new(14).is_none());
    }

    #[test]
    fn test_decoder_starts_empty() {
        let decoder = ResultDecoder::new();
        assert_eq!(decoder.last(), None);
        assert_eq!(decoder.last_label(), "none");
    }

    proptest! {
        #[test]
        fn prop_argmax_is_first_maximum(values in prop::collection::vec(-1000.0f32..1000.0, 1..32)) {
            let best = argmax(&values).unwrap();
            prop_assert!(values.iter().all(|&v| v <= values[best]));
            prop_assert!(values[..best].iter().all(|&v| v < values[best]));
        }
    }
}
