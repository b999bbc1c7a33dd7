//! Putting an architecture together before any weights exist.

use crate::attention::DEFAULT_REDUCTION;
use crate::backbone::Backbone;
use crate::error::ModelError;
use crate::head::HeadSpec;

/// Channels every input image arrives with.
pub const INPUT_CHANNELS: usize = 3;

/// A complete detector description: trunk, pyramid, and prediction head.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Architecture {
    pub backbone: Backbone,
    pub head: HeadSpec,
}

impl Architecture {
    /// Channel continuity plus backbone/head agreement. Returns the
    /// channel count at every tap.
    pub fn validate(&self) -> Result<Vec<usize>, ModelError> {
        let taps = self.backbone.validate(INPUT_CHANNELS)?;
        if taps != self.head.tap_channels {
            return Err(ModelError::Architecture(format!(
                "head expects taps {:?} but the backbone emits {:?}",
                self.head.tap_channels, taps
            )));
        }
        if self.head.tap_channels.len() != self.head.anchors_per_cell.len() {
            return Err(ModelError::Architecture(
                "one anchor group per tap is required".to_string(),
            ));
        }
        Ok(taps)
    }
}

/// The served detector: the standard single-shot table with a channel
/// attention gate behind every trunk convolution and a classification
/// head sized for `num_classes` (real classes plus background).
pub fn assemble(num_classes: usize) -> Architecture {
    let mut backbone = Backbone::ssd300_vgg16();
    backbone.attach_attention(DEFAULT_REDUCTION);
    Architecture {
        backbone,
        head: HeadSpec::ssd300(num_classes),
    }
}
