use crate::error::AdversarialError;
use crate::FgsmFloat;
use serde::{Deserialize, Serialize};

/// Parameters of an FGSM attack.
///
/// `epsilon` has no default; the caller decides how far to push each pixel.
/// The clip range defaults to the normalized pixel range `[0, 1]`.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct AttackConfig {
    pub epsilon: FgsmFloat,
    #[serde(default = "AttackConfig::default_clip_min")]
    pub clip_min: FgsmFloat,
    #[serde(default = "AttackConfig::default_clip_max")]
    pub clip_max: FgsmFloat,
    /// Warn when input pixels fall outside the clip range.
    #[serde(default = "AttackConfig::default_warn_out_of_range")]
    pub warn_out_of_range: bool,
}

impl AttackConfig {
    const fn default_clip_min() -> FgsmFloat {
        0.
    }

    const fn default_clip_max() -> FgsmFloat {
        1.
    }

    const fn default_warn_out_of_range() -> bool {
        true
    }

    pub const fn new(epsilon: FgsmFloat) -> Self {
        Self {
            epsilon,
            clip_min: Self::default_clip_min(),
            clip_max: Self::default_clip_max(),
            warn_out_of_range: Self::default_warn_out_of_range(),
        }
    }

    /// # Errors
    /// `InvalidConfig` if the range is empty or any bound is not finite
    pub fn with_clip_range(mut self, clip_min: FgsmFloat, clip_max: FgsmFloat) -> Result<Self, AdversarialError> {
        self.clip_min = clip_min;
        self.clip_max = clip_max;
        self.validate()?;
        Ok(self)
    }

    /// # Errors
    /// `InvalidConfig` if the range is empty or any value is not finite
    pub fn validate(&self) -> Result<(), AdversarialError> {
        if !self.epsilon.is_finite() {
            return Err(AdversarialError::InvalidConfig(format!(
                "epsilon must be finite, got {}",
                self.epsilon
            )));
        }
        if !self.clip_min.is_finite() || !self.clip_max.is_finite() || self.clip_min > self.clip_max {
            return Err(AdversarialError::InvalidConfig(format!(
                "clip range [{}, {}] is not a finite, non-empty interval",
                self.clip_min, self.clip_max
            )));
        }
        Ok(())
    }

    /// Parses and validates a JSON configuration.
    ///
    /// # Errors
    pub fn from_json(json: &str) -> Result<Self, AdversarialError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| AdversarialError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}
