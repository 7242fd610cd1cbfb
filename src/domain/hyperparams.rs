// ============================================================
// Layer 3 — Hyperparameter Record
// ============================================================
// The single source of truth for reproducing a run. It is written
// to params.json when a run starts and read back whenever a run
// is resumed, inspected, or used to warm-start another model.
//
// Unknown keys, missing keys and out-of-range values are all
// rejected when a record is parsed.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::domain::error::{VaeError, VaeResult};

// ─── Network ──────────────────────────────────────────────────────────────────
/// Architecture families the network builder knows how to construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Network {
    /// Fully connected encoder/decoder, works for any input size
    Dense,
    /// Four-layer conv stack used for 64x64 sprite data
    Dsprites,
    /// Wider conv stack for game frames
    Atari,
    Pendulum,
    PendulumMini,
}

impl Network {
    pub const ALL: [Network; 5] = [
        Network::Dense,
        Network::Dsprites,
        Network::Atari,
        Network::Pendulum,
        Network::PendulumMini,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Network::Dense        => "dense",
            Network::Dsprites     => "dsprites",
            Network::Atari        => "atari",
            Network::Pendulum     => "pendulum",
            Network::PendulumMini => "pendulum-mini",
        }
    }

    /// Output channels of each strided conv layer, in encoder order.
    /// Every layer halves height and width.
    pub fn conv_channels(&self) -> &'static [usize] {
        match self {
            Network::Dense        => &[],
            Network::Dsprites     => &[32, 32, 32, 32],
            Network::Atari        => &[32, 64, 64, 128],
            Network::Pendulum     => &[32, 64, 128, 256],
            Network::PendulumMini => &[16, 32, 64],
        }
    }

    /// Width of the dense layer between the conv stack and the latent heads
    pub fn hidden_units(&self) -> usize {
        match self {
            Network::Dense        => 512,
            Network::Dsprites     => 256,
            Network::Atari        => 512,
            Network::Pendulum     => 256,
            Network::PendulumMini => 128,
        }
    }

    /// Height and width must both be multiples of this value.
    pub fn downsample_factor(&self) -> usize {
        1 << self.conv_channels().len()
    }

    pub fn check_shape(&self, shape: &InputShape) -> VaeResult<()> {
        let factor = self.downsample_factor();
        if shape.height % factor != 0 || shape.width % factor != 0 {
            return Err(VaeError::IncompatibleShape {
                network: self.name().to_string(),
                height:  shape.height,
                width:   shape.width,
                factor,
            });
        }
        Ok(())
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Network {
    type Err = VaeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Network::ALL
            .iter()
            .copied()
            .find(|n| n.name() == s)
            .ok_or_else(|| VaeError::UnknownNetwork(s.to_string()))
    }
}

// ─── InputShape ───────────────────────────────────────────────────────────────
/// Shape of a single frame: (height, width, channels).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputShape {
    pub height:   usize,
    pub width:    usize,
    pub channels: usize,
}

impl InputShape {
    pub fn new(height: usize, width: usize, channels: usize) -> Self {
        Self { height, width, channels }
    }

    /// Accepts (h, w) or (h, w, c). A missing channel axis means grayscale.
    pub fn from_dims(dims: &[usize]) -> VaeResult<Self> {
        match *dims {
            [h, w]    => Ok(Self::new(h, w, 1)),
            [h, w, c] => Ok(Self::new(h, w, c)),
            _         => Err(VaeError::BadRank(dims.len())),
        }
    }

    pub fn dims(&self) -> [usize; 3] {
        [self.height, self.width, self.channels]
    }

    /// Number of values in one frame
    pub fn frame_len(&self) -> usize {
        self.height * self.width * self.channels
    }
}

impl fmt::Display for InputShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}x{}", self.height, self.width, self.channels)
    }
}

/// Parses "HxW" or "HxWxC", e.g. `64x64x1`.
impl FromStr for InputShape {
    type Err = VaeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let dims = s
            .split('x')
            .map(|d| d.trim().parse::<usize>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| VaeError::InvalidParams(format!("cannot parse input shape '{s}'")))?;
        Self::from_dims(&dims)
    }
}

// ─── HyperParams ──────────────────────────────────────────────────────────────
fn default_scaled_re_loss() -> bool {
    true
}

/// Everything needed to rebuild a model before its weights are loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HyperParams {
    pub network:     Network,
    pub latent_dim:  usize,
    /// Weight of the KL term in the total loss
    pub beta:        f64,
    pub lr:          f64,
    pub input_shape: InputShape,
    /// Frames per stacked sample; only set for the stacked variant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub k:           Option<usize>,
    /// Scale the stacked variant's cross-entropy by height²
    #[serde(default = "default_scaled_re_loss")]
    pub scaled_re_loss: bool,
}

impl HyperParams {
    /// Plain VAE defaults for the given frame shape.
    pub fn new(input_shape: InputShape) -> Self {
        Self {
            network:        Network::Atari,
            latent_dim:     20,
            beta:           44.4,
            lr:             5e-3,
            input_shape,
            k:              None,
            scaled_re_loss: true,
        }
    }

    /// Stacked VAE defaults: k frames encoded by one shared network.
    pub fn stacked(input_shape: InputShape, k: usize) -> Self {
        Self {
            network:        Network::Pendulum,
            latent_dim:     20,
            beta:           1.0,
            lr:             1e-3,
            input_shape,
            k:              Some(k),
            scaled_re_loss: true,
        }
    }

    pub fn validate(&self) -> VaeResult<()> {
        if self.latent_dim == 0 {
            return Err(VaeError::InvalidParams("latent_dim must be positive".into()));
        }
        if !self.beta.is_finite() || self.beta < 0.0 {
            return Err(VaeError::InvalidParams(format!("beta must be >= 0, got {}", self.beta)));
        }
        if !self.lr.is_finite() || self.lr <= 0.0 {
            return Err(VaeError::InvalidParams(format!("lr must be > 0, got {}", self.lr)));
        }
        if self.input_shape.frame_len() == 0 {
            return Err(VaeError::InvalidParams(format!(
                "input shape {} has a zero dimension",
                self.input_shape
            )));
        }
        if self.k == Some(0) {
            return Err(VaeError::InvalidParams("k must be at least 1".into()));
        }
        self.network.check_shape(&self.input_shape)
    }

    /// Parse and validate a params.json body.
    pub fn from_json(json: &str) -> VaeResult<Self> {
        let params: HyperParams = serde_json::from_str(json)
            .map_err(|e| VaeError::InvalidParams(e.to_string()))?;
        params.validate()?;
        Ok(params)
    }

    /// Directory name of a fresh run, e.g. `atari-b44.4-lat20-lr0.005-2024-05-01T12:30`
    pub fn run_id(&self, started: DateTime<Local>) -> String {
        format!(
            "{}-b{}-lat{}-lr{}-{}",
            self.network,
            self.beta,
            self.latent_dim,
            self.lr,
            started.format("%Y-%m-%dT%H:%M"),
        )
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_network_parse() {
        assert_eq!("pendulum-mini".parse::<Network>().unwrap(), Network::PendulumMini);
        let err = "resnet".parse::<Network>().unwrap_err();
        assert!(matches!(err, VaeError::UnknownNetwork(ref n) if n == "resnet"));
    }

    #[test]
    fn test_grayscale_shape_gets_channel() {
        let shape = InputShape::from_dims(&[64, 64]).unwrap();
        assert_eq!(shape.dims(), [64, 64, 1]);
        assert!(matches!(InputShape::from_dims(&[1, 2, 3, 4]), Err(VaeError::BadRank(4))));
    }

    #[test]
    fn test_shape_parse() {
        assert_eq!("64x48x3".parse::<InputShape>().unwrap(), InputShape::new(64, 48, 3));
        assert_eq!("32x32".parse::<InputShape>().unwrap(), InputShape::new(32, 32, 1));
        assert!("32xx32".parse::<InputShape>().is_err());
    }

    #[test]
    fn test_conv_network_rejects_odd_sizes() {
        let mut params = HyperParams::new(InputShape::new(84, 84, 1));
        params.network = Network::Dsprites;
        assert!(matches!(params.validate(), Err(VaeError::IncompatibleShape { factor: 16, .. })));

        params.network = Network::Dense;
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let json = r#"{"network":"dense","latent_dim":5,"beta":1.0,"lr":0.001,
            "input_shape":{"height":8,"width":8,"channels":1},"name":"legacy"}"#;
        assert!(matches!(HyperParams::from_json(json), Err(VaeError::InvalidParams(_))));
    }

    #[test]
    fn test_missing_fields_rejected() {
        let json = r#"{"network":"dense","latent_dim":5}"#;
        assert!(matches!(HyperParams::from_json(json), Err(VaeError::InvalidParams(_))));
    }

    #[test]
    fn test_optional_fields_default() {
        let json = r#"{"network":"dense","latent_dim":5,"beta":1.0,"lr":0.001,
            "input_shape":{"height":8,"width":8,"channels":1}}"#;
        let params = HyperParams::from_json(json).unwrap();
        assert_eq!(params.k, None);
        assert!(params.scaled_re_loss);
    }

    #[test]
    fn test_zero_latent_dim_invalid() {
        let mut params = HyperParams::new(InputShape::new(8, 8, 1));
        params.network    = Network::Dense;
        params.latent_dim = 0;
        assert!(matches!(params.validate(), Err(VaeError::InvalidParams(_))));
    }

    #[test]
    fn test_run_id_format() {
        let mut params = HyperParams::new(InputShape::new(64, 64, 1));
        params.network = Network::Dsprites;
        params.beta    = 30.1;
        params.latent_dim = 5;
        let started = Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 0).unwrap();
        assert_eq!(params.run_id(started), "dsprites-b30.1-lat5-lr0.005-2024-03-09T14:05");
    }
}
