// ============================================================
// Layer 5 — Network Builder
// ============================================================
// Encoder:  (n, h, w, c) ─► L strided convs ─► dense ─► mu, logvar
// Decoder:  z ─► dense ─► dense ─► L transposed convs ─► sigmoid
//
// Each conv uses kernel 4, stride 2, padding 1 and halves height
// and width; each transposed conv undoes one halving, so the
// reconstruction has exactly the input shape. Tensors cross the
// module boundary as NHWC and are permuted to NCHW internally.

use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig, ConvTranspose2d, ConvTranspose2dConfig},
        Linear, LinearConfig, PaddingConfig2d,
    },
    prelude::*,
    tensor::{
        activation::{relu, sigmoid},
        Distribution,
    },
};

use crate::domain::{
    error::{VaeError, VaeResult},
    hyperparams::{HyperParams, InputShape, Network},
};

// NOTE: #[derive(Config)] already generates Clone and Serialize/Deserialize
// internally — do NOT add them again or you get conflicting impls.
#[derive(Config, Debug)]
pub struct VaeNetworkConfig {
    pub network:     Network,
    pub input_shape: InputShape,
    pub latent_dim:  usize,
}

impl VaeNetworkConfig {
    pub fn from_params(params: &HyperParams) -> Self {
        Self::new(params.network, params.input_shape, params.latent_dim)
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> VaeResult<VaeNetwork<B>> {
        self.network.check_shape(&self.input_shape)?;
        if self.latent_dim == 0 {
            return Err(VaeError::InvalidParams("latent_dim must be positive".into()));
        }

        let InputShape { height, width, channels: in_channels } = self.input_shape;
        let conv_channels = self.network.conv_channels();
        let factor        = self.network.downsample_factor();
        let hidden        = self.network.hidden_units();

        // Spatial tensor the decoder starts from (and the encoder ends at)
        let seed_channels = conv_channels.last().copied().unwrap_or(in_channels);
        let seed_height   = height / factor;
        let seed_width    = width / factor;
        let flat          = seed_channels * seed_height * seed_width;

        let mut convs = Vec::with_capacity(conv_channels.len());
        let mut prev  = in_channels;
        for &out in conv_channels {
            convs.push(
                Conv2dConfig::new([prev, out], [4, 4])
                    .with_stride([2, 2])
                    .with_padding(PaddingConfig2d::Explicit(1, 1))
                    .init(device),
            );
            prev = out;
        }

        let deconvs = (0..conv_channels.len())
            .rev()
            .map(|i| {
                let out = if i == 0 { in_channels } else { conv_channels[i - 1] };
                ConvTranspose2dConfig::new([conv_channels[i], out], [4, 4])
                    .with_stride([2, 2])
                    .with_padding([1, 1])
                    .init(device)
            })
            .collect();

        let encoder = Encoder {
            convs,
            hidden: LinearConfig::new(flat, hidden).init(device),
            mu:     LinearConfig::new(hidden, self.latent_dim).init(device),
            logvar: LinearConfig::new(hidden, self.latent_dim).init(device),
        };

        let decoder = Decoder {
            hidden:  LinearConfig::new(self.latent_dim, hidden).init(device),
            project: LinearConfig::new(hidden, flat).init(device),
            deconvs,
            seed_channels,
            seed_height,
            seed_width,
        };

        tracing::debug!(
            "Built '{}' network: {} conv layers, hidden={}, latent_dim={}, input={}",
            self.network, conv_channels.len(), hidden, self.latent_dim, self.input_shape,
        );

        Ok(VaeNetwork { encoder, decoder, latent_dim: self.latent_dim })
    }
}

// ─── Encoder ──────────────────────────────────────────────────────────────────
#[derive(Module, Debug)]
pub struct Encoder<B: Backend> {
    pub convs:  Vec<Conv2d<B>>,
    pub hidden: Linear<B>,
    pub mu:     Linear<B>,
    pub logvar: Linear<B>,
}

impl<B: Backend> Encoder<B> {
    /// x: [n, h, w, c] → (mu, logvar): [n, latent_dim] each
    pub fn forward(&self, x: Tensor<B, 4>) -> (Tensor<B, 2>, Tensor<B, 2>) {
        let mut x = x.permute([0, 3, 1, 2]);
        for conv in &self.convs {
            x = relu(conv.forward(x));
        }
        let h = relu(self.hidden.forward(x.flatten::<2>(1, 3)));
        (self.mu.forward(h.clone()), self.logvar.forward(h))
    }
}

// ─── Decoder ──────────────────────────────────────────────────────────────────
#[derive(Module, Debug)]
pub struct Decoder<B: Backend> {
    pub hidden:        Linear<B>,
    pub project:       Linear<B>,
    pub deconvs:       Vec<ConvTranspose2d<B>>,
    pub seed_channels: usize,
    pub seed_height:   usize,
    pub seed_width:    usize,
}

impl<B: Backend> Decoder<B> {
    /// z: [n, latent_dim] → reconstruction [n, h, w, c] in (0, 1)
    pub fn forward(&self, z: Tensor<B, 2>) -> Tensor<B, 4> {
        let [n, _] = z.dims();
        let h = relu(self.hidden.forward(z));
        let mut x = self.project.forward(h);
        if !self.deconvs.is_empty() {
            x = relu(x);
        }

        let mut x = x.reshape([n, self.seed_channels, self.seed_height, self.seed_width]);
        let last = self.deconvs.len().saturating_sub(1);
        for (i, deconv) in self.deconvs.iter().enumerate() {
            x = deconv.forward(x);
            if i != last {
                x = relu(x);
            }
        }

        sigmoid(x).permute([0, 2, 3, 1])
    }
}

// ─── VaeNetwork ───────────────────────────────────────────────────────────────
#[derive(Module, Debug)]
pub struct VaeNetwork<B: Backend> {
    pub encoder:    Encoder<B>,
    pub decoder:    Decoder<B>,
    pub latent_dim: usize,
}

/// Everything one forward pass produces.
pub struct VaeOutput<B: Backend> {
    pub mu:             Tensor<B, 2>,
    pub logvar:         Tensor<B, 2>,
    pub z:              Tensor<B, 2>,
    pub reconstruction: Tensor<B, 4>,
}

impl<B: Backend> VaeNetwork<B> {
    pub fn latent_dim(&self) -> usize {
        self.latent_dim
    }

    pub fn encode(&self, x: Tensor<B, 4>) -> (Tensor<B, 2>, Tensor<B, 2>) {
        self.encoder.forward(x)
    }

    /// Reparameterization trick: z = mu + eps * exp(0.5 * logvar), eps ~ N(0, 1)
    pub fn sample(&self, mu: Tensor<B, 2>, logvar: Tensor<B, 2>) -> Tensor<B, 2> {
        let std = logvar.mul_scalar(0.5).exp();
        let eps = Tensor::random(std.shape(), Distribution::Normal(0.0, 1.0), &std.device());
        mu + eps * std
    }

    pub fn decode(&self, z: Tensor<B, 2>) -> Tensor<B, 4> {
        self.decoder.forward(z)
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> VaeOutput<B> {
        let (mu, logvar) = self.encode(x);
        let z = self.sample(mu.clone(), logvar.clone());
        let reconstruction = self.decode(z.clone());
        VaeOutput { mu, logvar, z, reconstruction }
    }
}
