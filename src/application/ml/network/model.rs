use super::dense::Dense;
use super::lstm::{LstmLayer, StepCache};
use crate::domain::errors::ConfigurationError;
use ndarray::{Array1, Array2, ArrayView2, ArrayView3, ArrayViewD, ArrayViewMutD, Axis, s};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Widths of the two hidden layers of the feed-forward head.
pub const HEAD_HIDDEN: [usize; 2] = [64, 32];

/// How the recurrent stack is pooled into the head's input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelVariant {
    /// Last time step's hidden state.
    #[default]
    Plain,
    /// Softmax-weighted sum of every time step's hidden state.
    Attention,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub input_size: usize,
    pub hidden_size: usize,
    pub num_layers: usize,
    pub output_size: usize,
    pub dropout: f64,
    pub variant: ModelVariant,
}

impl NetworkConfig {
    pub fn new(input_size: usize, output_size: usize) -> Self {
        Self {
            input_size,
            hidden_size: 128,
            num_layers: 2,
            output_size,
            dropout: 0.2,
            variant: ModelVariant::Plain,
        }
    }

    pub fn with_hidden_size(mut self, hidden_size: usize) -> Self {
        self.hidden_size = hidden_size;
        self
    }

    pub fn with_layers(mut self, num_layers: usize) -> Self {
        self.num_layers = num_layers;
        self
    }

    pub fn with_dropout(mut self, dropout: f64) -> Self {
        self.dropout = dropout;
        self
    }

    pub fn with_variant(mut self, variant: ModelVariant) -> Self {
        self.variant = variant;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let positive = [
            ("input_size", self.input_size),
            ("hidden_size", self.hidden_size),
            ("num_layers", self.num_layers),
            ("output_size", self.output_size),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(ConfigurationError::InvalidHyperparameter {
                    name,
                    reason: "must be at least 1".to_string(),
                });
            }
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(ConfigurationError::InvalidHyperparameter {
                name: "dropout",
                reason: format!("{} is outside [0, 1)", self.dropout),
            });
        }
        Ok(())
    }
}

/// Activations recorded by [`SequenceModel::train_forward`].
#[derive(Debug, Clone)]
pub struct Tape {
    layers: Vec<Vec<StepCache>>,
    /// Dropout masks applied to each non-final layer's outputs, per step.
    layer_masks: Vec<Vec<Option<Array2<f64>>>>,
    top_hidden: Vec<Array2<f64>>,
    attention: Option<Array2<f64>>,
    context_mask: Option<Array2<f64>>,
    a0: Array2<f64>,
    z1: Array2<f64>,
    hidden_mask: Option<Array2<f64>>,
    a1: Array2<f64>,
    z2: Array2<f64>,
    r2: Array2<f64>,
}

impl Tape {
    /// Softmax weights over time, `[batch, steps]`, for the attention variant.
    pub fn attention_weights(&self) -> Option<&Array2<f64>> {
        self.attention.as_ref()
    }
}

/// Stacked LSTM followed by a `hidden -> 64 -> 32 -> output` ReLU head.
///
/// The same struct doubles as the gradient container returned by
/// [`SequenceModel::backward`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceModel {
    config: NetworkConfig,
    lstm: Vec<LstmLayer>,
    attention: Option<Dense>,
    fc1: Dense,
    fc2: Dense,
    fc3: Dense,
}

fn relu(v: f64) -> f64 {
    v.max(0.0)
}

fn relu_grad(v: f64) -> f64 {
    if v > 0.0 { 1.0 } else { 0.0 }
}

fn softmax_rows(scores: &Array2<f64>) -> Array2<f64> {
    let mut out = scores.clone();
    for mut row in out.rows_mut() {
        let max = row.fold(f64::NEG_INFINITY, |a, &b| a.max(b));
        row.mapv_inplace(|v| (v - max).exp());
        let sum = row.sum();
        row /= sum;
    }
    out
}

/// Inverted dropout: kept units are scaled by `1 / (1 - p)`.
fn dropout_mask(shape: (usize, usize), p: f64, rng: Option<&mut StdRng>) -> Option<Array2<f64>> {
    let rng = rng?;
    if p <= 0.0 {
        return None;
    }
    let keep = 1.0 / (1.0 - p);
    Some(Array2::from_shape_fn(shape, |_| {
        if rng.random::<f64>() < p { 0.0 } else { keep }
    }))
}

fn apply_mask(x: Array2<f64>, mask: &Option<Array2<f64>>) -> Array2<f64> {
    match mask {
        Some(m) => x * m,
        None => x,
    }
}

/// Mean squared error over every element, with its gradient.
pub fn mse_loss(predictions: &Array2<f64>, targets: &Array2<f64>) -> (f64, Array2<f64>) {
    let diff = predictions - targets;
    let n = diff.len().max(1) as f64;
    let loss = diff.mapv(|d| d * d).sum() / n;
    (loss, diff * (2.0 / n))
}

impl SequenceModel {
    pub fn new(config: NetworkConfig, seed: u64) -> Result<Self, ConfigurationError> {
        let mut rng = StdRng::seed_from_u64(seed);
        Self::with_rng(config, &mut rng)
    }

    pub fn with_rng<R: Rng>(config: NetworkConfig, rng: &mut R) -> Result<Self, ConfigurationError> {
        config.validate()?;
        let h = config.hidden_size;
        let lstm = (0..config.num_layers)
            .map(|l| LstmLayer::new(if l == 0 { config.input_size } else { h }, h, rng))
            .collect();
        let attention = match config.variant {
            ModelVariant::Plain => None,
            ModelVariant::Attention => Some(Dense::new(h, 1, rng)),
        };
        let fc1 = Dense::new(h, HEAD_HIDDEN[0], rng);
        let fc2 = Dense::new(HEAD_HIDDEN[0], HEAD_HIDDEN[1], rng);
        let fc3 = Dense::new(HEAD_HIDDEN[1], config.output_size, rng);

        Ok(Self {
            config,
            lstm,
            attention,
            fc1,
            fc2,
            fc3,
        })
    }

    /// Same shapes, every parameter zero.
    pub fn zeros_like(&self) -> Self {
        Self {
            config: self.config.clone(),
            lstm: self
                .lstm
                .iter()
                .map(|l| LstmLayer::zeros(l.input_size(), l.hidden_size()))
                .collect(),
            attention: self
                .attention
                .as_ref()
                .map(|a| Dense::zeros(a.input_size(), a.output_size())),
            fc1: Dense::zeros(self.fc1.input_size(), self.fc1.output_size()),
            fc2: Dense::zeros(self.fc2.input_size(), self.fc2.output_size()),
            fc3: Dense::zeros(self.fc3.input_size(), self.fc3.output_size()),
        }
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    pub fn parameter_count(&self) -> usize {
        self.tensors().iter().map(|t| t.len()).sum()
    }

    /// Checks every weight and bias against the stored config. Used after
    /// loading, so a malformed file fails here instead of inside a request.
    pub fn check_shapes(&self) -> Result<(), ConfigurationError> {
        let c = &self.config;
        c.validate()?;
        if self.lstm.len() != c.num_layers {
            return Err(ConfigurationError::ShapeMismatch {
                tensor: "lstm".to_string(),
                expected: vec![c.num_layers],
                actual: vec![self.lstm.len()],
            });
        }
        for (l, layer) in self.lstm.iter().enumerate() {
            let input = if l == 0 { c.input_size } else { c.hidden_size };
            layer.check_shape(&format!("lstm.{}", l), input, c.hidden_size)?;
        }
        match (&self.attention, c.variant) {
            (Some(scorer), ModelVariant::Attention) => scorer.check_shape("attention", c.hidden_size, 1)?,
            (None, ModelVariant::Plain) => {}
            _ => {
                return Err(ConfigurationError::InvalidHyperparameter {
                    name: "variant",
                    reason: "attention weights do not match the configured variant".to_string(),
                });
            }
        }
        self.fc1.check_shape("fc1", c.hidden_size, HEAD_HIDDEN[0])?;
        self.fc2.check_shape("fc2", HEAD_HIDDEN[0], HEAD_HIDDEN[1])?;
        self.fc3.check_shape("fc3", HEAD_HIDDEN[1], c.output_size)
    }

    /// Forward pass with dropout active; the returned tape feeds [`Self::backward`].
    pub fn train_forward(
        &self,
        windows: ArrayView3<'_, f64>,
        rng: &mut StdRng,
    ) -> Result<(Array2<f64>, Tape), ConfigurationError> {
        self.forward(windows, Some(rng))
    }

    /// Deterministic single-window prediction with dropout disabled.
    pub fn infer(&self, window: ArrayView2<'_, f64>) -> Result<Array1<f64>, ConfigurationError> {
        let batch = window.insert_axis(Axis(0));
        let (out, _) = self.forward(batch, None)?;
        Ok(out.row(0).to_owned())
    }

    pub fn infer_batch(&self, windows: ArrayView3<'_, f64>) -> Result<Array2<f64>, ConfigurationError> {
        self.forward(windows, None).map(|(out, _)| out)
    }

    /// Attention weights (`[batch, steps]`) in inference mode; `None` for the
    /// plain variant.
    pub fn attention_weights(
        &self,
        windows: ArrayView3<'_, f64>,
    ) -> Result<Option<Array2<f64>>, ConfigurationError> {
        self.forward(windows, None).map(|(_, tape)| tape.attention)
    }

    fn forward(
        &self,
        windows: ArrayView3<'_, f64>,
        mut rng: Option<&mut StdRng>,
    ) -> Result<(Array2<f64>, Tape), ConfigurationError> {
        let (batch, steps, width) = windows.dim();
        if width != self.config.input_size {
            return Err(ConfigurationError::FeatureWidthMismatch {
                expected: self.config.input_size,
                actual: width,
            });
        }
        if steps == 0 {
            return Err(ConfigurationError::InvalidHyperparameter {
                name: "sequence_length",
                reason: "window has no time steps".to_string(),
            });
        }
        let p = self.config.dropout;

        let mut inputs: Vec<Array2<f64>> = (0..steps)
            .map(|t| windows.slice(s![.., t, ..]).to_owned())
            .collect();
        let mut layers = Vec::with_capacity(self.lstm.len());
        let mut layer_masks = Vec::with_capacity(self.lstm.len().saturating_sub(1));

        for (l, layer) in self.lstm.iter().enumerate() {
            let (outputs, caches) = layer.forward_sequence(&inputs);
            layers.push(caches);
            if l + 1 == self.lstm.len() {
                inputs = outputs;
                break;
            }
            let mut masks = Vec::with_capacity(steps);
            inputs = Vec::with_capacity(steps);
            for h in outputs {
                let mask = dropout_mask(h.dim(), p, rng.as_deref_mut());
                inputs.push(apply_mask(h, &mask));
                masks.push(mask);
            }
            layer_masks.push(masks);
        }
        let top_hidden = inputs;

        let (context, attention) = match &self.attention {
            Some(scorer) => {
                let mut scores = Array2::zeros((batch, steps));
                for (t, h) in top_hidden.iter().enumerate() {
                    scores.column_mut(t).assign(&scorer.forward(h).column(0));
                }
                let weights = softmax_rows(&scores);
                let mut context = Array2::zeros((batch, self.config.hidden_size));
                for (t, h) in top_hidden.iter().enumerate() {
                    context += &(h * &weights.column(t).insert_axis(Axis(1)));
                }
                (context, Some(weights))
            }
            None => (top_hidden[steps - 1].clone(), None),
        };

        let context_mask = dropout_mask(context.dim(), p, rng.as_deref_mut());
        let a0 = apply_mask(context, &context_mask);
        let z1 = self.fc1.forward(&a0);
        let hidden_mask = dropout_mask(z1.dim(), p, rng.as_deref_mut());
        let a1 = apply_mask(z1.mapv(relu), &hidden_mask);
        let z2 = self.fc2.forward(&a1);
        let r2 = z2.mapv(relu);
        let output = self.fc3.forward(&r2);

        let tape = Tape {
            layers,
            layer_masks,
            top_hidden,
            attention,
            context_mask,
            a0,
            z1,
            hidden_mask,
            a1,
            z2,
            r2,
        };
        Ok((output, tape))
    }

    /// Gradients of the loss with respect to every parameter, given the loss
    /// gradient at the outputs of the pass recorded in `tape`.
    pub fn backward(&self, tape: &Tape, d_output: &Array2<f64>) -> SequenceModel {
        let mut grad = self.zeros_like();

        let d_r2 = self.fc3.backward(&tape.r2, d_output, &mut grad.fc3);
        let d_z2 = d_r2 * &tape.z2.mapv(relu_grad);
        let d_a1 = self.fc2.backward(&tape.a1, &d_z2, &mut grad.fc2);
        let d_z1 = apply_mask(d_a1, &tape.hidden_mask) * &tape.z1.mapv(relu_grad);
        let d_a0 = self.fc1.backward(&tape.a0, &d_z1, &mut grad.fc1);
        let d_context = apply_mask(d_a0, &tape.context_mask);

        let steps = tape.top_hidden.len();
        let mut d_hidden: Vec<Array2<f64>> = tape
            .top_hidden
            .iter()
            .map(|h| Array2::zeros(h.raw_dim()))
            .collect();

        match (&self.attention, &tape.attention, grad.attention.as_mut()) {
            (Some(scorer), Some(weights), Some(scorer_grad)) => {
                let mut d_weights = Array2::zeros(weights.raw_dim());
                for (t, h) in tape.top_hidden.iter().enumerate() {
                    d_hidden[t] += &(&d_context * &weights.column(t).insert_axis(Axis(1)));
                    d_weights
                        .column_mut(t)
                        .assign(&(&d_context * h).sum_axis(Axis(1)));
                }
                // softmax: ds = w * (dw - sum(w * dw))
                let weighted = (&d_weights * weights).sum_axis(Axis(1)).insert_axis(Axis(1));
                let d_scores = weights * &(&d_weights - &weighted);
                for (t, h) in tape.top_hidden.iter().enumerate() {
                    let d_score = d_scores.column(t).insert_axis(Axis(1)).to_owned();
                    d_hidden[t] += &scorer.backward(h, &d_score, scorer_grad);
                }
            }
            _ => d_hidden[steps - 1] += &d_context,
        }

        for l in (0..self.lstm.len()).rev() {
            let d_inputs = self.lstm[l].backward_sequence(&tape.layers[l], &d_hidden, &mut grad.lstm[l]);
            if l == 0 {
                break;
            }
            d_hidden = d_inputs
                .into_iter()
                .zip(&tape.layer_masks[l - 1])
                .map(|(d, mask)| apply_mask(d, mask))
                .collect();
        }

        grad
    }

    pub(crate) fn tensors(&self) -> Vec<ArrayViewD<'_, f64>> {
        let mut out = Vec::new();
        for layer in &self.lstm {
            out.extend(layer.tensors());
        }
        if let Some(scorer) = &self.attention {
            out.extend(scorer.tensors());
        }
        for dense in [&self.fc1, &self.fc2, &self.fc3] {
            out.extend(dense.tensors());
        }
        out
    }

    pub(crate) fn tensors_mut(&mut self) -> Vec<ArrayViewMutD<'_, f64>> {
        let mut out = Vec::new();
        for layer in &mut self.lstm {
            out.extend(layer.tensors_mut());
        }
        if let Some(scorer) = &mut self.attention {
            out.extend(scorer.tensors_mut());
        }
        for dense in [&mut self.fc1, &mut self.fc2, &mut self.fc3] {
            out.extend(dense.tensors_mut());
        }
        out
    }
}
