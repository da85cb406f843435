use super::dense::check_tensor;
use crate::domain::errors::ConfigurationError;
use ndarray::{Array1, Array2, ArrayViewD, ArrayViewMutD, Axis, s};
use rand::Rng;
use serde::{Deserialize, Serialize};

fn sigmoid(v: f64) -> f64 {
    1.0 / (1.0 + (-v).exp())
}

/// One LSTM layer with fused gate weights.
///
/// Gate blocks along the last axis are ordered input, forget, cell, output:
/// `z = x · W_x + h · W_h + b`, each block `hidden` wide.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LstmLayer {
    pub w_x: Array2<f64>,
    pub w_h: Array2<f64>,
    pub bias: Array1<f64>,
}

/// Activations of one time step kept for back-propagation.
#[derive(Debug, Clone)]
pub(crate) struct StepCache {
    x: Array2<f64>,
    h_prev: Array2<f64>,
    c_prev: Array2<f64>,
    i: Array2<f64>,
    f: Array2<f64>,
    g: Array2<f64>,
    o: Array2<f64>,
    tanh_c: Array2<f64>,
}

impl LstmLayer {
    pub fn new<R: Rng>(input_size: usize, hidden_size: usize, rng: &mut R) -> Self {
        let limit = 1.0 / (hidden_size as f64).sqrt();
        let mut bias = Array1::zeros(4 * hidden_size);
        // Forget gate starts open
        bias.slice_mut(s![hidden_size..2 * hidden_size]).fill(1.0);

        Self {
            w_x: Array2::from_shape_fn((input_size, 4 * hidden_size), |_| {
                rng.random_range(-limit..limit)
            }),
            w_h: Array2::from_shape_fn((hidden_size, 4 * hidden_size), |_| {
                rng.random_range(-limit..limit)
            }),
            bias,
        }
    }

    pub fn zeros(input_size: usize, hidden_size: usize) -> Self {
        Self {
            w_x: Array2::zeros((input_size, 4 * hidden_size)),
            w_h: Array2::zeros((hidden_size, 4 * hidden_size)),
            bias: Array1::zeros(4 * hidden_size),
        }
    }

    pub fn input_size(&self) -> usize {
        self.w_x.nrows()
    }

    pub fn hidden_size(&self) -> usize {
        self.w_h.nrows()
    }

    /// Runs the layer over `inputs` (one `[batch, input]` matrix per time
    /// step) from a zero state. Returns the hidden state of every step.
    pub(crate) fn forward_sequence(
        &self,
        inputs: &[Array2<f64>],
    ) -> (Vec<Array2<f64>>, Vec<StepCache>) {
        let hidden = self.hidden_size();
        let batch = inputs.first().map_or(0, |x| x.nrows());
        let mut h = Array2::zeros((batch, hidden));
        let mut c = Array2::zeros((batch, hidden));
        let mut outputs = Vec::with_capacity(inputs.len());
        let mut caches = Vec::with_capacity(inputs.len());

        for x in inputs {
            let z = x.dot(&self.w_x) + &h.dot(&self.w_h) + &self.bias;
            let i = z.slice(s![.., ..hidden]).mapv(sigmoid);
            let f = z.slice(s![.., hidden..2 * hidden]).mapv(sigmoid);
            let g = z.slice(s![.., 2 * hidden..3 * hidden]).mapv(f64::tanh);
            let o = z.slice(s![.., 3 * hidden..]).mapv(sigmoid);

            let c_next = &f * &c + &i * &g;
            let tanh_c = c_next.mapv(f64::tanh);
            let h_next = &o * &tanh_c;

            outputs.push(h_next.clone());
            caches.push(StepCache {
                x: x.clone(),
                h_prev: h,
                c_prev: c,
                i,
                f,
                g,
                o,
                tanh_c,
            });
            h = h_next;
            c = c_next;
        }

        (outputs, caches)
    }

    /// Back-propagation through time.
    ///
    /// `d_hidden[t]` is the loss gradient arriving at step `t`'s hidden output
    /// from above. Parameter gradients are accumulated into `grad`; the
    /// returned vector holds the gradient for each step's input.
    pub(crate) fn backward_sequence(
        &self,
        caches: &[StepCache],
        d_hidden: &[Array2<f64>],
        grad: &mut LstmLayer,
    ) -> Vec<Array2<f64>> {
        let hidden = self.hidden_size();
        let batch = caches.first().map_or(0, |c| c.h_prev.nrows());
        let mut dh_next = Array2::zeros((batch, hidden));
        let mut dc_next = Array2::zeros((batch, hidden));
        let mut d_inputs = Vec::with_capacity(caches.len());

        for (cache, d_h_above) in caches.iter().zip(d_hidden).rev() {
            let dh = d_h_above + &dh_next;
            let d_o = &dh * &cache.tanh_c;
            let dc = &dh * &cache.o * &cache.tanh_c.mapv(|v| 1.0 - v * v) + &dc_next;

            let d_i = &dc * &cache.g;
            let d_f = &dc * &cache.c_prev;
            let d_g = &dc * &cache.i;
            dc_next = &dc * &cache.f;

            let mut dz = Array2::zeros((batch, 4 * hidden));
            dz.slice_mut(s![.., ..hidden])
                .assign(&(d_i * &cache.i.mapv(|v| v * (1.0 - v))));
            dz.slice_mut(s![.., hidden..2 * hidden])
                .assign(&(d_f * &cache.f.mapv(|v| v * (1.0 - v))));
            dz.slice_mut(s![.., 2 * hidden..3 * hidden])
                .assign(&(d_g * &cache.g.mapv(|v| 1.0 - v * v)));
            dz.slice_mut(s![.., 3 * hidden..])
                .assign(&(d_o * &cache.o.mapv(|v| v * (1.0 - v))));

            grad.w_x += &cache.x.t().dot(&dz);
            grad.w_h += &cache.h_prev.t().dot(&dz);
            grad.bias += &dz.sum_axis(Axis(0));

            dh_next = dz.dot(&self.w_h.t());
            d_inputs.push(dz.dot(&self.w_x.t()));
        }

        d_inputs.reverse();
        d_inputs
    }

    pub(crate) fn check_shape(
        &self,
        name: &str,
        input_size: usize,
        hidden_size: usize,
    ) -> Result<(), ConfigurationError> {
        let gates = 4 * hidden_size;
        check_tensor(format!("{}.w_x", name), &[input_size, gates], self.w_x.shape())?;
        check_tensor(format!("{}.w_h", name), &[hidden_size, gates], self.w_h.shape())?;
        check_tensor(format!("{}.bias", name), &[gates], self.bias.shape())
    }

    pub(crate) fn tensors(&self) -> [ArrayViewD<'_, f64>; 3] {
        [
            self.w_x.view().into_dyn(),
            self.w_h.view().into_dyn(),
            self.bias.view().into_dyn(),
        ]
    }

    pub(crate) fn tensors_mut(&mut self) -> [ArrayViewMutD<'_, f64>; 3] {
        [
            self.w_x.view_mut().into_dyn(),
            self.w_h.view_mut().into_dyn(),
            self.bias.view_mut().into_dyn(),
        ]
    }
}
