use super::network::SequenceModel;
use ndarray::{ArrayD, Zip};

/// Adam (adaptive moment estimation) over every tensor of a [`SequenceModel`].
#[derive(Debug, Clone)]
pub struct Adam {
    pub learning_rate: f64,
    pub beta1: f64,
    pub beta2: f64,
    pub epsilon: f64,
    t: i32,
    m: Vec<ArrayD<f64>>,
    v: Vec<ArrayD<f64>>,
}

impl Adam {
    pub fn new(learning_rate: f64) -> Self {
        Self {
            learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
            t: 0,
            m: Vec::new(),
            v: Vec::new(),
        }
    }

    pub fn steps(&self) -> i32 {
        self.t
    }

    /// Applies one update using `grads` (same layout as `model`).
    pub fn step(&mut self, model: &mut SequenceModel, grads: &SequenceModel) {
        let grads = grads.tensors();
        if self.m.len() != grads.len() {
            self.m = grads.iter().map(|g| ArrayD::zeros(g.raw_dim())).collect();
            self.v = grads.iter().map(|g| ArrayD::zeros(g.raw_dim())).collect();
            self.t = 0;
        }
        self.t += 1;

        let (b1, b2, eps, lr) = (self.beta1, self.beta2, self.epsilon, self.learning_rate);
        let c1 = 1.0 - b1.powi(self.t);
        let c2 = 1.0 - b2.powi(self.t);

        for (((param, grad), m), v) in model
            .tensors_mut()
            .into_iter()
            .zip(grads.iter())
            .zip(self.m.iter_mut())
            .zip(self.v.iter_mut())
        {
            Zip::from(param)
                .and(grad)
                .and(m)
                .and(v)
                .for_each(|p, &g, m, v| {
                    *m = b1 * *m + (1.0 - b1) * g;
                    *v = b2 * *v + (1.0 - b2) * g * g;
                    *p -= lr * (*m / c1) / ((*v / c2).sqrt() + eps);
                });
        }
    }
}

/// Rescales `grads` in place so their global L2 norm is at most `max_norm`.
/// Returns the norm before clipping.
pub fn clip_global_norm(grads: &mut SequenceModel, max_norm: f64) -> f64 {
    let norm = grads
        .tensors()
        .iter()
        .flat_map(|t| t.iter())
        .map(|g| g * g)
        .sum::<f64>()
        .sqrt();
    if norm > max_norm && norm.is_finite() {
        let scale = max_norm / norm;
        for mut t in grads.tensors_mut() {
            t.mapv_inplace(|g| g * scale);
        }
    }
    norm
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ml::network::NetworkConfig;

    fn model() -> SequenceModel {
        SequenceModel::new(NetworkConfig::new(2, 1).with_hidden_size(3).with_layers(1), 1).unwrap()
    }

    #[test]
    fn test_adam_first_step_moves_by_learning_rate() {
        let mut m = model();
        let before = m.clone();
        let mut grads = m.zeros_like();
        for mut t in grads.tensors_mut() {
            t.fill(0.5);
        }

        let mut adam = Adam::new(0.01);
        adam.step(&mut m, &grads);
        assert_eq!(adam.steps(), 1);

        // bias-corrected first step is lr * sign(g)
        for (after, prev) in m.tensors().iter().zip(before.tensors().iter()) {
            for (a, p) in after.iter().zip(prev.iter()) {
                assert!((p - a - 0.01).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn test_zero_gradient_leaves_params() {
        let mut m = model();
        let before = m.clone();
        let grads = m.zeros_like();
        Adam::new(0.1).step(&mut m, &grads);
        assert_eq!(m, before);
    }

    #[test]
    fn test_clip_global_norm() {
        let mut grads = model().zeros_like();
        for mut t in grads.tensors_mut() {
            t.fill(1.0);
        }
        let count = grads.parameter_count() as f64;

        let norm = clip_global_norm(&mut grads, 1.0);
        assert!((norm - count.sqrt()).abs() < 1e-9);
        let clipped: f64 = grads.tensors().iter().flat_map(|t| t.iter()).map(|g| g * g).sum();
        assert!((clipped.sqrt() - 1.0).abs() < 1e-9);

        let norm = clip_global_norm(&mut grads, 5.0);
        assert!((norm - 1.0).abs() < 1e-9);
    }
}
