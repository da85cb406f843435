use crate::domain::errors::ConfigurationError;
use ndarray::{Array1, Array2, ArrayViewD, ArrayViewMutD, Axis};
use rand::Rng;
use serde::{Deserialize, Serialize};

pub(crate) fn check_tensor(
    tensor: String,
    expected: &[usize],
    actual: &[usize],
) -> Result<(), ConfigurationError> {
    if expected == actual {
        return Ok(());
    }
    Err(ConfigurationError::ShapeMismatch {
        tensor,
        expected: expected.to_vec(),
        actual: actual.to_vec(),
    })
}

/// Fully connected layer: `y = x · W + b` with `W` stored as `[input, output]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dense {
    pub weights: Array2<f64>,
    pub bias: Array1<f64>,
}

impl Dense {
    /// Uniform init in `±1/sqrt(input)`.
    pub fn new<R: Rng>(input_size: usize, output_size: usize, rng: &mut R) -> Self {
        let limit = 1.0 / (input_size as f64).sqrt();
        Self {
            weights: Array2::from_shape_fn((input_size, output_size), |_| {
                rng.random_range(-limit..limit)
            }),
            bias: Array1::from_shape_fn(output_size, |_| rng.random_range(-limit..limit)),
        }
    }

    pub fn zeros(input_size: usize, output_size: usize) -> Self {
        Self {
            weights: Array2::zeros((input_size, output_size)),
            bias: Array1::zeros(output_size),
        }
    }

    pub fn input_size(&self) -> usize {
        self.weights.nrows()
    }

    pub fn output_size(&self) -> usize {
        self.weights.ncols()
    }

    pub(crate) fn check_shape(
        &self,
        name: &str,
        input_size: usize,
        output_size: usize,
    ) -> Result<(), ConfigurationError> {
        check_tensor(format!("{}.weights", name), &[input_size, output_size], self.weights.shape())?;
        check_tensor(format!("{}.bias", name), &[output_size], self.bias.shape())
    }

    pub fn forward(&self, input: &Array2<f64>) -> Array2<f64> {
        input.dot(&self.weights) + &self.bias
    }

    /// Accumulates parameter gradients into `grad` and returns the gradient
    /// with respect to `input`.
    pub fn backward(
        &self,
        input: &Array2<f64>,
        d_output: &Array2<f64>,
        grad: &mut Dense,
    ) -> Array2<f64> {
        grad.weights += &input.t().dot(d_output);
        grad.bias += &d_output.sum_axis(Axis(0));
        d_output.dot(&self.weights.t())
    }

    pub(crate) fn tensors(&self) -> [ArrayViewD<'_, f64>; 2] {
        [self.weights.view().into_dyn(), self.bias.view().into_dyn()]
    }

    pub(crate) fn tensors_mut(&mut self) -> [ArrayViewMutD<'_, f64>; 2] {
        [
            self.weights.view_mut().into_dyn(),
            self.bias.view_mut().into_dyn(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_forward_shape_and_values() {
        let layer = Dense {
            weights: array![[1.0, 0.0], [0.0, 2.0], [1.0, 1.0]],
            bias: array![0.5, -0.5],
        };
        let out = layer.forward(&array![[1.0, 2.0, 3.0]]);
        assert_eq!(out, array![[4.5, 6.5]]);
    }

    #[test]
    fn test_backward_accumulates() {
        let layer = Dense {
            weights: array![[1.0], [2.0]],
            bias: array![0.0],
        };
        let input = array![[1.0, 1.0], [2.0, 0.0]];
        let d_out = array![[1.0], [0.5]];
        let mut grad = Dense::zeros(2, 1);

        let d_in = layer.backward(&input, &d_out, &mut grad);
        assert_eq!(grad.weights, array![[2.0], [1.0]]);
        assert_eq!(grad.bias, array![1.5]);
        assert_eq!(d_in, array![[1.0, 2.0], [0.5, 1.0]]);

        layer.backward(&input, &d_out, &mut grad);
        assert_eq!(grad.bias, array![3.0]);
    }

    #[test]
    fn test_init_bounds() {
        let mut rng = StdRng::seed_from_u64(7);
        let layer = Dense::new(16, 4, &mut rng);
        assert_eq!(layer.input_size(), 16);
        assert_eq!(layer.output_size(), 4);
        assert!(layer.weights.iter().all(|w| w.abs() <= 0.25));
    }

    #[test]
    fn test_check_shape_catches_short_bias() {
        let mut layer = Dense::zeros(3, 2);
        assert!(layer.check_shape("fc", 3, 2).is_ok());
        assert!(layer.check_shape("fc", 3, 4).is_err());

        layer.bias = array![0.0];
        assert_eq!(
            layer.check_shape("fc", 3, 2),
            Err(ConfigurationError::ShapeMismatch {
                tensor: "fc.bias".to_string(),
                expected: vec![2],
                actual: vec![1],
            })
        );
    }
}
