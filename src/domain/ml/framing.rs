//! Turns a time-ordered feature matrix into (window, next-step target) pairs.

use crate::domain::errors::ConfigurationError;
use ndarray::{Array2, Array3, ArrayView2, Axis, concatenate, s};

/// Windows and their targets, aligned by the first axis.
///
/// `windows` is `[pairs, sequence_length, features]`, `targets` is
/// `[pairs, target_width]`.
#[derive(Debug, Clone, PartialEq)]
pub struct FramedSequences {
    pub windows: Array3<f64>,
    pub targets: Array2<f64>,
}

impl FramedSequences {
    pub fn len(&self) -> usize {
        self.windows.len_of(Axis(0))
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn sequence_length(&self) -> usize {
        self.windows.len_of(Axis(1))
    }

    pub fn feature_width(&self) -> usize {
        self.windows.len_of(Axis(2))
    }

    pub fn target_width(&self) -> usize {
        self.targets.len_of(Axis(1))
    }

    /// Chronological split: the first `at` pairs and the rest.
    pub fn split_at(&self, at: usize) -> (FramedSequences, FramedSequences) {
        let at = at.min(self.len());
        let head = FramedSequences {
            windows: self.windows.slice(s![..at, .., ..]).to_owned(),
            targets: self.targets.slice(s![..at, ..]).to_owned(),
        };
        let tail = FramedSequences {
            windows: self.windows.slice(s![at.., .., ..]).to_owned(),
            targets: self.targets.slice(s![at.., ..]).to_owned(),
        };
        (head, tail)
    }

    /// Stacks pairs framed from separate runs, keeping their order. All parts
    /// must share window length and widths.
    pub fn concat(parts: &[FramedSequences]) -> Result<FramedSequences, ConfigurationError> {
        let shape_err = |e: ndarray::ShapeError| ConfigurationError::FeaturePipeline {
            reason: format!("cannot stack framed runs: {}", e),
        };
        let windows: Vec<_> = parts.iter().map(|p| p.windows.view()).collect();
        let targets: Vec<_> = parts.iter().map(|p| p.targets.view()).collect();
        Ok(FramedSequences {
            windows: concatenate(Axis(0), &windows).map_err(shape_err)?,
            targets: concatenate(Axis(0), &targets).map_err(shape_err)?,
        })
    }

    /// Gathers the given pairs in order.
    pub fn select(&self, indices: &[usize]) -> FramedSequences {
        FramedSequences {
            windows: self.windows.select(Axis(0), indices),
            targets: self.targets.select(Axis(0), indices),
        }
    }
}

/// Frames `series` (`[N, F]`, oldest row first) into `max(N - L, 0)` pairs.
///
/// Pair `i` holds rows `[i, i + L)` as its window and row `i + L` as its
/// target, projected onto `target_columns` when given. A series that is not
/// longer than the window yields an empty result.
pub fn frame_sequences(
    series: ArrayView2<'_, f64>,
    sequence_length: usize,
    target_columns: Option<&[usize]>,
) -> Result<FramedSequences, ConfigurationError> {
    if sequence_length == 0 {
        return Err(ConfigurationError::InvalidHyperparameter {
            name: "sequence_length",
            reason: "must be at least 1".to_string(),
        });
    }

    let (rows, width) = series.dim();
    let columns: Vec<usize> = match target_columns {
        Some(cols) => {
            if let Some(&column) = cols.iter().find(|&&c| c >= width) {
                return Err(ConfigurationError::TargetColumnOutOfRange { column, width });
            }
            cols.to_vec()
        }
        None => (0..width).collect(),
    };

    let pairs = rows.saturating_sub(sequence_length);
    let mut windows = Array3::zeros((pairs, sequence_length, width));
    let mut targets = Array2::zeros((pairs, columns.len()));

    for i in 0..pairs {
        windows
            .slice_mut(s![i, .., ..])
            .assign(&series.slice(s![i..i + sequence_length, ..]));
        let next = series.row(i + sequence_length);
        for (j, &c) in columns.iter().enumerate() {
            targets[[i, j]] = next[c];
        }
    }

    Ok(FramedSequences { windows, targets })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(rows: usize, width: usize) -> Array2<f64> {
        Array2::from_shape_fn((rows, width), |(r, c)| (r * 100 + c) as f64)
    }

    #[test]
    fn test_pair_count_and_alignment() {
        let series = ramp(20, 3);
        let framed = frame_sequences(series.view(), 5, None).unwrap();

        assert_eq!(framed.len(), 15);
        assert_eq!(framed.sequence_length(), 5);
        for i in 0..framed.len() {
            // last row of the window is day i + 4, target is day i + 5
            assert_eq!(framed.windows[[i, 0, 0]], (i * 100) as f64);
            assert_eq!(framed.windows[[i, 4, 2]], ((i + 4) * 100 + 2) as f64);
            assert_eq!(framed.targets[[i, 0]], ((i + 5) * 100) as f64);
        }
    }

    #[test]
    fn test_target_projection() {
        let series = ramp(10, 4);
        let framed = frame_sequences(series.view(), 3, Some(&[2, 0])).unwrap();

        assert_eq!(framed.target_width(), 2);
        assert_eq!(framed.targets[[0, 0]], 302.0);
        assert_eq!(framed.targets[[0, 1]], 300.0);
    }

    #[test]
    fn test_short_series_is_empty_not_error() {
        let series = ramp(7, 2);
        let framed = frame_sequences(series.view(), 7, None).unwrap();
        assert!(framed.is_empty());

        let framed = frame_sequences(series.view(), 12, None).unwrap();
        assert!(framed.is_empty());
        assert_eq!(framed.feature_width(), 2);
    }

    #[test]
    fn test_scenario_993_pairs() {
        let series = ramp(1000, 10);
        let framed = frame_sequences(series.view(), 7, None).unwrap();
        assert_eq!(framed.len(), 993);
    }

    #[test]
    fn test_framing_is_deterministic() {
        let series = ramp(50, 3);
        let a = frame_sequences(series.view(), 6, Some(&[1])).unwrap();
        let b = frame_sequences(series.view(), 6, Some(&[1])).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_invalid_arguments() {
        let series = ramp(10, 2);
        assert!(matches!(
            frame_sequences(series.view(), 0, None),
            Err(ConfigurationError::InvalidHyperparameter { .. })
        ));
        assert_eq!(
            frame_sequences(series.view(), 3, Some(&[2])),
            Err(ConfigurationError::TargetColumnOutOfRange {
                column: 2,
                width: 2
            })
        );
    }

    #[test]
    fn test_split_and_select() {
        let series = ramp(12, 1);
        let framed = frame_sequences(series.view(), 2, None).unwrap();
        let (train, test) = framed.split_at(8);
        assert_eq!(train.len(), 8);
        assert_eq!(test.len(), 2);
        assert_eq!(test.targets[[0, 0]], 1000.0);

        let picked = framed.select(&[3, 1]);
        assert_eq!(picked.targets[[0, 0]], 500.0);
        assert_eq!(picked.targets[[1, 0]], 300.0);
    }

    #[test]
    fn test_concat_keeps_run_order() {
        let first = frame_sequences(ramp(5, 2).view(), 2, None).unwrap();
        let second = frame_sequences(ramp(4, 2).view(), 2, None).unwrap();
        let joined = FramedSequences::concat(&[first.clone(), second.clone()]).unwrap();

        assert_eq!(joined.len(), 5);
        assert_eq!(joined.select(&[0, 1, 2]), first);
        assert_eq!(joined.select(&[3, 4]), second);

        let wider = frame_sequences(ramp(5, 3).view(), 2, None).unwrap();
        assert!(FramedSequences::concat(&[first, wider]).is_err());
        assert!(FramedSequences::concat(&[]).is_err());
    }
}
