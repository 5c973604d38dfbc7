//! Binary and multiclass classification metrics.
//!
//! Without an objective, binary scores go through a sigmoid and multiclass
//! scores through a softmax before the loss is taken.

use crate::core::error::Result;
use crate::core::meta::K_EPSILON;
use crate::core::types::{DataSize, Label};
use crate::core::utils::Common;
use crate::dataset::Metadata;
use crate::metrics::{Metric, PointwiseData};
use crate::objective::ObjectiveFunction;
use rayon::prelude::*;

fn binary_logloss(label: Label, prob: f64) -> f64 {
    if label <= 0.0 {
        if 1.0 - prob > K_EPSILON {
            return -(1.0 - prob).ln();
        }
    } else if prob > K_EPSILON {
        return -prob.ln();
    }
    -K_EPSILON.ln()
}

fn binary_error(label: Label, prob: f64) -> f64 {
    let wrong = if prob <= 0.5 { label > 0.0 } else { label <= 0.0 };
    if wrong {
        1.0
    } else {
        0.0
    }
}

/// Shared evaluation of the binary metrics
#[derive(Debug, Clone)]
struct BinaryEval {
    sigmoid: f64,
    data: PointwiseData,
    names: Vec<String>,
}

impl BinaryEval {
    fn new(name: &str, sigmoid: f64) -> Self {
        BinaryEval {
            sigmoid,
            data: PointwiseData::default(),
            names: vec![name.to_string()],
        }
    }

    fn eval(&self, score: &[f64], objective: Option<&dyn ObjectiveFunction>, loss: fn(Label, f64) -> f64) -> Vec<f64> {
        let data = &self.data;
        let sum_loss: f64 = (0..data.num_data)
            .into_par_iter()
            .map(|i| {
                let prob = match objective {
                    Some(objective) => {
                        let mut out = [0.0];
                        objective.convert_output(&score[i..=i], &mut out);
                        out[0]
                    }
                    None => 1.0 / (1.0 + (-self.sigmoid * score[i]).exp()),
                };
                loss(data.label[i], prob) * data.weight(i)
            })
            .sum();
        vec![sum_loss / data.sum_weights]
    }
}

macro_rules! binary_metric {
    ($(#[$doc:meta])* $name:ident, $display:literal, $loss:path) => {
        $(#[$doc])*
        #[derive(Debug, Clone)]
        pub struct $name {
            inner: BinaryEval,
        }

        impl $name {
            pub fn new(sigmoid: f64) -> Self {
                $name {
                    inner: BinaryEval::new($display, sigmoid),
                }
            }
        }

        impl Metric for $name {
            fn init(&mut self, metadata: &Metadata, num_data: DataSize) -> Result<()> {
                self.inner.data = PointwiseData::from_metadata(metadata, num_data);
                Ok(())
            }

            fn names(&self) -> &[String] {
                &self.inner.names
            }

            fn factor_to_bigger_better(&self) -> f64 {
                -1.0
            }

            fn eval(&self, score: &[f64], objective: Option<&dyn ObjectiveFunction>) -> Vec<f64> {
                self.inner.eval(score, objective, $loss)
            }
        }
    };
}

binary_metric!(
    /// Mean negative log likelihood of the positive probability
    BinaryLoglossMetric,
    "binary_logloss",
    binary_logloss
);
binary_metric!(
    /// Fraction of rows on the wrong side of 0.5
    BinaryErrorMetric,
    "binary_error",
    binary_error
);

fn multi_logloss(label: usize, prob: &[f64]) -> f64 {
    if prob[label] > K_EPSILON {
        -prob[label].ln()
    } else {
        -K_EPSILON.ln()
    }
}

fn multi_error(label: usize, prob: &[f64]) -> f64 {
    let wrong = prob
        .iter()
        .enumerate()
        .any(|(k, &p)| k != label && p >= prob[label]);
    if wrong {
        1.0
    } else {
        0.0
    }
}

#[derive(Debug, Clone)]
struct MulticlassEval {
    num_class: usize,
    data: PointwiseData,
    names: Vec<String>,
}

impl MulticlassEval {
    fn eval(
        &self,
        score: &[f64],
        objective: Option<&dyn ObjectiveFunction>,
        loss: fn(usize, &[f64]) -> f64,
    ) -> Vec<f64> {
        let data = &self.data;
        let n = data.num_data;
        let num_class = self.num_class;
        let sum_loss: f64 = (0..n)
            .into_par_iter()
            .map(|i| {
                let raw: Vec<f64> = (0..num_class).map(|k| score[n * k + i]).collect();
                let mut prob = vec![0.0; num_class];
                match objective {
                    Some(objective) => objective.convert_output(&raw, &mut prob),
                    None => {
                        prob.copy_from_slice(&raw);
                        Common::softmax(&mut prob);
                    }
                }
                let label = (data.label[i] as usize).min(num_class - 1);
                loss(label, &prob) * data.weight(i)
            })
            .sum();
        vec![sum_loss / data.sum_weights]
    }
}

macro_rules! multiclass_metric {
    ($(#[$doc:meta])* $name:ident, $display:literal, $loss:path) => {
        $(#[$doc])*
        #[derive(Debug, Clone)]
        pub struct $name {
            inner: MulticlassEval,
        }

        impl $name {
            pub fn new(num_class: usize) -> Self {
                $name {
                    inner: MulticlassEval {
                        num_class: num_class.max(1),
                        data: PointwiseData::default(),
                        names: vec![$display.to_string()],
                    },
                }
            }
        }

        impl Metric for $name {
            fn init(&mut self, metadata: &Metadata, num_data: DataSize) -> Result<()> {
                self.inner.data = PointwiseData::from_metadata(metadata, num_data);
                Ok(())
            }

            fn names(&self) -> &[String] {
                &self.inner.names
            }

            fn factor_to_bigger_better(&self) -> f64 {
                -1.0
            }

            fn eval(&self, score: &[f64], objective: Option<&dyn ObjectiveFunction>) -> Vec<f64> {
                self.inner.eval(score, objective, $loss)
            }
        }
    };
}

multiclass_metric!(
    /// Mean negative log probability of the true class
    MultiLoglossMetric,
    "multi_logloss",
    multi_logloss
);
multiclass_metric!(
    /// Fraction of rows whose true class is not the strict argmax
    MultiErrorMetric,
    "multi_error",
    multi_error
);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objective::{BinaryLogloss, MulticlassSoftmax};
    use approx::assert_relative_eq;

    fn metadata(labels: &[f64]) -> Metadata {
        let mut metadata = Metadata::new();
        metadata.init(labels.len() as DataSize, -1, -1);
        for (i, &l) in labels.iter().enumerate() {
            metadata.set_label_at(i as DataSize, l);
        }
        metadata
    }

    #[test]
    fn test_binary_logloss_at_zero_score() {
        let mut metric = BinaryLoglossMetric::new(1.0);
        metric.init(&metadata(&[0.0, 1.0]), 2).unwrap();
        let objective = BinaryLogloss::new(1.0).unwrap();
        let v = metric.eval(&[0.0, 0.0], Some(&objective));
        assert_relative_eq!(v[0], 2.0f64.ln());
        assert_relative_eq!(metric.eval(&[0.0, 0.0], None)[0], 2.0f64.ln());
    }

    #[test]
    fn test_binary_error() {
        let mut metric = BinaryErrorMetric::new(1.0);
        metric.init(&metadata(&[0.0, 1.0, 1.0, 0.0]), 4).unwrap();
        let v = metric.eval(&[-2.0, 3.0, -1.0, 0.5], None);
        assert_relative_eq!(v[0], 0.5);
    }

    #[test]
    fn test_multi_error_and_logloss() {
        let labels = [0.0, 1.0];
        let mut error = MultiErrorMetric::new(2);
        error.init(&metadata(&labels), 2).unwrap();
        // class-major: class 0 scores then class 1 scores
        let score = [2.0, 2.0, 0.0, 1.0];
        assert_relative_eq!(error.eval(&score, None)[0], 0.5);

        let mut objective = MulticlassSoftmax::new(2).unwrap();
        objective.init(&metadata(&labels), 2).unwrap();
        let mut logloss = MultiLoglossMetric::new(2);
        logloss.init(&metadata(&labels), 2).unwrap();
        let uniform = logloss.eval(&[0.0; 4], Some(&objective));
        assert_relative_eq!(uniform[0], 2.0f64.ln());
    }

    #[test]
    fn test_ties_count_as_errors() {
        let mut error = MultiErrorMetric::new(2);
        error.init(&metadata(&[0.0]), 1).unwrap();
        assert_relative_eq!(error.eval(&[1.0, 1.0], None)[0], 1.0);
    }
}
