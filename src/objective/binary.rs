//! Binary log loss.

use crate::core::error::{LightGBMError, Result};
use crate::core::meta::K_EPSILON;
use crate::core::types::{DataSize, Label, Score};
use crate::dataset::Metadata;
use crate::objective::ObjectiveFunction;
use log::warn;
use rayon::prelude::*;

/// Logistic loss with a configurable sigmoid slope.
///
/// Labels are reduced to -1/+1. By default a label is positive when it is
/// greater than zero; the one-vs-all objective instead marks rows whose
/// integer label equals a given class.
#[derive(Debug, Clone)]
pub struct BinaryLogloss {
    sigmoid: f64,
    positive_class: Option<i32>,
    /// -1 or +1 per row
    label: Vec<i8>,
    weights: Option<Vec<Label>>,
    need_train: bool,
    default_output: f64,
}

impl BinaryLogloss {
    pub fn new(sigmoid: f64) -> Result<Self> {
        if sigmoid <= 0.0 {
            return Err(LightGBMError::invalid_parameter(
                "sigmoid",
                sigmoid.to_string(),
                "sigmoid parameter should be greater than zero",
            ));
        }
        Ok(BinaryLogloss {
            sigmoid,
            positive_class: None,
            label: Vec::new(),
            weights: None,
            need_train: true,
            default_output: 0.0,
        })
    }

    /// Loss of class `class_id` against every other class
    pub fn one_vs_rest(sigmoid: f64, class_id: i32) -> Result<Self> {
        let mut loss = Self::new(sigmoid)?;
        loss.positive_class = Some(class_id);
        Ok(loss)
    }

    #[inline]
    fn is_positive(&self, label: Label) -> bool {
        match self.positive_class {
            Some(k) => label as i32 == k,
            None => label > 0.0,
        }
    }

    /// Raw score whose sigmoid is `p`
    fn raw_of_probability(&self, p: f64) -> f64 {
        let p = p.clamp(K_EPSILON, 1.0 - K_EPSILON);
        (p / (1.0 - p)).ln() / self.sigmoid
    }

    #[inline]
    fn response(&self, label: f64, score: f64) -> (f64, f64) {
        let response = -label * self.sigmoid / (1.0 + (label * self.sigmoid * score).exp());
        let abs_response = response.abs();
        (response, abs_response * (self.sigmoid - abs_response))
    }
}

impl ObjectiveFunction for BinaryLogloss {
    fn init(&mut self, metadata: &Metadata, num_data: DataSize) -> Result<()> {
        let labels = &metadata.label()[..num_data as usize];
        self.label = labels
            .iter()
            .map(|&l| if self.is_positive(l) { 1 } else { -1 })
            .collect();
        self.weights = metadata.weights().map(<[Label]>::to_vec);
        let cnt_positive = self.label.iter().filter(|&&l| l > 0).count();
        let cnt_negative = self.label.len() - cnt_positive;
        log::info!("Number of positive: {}, number of negative: {}", cnt_positive, cnt_negative);
        self.need_train = cnt_positive > 0 && cnt_negative > 0;
        if !self.need_train {
            warn!("Contains only one class");
            self.default_output = if cnt_positive > 0 {
                self.raw_of_probability(1.0)
            } else {
                self.raw_of_probability(0.0)
            };
        }
        Ok(())
    }

    fn get_gradients(&self, score: &[f64], gradients: &mut [Score], hessians: &mut [Score]) {
        if !self.need_train {
            return;
        }
        let label = &self.label;
        gradients
            .par_iter_mut()
            .zip(hessians.par_iter_mut())
            .enumerate()
            .for_each(|(i, (g, h))| {
                let (grad, hess) = self.response(f64::from(label[i]), score[i]);
                let w = self.weights.as_ref().map_or(1.0, |w| f64::from(w[i]));
                *g = (grad * w) as Score;
                *h = (hess * w) as Score;
            });
    }

    fn name(&self) -> &'static str {
        "binary"
    }

    fn convert_output(&self, input: &[f64], output: &mut [f64]) {
        output[0] = 1.0 / (1.0 + (-self.sigmoid * input[0]).exp());
    }

    fn to_model_string(&self) -> String {
        format!("{} sigmoid:{}", self.name(), self.sigmoid)
    }

    fn need_accurate_prediction(&self) -> bool {
        false
    }

    fn class_need_train(&self, _class_id: usize) -> bool {
        self.need_train
    }

    fn class_default_output(&self, _class_id: usize) -> f64 {
        self.default_output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
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
    fn test_gradients_at_zero_score() {
        let mut objective = BinaryLogloss::new(1.0).unwrap();
        objective.init(&metadata(&[0.0, 1.0]), 2).unwrap();
        let mut g = vec![0.0; 2];
        let mut h = vec![0.0; 2];
        objective.get_gradients(&[0.0, 0.0], &mut g, &mut h);
        assert_relative_eq!(g[0], 0.5);
        assert_relative_eq!(g[1], -0.5);
        assert_relative_eq!(h[0], 0.25);
        assert_relative_eq!(h[1], 0.25);
    }

    #[test]
    fn test_convert_output_is_sigmoid() {
        let objective = BinaryLogloss::new(2.0).unwrap();
        let mut out = [0.0];
        objective.convert_output(&[0.0], &mut out);
        assert_relative_eq!(out[0], 0.5);
        objective.convert_output(&[1.0], &mut out);
        assert_relative_eq!(out[0], 1.0 / (1.0 + (-2.0f64).exp()));
    }

    #[test]
    fn test_single_class_is_not_trained() {
        let mut objective = BinaryLogloss::new(1.0).unwrap();
        objective.init(&metadata(&[1.0, 1.0, 1.0]), 3).unwrap();
        assert!(!objective.class_need_train(0));
        assert!(objective.class_default_output(0) > 30.0);
    }

    #[test]
    fn test_rejects_non_positive_sigmoid() {
        assert!(BinaryLogloss::new(0.0).is_err());
    }
}
