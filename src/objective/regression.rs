//! Squared loss regression.

use crate::core::error::Result;
use crate::core::types::{DataSize, Label, Score};
use crate::dataset::Metadata;
use crate::objective::ObjectiveFunction;
use rayon::prelude::*;

/// `0.5 * (score - label)^2`, optionally weighted.
#[derive(Debug, Clone, Default)]
pub struct RegressionL2Loss {
    label: Vec<Label>,
    weights: Option<Vec<Label>>,
}

impl RegressionL2Loss {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ObjectiveFunction for RegressionL2Loss {
    fn init(&mut self, metadata: &Metadata, num_data: DataSize) -> Result<()> {
        self.label = metadata.label()[..num_data as usize].to_vec();
        self.weights = metadata.weights().map(<[Label]>::to_vec);
        Ok(())
    }

    fn get_gradients(&self, score: &[f64], gradients: &mut [Score], hessians: &mut [Score]) {
        let label = &self.label;
        match &self.weights {
            None => gradients
                .par_iter_mut()
                .zip(hessians.par_iter_mut())
                .enumerate()
                .for_each(|(i, (g, h))| {
                    *g = (score[i] - f64::from(label[i])) as Score;
                    *h = 1.0;
                }),
            Some(weights) => gradients
                .par_iter_mut()
                .zip(hessians.par_iter_mut())
                .enumerate()
                .for_each(|(i, (g, h))| {
                    *g = ((score[i] - f64::from(label[i])) * f64::from(weights[i])) as Score;
                    *h = weights[i];
                }),
        }
    }

    fn name(&self) -> &'static str {
        "regression"
    }

    fn convert_output(&self, input: &[f64], output: &mut [f64]) {
        output[0] = input[0];
    }

    fn to_model_string(&self) -> String {
        self.name().to_string()
    }

    fn is_constant_hessian(&self) -> bool {
        self.weights.is_none()
    }

    fn boost_from_average(&self) -> bool {
        true
    }
}
