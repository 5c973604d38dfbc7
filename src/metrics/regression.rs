//! Pointwise regression metrics.

use crate::core::error::Result;
use crate::core::types::{DataSize, Label};
use crate::dataset::Metadata;
use crate::metrics::{Metric, PointwiseData};
use crate::objective::ObjectiveFunction;
use rayon::prelude::*;
use std::fmt::Debug;
use std::marker::PhantomData;

/// Loss of a single prediction, averaged by [`RegressionMetric`].
pub trait PointWiseLoss: Send + Sync + Debug + 'static {
    const NAME: &'static str;

    fn loss_on_point(label: Label, score: f64, huber_delta: f64, fair_c: f64) -> f64;

    fn average_loss(sum_loss: f64, sum_weights: f64) -> f64 {
        sum_loss / sum_weights
    }
}

/// Weighted mean of a pointwise loss.
#[derive(Debug)]
pub struct RegressionMetric<L: PointWiseLoss> {
    huber_delta: f64,
    fair_c: f64,
    data: PointwiseData,
    names: Vec<String>,
    _loss: PhantomData<L>,
}

impl<L: PointWiseLoss> RegressionMetric<L> {
    pub fn new() -> Self {
        Self::with_params(1.0, 1.0)
    }

    pub fn with_params(huber_delta: f64, fair_c: f64) -> Self {
        RegressionMetric {
            huber_delta,
            fair_c,
            data: PointwiseData::default(),
            names: vec![L::NAME.to_string()],
            _loss: PhantomData,
        }
    }
}

impl<L: PointWiseLoss> Default for RegressionMetric<L> {
    fn default() -> Self {
        Self::new()
    }
}

impl<L: PointWiseLoss> Metric for RegressionMetric<L> {
    fn init(&mut self, metadata: &Metadata, num_data: DataSize) -> Result<()> {
        self.data = PointwiseData::from_metadata(metadata, num_data);
        Ok(())
    }

    fn names(&self) -> &[String] {
        &self.names
    }

    fn factor_to_bigger_better(&self) -> f64 {
        -1.0
    }

    fn eval(&self, score: &[f64], objective: Option<&dyn ObjectiveFunction>) -> Vec<f64> {
        let data = &self.data;
        let sum_loss: f64 = (0..data.num_data)
            .into_par_iter()
            .map(|i| {
                let mut t = score[i];
                if let Some(objective) = objective {
                    let mut out = [0.0];
                    objective.convert_output(&score[i..=i], &mut out);
                    t = out[0];
                }
                L::loss_on_point(data.label[i], t, self.huber_delta, self.fair_c) * data.weight(i)
            })
            .sum();
        vec![L::average_loss(sum_loss, data.sum_weights)]
    }
}

#[derive(Debug)]
pub struct L2Loss;

impl PointWiseLoss for L2Loss {
    const NAME: &'static str = "l2";

    fn loss_on_point(label: Label, score: f64, _: f64, _: f64) -> f64 {
        let diff = score - f64::from(label);
        diff * diff
    }
}

#[derive(Debug)]
pub struct RmseLoss;

impl PointWiseLoss for RmseLoss {
    const NAME: &'static str = "rmse";

    fn loss_on_point(label: Label, score: f64, _: f64, _: f64) -> f64 {
        let diff = score - f64::from(label);
        diff * diff
    }

    fn average_loss(sum_loss: f64, sum_weights: f64) -> f64 {
        (sum_loss / sum_weights).sqrt()
    }
}

#[derive(Debug)]
pub struct L1Loss;

impl PointWiseLoss for L1Loss {
    const NAME: &'static str = "l1";

    fn loss_on_point(label: Label, score: f64, _: f64, _: f64) -> f64 {
        (score - f64::from(label)).abs()
    }
}

/// Quadratic below `delta`, linear above
#[derive(Debug)]
pub struct HuberLoss;

impl PointWiseLoss for HuberLoss {
    const NAME: &'static str = "huber";

    fn loss_on_point(label: Label, score: f64, delta: f64, _: f64) -> f64 {
        let diff = score - f64::from(label);
        if diff.abs() <= delta {
            0.5 * diff * diff
        } else {
            delta * (diff.abs() - 0.5 * delta)
        }
    }
}

/// `c*x - c^2*ln(1 + x/c)` of the absolute error `x`
#[derive(Debug)]
pub struct FairLoss;

impl PointWiseLoss for FairLoss {
    const NAME: &'static str = "fair";

    fn loss_on_point(label: Label, score: f64, _: f64, c: f64) -> f64 {
        let x = (score - f64::from(label)).abs();
        c * x - c * c * (1.0 + x / c).ln()
    }
}

#[derive(Debug)]
pub struct PoissonLoss;

impl PointWiseLoss for PoissonLoss {
    const NAME: &'static str = "poisson";

    fn loss_on_point(label: Label, score: f64, _: f64, _: f64) -> f64 {
        const EPS: f64 = 1e-10;
        let score = score.max(EPS);
        score - f64::from(label) * score.ln()
    }
}

pub type L2Metric = RegressionMetric<L2Loss>;
pub type RmseMetric = RegressionMetric<RmseLoss>;
pub type L1Metric = RegressionMetric<L1Loss>;
pub type HuberLossMetric = RegressionMetric<HuberLoss>;
pub type FairLossMetric = RegressionMetric<FairLoss>;
pub type PoissonMetric = RegressionMetric<PoissonLoss>;

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

    fn eval<M: Metric>(mut metric: M, labels: &[f64], score: &[f64]) -> f64 {
        metric.init(&metadata(labels), labels.len() as DataSize).unwrap();
        metric.eval(score, None)[0]
    }

    #[test]
    fn test_rmse_and_l2() {
        let rmse = eval(RmseMetric::new(), &[1.0, 2.0, 3.0], &[1.0, 2.0, 4.0]);
        assert_relative_eq!(rmse, (1.0f64 / 3.0).sqrt(), epsilon = 1e-12);
        let l2 = eval(L2Metric::new(), &[1.0, 2.0, 3.0], &[1.0, 2.0, 4.0]);
        assert_relative_eq!(l2, 1.0 / 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_huber_linear_region() {
        let huber = eval(HuberLossMetric::with_params(1.0, 1.0), &[0.0], &[3.0]);
        assert_relative_eq!(huber, 2.5);
        let quadratic = eval(HuberLossMetric::with_params(1.0, 1.0), &[0.0], &[0.5]);
        assert_relative_eq!(quadratic, 0.125);
    }

    #[test]
    fn test_fair_l1_and_poisson() {
        let fair = eval(FairLossMetric::with_params(1.0, 1.0), &[0.0], &[1.0]);
        assert_relative_eq!(fair, 1.0 - 2.0f64.ln());
        let l1 = eval(L1Metric::new(), &[1.0, 3.0], &[2.0, 1.0]);
        assert_relative_eq!(l1, 1.5);
        let poisson = eval(PoissonMetric::new(), &[1.0], &[1.0]);
        assert_relative_eq!(poisson, 1.0);
    }

    #[test]
    fn test_lower_is_better() {
        assert_eq!(L2Metric::new().factor_to_bigger_better(), -1.0);
    }
}
