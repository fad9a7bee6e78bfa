//! A small tabular GAN over standardized numeric columns.
//!
//! # Algorithm Overview
//!
//! 1. Every column is standardized to zero mean and unit variance ([`Standardizer`]).
//! 2. The generator maps Gaussian noise to a sample through two leaky-ReLU hidden
//!    layers and a linear output; the discriminator maps a sample to one logit.
//! 3. Each minibatch first updates the discriminator on binary cross-entropy (real = 1,
//!    generated = 0), then updates the generator on the non-saturating loss
//!    `-log D(G(z))`, backpropagating through the frozen discriminator.
//! 4. Training fails as soon as an epoch's mean loss is not finite.
//!
//! After training, [`check_moments`] compares each generated column's mean and
//! standard deviation with the real ones in standardized units.

use nalgebra::DMatrix;
use railpulse_dataset::schema::Field;
use rand::{Rng, seq::SliceRandom};
use rand_distr::{Distribution, StandardNormal};
use serde::{Deserialize, Serialize};

use crate::{
    generator::{FitFailure, Moment},
    mlp::{Activation, Mlp},
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GanParams {
    pub noise_dim: usize,
    pub hidden: usize,
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    /// Largest accepted gap between real and generated column means, in standard deviations.
    pub mean_tolerance: f64,
    /// Largest accepted gap between real and generated column standard deviations, in
    /// standard deviations.
    pub std_tolerance: f64,
    /// Below this many rows `auto` synthesis does not attempt the GAN.
    pub min_rows: usize,
}

impl Default for GanParams {
    fn default() -> Self {
        Self {
            noise_dim: 8,
            hidden: 32,
            epochs: 300,
            batch_size: 64,
            learning_rate: 1e-3,
            mean_tolerance: 0.25,
            std_tolerance: 0.35,
            min_rows: 50,
        }
    }
}

/// Per-row affine map to zero mean and unit variance. Constant rows keep a scale of 1.
#[derive(Debug, Clone, PartialEq)]
pub struct Standardizer {
    means: Vec<f64>,
    scales: Vec<f64>,
}

impl Standardizer {
    /// Fits on `data`, one field per row and one sample per column.
    #[must_use]
    pub fn fit(data: &DMatrix<f64>) -> Self {
        let (means, scales) = data
            .row_iter()
            .map(|row| {
                let std_dev = row.variance().sqrt();
                (row.mean(), if std_dev > 0.0 { std_dev } else { 1.0 })
            })
            .unzip();
        Self { means, scales }
    }

    #[must_use]
    pub fn transform(&self, data: &DMatrix<f64>) -> DMatrix<f64> {
        DMatrix::from_fn(data.nrows(), data.ncols(), |i, j| {
            (data[(i, j)] - self.means[i]) / self.scales[i]
        })
    }

    #[must_use]
    pub fn inverse(&self, data: &DMatrix<f64>) -> DMatrix<f64> {
        DMatrix::from_fn(data.nrows(), data.ncols(), |i, j| {
            data[(i, j)] * self.scales[i] + self.means[i]
        })
    }
}

/// Final losses of a successful training run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GanFit {
    pub epochs: usize,
    pub discriminator_loss: f64,
    pub generator_loss: f64,
}

#[derive(Debug, Clone)]
pub struct TabularGan {
    params: GanParams,
    generator: Mlp,
    discriminator: Mlp,
}

impl TabularGan {
    #[must_use]
    pub fn new<R>(dims: usize, params: &GanParams, rng: &mut R) -> Self
    where
        R: Rng + ?Sized,
    {
        let hidden = params.hidden;
        Self {
            params: params.clone(),
            generator: Mlp::new(
                &[params.noise_dim, hidden, hidden, dims],
                Activation::LeakyRelu,
                Activation::Linear,
                rng,
            ),
            discriminator: Mlp::new(
                &[dims, hidden, hidden, 1],
                Activation::LeakyRelu,
                Activation::Linear,
                rng,
            ),
        }
    }

    /// Trains on standardized `data` (one sample per column).
    #[expect(clippy::cast_precision_loss)]
    pub fn train<R>(&mut self, data: &DMatrix<f64>, rng: &mut R) -> Result<GanFit, FitFailure>
    where
        R: Rng + ?Sized,
    {
        let lr = self.params.learning_rate;
        let batch_size = self.params.batch_size.max(1);
        let mut order = (0..data.ncols()).collect::<Vec<_>>();
        let mut last = GanFit {
            epochs: 0,
            discriminator_loss: f64::NAN,
            generator_loss: f64::NAN,
        };

        for epoch in 0..self.params.epochs {
            order.shuffle(rng);
            let mut d_total = 0.0;
            let mut g_total = 0.0;
            let mut batches = 0_u32;
            for chunk in order.chunks(batch_size) {
                let real = data.select_columns(chunk);
                let b = chunk.len() as f64;

                // discriminator step
                let fake = self.generator.forward(&self.noise(chunk.len(), rng));
                let (real_out, real_trace) = self.discriminator.forward_traced(&real);
                let (fake_out, fake_trace) = self.discriminator.forward_traced(&fake);
                d_total += (real_out.map(|l| softplus(-l)).sum() + fake_out.map(softplus).sum()) / b;
                let (mut grads, _) = self
                    .discriminator
                    .backward(&real_trace, real_out.map(|l| (sigmoid(l) - 1.0) / b));
                let (fake_grads, _) = self
                    .discriminator
                    .backward(&fake_trace, fake_out.map(|l| sigmoid(l) / b));
                for (g, f) in grads.iter_mut().zip(fake_grads) {
                    g.weights += f.weights;
                    g.bias += f.bias;
                }
                self.discriminator.apply(&grads, lr);

                // generator step
                let (fake, g_trace) = self
                    .generator
                    .forward_traced(&self.noise(chunk.len(), rng));
                let (out, d_trace) = self.discriminator.forward_traced(&fake);
                g_total += out.map(|l| softplus(-l)).sum() / b;
                let (_, grad_fake) = self
                    .discriminator
                    .backward(&d_trace, out.map(|l| (sigmoid(l) - 1.0) / b));
                let (g_grads, _) = self.generator.backward(&g_trace, grad_fake);
                self.generator.apply(&g_grads, lr);

                batches += 1;
            }

            let d_loss = d_total / f64::from(batches);
            let g_loss = g_total / f64::from(batches);
            if !d_loss.is_finite() || !g_loss.is_finite() {
                return Err(FitFailure::NonFiniteLoss { epoch });
            }
            tracing::debug!(epoch, d_loss, g_loss, "gan epoch");
            last = GanFit {
                epochs: epoch + 1,
                discriminator_loss: d_loss,
                generator_loss: g_loss,
            };
        }
        Ok(last)
    }

    /// Draws `count` standardized samples.
    #[must_use]
    pub fn sample<R>(&self, count: usize, rng: &mut R) -> DMatrix<f64>
    where
        R: Rng + ?Sized,
    {
        self.generator.forward(&self.noise(count, rng))
    }

    fn noise<R>(&self, count: usize, rng: &mut R) -> DMatrix<f64>
    where
        R: Rng + ?Sized,
    {
        DMatrix::from_fn(self.params.noise_dim, count, |_, _| {
            StandardNormal.sample(rng)
        })
    }
}

/// Compares row means and standard deviations of `generated` with `real`, both in
/// standardized units. `fields` names the rows.
pub fn check_moments(
    real: &DMatrix<f64>,
    generated: &DMatrix<f64>,
    fields: &[Field],
    params: &GanParams,
) -> Result<(), FitFailure> {
    for ((field, real_row), generated_row) in fields.iter().zip(real.row_iter()).zip(generated.row_iter()) {
        let checks = [
            (Moment::Mean, real_row.mean(), generated_row.mean(), params.mean_tolerance),
            (
                Moment::StdDev,
                real_row.variance().sqrt(),
                generated_row.variance().sqrt(),
                params.std_tolerance,
            ),
        ];
        for (moment, expected, actual, tolerance) in checks {
            if !actual.is_finite() || (expected - actual).abs() > tolerance {
                return Err(FitFailure::MomentMismatch {
                    field: *field,
                    moment,
                    real: expected,
                    generated: actual,
                    tolerance,
                });
            }
        }
    }
    Ok(())
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// `ln(1 + e^x)` without overflow.
fn softplus(x: f64) -> f64 {
    x.max(0.0) + (-x.abs()).exp().ln_1p()
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_pcg::Pcg64;

    use super::*;

    fn gaussian(rows: usize, cols: usize, rng: &mut Pcg64) -> DMatrix<f64> {
        DMatrix::from_fn(rows, cols, |i, _| {
            let z: f64 = StandardNormal.sample(rng);
            50.0 + 10.0 * i as f64 + (i as f64 + 1.0) * z
        })
    }

    #[test]
    fn test_standardizer_inverts() {
        let mut rng = Pcg64::seed_from_u64(3);
        let mut data = gaussian(3, 40, &mut rng);
        data.row_mut(2).fill(7.0);
        let standardizer = Standardizer::fit(&data);
        let z = standardizer.transform(&data);
        assert!(z.row(0).mean().abs() < 1e-9);
        assert!((z.row(1).variance() - 1.0).abs() < 1e-9);
        assert!(z.row(2).iter().all(|v| *v == 0.0));
        let back = standardizer.inverse(&z);
        assert!((back - data).abs().max() < 1e-9);
    }

    #[test]
    fn test_softplus_is_stable() {
        assert!((softplus(0.0) - 2.0_f64.ln()).abs() < 1e-12);
        assert_eq!(softplus(1000.0), 1000.0);
        assert!(softplus(-1000.0) >= 0.0 && softplus(-1000.0) < 1e-300);
        assert!((sigmoid(0.0) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_training_reports_finite_losses() {
        let mut rng = Pcg64::seed_from_u64(4);
        let data = gaussian(2, 128, &mut rng);
        let z = Standardizer::fit(&data).transform(&data);
        let params = GanParams {
            epochs: 20,
            batch_size: 32,
            ..GanParams::default()
        };
        let mut gan = TabularGan::new(2, &params, &mut rng);
        let fit = gan.train(&z, &mut rng).unwrap();
        assert_eq!(fit.epochs, 20);
        assert!(fit.discriminator_loss.is_finite() && fit.generator_loss.is_finite());
        let samples = gan.sample(10, &mut rng);
        assert_eq!(samples.shape(), (2, 10));
        assert!(samples.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_moment_check_names_the_field() {
        let mut rng = Pcg64::seed_from_u64(5);
        let real = Standardizer::fit(&gaussian(2, 200, &mut rng)).transform(&gaussian(2, 200, &mut rng));
        let fields = [Field::PunctualityPct, Field::CancellationPct];
        let params = GanParams::default();
        assert!(check_moments(&real, &real, &fields, &params).is_ok());

        let mut shifted = real.clone();
        shifted.row_mut(1).iter_mut().for_each(|v| *v += 1.0);
        let err = check_moments(&real, &shifted, &fields, &params).unwrap_err();
        assert!(matches!(
            err,
            FitFailure::MomentMismatch { field: Field::CancellationPct, moment: Moment::Mean, .. }
        ));
    }
}
