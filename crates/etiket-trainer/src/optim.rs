//! Optimizers over the tagger's flat parameter vector.
//!
//! Updates arrive as sparse gradients from the structured-perceptron step.
//! SGD applies them directly; Adam keeps per-parameter moment estimates so
//! its state must travel with checkpoints.

use serde::{Deserialize, Serialize};

use etiket_core::error::{EtiketError, Result};
use etiket_core::model::SparseGrad;

use crate::params::OptimizerKind;

const ADAM_BETA1: f32 = 0.9;
const ADAM_BETA2: f32 = 0.999;
const ADAM_EPS: f32 = 1e-8;

/// Optimizer state, serialized into checkpoints so resume continues the
/// exact trajectory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Optimizer {
    Sgd {
        learning_rate: f32,
    },
    Adam {
        learning_rate: f32,
        step: u64,
        m: Vec<f32>,
        v: Vec<f32>,
    },
}

impl Optimizer {
    pub fn new(kind: OptimizerKind, learning_rate: f64, param_count: usize) -> Self {
        let learning_rate = learning_rate as f32;
        match kind {
            OptimizerKind::Sgd => Optimizer::Sgd { learning_rate },
            OptimizerKind::Adam => Optimizer::Adam {
                learning_rate,
                step: 0,
                m: vec![0.0; param_count],
                v: vec![0.0; param_count],
            },
        }
    }

    pub fn learning_rate(&self) -> f32 {
        match self {
            Optimizer::Sgd { learning_rate } | Optimizer::Adam { learning_rate, .. } => {
                *learning_rate
            }
        }
    }

    /// Override the step size. Used by the learning-rate finder sweep.
    pub fn set_learning_rate(&mut self, lr: f32) {
        match self {
            Optimizer::Sgd { learning_rate } | Optimizer::Adam { learning_rate, .. } => {
                *learning_rate = lr;
            }
        }
    }

    /// Checkpoint state must match the model it is applied to.
    pub fn check_param_count(&self, param_count: usize) -> Result<()> {
        if let Optimizer::Adam { m, .. } = self {
            if m.len() != param_count {
                return Err(EtiketError::ResumeMismatch(format!(
                    "optimizer state covers {} parameters, model has {}",
                    m.len(),
                    param_count
                )));
            }
        }
        Ok(())
    }

    /// Apply one sparse gradient (ascent direction) to the parameters.
    pub fn apply(&mut self, params: &mut [f32], grad: &SparseGrad) {
        if grad.is_empty() {
            return;
        }
        match self {
            Optimizer::Sgd { learning_rate } => {
                for &(idx, magnitude) in grad {
                    params[idx] += *learning_rate * magnitude;
                }
            }
            Optimizer::Adam {
                learning_rate,
                step,
                m,
                v,
            } => {
                *step += 1;
                let t = *step as f32;
                let bias1 = 1.0 - ADAM_BETA1.powf(t);
                let bias2 = 1.0 - ADAM_BETA2.powf(t);
                for &(idx, magnitude) in grad {
                    m[idx] = ADAM_BETA1 * m[idx] + (1.0 - ADAM_BETA1) * magnitude;
                    v[idx] = ADAM_BETA2 * v[idx] + (1.0 - ADAM_BETA2) * magnitude * magnitude;
                    let m_hat = m[idx] / bias1;
                    let v_hat = v[idx] / bias2;
                    params[idx] += *learning_rate * m_hat / (v_hat.sqrt() + ADAM_EPS);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sgd_applies_scaled_updates() {
        let mut opt = Optimizer::new(OptimizerKind::Sgd, 0.5, 4);
        let mut params = vec![0.0f32; 4];
        opt.apply(&mut params, &vec![(1, 1.0), (3, -1.0)]);
        assert_eq!(params, vec![0.0, 0.5, 0.0, -0.5]);
    }

    #[test]
    fn adam_moves_in_gradient_direction() {
        let mut opt = Optimizer::new(OptimizerKind::Adam, 0.1, 2);
        let mut params = vec![0.0f32; 2];
        for _ in 0..5 {
            opt.apply(&mut params, &vec![(0, 1.0), (1, -1.0)]);
        }
        assert!(params[0] > 0.0);
        assert!(params[1] < 0.0);
    }

    #[test]
    fn empty_gradient_is_a_noop() {
        let mut opt = Optimizer::new(OptimizerKind::Adam, 0.1, 2);
        let mut params = vec![1.0f32, -1.0];
        opt.apply(&mut params, &Vec::new());
        assert_eq!(params, vec![1.0, -1.0]);
        if let Optimizer::Adam { step, .. } = opt {
            assert_eq!(step, 0);
        }
    }

    #[test]
    fn mismatched_adam_state_is_resume_mismatch() {
        let opt = Optimizer::new(OptimizerKind::Adam, 0.1, 8);
        assert!(opt.check_param_count(8).is_ok());
        assert!(matches!(
            opt.check_param_count(4),
            Err(EtiketError::ResumeMismatch(_))
        ));
    }
}
