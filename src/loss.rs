//! Loss functions

use crate::values::Value;

/// Mean Squared Error Loss between two vectors of values
pub struct MSELoss;

impl MSELoss {
    pub fn call<T, U>(y_pred: &[T], y_true: &[U]) -> Value
    where
        T: AsRef<Value>,
        U: AsRef<Value>,
    {
        let loss = y_pred
            .iter()
            .zip(y_true.iter())
            .map(|(a, b)| (a.as_ref() - b.as_ref()).pow(&Value::new(2.0)))
            .sum::<Value>();
        loss / Value::new(y_pred.len() as f32)
    }
}

/// Negative log-likelihood of a one-hot target under log-probabilities,
/// the analogue of torch.nn.NLLLoss. Expects the inputs to already be
/// log-normalized, e.g. by a `LogSoftmax` stage.
pub struct NLLLoss;

impl NLLLoss {
    pub fn call<T, U>(log_probs: &[T], y_true: &[U]) -> Value
    where
        T: AsRef<Value>,
        U: AsRef<Value>,
    {
        let log_likelihood = log_probs
            .iter()
            .zip(y_true.iter())
            .map(|(p, t)| p.as_ref() * t.as_ref())
            .sum::<Value>();
        -&log_likelihood
    }
}

/// Cross-entropy between raw logits and a one-hot target, fusing log-softmax
/// and negative log-likelihood the way torch.nn.CrossEntropyLoss does
pub struct CrossEntropyLoss;

impl CrossEntropyLoss {
    pub fn call<T, U>(logits: &[T], y_true: &[U]) -> Value
    where
        T: AsRef<Value>,
        U: AsRef<Value>,
    {
        // shift by the row maximum so the exponentials cannot overflow; the
        // shift is constant with respect to the graph and softmax is shift
        // invariant, so gradients are unchanged
        let max = logits
            .iter()
            .map(|v| v.as_ref().data())
            .fold(f32::NEG_INFINITY, f32::max);
        let max = Value::new(max);
        let shifted: Vec<Value> = logits.iter().map(|v| v.as_ref() - &max).collect();
        let log_sum = shifted.iter().map(|v| v.exp()).sum::<Value>().ln();
        let target_score = shifted
            .iter()
            .zip(y_true.iter())
            .map(|(s, t)| s * t.as_ref())
            .sum::<Value>();
        &log_sum - &target_score
    }
}

#[cfg(test)]
mod tests {
    use crate::assert_eq_float;
    use crate::nn::{LogSoftmax, Module};

    use super::*;

    #[test]
    fn test_mse_loss() {
        let y_pred = vec![Value::new(2.0), Value::new(3.0)];
        let y_true = vec![Value::new(1.0), Value::new(5.0)];
        let loss = MSELoss::call(&y_pred, &y_true);
        assert_eq!(loss.data(), 2.5);

        loss.backward();
        // dloss / dy_pred = 1/N * 2 * (y_pred - y_true)
        // dloss / dy_true = -1/N * 2 * (y_pred - y_true)
        assert_eq!(y_pred[0].grad(), 1.0);
        assert_eq!(y_pred[1].grad(), -2.0);
        assert_eq!(y_true[0].grad(), -1.0);
        assert_eq!(y_true[1].grad(), 2.0);
    }

    #[test]
    fn test_nll_loss() {
        let log_probs = vec![Value::new(0.25f32.ln()), Value::new(0.75f32.ln())];
        let y_true = vec![Value::new(0.0), Value::new(1.0)];
        let loss = NLLLoss::call(&log_probs, &y_true);
        assert_eq_float!(loss.data(), -(0.75f32.ln()));

        loss.backward();
        // dloss / dlogp_i = -t_i
        assert_eq_float!(log_probs[0].grad(), 0.0);
        assert_eq_float!(log_probs[1].grad(), -1.0);
    }

    #[test]
    fn test_cross_entropy_loss() {
        let logits = vec![Value::new(1.0), Value::new(2.0)];
        let y_true = vec![Value::new(0.0), Value::new(1.0)];
        let loss = CrossEntropyLoss::call(&logits, &y_true);
        // -ln(softmax(2)) = ln(e^1 + e^2) - 2
        assert_eq_float!(loss.data(), 0.3132617);

        loss.backward();
        // dloss / dz_i = softmax(z)_i - t_i
        assert_eq_float!(logits[0].grad(), 0.2689414);
        assert_eq_float!(logits[1].grad(), -0.2689414);
    }

    #[test]
    fn test_cross_entropy_matches_log_softmax_nll() {
        let logits = vec![Value::new(-0.5), Value::new(1.5), Value::new(0.25)];
        let y_true = vec![Value::new(1.0), Value::new(0.0), Value::new(0.0)];

        let fused = CrossEntropyLoss::call(&logits, &y_true);
        let log_probs = LogSoftmax::new().forward(&logits).unwrap();
        let staged = NLLLoss::call(&log_probs, &y_true);

        assert_eq_float!(fused.data(), staged.data());
    }

    #[test]
    fn test_cross_entropy_large_logits() {
        // naive exp would overflow f32 here
        let logits = vec![Value::new(1000.0), Value::new(1001.0)];
        let y_true = vec![Value::new(1.0), Value::new(0.0)];
        let loss = CrossEntropyLoss::call(&logits, &y_true);
        assert!(loss.data().is_finite());
        // -ln(softmax(1000)) = ln(1 + e) since the scores differ by 1
        assert_eq_float!(loss.data(), (1.0 + 1.0f32.exp()).ln());
    }
}
