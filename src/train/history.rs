use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EpochLosses {
    pub train: f64,
    pub eval: f64,
    /// Mean codebook perplexity over the evaluation batches.
    pub perplexity: f64,
}

/// Append-only record of per-epoch mean losses.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LossHistory {
    epochs: Vec<EpochLosses>,
    #[serde(skip)]
    train: Vec<f64>,
}

impl LossHistory {
    pub fn push(&mut self, losses: EpochLosses) {
        self.train.push(losses.train);
        self.epochs.push(losses);
    }

    pub fn epochs(&self) -> &[EpochLosses] {
        &self.epochs
    }

    pub fn train_losses(&self) -> &[f64] {
        &self.train
    }

    pub fn eval_losses(&self) -> Vec<f64> {
        self.epochs.iter().map(|epoch| epoch.eval).collect()
    }

    pub fn last(&self) -> Option<&EpochLosses> {
        self.epochs.last()
    }

    pub fn len(&self) -> usize {
        self.epochs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.epochs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn train_losses_follow_pushes() {
        let mut history = LossHistory::default();
        history.push(EpochLosses {
            train: 3.0,
            eval: 4.0,
            perplexity: 2.0,
        });
        history.push(EpochLosses {
            train: 2.0,
            eval: 3.5,
            perplexity: 2.5,
        });

        assert_eq!(history.train_losses(), &[3.0, 2.0]);
        assert_eq!(history.eval_losses(), vec![4.0, 3.5]);
        assert_eq!(history.last().map(|epoch| epoch.eval), Some(3.5));
    }
}
