//! Shared fixtures and gradient checks for loss unit tests.

use mf_layers::{Constraint, Initializer, Tensor};

use crate::base::{EmbeddingLoss, LossInput};

pub(crate) struct Fixture {
    pub users: Tensor,
    pub items: Tensor,
    pub label: Vec<f32>,
    pub weight: Vec<f32>,
    pub user_idx: Vec<i64>,
    pub item_idx: Vec<i64>,
}

impl Fixture {
    /// `batch_size` users, each with one positive and `neg_multiple` negatives.
    /// Some negative ids collide with positives so pools are uneven.
    pub fn random(batch_size: usize, neg_multiple: usize, dim: usize, seed: u64) -> Self {
        let init = Initializer::Normal { mean: 0.0, std: 0.5 };
        let num_items = batch_size * (1 + neg_multiple);
        let users = init.initialize(&[batch_size, dim], Some(seed)).unwrap();
        let items = init.initialize(&[num_items, dim], Some(seed + 1)).unwrap();
        let mut item_idx: Vec<i64> = (0..batch_size as i64).collect();
        item_idx.extend((0..(batch_size * neg_multiple) as i64).map(|k| k % (batch_size as i64 + 3)));
        Self {
            users,
            items,
            label: vec![1.0; batch_size],
            weight: (0..batch_size).map(|i| 0.5 + 0.5 * (i % 3) as f32).collect(),
            user_idx: (0..batch_size as i64).map(|i| 100 + i).collect(),
            item_idx,
        }
    }

    pub fn normalized(mut self) -> Self {
        self.users = Constraint::UnitNorm.apply(&self.users);
        self.items = Constraint::UnitNorm.apply(&self.items);
        self
    }

    pub fn input(&self) -> LossInput<'_> {
        LossInput::new(
            &self.users,
            &self.items,
            &self.label,
            &self.weight,
            &self.user_idx,
            &self.item_idx,
        )
    }

    pub fn with_weight(&self, weight: Vec<f32>) -> Self {
        Self {
            users: self.users.clone(),
            items: self.items.clone(),
            label: self.label.clone(),
            weight,
            user_idx: self.user_idx.clone(),
            item_idx: self.item_idx.clone(),
        }
    }
}

/// Compares analytic gradients with central differences of `objective`.
pub(crate) fn check_gradients_with<F>(loss: &dyn EmbeddingLoss, fixture: &Fixture, objective: F)
where
    F: Fn(&LossInput<'_>) -> f32,
{
    let output = loss.forward_backward(&fixture.input()).unwrap();
    let h = 1e-3f32;
    let tolerance = |analytic: f32| 2e-2 + 2e-2 * analytic.abs();

    for (is_user, analytic) in [(true, &output.user_grad), (false, &output.item_grad)] {
        let base = if is_user { &fixture.users } else { &fixture.items };
        for idx in 0..base.numel() {
            let mut plus = base.clone();
            plus.data_mut()[idx] += h;
            let mut minus = base.clone();
            minus.data_mut()[idx] -= h;
            let eval = |t: Tensor| {
                let (users, items) = if is_user {
                    (t, fixture.items.clone())
                } else {
                    (fixture.users.clone(), t)
                };
                let input = LossInput::new(
                    &users,
                    &items,
                    &fixture.label,
                    &fixture.weight,
                    &fixture.user_idx,
                    &fixture.item_idx,
                );
                objective(&input)
            };
            let numeric = (eval(plus) - eval(minus)) / (2.0 * h);
            let a = analytic.data()[idx];
            assert!(
                (numeric - a).abs() < tolerance(a),
                "{} {} grad[{idx}]: numeric {numeric} analytic {a}",
                loss.name(),
                if is_user { "user" } else { "item" },
            );
        }
    }
}

/// Gradient check against the loss value itself.
pub(crate) fn check_gradients(loss: &dyn EmbeddingLoss, fixture: &Fixture) {
    check_gradients_with(loss, fixture, |input| loss.forward(input).unwrap());
}
