//! Family-wide invariants of the loss functions.

use mf_layers::{Constraint, Tensor};
use mf_loss::prelude::*;
use proptest::prelude::*;

fn embeddings(rows: usize, dim: usize) -> impl Strategy<Value = Tensor> {
    prop::collection::vec(-2.0f32..2.0, rows * dim)
        .prop_map(move |data| Tensor::from_data(&[rows, dim], data))
}

fn batch() -> impl Strategy<Value = (Tensor, Tensor, Vec<f32>, Vec<i64>)> {
    (1usize..5, 0usize..3, 1usize..4).prop_flat_map(|(batch_size, neg_multiple, dim)| {
        let num_items = batch_size * (1 + neg_multiple);
        (
            embeddings(batch_size, dim),
            embeddings(num_items, dim),
            prop::collection::vec(0.0f32..3.0, batch_size),
            prop::collection::vec(0i64..6, num_items),
        )
    })
}

proptest! {
    /// Every loss is finite and non-negative, with or without normalization
    /// and hard negatives.
    #[test]
    fn losses_are_non_negative(
        (users, items, weight, item_idx) in batch(),
        normalize in any::<bool>(),
        ratio in prop::option::of(0.1f32..1.0),
    ) {
        let (users, items) = if normalize {
            (Constraint::UnitNorm.apply(&users), Constraint::UnitNorm.apply(&items))
        } else {
            (users, items)
        };
        let batch_size = users.rows();
        let label = vec![1.0; batch_size];
        let user_idx: Vec<i64> = (0..batch_size as i64).collect();
        let input = LossInput::new(&users, &items, &label, &weight, &user_idx, &item_idx);

        let family = LossFamily::new(LossConfig::default().with_hard_negatives_ratio(ratio)).unwrap();
        for (name, value) in family.compute_all(&input, "train").unwrap() {
            prop_assert!(value.is_finite(), "{} is not finite: {}", name, value);
            prop_assert!(value >= 0.0, "{} is negative: {}", name, value);
        }
    }
}

#[test]
fn batch_without_negatives_yields_all_losses() {
    let users = Tensor::from_data(&[3, 2], vec![0.6, 0.8, 1.0, 0.0, 0.0, 1.0]);
    let items = Tensor::from_data(&[3, 2], vec![0.0, 1.0, 0.6, 0.8, 1.0, 0.0]);
    let input = LossInput::new(&users, &items, &[1.0; 3], &[1.0; 3], &[0, 1, 2], &[5, 6, 7]);
    let family = LossFamily::new(LossConfig::default()).unwrap();
    let losses = family.compute_all(&input, "val").unwrap();
    assert_eq!(losses.len(), 9);
    for kind in LossKind::ALL {
        assert!(losses.contains_key(&format!("val/{}", kind.name())));
    }
}

#[test]
fn zero_weights_and_zero_embeddings_are_safe() {
    let users = Tensor::zeros(&[2, 3]);
    let items = Tensor::zeros(&[4, 3]);
    let input = LossInput::new(&users, &items, &[0.0, 1.0], &[0.0, 0.0], &[0, 1], &[0, 1, 2, 3]);
    let family = LossFamily::new(LossConfig::default()).unwrap();
    for (kind, loss) in family.iter() {
        let out = loss.forward_backward(&input).unwrap();
        assert!(out.value.is_finite(), "{kind}");
        assert!(out.user_grad.is_finite() && out.item_grad.is_finite(), "{kind}");
    }
}

#[test]
fn doubling_weights_leaves_mean_losses_unchanged() {
    let users = Tensor::from_data(&[2, 2], vec![0.6, 0.8, 0.8, -0.6]);
    let items = Tensor::from_data(&[4, 2], vec![1.0, 0.0, 0.0, 1.0, 0.6, -0.8, -1.0, 0.0]);
    let family = LossFamily::new(LossConfig::default()).unwrap();
    let single = family
        .compute_all(
            &LossInput::new(&users, &items, &[1.0; 2], &[1.0, 3.0], &[0, 1], &[0, 1, 2, 3]),
            "train",
        )
        .unwrap();
    let doubled = family
        .compute_all(
            &LossInput::new(&users, &items, &[1.0; 2], &[2.0, 6.0], &[0, 1], &[0, 1, 2, 3]),
            "train",
        )
        .unwrap();
    for (key, value) in &single {
        assert!((value - doubled[key]).abs() < 1e-5, "{key}");
    }
}

#[test]
fn doubling_weights_doubles_sum_losses() {
    let users = Tensor::from_data(&[2, 2], vec![0.6, 0.8, 0.8, -0.6]);
    let items = Tensor::from_data(&[4, 2], vec![1.0, 0.0, 0.0, 1.0, 0.6, -0.8, -1.0, 0.0]);
    let config = LossConfig::default().with_reduction(Reduction::Sum);
    let per_example = [
        LossKind::Alignment,
        LossKind::Contrastive,
        LossKind::InformationNoiseContrastiveEstimation,
        LossKind::PairwiseHinge,
        LossKind::PairwiseLogistic,
    ];
    for kind in per_example {
        let loss = kind.build(&config);
        let single = loss
            .forward(&LossInput::new(&users, &items, &[1.0; 2], &[1.0, 3.0], &[0, 1], &[0, 1, 2, 3]))
            .unwrap();
        let doubled = loss
            .forward(&LossInput::new(&users, &items, &[1.0; 2], &[2.0, 6.0], &[0, 1], &[0, 1, 2, 3]))
            .unwrap();
        assert!((doubled - 2.0 * single).abs() < 1e-4, "{kind}");
    }
}

#[test]
fn alignment_is_zero_for_identical_unit_pairs() {
    let embed = Tensor::from_data(&[2, 2], vec![1.0, 0.0, 0.0, 1.0]);
    let input = LossInput::new(&embed, &embed, &[1.0, 1.0], &[1.0, 1.0], &[0, 1], &[0, 1]);
    let loss = LossKind::Alignment.build(&LossConfig::default());
    assert_eq!(loss.forward(&input).unwrap(), 0.0);
}
