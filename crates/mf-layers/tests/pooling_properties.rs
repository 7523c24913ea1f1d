//! Invariants of embedding-bag pooling and scoring.

use mf_layers::prelude::*;
use mf_layers::tensor::l2_norm;
use proptest::prelude::*;

const NUM_BUCKETS: usize = 33;
const DIM: usize = 4;

fn bag_strategy() -> impl Strategy<Value = (Vec<i64>, Vec<f32>)> {
    (1usize..6).prop_flat_map(|num_features| {
        (
            prop::collection::vec(0i64..NUM_BUCKETS as i64, num_features),
            prop::collection::vec(-3.0f32..3.0, num_features),
        )
    })
}

proptest! {
    /// Pooled norms never exceed the configured bound.
    #[test]
    fn max_norm_bounds_pooled_embeddings(
        seed in any::<u64>(),
        max_norm in 0.05f32..5.0,
        (hashes, weights) in bag_strategy(),
    ) {
        let table = HashEmbeddingTable::with_initializer(NUM_BUCKETS, DIM, &Initializer::default(), Some(seed)).unwrap();
        let bag = FeatureBag::new(1, hashes.len(), hashes, Some(weights)).unwrap();
        let pooler = EmbeddingBagConfig::new().with_max_norm(Some(max_norm)).build().unwrap();
        let embed = pooler.pool(&table, &bag).unwrap();
        prop_assert!(l2_norm(embed.row(0)) <= max_norm + 1e-4);
    }

    /// Normalized embeddings lie on the unit sphere unless the pooled sum is zero.
    #[test]
    fn normalization_projects_onto_unit_sphere(
        seed in any::<u64>(),
        (hashes, weights) in bag_strategy(),
    ) {
        let table = HashEmbeddingTable::with_initializer(NUM_BUCKETS, DIM, &Initializer::default(), Some(seed)).unwrap();
        let bag = FeatureBag::new(1, hashes.len(), hashes, Some(weights)).unwrap();
        let raw = EmbeddingBag::new(EmbeddingBagConfig::new()).unwrap().pool(&table, &bag).unwrap();
        let normalized = EmbeddingBagConfig::new()
            .with_max_norm(Some(2.0))
            .with_normalize(true)
            .build()
            .unwrap()
            .pool(&table, &bag)
            .unwrap();
        prop_assert!(normalized.is_finite());
        if l2_norm(raw.row(0)) > 1e-3 {
            prop_assert!((l2_norm(normalized.row(0)) - 1.0).abs() < 1e-4);
        }
    }

    /// A single feature pools to its weighted table row.
    #[test]
    fn single_feature_pooling_is_linear(
        seed in any::<u64>(),
        hash in 0i64..NUM_BUCKETS as i64,
        weight in -5.0f32..5.0,
    ) {
        let table = HashEmbeddingTable::with_initializer(NUM_BUCKETS, DIM, &Initializer::default(), Some(seed)).unwrap();
        let bag = FeatureBag::new(1, 1, vec![hash], Some(vec![weight])).unwrap();
        let embed = EmbeddingBag::new(EmbeddingBagConfig::new()).unwrap().pool(&table, &bag).unwrap();
        let row = table.get(hash).unwrap();
        for (a, b) in embed.row(0).iter().zip(row) {
            prop_assert!((a - weight * b).abs() < 1e-5);
        }
    }
}

#[test]
fn identity_table_scores_matching_pairs_as_one() {
    let table = HashEmbeddingTable::with_initializer(2, 2, &Initializer::Identity, None).unwrap();
    let pooler = EmbeddingBagConfig::new().with_normalize(true).build().unwrap();
    let weights = vec![vec![1.0], vec![1.0]];
    let users = FeatureBag::from_rows(&[vec![0], vec![1]], Some(&weights)).unwrap();
    let items = users.clone();

    let user_embed = pooler.pool(&table, &users).unwrap();
    let item_embed = pooler.pool(&table, &items).unwrap();
    let scores = DotScorer::new().score(&user_embed, &item_embed).unwrap();
    assert_eq!(scores.data(), &[1.0, 1.0]);
}

#[test]
fn pooling_does_not_mutate_table() {
    let table = HashEmbeddingTable::with_initializer(9, 3, &Initializer::default(), Some(11)).unwrap();
    let before = table.clone();
    let bag = FeatureBag::from_rows(&[vec![1, 2, 3]], None).unwrap();
    let pooler = EmbeddingBagConfig::new().with_normalize(true).build().unwrap();
    let pooled = pooler.pool_train(&table, &bag).unwrap();
    let _ = pooler.backward(&table, &pooled.tape, &Tensor::ones(&[1, 3])).unwrap();
    assert_eq!(table, before);
}

#[test]
fn table_round_trips_through_json() {
    let table = HashEmbeddingTable::with_initializer(5, 2, &Initializer::Constant(0.5), None).unwrap();
    let json = serde_json::to_string(&table).unwrap();
    let restored: HashEmbeddingTable = serde_json::from_str(&json).unwrap();
    assert_eq!(table, restored);
}
