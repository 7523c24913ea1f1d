use std::io::Write;

use mf_data::{Batch, JsonlBatchReader};
use mf_layers::{EmbeddingBagConfig, HashEmbeddingTable, Initializer};
use mf_training::{
    LossRecorder, MatrixFactorization, MatrixFactorizationConfig, MatrixFactorizationTask, Phase,
};

const BATCH: &str = r#"{"user_idx":[0,1],"item_idx":[0,1],"user_feature_hashes":[[0],[1]],"user_feature_weights":[[1.0],[1.0]],"item_feature_hashes":[[0],[1]],"label":[1.0,1.0],"weight":[1.0,1.0]}"#;

fn identity_task() -> MatrixFactorizationTask {
    let config = MatrixFactorizationConfig::default()
        .with_num_embeddings(2)
        .with_embedding_dim(2);
    let table = HashEmbeddingTable::with_initializer(2, 2, &Initializer::Identity, None).unwrap();
    let pooler = EmbeddingBagConfig::new().with_normalize(true).build().unwrap();
    let model = MatrixFactorization::from_parts(table, pooler).unwrap();
    MatrixFactorizationTask::with_model(config, model).unwrap()
}

#[test]
fn identity_table_scores_and_aligns() {
    let task = identity_task();
    let batch = Batch::from_json(BATCH).unwrap();
    let scores = task.score(&batch).unwrap();
    assert_eq!(scores, vec![1.0, 1.0]);

    let losses = task.compute_losses(&batch, Phase::Train).unwrap();
    assert_eq!(losses.len(), 9);
    assert_eq!(losses["train/AlignmentLoss"], 0.0);
}

#[test]
fn epoch_over_jsonl_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    for _ in 0..3 {
        writeln!(file, "{BATCH}").unwrap();
    }
    file.flush().unwrap();

    let config = MatrixFactorizationConfig::default()
        .with_num_embeddings(5)
        .with_embedding_dim(3)
        .with_seed(Some(3))
        .with_train_loss("InformationNoiseContrastiveEstimationLoss");
    let mut task = MatrixFactorizationTask::new(config).unwrap();
    let mut recorder = LossRecorder::new();
    for batch in JsonlBatchReader::open(file.path()).unwrap() {
        let out = task.training_step(&batch.unwrap()).unwrap();
        recorder.record(&out.losses);
    }
    assert_eq!(task.global_step(), 3);
    assert_eq!(recorder.steps(), 3);
    assert_eq!(recorder.averages().len(), 9);

    for batch in JsonlBatchReader::open(file.path()).unwrap() {
        task.validation_step(&batch.unwrap()).unwrap();
    }
    let metrics = task.finish_epoch(Phase::Val);
    assert_eq!(metrics.len(), 6);
    assert!(metrics.values().all(|v| (0.0..=1.0).contains(v)));
}

#[test]
fn misspelled_info_nce_name_is_accepted() {
    let config = MatrixFactorizationConfig::default()
        .with_num_embeddings(5)
        .with_embedding_dim(2)
        .with_train_loss("InfomationNoiseContrastiveEstimationLoss");
    let task = MatrixFactorizationTask::new(config).unwrap();
    assert_eq!(
        task.train_loss().name(),
        "InformationNoiseContrastiveEstimationLoss"
    );
}
