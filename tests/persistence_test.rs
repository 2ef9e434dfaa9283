use char_lstm::layers::lstm_cell::PARAMETER_NAMES;
use char_lstm::persistence::{Checkpoint, CheckpointMetadata, PersistenceError};
use char_lstm::training::PROGRESS_FILE;
use char_lstm::{create_trainer, AnyOptimizer, Corpus, LSTMCell, LstmError, TrainingConfig};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::fs;
use tempfile::tempdir;

fn random_cell(vocab_size: usize, hidden_size: usize, seed: u64) -> LSTMCell {
    let mut rng = StdRng::seed_from_u64(seed);
    LSTMCell::new(vocab_size, hidden_size, &mut rng)
}

fn metadata(vocabulary: &[char]) -> CheckpointMetadata {
    CheckpointMetadata::new("test_run", 4, vocabulary, 12, Some(1.25))
}

#[test]
fn test_parameters_round_trip() {
    let dir = tempdir().unwrap();
    let checkpoint = Checkpoint::new(dir.path().join("run"));
    let cell = random_cell(5, 4, 1);

    checkpoint.save(&cell.params, &metadata(&['.', 'a', 'b', 'c', 'd'])).unwrap();
    let loaded = checkpoint.load_parameters().unwrap();

    assert_eq!(loaded, cell.params);
    for name in PARAMETER_NAMES {
        assert!(checkpoint.parameter_path(name).is_file(), "missing file for {}", name);
    }
}

#[test]
fn test_metadata_round_trip() {
    let dir = tempdir().unwrap();
    let checkpoint = Checkpoint::new(dir.path().join("run"));
    assert!(checkpoint.load_metadata().unwrap().is_none());

    let meta = metadata(&['.', 'x', 'y']);
    checkpoint.save_metadata(&meta).unwrap();

    let loaded = checkpoint.load_metadata().unwrap().unwrap();
    assert_eq!(loaded, meta);
    assert_eq!(loaded.version, env!("CARGO_PKG_VERSION"));
}

#[test]
fn test_existing_directory_is_not_an_error() {
    let dir = tempdir().unwrap();
    let run_dir = dir.path().join("run");
    fs::create_dir_all(&run_dir).unwrap();

    let checkpoint = Checkpoint::new(&run_dir);
    let first = random_cell(3, 2, 1);
    let second = random_cell(3, 2, 2);

    checkpoint.save_parameters(&first.params).unwrap();
    checkpoint.save_parameters(&second.params).unwrap();

    assert_eq!(checkpoint.load_parameters().unwrap(), second.params);
}

#[test]
fn test_missing_parameter_fails_whole_load() {
    let dir = tempdir().unwrap();
    let checkpoint = Checkpoint::new(dir.path().join("run"));
    checkpoint.save_parameters(&random_cell(3, 2, 1).params).unwrap();

    fs::remove_file(checkpoint.parameter_path("bo")).unwrap();

    match checkpoint.load_parameters() {
        Err(PersistenceError::MissingParameter { name, .. }) => assert_eq!(name, "bo"),
        Err(other) => panic!("unexpected error: {}", other),
        Ok(_) => panic!("partial checkpoint loaded"),
    }
}

#[test]
fn test_corrupt_parameter_file() {
    let dir = tempdir().unwrap();
    let checkpoint = Checkpoint::new(dir.path().join("run"));
    checkpoint.save_parameters(&random_cell(3, 2, 1).params).unwrap();

    fs::write(checkpoint.parameter_path("Wy"), b"not an array").unwrap();

    assert!(matches!(
        checkpoint.load_parameters(),
        Err(PersistenceError::SerializationError(_))
    ));
}

#[test]
fn test_trainer_writes_checkpoint_and_progress() {
    let dir = tempdir().unwrap();
    let run_dir = dir.path().join("run");
    let corpus = Corpus::from_text("abcabcabc").unwrap();
    let config = TrainingConfig {
        hidden_size: 4,
        seq_len: 3,
        iterations: 4,
        print_every: 0,
        sample_every: 0,
        progress_every: 1,
        store_every: 2,
        ..TrainingConfig::default()
    };

    let mut trainer = create_trainer(&corpus, config)
        .unwrap()
        .with_checkpoint("run", Checkpoint::new(&run_dir))
        .unwrap();
    trainer.train().unwrap();

    let progress = fs::read_to_string(run_dir.join(PROGRESS_FILE)).unwrap();
    let lines: Vec<&str> = progress.lines().collect();
    assert_eq!(lines.len(), 4);
    for (i, line) in lines.iter().enumerate() {
        let (iteration, loss) = line.split_once(',').unwrap();
        assert_eq!(iteration.parse::<usize>().unwrap(), i + 1);
        assert!(loss.parse::<f64>().unwrap().is_finite());
    }
    assert_eq!(trainer.get_metrics_history().len(), 4);

    let checkpoint = Checkpoint::new(&run_dir);
    assert_eq!(checkpoint.load_parameters().unwrap(), trainer.cell.params);
    let meta = checkpoint.load_metadata().unwrap().unwrap();
    assert_eq!(meta.iteration, 4);
    assert_eq!(meta.hidden_size, 4);
    assert_eq!(meta.vocabulary, corpus.vocab.chars());
}

#[test]
fn test_resume_restores_parameters() {
    let dir = tempdir().unwrap();
    let checkpoint = Checkpoint::new(dir.path().join("saved"));
    let corpus = Corpus::from_text("resume me").unwrap();
    let config = TrainingConfig {
        hidden_size: 5,
        print_every: 0,
        sample_every: 0,
        ..TrainingConfig::default()
    };

    let saved = random_cell(corpus.vocab.size(), 5, 99);
    checkpoint
        .save(
            &saved.params,
            &CheckpointMetadata::new("saved", 5, corpus.vocab.chars(), 30, None),
        )
        .unwrap();

    let mut trainer = create_trainer(&corpus, config).unwrap();
    assert_ne!(trainer.cell.params, saved.params);
    trainer.train_step().unwrap();

    trainer.resume_from(&checkpoint).unwrap();
    assert_eq!(trainer.cell.params, saved.params);
    assert_eq!(trainer.iteration(), 30);
    match &trainer.optimizer {
        AnyOptimizer::Adam(adam) => {
            assert_eq!(adam.step_count(), 0);
            assert!(adam.first_moment("Wy").is_none());
        }
        AnyOptimizer::Sgd(_) => panic!("default optimizer should be Adam"),
    }
}

#[test]
fn test_resume_rejects_incompatible_checkpoints() {
    let dir = tempdir().unwrap();
    let corpus = Corpus::from_text("abc").unwrap();
    let config = TrainingConfig {
        hidden_size: 4,
        print_every: 0,
        sample_every: 0,
        ..TrainingConfig::default()
    };

    // Wrong hidden width
    let wide = Checkpoint::new(dir.path().join("wide"));
    wide.save_parameters(&random_cell(corpus.vocab.size(), 6, 1).params).unwrap();
    let mut trainer = create_trainer(&corpus, config.clone()).unwrap();
    assert!(matches!(
        trainer.resume_from(&wide),
        Err(LstmError::ShapeMismatch { .. })
    ));

    // Same size, different characters
    let other = Checkpoint::new(dir.path().join("other"));
    other
        .save(
            &random_cell(4, 4, 1).params,
            &CheckpointMetadata::new("other", 4, &['.', 'a', 'b', 'd'], 1, None),
        )
        .unwrap();
    assert!(matches!(
        trainer.resume_from(&other),
        Err(LstmError::VocabularyMismatch(_))
    ));

    // Nothing there at all
    let missing = Checkpoint::new(dir.path().join("missing"));
    assert!(matches!(
        trainer.resume_from(&missing),
        Err(LstmError::Persistence(PersistenceError::MissingParameter { .. }))
    ));
}
