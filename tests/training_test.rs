use char_lstm::training::bptt;
use char_lstm::{create_trainer, Corpus, LossSmoothing, LstmError, OptimizerKind, TrainingConfig};

fn quiet_config(hidden_size: usize, seq_len: usize) -> TrainingConfig {
    TrainingConfig {
        hidden_size,
        seq_len,
        print_every: 0,
        sample_every: 0,
        progress_every: 0,
        store_every: 0,
        ..TrainingConfig::default()
    }
}

#[test]
fn test_five_iterations_on_tiny_corpus() {
    let corpus = Corpus::from_text("aabb").unwrap();
    let mut trainer = create_trainer(&corpus, quiet_config(4, 10)).unwrap();

    let mut previous_best = f64::INFINITY;
    for _ in 0..5 {
        let metrics = trainer.train_step().unwrap();

        assert!(metrics.minibatch_loss.is_finite());
        assert!(metrics.minibatch_loss >= 0.0);
        assert!(metrics.smoothed_loss.is_finite());
        assert!(metrics.smoothed_loss >= 0.0);
        assert!(metrics.best_loss <= previous_best);
        previous_best = metrics.best_loss;
    }

    assert_eq!(trainer.iteration(), 5);
}

#[test]
fn test_training_is_deterministic() {
    let corpus = Corpus::from_text("the cat sat on the mat. the dog sat on the log.").unwrap();
    let config = quiet_config(8, 7);

    let run = || {
        let mut trainer = create_trainer(&corpus, config.clone()).unwrap();
        (0..25)
            .map(|_| trainer.train_step().unwrap().minibatch_loss)
            .collect::<Vec<f64>>()
    };

    assert_eq!(run(), run());
}

#[test]
fn test_state_carries_into_wrapped_minibatch() {
    let corpus = Corpus::from_text("abcdefghi").unwrap();
    let mut trainer = create_trainer(&corpus, quiet_config(5, 3)).unwrap();
    let k = trainer.minibatch_count();
    assert_eq!(k, 3);

    for _ in 0..k {
        trainer.train_step().unwrap();
    }

    // Minibatch k wraps to minibatch 0 and starts from the state left by minibatch k-1
    let carried = trainer.state().clone();
    assert!(carried.h.iter().any(|&x| x != 0.0));
    let cell_before = trainer.cell.clone();
    let wrapped = trainer.minibatch(k).clone();
    assert_eq!(&wrapped, trainer.minibatch(0));

    let metrics = trainer.train_step().unwrap();

    let expected = bptt(&cell_before, &wrapped, &carried).unwrap();
    assert_eq!(metrics.minibatch_loss, expected.loss / wrapped.len() as f64);
    assert_eq!(trainer.state(), &expected.final_state);

    let fresh = bptt(&cell_before, &wrapped, &cell_before.initial_state()).unwrap();
    assert_ne!(fresh.loss, expected.loss);
}

#[test]
fn test_adam_reduces_loss_on_repetitive_text() {
    let corpus = Corpus::from_text("abababababababab").unwrap();
    let config = TrainingConfig {
        learning_rate: 1e-2,
        loss_smoothing: LossSmoothing::PerMinibatch,
        ..quiet_config(8, 16)
    };
    let mut trainer = create_trainer(&corpus, config).unwrap();

    let first = trainer.train_step().unwrap().minibatch_loss;
    let mut last = first;
    for _ in 0..500 {
        last = trainer.train_step().unwrap().minibatch_loss;
    }

    assert!(last < first * 0.5, "loss went from {} to {}", first, last);
}

#[test]
fn test_gradient_descent_option() {
    let corpus = Corpus::from_text("hello hello hello").unwrap();
    let config = TrainingConfig {
        optimizer: OptimizerKind::Sgd,
        learning_rate: 0.05,
        ..quiet_config(6, 5)
    };
    let mut trainer = create_trainer(&corpus, config).unwrap();
    let before = trainer.cell.params.clone();

    for _ in 0..10 {
        let metrics = trainer.train_step().unwrap();
        assert!(metrics.minibatch_loss.is_finite());
    }

    assert_ne!(trainer.cell.params, before);
}

#[test]
fn test_sampling_does_not_disturb_training() {
    let corpus = Corpus::from_text("sampling should not change the loss curve").unwrap();

    let mut plain = create_trainer(&corpus, quiet_config(6, 8)).unwrap();
    let mut sampled = create_trainer(
        &corpus,
        TrainingConfig {
            sample_every: 2,
            sample_length: 15,
            ..quiet_config(6, 8)
        },
    )
    .unwrap();

    for _ in 0..8 {
        let a = plain.train_step().unwrap();
        let b = sampled.train_step().unwrap();
        assert_eq!(a.minibatch_loss, b.minibatch_loss);
    }
}

#[test]
fn test_non_finite_loss_aborts_step() {
    let corpus = Corpus::from_text("abcabc").unwrap();
    let mut trainer = create_trainer(&corpus, quiet_config(4, 3)).unwrap();
    trainer.cell.params.wy[[0, 0]] = f64::NAN;
    let params_before = trainer.cell.params.clone();
    let state_before = trainer.state().clone();

    let result = trainer.train_step();

    match result {
        Err(LstmError::NonFiniteLoss { iteration, loss }) => {
            assert_eq!(iteration, 1);
            assert!(loss.is_nan());
        }
        other => panic!("expected NonFiniteLoss, got {:?}", other),
    }
    assert_eq!(trainer.iteration(), 0);
    assert_eq!(trainer.state(), &state_before);
    assert_eq!(trainer.cell.params.wf, params_before.wf);
    assert_eq!(trainer.cell.params.by, params_before.by);
}

#[test]
fn test_zero_target_probability_aborts_step() {
    let corpus = Corpus::from_text("abab").unwrap();
    let mut trainer = create_trainer(&corpus, quiet_config(4, 2)).unwrap();
    let sentinel = corpus.vocab.char_to_index('.').unwrap();
    let b = corpus.vocab.char_to_index('b').unwrap();

    // Every other symbol underflows to probability zero
    trainer.cell.params.by[[0, sentinel]] = 1e4;

    let result = trainer.train_step();

    assert!(matches!(result, Err(LstmError::ZeroProbability { target }) if target == b));
    assert_eq!(trainer.iteration(), 0);
}

#[test]
fn test_failed_step_does_not_advance_minibatch() {
    let corpus = Corpus::from_text("abcdefghi").unwrap();
    let mut trainer = create_trainer(&corpus, quiet_config(4, 3)).unwrap();
    let original = trainer.cell.params.wy[[0, 0]];

    trainer.cell.params.wy[[0, 0]] = f64::NAN;
    assert!(trainer.train_step().is_err());

    trainer.cell.params.wy[[0, 0]] = original;
    let cell_before = trainer.cell.clone();
    let metrics = trainer.train_step().unwrap();

    let expected = bptt(&cell_before, trainer.minibatch(0), &cell_before.initial_state()).unwrap();
    assert_eq!(metrics.iteration, 1);
    assert_eq!(metrics.minibatch_loss, expected.loss / trainer.minibatch(0).len() as f64);
}
