use mobilenet_search::train::count_correct;
use mobilenet_search::vision::dataset::{augmentation, normalize, random_crop, Dataset};
use mobilenet_search::vision::Architecture;
use mobilenet_search::{HyperParams, OptimizerKind, SearchError, TrainConfig, Trainer};
use tch::nn;
use tch::{Device, Kind, Tensor};

use test_utils::*;

#[test]
fn train_and_evaluate_synthetic() {
    tch::manual_seed(42);
    let dataset = synthetic_dataset(20, 2);
    let trainer = Trainer::new(&dataset, TrainConfig::default().with_epochs(1), Device::Cpu);
    let params = HyperParams::new(1.0, 1e-3, OptimizerKind::Adam);
    let accuracy = trainer.train_and_evaluate(&params).unwrap();
    assert!((0. ..=100.).contains(&accuracy), "{accuracy}");
}

#[test]
fn train_and_evaluate_sgd_v2() {
    tch::manual_seed(42);
    let dataset = synthetic_dataset(12, 3);
    let config = TrainConfig::default().with_epochs(2).with_architecture(Architecture::V2);
    let trainer = Trainer::new(&dataset, config, Device::Cpu);
    let params = HyperParams::new(0.5, 1e-2, OptimizerKind::Sgd);
    let accuracy = trainer.train_and_evaluate(&params).unwrap();
    assert!((0. ..=100.).contains(&accuracy), "{accuracy}");
}

#[test]
fn invalid_hyperparameters_are_rejected() {
    let dataset = synthetic_dataset(4, 2);
    let trainer = Trainer::new(&dataset, TrainConfig::default(), Device::Cpu);
    let params = HyperParams::new(1.0, -1e-3, OptimizerKind::Adam);
    match trainer.train_and_evaluate(&params) {
        Err(SearchError::InvalidParameter { name, .. }) => assert_eq!(name, "learning_rate"),
        other => panic!("unexpected result {other:?}"),
    }
}

#[test]
fn evaluate_counts_argmax_hits() {
    let labels = Tensor::from_slice(&[0i64, 1, 1, 0]);
    let logits = Tensor::from_slice(&[2f32, 1., 0., 3., 5., 4., -1., 0.]).view([4, 2]);
    assert_eq!(count_correct(&logits, &labels).unwrap(), 2);

    let images = Tensor::zeros([5, 3, 32, 32], (Kind::Float, Device::Cpu));
    let labels = Tensor::from_slice(&[1i64, 1, 0, 1, 1]);
    let dataset =
        Dataset::new(images.shallow_clone(), labels.shallow_clone(), images, labels, 2).unwrap();
    let config = TrainConfig { test_batch_size: 2, ..Default::default() };
    let trainer = Trainer::new(&dataset, config, Device::Cpu);
    // Always predicts class 1.
    let model = nn::func_t(|xs, _train| {
        let ones = Tensor::ones([xs.size()[0], 1], (Kind::Float, Device::Cpu));
        Tensor::cat(&[ones.zeros_like(), ones], 1)
    });
    assert_eq!(trainer.evaluate(&model).unwrap(), 80.);
}

#[test]
fn empty_test_split_is_an_error() {
    let train = Tensor::zeros([4, 3, 32, 32], (Kind::Float, Device::Cpu));
    let test = Tensor::zeros([0, 3, 32, 32], (Kind::Float, Device::Cpu));
    let dataset = Dataset::new(
        train,
        Tensor::zeros([4], (Kind::Int64, Device::Cpu)),
        test,
        Tensor::zeros([0], (Kind::Int64, Device::Cpu)),
        2,
    )
    .unwrap();
    let trainer = Trainer::new(&dataset, TrainConfig::default(), Device::Cpu);
    let model = nn::func_t(|xs, _train| xs.flatten(1, -1).narrow(1, 0, 2));
    assert!(matches!(trainer.evaluate(&model), Err(SearchError::EmptySplit("test"))));
}

#[test]
fn dataset_rejects_mismatched_labels() {
    let images = Tensor::zeros([4, 3, 32, 32], (Kind::Float, Device::Cpu));
    let labels = Tensor::zeros([3], (Kind::Int64, Device::Cpu));
    let err = Dataset::new(images.shallow_clone(), labels.shallow_clone(), images, labels, 10);
    assert!(matches!(err, Err(SearchError::Shape(_))));
}

#[test]
fn dataset_rejects_out_of_range_labels() {
    let images = Tensor::zeros([4, 3, 32, 32], (Kind::Float, Device::Cpu));
    let labels = Tensor::from_slice(&[0i64, 1, 5, 1]);
    let err = Dataset::new(images.shallow_clone(), labels.shallow_clone(), images, labels, 2);
    assert!(matches!(err, Err(SearchError::Shape(_))));
}

#[test]
fn invalid_train_config_is_rejected() {
    let dataset = synthetic_dataset(4, 2);
    let config = TrainConfig { train_batch_size: 0, ..Default::default() };
    let trainer = Trainer::new(&dataset, config, Device::Cpu);
    let params = HyperParams::new(1.0, 1e-3, OptimizerKind::Adam);
    assert!(matches!(
        trainer.train_and_evaluate(&params),
        Err(SearchError::InvalidParameter { name: "train_batch_size", .. })
    ));
}

#[test]
fn augmentation_keeps_shape() {
    let images = Tensor::rand([6, 3, 32, 32], (Kind::Float, Device::Cpu));
    assert_eq!(augmentation(&images, 4, true).size(), [6, 3, 32, 32]);
    // Without padding the only possible crop is the image itself.
    assert_eq!(max_abs_diff(&random_crop(&images, 0), &images), 0.);
    let cropped = random_crop(&images, 4);
    assert!(f64_from(&cropped.min()) >= 0.);
    assert!(f64_from(&cropped.max()) <= 1.);
}

#[test]
fn normalization_constants() {
    let images = Tensor::ones([1, 3, 2, 2], (Kind::Float, Device::Cpu));
    let normalized = normalize(&images);
    let first = Vec::<f32>::try_from(&normalized.flatten(0, -1)).unwrap();
    assert!((first[0] - (1. - 0.4914) / 0.2023).abs() < 1e-5);
    assert!((first[4] - (1. - 0.4822) / 0.1994).abs() < 1e-5);
    assert!((first[8] - (1. - 0.4465) / 0.2010).abs() < 1e-5);
}
