//! Train/test splits and the image transforms applied to them.
use rand::Rng;
use tch::data::Iter2;
use tch::{Device, IndexOp, Kind, Tensor};

use crate::error::{Result, SearchError};

/// Per-channel mean of the CIFAR-10 training images.
pub const CIFAR10_MEAN: [f32; 3] = [0.4914, 0.4822, 0.4465];
/// Per-channel standard deviation of the CIFAR-10 training images.
pub const CIFAR10_STD: [f32; 3] = [0.2023, 0.1994, 0.2010];

/// Images are stored as NCHW floats in `[0, 1]`, labels as int64 class indexes.
#[derive(Debug)]
pub struct Dataset {
    pub train_images: Tensor,
    pub train_labels: Tensor,
    pub test_images: Tensor,
    pub test_labels: Tensor,
    pub labels: i64,
}

impl Dataset {
    pub fn new(
        train_images: Tensor,
        train_labels: Tensor,
        test_images: Tensor,
        test_labels: Tensor,
        labels: i64,
    ) -> Result<Dataset> {
        for (split, images, targets) in
            [("train", &train_images, &train_labels), ("test", &test_images, &test_labels)]
        {
            let size = images.size();
            if size.len() != 4 || size[1] != 3 {
                return Err(SearchError::Shape(format!(
                    "{split} images should be (n, 3, h, w), got {size:?}"
                )));
            }
            if targets.size() != [size[0]] {
                return Err(SearchError::Shape(format!(
                    "{split} labels {:?} do not match {} images",
                    targets.size(),
                    size[0]
                )));
            }
            if size[0] > 0 {
                let min = targets.min().f_int64_value(&[])?;
                let max = targets.max().f_int64_value(&[])?;
                if min < 0 || max >= labels {
                    return Err(SearchError::Shape(format!(
                        "{split} labels should be in 0..{labels}, got {min}..={max}"
                    )));
                }
            }
        }
        Ok(Dataset { train_images, train_labels, test_images, test_labels, labels })
    }

    pub fn train_size(&self) -> i64 {
        self.train_images.size()[0]
    }

    pub fn test_size(&self) -> i64 {
        self.test_images.size()[0]
    }

    /// Shuffled training batches, the last one possibly smaller.
    pub fn train_iter(&self, batch_size: i64, device: Device) -> Iter2 {
        let mut iter = Iter2::new(&self.train_images, &self.train_labels, batch_size);
        iter.shuffle().return_smaller_last_batch().to_device(device);
        iter
    }

    /// Test batches in dataset order, the last one possibly smaller.
    pub fn test_iter(&self, batch_size: i64, device: Device) -> Iter2 {
        let mut iter = Iter2::new(&self.test_images, &self.test_labels, batch_size);
        iter.return_smaller_last_batch().to_device(device);
        iter
    }
}

/// Normalizes NCHW images with the CIFAR-10 per-channel statistics.
pub fn normalize(t: &Tensor) -> Tensor {
    let device = t.device();
    let mean = Tensor::from_slice(&CIFAR10_MEAN).to_device(device).view([1, 3, 1, 1]);
    let std = Tensor::from_slice(&CIFAR10_STD).to_device(device).view([1, 3, 1, 1]);
    (t.to_kind(Kind::Float) - mean) / std
}

/// Randomly applies horizontal flips
/// This expects a 4 dimension NCHW tensor and returns a tensor with
/// an identical shape.
pub fn random_flip(t: &Tensor) -> Tensor {
    let size = t.size();
    if size.len() != 4 {
        panic!("unexpected shape for tensor {t:?}")
    }
    let output = t.zeros_like();
    for batch_index in 0..size[0] {
        let mut output_view = output.i(batch_index);
        let t_view = t.i(batch_index);
        let src = if rand::random() { t_view } else { t_view.flip([2]) };
        output_view.copy_(&src)
    }
    output
}

/// Pads the images with `pad` zeros on each side and takes random crops of
/// the original size.
/// This expects a 4 dimension NCHW tensor and returns a tensor with
/// an identical shape.
pub fn random_crop(t: &Tensor, pad: i64) -> Tensor {
    let size = t.size();
    if size.len() != 4 {
        panic!("unexpected shape for tensor {t:?}")
    }
    let (sz_h, sz_w) = (size[2], size[3]);
    let padded_size = [size[0], size[1], sz_h + 2 * pad, sz_w + 2 * pad];
    let padded = Tensor::zeros(padded_size, (t.kind(), t.device()));
    let mut center = padded.i((.., .., pad..pad + sz_h, pad..pad + sz_w));
    center.copy_(t);
    let output = t.zeros_like();
    let mut rng = rand::thread_rng();
    for bindex in 0..size[0] {
        let mut output_view = output.i(bindex);
        let start_h = rng.gen_range(0..=2 * pad);
        let start_w = rng.gen_range(0..=2 * pad);
        let src = padded.i((bindex, .., start_h..start_h + sz_h, start_w..start_w + sz_w));
        output_view.copy_(&src)
    }
    output
}

/// Training-time augmentation: random crop with zero padding, then random
/// horizontal flip.
pub fn augmentation(t: &Tensor, crop_padding: i64, flip: bool) -> Tensor {
    let mut t = t.shallow_clone();
    if crop_padding > 0 {
        t = random_crop(&t, crop_padding);
    }
    if flip {
        t = random_flip(&t);
    }
    t
}
