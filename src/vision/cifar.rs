//! The CIFAR-10 dataset.
//!
//! The files can be downloaded from the following page:
//! <https://www.cs.toronto.edu/~kriz/cifar.html>
//! The binary version of the dataset is used, images are returned as floats
//! in `[0, 1]` and are not normalized.
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use tch::{IndexOp, Kind, Tensor};
use tracing::debug;

use super::dataset::Dataset;
use crate::error::Result;

pub const W: i64 = 32;
pub const H: i64 = 32;
pub const C: i64 = 3;
pub const N_CLASSES: i64 = 10;
/// A record is the label byte followed by the CHW pixel bytes.
const BYTES_PER_IMAGE: i64 = W * H * C + 1;

const TRAIN_FILES: [&str; 5] = [
    "data_batch_1.bin",
    "data_batch_2.bin",
    "data_batch_3.bin",
    "data_batch_4.bin",
    "data_batch_5.bin",
];
const TEST_FILE: &str = "test_batch.bin";

fn read_file_(filename: &Path) -> Result<(Tensor, Tensor)> {
    let mut data = Vec::new();
    BufReader::new(File::open(filename)?).read_to_end(&mut data)?;
    let len = data.len() as i64;
    if len == 0 || len % BYTES_PER_IMAGE != 0 {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("{len} bytes is not a whole number of {BYTES_PER_IMAGE} byte records"),
        )
        .into());
    }
    let samples = len / BYTES_PER_IMAGE;
    let content = Tensor::from_slice(&data).view((samples, BYTES_PER_IMAGE));
    let labels = content.i((.., 0)).to_kind(Kind::Int64);
    let images = content.i((.., 1..)).reshape([samples, C, H, W]).to_kind(Kind::Float);
    Ok((images / 255.0, labels))
}

fn read_file(filename: &Path) -> Result<(Tensor, Tensor)> {
    debug!(file = %filename.display(), "reading cifar-10 batch");
    read_file_(filename).map_err(|err| err.path_context(&format!("{filename:?}")))
}

/// Loads the training and test splits from `dir`.
pub fn load_dir<T: AsRef<Path>>(dir: T) -> Result<Dataset> {
    let dir = dir.as_ref();
    let (test_images, test_labels) = read_file(&dir.join(TEST_FILE))?;
    let (train_images, train_labels): (Vec<_>, Vec<_>) = TRAIN_FILES
        .iter()
        .map(|x| read_file(&dir.join(x)))
        .collect::<Result<Vec<_>>>()?
        .into_iter()
        .unzip();
    Dataset::new(
        Tensor::cat(&train_images, 0),
        Tensor::cat(&train_labels, 0),
        test_images,
        test_labels,
        N_CLASSES,
    )
}
