//! MNIST handwritten digit dataset stored in the IDX binary format
//!
//! The dataset ships as four files, all values big-endian:
//!   images: magic(2051) | count(u32) | rows(u32) | cols(u32) | pixels(u8...)
//!   labels: magic(2049) | count(u32) | labels(u8...)

use std::{
    fs,
    path::{Path, PathBuf},
};

use thiserror::Error;

const IMAGE_MAGIC: u32 = 2051;
const LABEL_MAGIC: u32 = 2049;

/// Number of digit classes
pub const N_CLASSES: usize = 10;

/// Errors for MNIST loading
#[derive(Debug, Error)]
pub enum MnistError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Dataset file not found: {0} (the uncompressed IDX files are expected)")]
    MissingFile(PathBuf),
    #[error("Bad IDX magic: expected {expected}, got {got}")]
    BadMagic { expected: u32, got: u32 },
    #[error("IDX payload truncated: expected {expected} bytes, got {got}")]
    Truncated { expected: usize, got: usize },
    #[error("Count mismatch: {images} images but {labels} labels")]
    CountMismatch { images: usize, labels: usize },
    #[error("Label {0} outside the digit range 0-9")]
    LabelOutOfRange(u8),
}

/// Which split of the dataset to load
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Split {
    Train,
    Test,
}

impl Split {
    fn file_names(&self) -> (&'static str, &'static str) {
        match self {
            Split::Train => ("train-images-idx3-ubyte", "train-labels-idx1-ubyte"),
            Split::Test => ("t10k-images-idx3-ubyte", "t10k-labels-idx1-ubyte"),
        }
    }
}

/// An MNIST split held entirely in memory, one `Vec<u8>` of raw pixels per image
#[derive(Debug)]
pub struct Mnist {
    images: Vec<Vec<u8>>,
    labels: Vec<u8>,
    rows: usize,
    cols: usize,
}

impl Mnist {
    /// Loads a split from a directory holding the standard IDX file names
    pub fn load(dir: impl AsRef<Path>, split: Split) -> Result<Self, MnistError> {
        let dir = dir.as_ref();
        let (image_name, label_name) = split.file_names();
        let image_bytes = read_file(&dir.join(image_name))?;
        let label_bytes = read_file(&dir.join(label_name))?;
        Self::from_raw(&image_bytes, &label_bytes)
    }

    /// Parses a dataset from in-memory IDX bytes
    pub fn from_raw(image_bytes: &[u8], label_bytes: &[u8]) -> Result<Self, MnistError> {
        let (images, rows, cols) = parse_images(image_bytes)?;
        let labels = parse_labels(label_bytes)?;
        if images.len() != labels.len() {
            return Err(MnistError::CountMismatch {
                images: images.len(),
                labels: labels.len(),
            });
        }
        if let Some(&bad) = labels.iter().find(|&&l| l as usize >= N_CLASSES) {
            return Err(MnistError::LabelOutOfRange(bad));
        }
        Ok(Self {
            images,
            labels,
            rows,
            cols,
        })
    }

    /// Generates random 28x28 images with random labels, a stand-in when no
    /// downloaded dataset is available
    pub fn synthetic(n: usize) -> Self {
        use rand::Rng;

        let mut rng = rand::rng();
        let rows = 28;
        let cols = 28;
        let mut images = Vec::with_capacity(n);
        let mut labels = Vec::with_capacity(n);
        for _ in 0..n {
            let image = (0..rows * cols).map(|_| rng.random()).collect();
            images.push(image);
            labels.push(rng.random_range(0..N_CLASSES as u8));
        }
        Self {
            images,
            labels,
            rows,
            cols,
        }
    }

    /// Keeps only the first `n` samples, for quick runs
    pub fn take(mut self, n: usize) -> Self {
        let n = n.min(self.images.len());
        self.images.truncate(n);
        self.labels.truncate(n);
        self
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// Image dimensions as (rows, cols)
    pub fn image_dims(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// Raw pixel values of sample `i`, row major
    pub fn image(&self, i: usize) -> &[u8] {
        &self.images[i]
    }

    pub fn label(&self, i: usize) -> u8 {
        self.labels[i]
    }

    /// Converts the split into training pairs for the data loader: images are
    /// flattened and scaled to [0, 1], labels are one hot encoded
    pub fn to_training_pairs(&self) -> (Vec<Vec<f32>>, Vec<Vec<u8>>) {
        let data = self
            .images
            .iter()
            .map(|image| image.iter().map(|&p| p as f32 / 255.0).collect())
            .collect();
        let labels = self
            .labels
            .iter()
            .map(|&l| one_hot(l, N_CLASSES))
            .collect();
        (data, labels)
    }
}

/// One hot encodes a class label
pub fn one_hot(label: u8, n_classes: usize) -> Vec<u8> {
    let mut encoded = vec![0; n_classes];
    encoded[label as usize] = 1;
    encoded
}

fn read_file(path: &Path) -> Result<Vec<u8>, MnistError> {
    if !path.exists() {
        return Err(MnistError::MissingFile(path.to_path_buf()));
    }
    fs::read(path).map_err(|source| MnistError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn parse_images(data: &[u8]) -> Result<(Vec<Vec<u8>>, usize, usize), MnistError> {
    if data.len() < 16 {
        return Err(MnistError::Truncated {
            expected: 16,
            got: data.len(),
        });
    }
    let magic = read_u32_be(data, 0);
    if magic != IMAGE_MAGIC {
        return Err(MnistError::BadMagic {
            expected: IMAGE_MAGIC,
            got: magic,
        });
    }
    let count = read_u32_be(data, 4) as usize;
    let rows = read_u32_be(data, 8) as usize;
    let cols = read_u32_be(data, 12) as usize;
    let pixels_per_image = rows * cols;
    let expected = 16 + count * pixels_per_image;
    if data.len() < expected {
        return Err(MnistError::Truncated {
            expected,
            got: data.len(),
        });
    }
    let mut images = Vec::with_capacity(count);
    for i in 0..count {
        let start = 16 + i * pixels_per_image;
        images.push(data[start..start + pixels_per_image].to_vec());
    }
    Ok((images, rows, cols))
}

fn parse_labels(data: &[u8]) -> Result<Vec<u8>, MnistError> {
    if data.len() < 8 {
        return Err(MnistError::Truncated {
            expected: 8,
            got: data.len(),
        });
    }
    let magic = read_u32_be(data, 0);
    if magic != LABEL_MAGIC {
        return Err(MnistError::BadMagic {
            expected: LABEL_MAGIC,
            got: magic,
        });
    }
    let count = read_u32_be(data, 4) as usize;
    let expected = 8 + count;
    if data.len() < expected {
        return Err(MnistError::Truncated {
            expected,
            got: data.len(),
        });
    }
    Ok(data[8..expected].to_vec())
}

fn read_u32_be(data: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

/// Builds IDX image bytes from raw pixel data, used to construct fixtures in tests
pub fn build_image_bytes(images: &[&[u8]], rows: u32, cols: u32) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(&IMAGE_MAGIC.to_be_bytes());
    buf.extend_from_slice(&(images.len() as u32).to_be_bytes());
    buf.extend_from_slice(&rows.to_be_bytes());
    buf.extend_from_slice(&cols.to_be_bytes());
    for image in images {
        buf.extend_from_slice(image);
    }
    buf
}

/// Builds IDX label bytes, used to construct fixtures in tests
pub fn build_label_bytes(labels: &[u8]) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(&LABEL_MAGIC.to_be_bytes());
    buf.extend_from_slice(&(labels.len() as u32).to_be_bytes());
    buf.extend_from_slice(labels);
    buf
}
