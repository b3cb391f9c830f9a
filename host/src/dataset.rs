// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

//! Dataset factory: named datasets and splits read from `--dataset_dir`.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use burn::data::dataset::{Dataset, InMemDataset};
use image::{DynamicImage, GrayImage};
use log::{info, warn};
use rust_mnist::Mnist;

use crate::error::EvalError;

const SUPPORTED_FILES: [&str; 4] = ["bmp", "jpg", "jpeg", "png"];

const MNIST_SIDE: u32 = 28;
const MNIST_FILES: [&str; 4] = [
    "train-images-idx3-ubyte",
    "train-labels-idx1-ubyte",
    "t10k-images-idx3-ubyte",
    "t10k-labels-idx1-ubyte",
];

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Layout {
    /// `<dir>/<split>/<class>/<image>`, classes in sorted order.
    ImageFolder,
    /// The four MNIST IDX files directly under `<dir>`.
    MnistIdx,
}

#[derive(Debug)]
struct DatasetInfo {
    name: &'static str,
    num_classes: usize,
    /// Label of the first class directory; 1 when label 0 is a background class.
    label_base: usize,
    splits: &'static [(&'static str, usize)],
    layout: Layout,
}

const DATASETS: [DatasetInfo; 4] = [
    DatasetInfo {
        name: "imagenet",
        num_classes: 1001,
        label_base: 1,
        splits: &[("train", 1_281_167), ("validation", 50_000)],
        layout: Layout::ImageFolder,
    },
    DatasetInfo {
        name: "cifar10",
        num_classes: 10,
        label_base: 0,
        splits: &[("train", 50_000), ("test", 10_000)],
        layout: Layout::ImageFolder,
    },
    DatasetInfo {
        name: "flowers",
        num_classes: 5,
        label_base: 0,
        splits: &[("train", 3_320), ("validation", 350)],
        layout: Layout::ImageFolder,
    },
    DatasetInfo {
        name: "mnist",
        num_classes: 10,
        label_base: 0,
        splits: &[("train", 60_000), ("test", 10_000)],
        layout: Layout::MnistIdx,
    },
];

#[derive(Clone, Debug, PartialEq)]
pub enum ImageSource {
    File(PathBuf),
    Gray {
        width: u32,
        height: u32,
        pixels: Arc<[u8]>,
    },
}

/// One undecoded sample of a split.
#[derive(Clone, Debug, PartialEq)]
pub struct ImageRecord {
    pub source: ImageSource,
    pub label: usize,
}

impl ImageRecord {
    pub fn load(&self) -> Result<DynamicImage, common::NetError> {
        match &self.source {
            ImageSource::File(path) => Ok(image::open(path)?),
            ImageSource::Gray {
                width,
                height,
                pixels,
            } => GrayImage::from_raw(*width, *height, pixels.to_vec())
                .map(DynamicImage::ImageLuma8)
                .ok_or(common::NetError::EmptyImage {
                    width: *width,
                    height: *height,
                }),
        }
    }
}

/// The samples of one split with the metadata of their dataset.
pub struct SplitDataset {
    name: String,
    split: String,
    num_classes: usize,
    records: InMemDataset<ImageRecord>,
}

impl SplitDataset {
    pub fn new(name: &str, split: &str, num_classes: usize, records: Vec<ImageRecord>) -> Self {
        Self {
            name: name.to_string(),
            split: split.to_string(),
            num_classes,
            records: InMemDataset::new(records),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn split(&self) -> &str {
        &self.split
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    pub fn num_samples(&self) -> usize {
        self.records.len()
    }
}

impl Dataset<ImageRecord> for SplitDataset {
    fn get(&self, index: usize) -> Option<ImageRecord> {
        self.records.get(index)
    }

    fn len(&self) -> usize {
        self.records.len()
    }
}

pub fn get_dataset(name: &str, split: &str, dir: &Path) -> Result<SplitDataset, EvalError> {
    let info = DATASETS
        .iter()
        .find(|info| info.name == name)
        .ok_or_else(|| EvalError::UnknownDataset(name.to_string()))?;
    let declared = info
        .splits
        .iter()
        .find(|(known, _)| *known == split)
        .map(|(_, size)| *size)
        .ok_or_else(|| EvalError::UnknownSplit {
            dataset: name.to_string(),
            split: split.to_string(),
        })?;

    let records = match info.layout {
        Layout::ImageFolder => scan_image_folder(info, &dir.join(split))?,
        Layout::MnistIdx => read_mnist(dir, split)?,
    };
    if records.is_empty() {
        return Err(EvalError::EmptySplit(dir.join(split)));
    }
    if records.len() != declared {
        warn!(
            "{}/{} declares {} samples, found {}",
            name,
            split,
            declared,
            records.len()
        );
    }
    info!(
        "Dataset {}/{}: {} samples, {} classes",
        name,
        split,
        records.len(),
        info.num_classes
    );

    Ok(SplitDataset::new(name, split, info.num_classes, records))
}

fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| SUPPORTED_FILES.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>, EvalError> {
    let mut entries = fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<Vec<_>, _>>()?;
    entries.sort();
    Ok(entries)
}

fn scan_image_folder(info: &DatasetInfo, root: &Path) -> Result<Vec<ImageRecord>, EvalError> {
    let classes: Vec<PathBuf> = sorted_entries(root)?
        .into_iter()
        .filter(|path| path.is_dir())
        .collect();
    if classes.len() + info.label_base > info.num_classes {
        return Err(EvalError::TooManyClasses {
            dataset: info.name.to_string(),
            num_classes: info.num_classes,
            found: classes.len(),
        });
    }

    let mut records = Vec::new();
    for (index, class_dir) in classes.iter().enumerate() {
        for path in sorted_entries(class_dir)? {
            if path.is_file() && is_supported(&path) {
                records.push(ImageRecord {
                    source: ImageSource::File(path),
                    label: index + info.label_base,
                });
            }
        }
    }
    Ok(records)
}

fn read_mnist(dir: &Path, split: &str) -> Result<Vec<ImageRecord>, EvalError> {
    for file in MNIST_FILES {
        let path = dir.join(file);
        if !path.is_file() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("missing MNIST file {}", path.display()),
            )
            .into());
        }
    }

    // The reader concatenates file names onto the directory string.
    let mut root = dir.to_string_lossy().into_owned();
    if !root.ends_with('/') {
        root.push('/');
    }
    let mnist = Mnist::new(&root);
    let (images, labels) = match split {
        "train" => (mnist.train_data, mnist.train_labels),
        _ => (mnist.test_data, mnist.test_labels),
    };

    Ok(images
        .iter()
        .zip(labels)
        .map(|(pixels, label)| ImageRecord {
            source: ImageSource::Gray {
                width: MNIST_SIDE,
                height: MNIST_SIDE,
                pixels: Arc::from(&pixels[..]),
            },
            label: label as usize,
        })
        .collect())
}
