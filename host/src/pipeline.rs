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

//! Per-checkpoint evaluation: restore, run every batch, collect logits and labels.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use burn::tensor::{backend::Backend, Tensor, TensorData};
use common::{get_network, get_preprocessing, Network};
use log::info;
use proto::{ImageSize, Sample};

use crate::config::EvalConfig;
use crate::dataset::get_dataset;
use crate::error::EvalError;
use crate::provider::{ProviderConfig, SampleProvider};

/// Row-major `(rows, num_classes)` logits, filled at sequential offsets.
#[derive(Clone, Debug, PartialEq)]
pub struct LogitBuffer {
    rows: usize,
    num_classes: usize,
    data: Vec<f32>,
}

impl LogitBuffer {
    pub fn new(rows: usize, num_classes: usize) -> Self {
        Self {
            rows,
            num_classes,
            data: vec![0.0; rows * num_classes],
        }
    }

    pub fn from_vec(rows: usize, num_classes: usize, data: Vec<f32>) -> Result<Self, EvalError> {
        if data.len() != rows * num_classes {
            return Err(EvalError::ShapeMismatch {
                index: 0,
                expected: (rows, num_classes),
                found: (data.len() / num_classes.max(1), num_classes),
            });
        }
        Ok(Self {
            rows,
            num_classes,
            data,
        })
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.num_classes)
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Copies whole rows starting at row `offset`.
    pub fn write(&mut self, offset: usize, values: &[f32]) -> Result<(), EvalError> {
        let start = offset * self.num_classes;
        let end = start + values.len();
        if values.len() % self.num_classes != 0 || end > self.data.len() {
            return Err(EvalError::ShapeMismatch {
                index: offset,
                expected: (self.rows, self.num_classes),
                found: (values.len() / self.num_classes.max(1), values.len()),
            });
        }
        self.data[start..end].copy_from_slice(values);
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LabelBuffer {
    data: Vec<i64>,
}

impl LabelBuffer {
    pub fn new(rows: usize) -> Self {
        Self {
            data: vec![0; rows],
        }
    }

    #[cfg(test)]
    pub fn from_vec(data: Vec<i64>) -> Self {
        Self { data }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[i64] {
        &self.data
    }

    pub fn write(&mut self, offset: usize, labels: &[i64]) {
        self.data[offset..offset + labels.len()].copy_from_slice(labels);
    }
}

/// Everything one checkpoint produced over the split.
#[derive(Clone, Debug)]
pub struct CheckpointOutput {
    pub checkpoint: PathBuf,
    pub num_batches: usize,
    pub logits: LogitBuffer,
    pub labels: LabelBuffer,
}

/// The explicit cap when set and non-zero, otherwise one pass over the split.
pub fn num_batches(num_samples: usize, batch_size: usize, max_num_batches: Option<usize>) -> usize {
    match max_num_batches {
        Some(cap) if cap > 0 => cap,
        _ => num_samples.div_ceil(batch_size),
    }
}

/// Output classes of the network once `labels_offset` leading classes are dropped.
pub fn model_classes(dataset_classes: usize, labels_offset: usize) -> Result<usize, EvalError> {
    dataset_classes
        .checked_sub(labels_offset)
        .filter(|&classes| classes > 0)
        .ok_or(EvalError::InvalidLabelsOffset {
            offset: labels_offset,
            num_classes: dataset_classes,
        })
}

/// Stacks preprocessed samples into an `[N, C, H, W]` tensor and their labels.
pub fn samples_to_batch<B: Backend>(
    samples: &[Sample],
    size: ImageSize,
    device: &B::Device,
) -> (Tensor<B, 4>, Vec<i64>) {
    let mut data = Vec::with_capacity(samples.len() * size.len());
    for sample in samples {
        data.extend_from_slice(&sample.pixels);
    }
    let labels = samples.iter().map(|sample| sample.label).collect();

    let tensor_data = TensorData::new(data, [samples.len(), size.channels, size.height, size.width]);
    let images = Tensor::from_data(tensor_data.convert::<B::FloatElem>(), device);
    (images, labels)
}

/// Evaluates one checkpoint in isolation; nothing outlives the call except its buffers.
pub fn evaluate_checkpoint<B: Backend>(
    config: &EvalConfig,
    dataset_dir: &Path,
    checkpoint: &Path,
    device: &B::Device,
) -> Result<CheckpointOutput, EvalError> {
    let dataset = get_dataset(&config.dataset_name, &config.dataset_split_name, dataset_dir)?;
    let num_classes = model_classes(dataset.num_classes(), config.labels_offset)?;

    let network = get_network::<B>(&config.model_name, num_classes, device)?;
    info!(
        "Restoring {} ({} classes) from {}",
        config.model_name,
        num_classes,
        checkpoint.display()
    );
    let network = network.restore(checkpoint, device)?;

    let preprocessing = get_preprocessing(
        config
            .preprocessing_name()
            .unwrap_or(network.spec().default_preprocessing),
    )?;
    let size = network.input_size(config.eval_image_size);
    let batch_size = config.batch_size;
    let num_batches = num_batches(dataset.num_samples(), batch_size, config.max_num_batches);
    info!(
        "Evaluating {}/{}: {} batches of {} at {}x{} with {} preprocessing",
        dataset.name(),
        dataset.split(),
        num_batches,
        batch_size,
        size.height,
        size.width,
        preprocessing.name()
    );

    let provider_config = ProviderConfig::new(preprocessing, size, batch_size)
        .with_num_threads(config.num_preprocessing_threads)
        .with_labels_offset(config.labels_offset);
    let mut provider = SampleProvider::start(Arc::new(dataset), provider_config)?;

    let collected = collect_outputs(&network, &mut provider, num_batches, batch_size, size, device);
    provider.stop()?;
    let (logits, labels) = collected?;

    Ok(CheckpointOutput {
        checkpoint: checkpoint.to_path_buf(),
        num_batches,
        logits,
        labels,
    })
}

fn collect_outputs<B: Backend>(
    network: &Network<B>,
    provider: &mut SampleProvider,
    num_batches: usize,
    batch_size: usize,
    size: ImageSize,
    device: &B::Device,
) -> Result<(LogitBuffer, LabelBuffer), EvalError> {
    let mut logits = LogitBuffer::new(num_batches * batch_size, network.num_classes());
    let mut labels = LabelBuffer::new(num_batches * batch_size);
    let mut offset = 0;

    for step in 0..num_batches {
        println!("step: {}/{}", step, num_batches);
        let samples = provider.next_batch(batch_size)?;
        let (images, batch_labels) = samples_to_batch::<B>(&samples, size, device);

        let output = network.forward(images);
        let values = output
            .into_data()
            .to_vec::<f32>()
            .map_err(|err| EvalError::Tensor(format!("{err:?}")))?;

        logits.write(offset, &values)?;
        labels.write(offset, &batch_labels);
        offset += batch_size;
    }

    Ok((logits, labels))
}
