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

//! Top-k scoring of logit buffers, one model at a time or averaged as an ensemble.

use burn::tensor::{activation::softmax, backend::Backend, Tensor, TensorData};
use proto::{Accuracy, TOP_1, TOP_5};

use crate::error::EvalError;
use crate::pipeline::{LabelBuffer, LogitBuffer};

// Rows converted to probabilities per tensor round trip.
const SCORE_CHUNK_ROWS: usize = 1024;

/// True when fewer than `k` classes score strictly higher than `label`.
pub fn in_top_k(scores: &[f32], label: i64, k: usize) -> bool {
    let Ok(label) = usize::try_from(label) else {
        return false;
    };
    let Some(&target) = scores.get(label) else {
        return false;
    };
    if !target.is_finite() || scores.iter().any(|score| !score.is_finite()) {
        return false;
    }
    scores.iter().filter(|&&score| score > target).count() < k
}

fn buffer_to_tensor<B: Backend>(
    values: &[f32],
    rows: usize,
    num_classes: usize,
    device: &B::Device,
) -> Tensor<B, 2> {
    let data = TensorData::new(values.to_vec(), [rows, num_classes]);
    Tensor::from_data(data.convert::<B::FloatElem>(), device)
}

fn tensor_to_vec<B: Backend>(tensor: Tensor<B, 2>) -> Result<Vec<f32>, EvalError> {
    tensor
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|err| EvalError::Tensor(format!("{err:?}")))
}

/// Softmax then top-1/top-5 accuracy of `logits` against `labels`.
pub fn score<B: Backend>(
    logits: &LogitBuffer,
    labels: &LabelBuffer,
    device: &B::Device,
) -> Result<Accuracy, EvalError> {
    let (rows, num_classes) = logits.shape();
    if labels.len() != rows {
        return Err(EvalError::ShapeMismatch {
            index: 0,
            expected: (rows, num_classes),
            found: (labels.len(), num_classes),
        });
    }
    if labels.is_empty() {
        return Ok(Accuracy {
            top1: 0.0,
            top5: 0.0,
            count: 0,
        });
    }

    let (mut top1, mut top5) = (0usize, 0usize);
    for start in (0..rows).step_by(SCORE_CHUNK_ROWS) {
        let end = (start + SCORE_CHUNK_ROWS).min(rows);
        let chunk = &logits.as_slice()[start * num_classes..end * num_classes];
        let probabilities = softmax(
            buffer_to_tensor::<B>(chunk, end - start, num_classes, device),
            1,
        );
        let probabilities = tensor_to_vec(probabilities)?;

        for (row, label) in probabilities
            .chunks_exact(num_classes)
            .zip(&labels.as_slice()[start..end])
        {
            top1 += in_top_k(row, *label, TOP_1) as usize;
            top5 += in_top_k(row, *label, TOP_5) as usize;
        }
    }

    Ok(Accuracy {
        top1: top1 as f64 / rows as f64,
        top5: top5 as f64 / rows as f64,
        count: rows,
    })
}

/// Element-wise mean of equally shaped buffers.
pub fn average_logits<B: Backend>(
    buffers: &[&LogitBuffer],
    device: &B::Device,
) -> Result<LogitBuffer, EvalError> {
    let first = buffers.first().ok_or(EvalError::NoSamples)?;
    let (rows, num_classes) = first.shape();

    let mut sum: Option<Tensor<B, 2>> = None;
    for (index, buffer) in buffers.iter().enumerate() {
        if buffer.shape() != first.shape() {
            return Err(EvalError::ShapeMismatch {
                index,
                expected: first.shape(),
                found: buffer.shape(),
            });
        }
        let tensor = buffer_to_tensor::<B>(buffer.as_slice(), rows, num_classes, device);
        sum = Some(match sum {
            Some(acc) => acc + tensor,
            None => tensor,
        });
    }

    let mean = sum.ok_or(EvalError::NoSamples)?.div_scalar(buffers.len() as f32);
    LogitBuffer::from_vec(rows, num_classes, tensor_to_vec(mean)?)
}

/// Every label buffer must match the first one row for row.
pub fn verify_labels(labels: &[&LabelBuffer]) -> Result<(), EvalError> {
    let Some(first) = labels.first() else {
        return Ok(());
    };
    for (index, other) in labels.iter().enumerate().skip(1) {
        if other.len() != first.len() {
            return Err(EvalError::LabelMismatch {
                index,
                row: first.len().min(other.len()),
            });
        }
        if let Some(row) = first
            .as_slice()
            .iter()
            .zip(other.as_slice())
            .position(|(a, b)| a != b)
        {
            return Err(EvalError::LabelMismatch { index, row });
        }
    }
    Ok(())
}

/// Scores the mean of all logit buffers against the shared labels.
pub fn score_ensemble<B: Backend>(
    logits: &[&LogitBuffer],
    labels: &[&LabelBuffer],
    device: &B::Device,
) -> Result<Accuracy, EvalError> {
    verify_labels(labels)?;
    let first_labels = labels.first().ok_or(EvalError::NoSamples)?;
    let averaged = average_logits::<B>(logits, device)?;
    score::<B>(&averaged, first_labels, device)
}
