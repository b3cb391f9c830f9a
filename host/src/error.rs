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

use std::path::PathBuf;

use common::NetError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EvalError {
    #[error("You must supply the dataset directory with --dataset_dir")]
    MissingDatasetDir,

    #[error("batch size must be at least 1")]
    InvalidBatchSize,

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("no checkpoint paths in `{0}`")]
    EmptyCheckpointList(String),

    #[error("no checkpoint found in {}", .0.display())]
    NoCheckpointFound(PathBuf),

    #[error("unknown dataset `{0}`")]
    UnknownDataset(String),

    #[error("dataset `{dataset}` has no split `{split}`")]
    UnknownSplit { dataset: String, split: String },

    #[error("no samples found under {}", .0.display())]
    EmptySplit(PathBuf),

    #[error("cannot provide samples from an empty dataset")]
    NoSamples,

    #[error("dataset `{dataset}` has {num_classes} classes but {found} class directories")]
    TooManyClasses {
        dataset: String,
        num_classes: usize,
        found: usize,
    },

    #[error("labels offset {offset} leaves no classes out of {num_classes}")]
    InvalidLabelsOffset { offset: usize, num_classes: usize },

    #[error("failed to load sample {index}")]
    Sample {
        index: usize,
        #[source]
        source: NetError,
    },

    #[error("a data loading worker stopped unexpectedly")]
    WorkerFailed,

    #[error("buffer {index} has shape {found:?}, expected {expected:?}")]
    ShapeMismatch {
        index: usize,
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error("labels of checkpoint {index} differ from checkpoint 0 at row {row}")]
    LabelMismatch { index: usize, row: usize },

    #[error("cannot read tensor data: {0}")]
    Tensor(String),

    #[error(transparent)]
    Net(#[from] NetError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Report(#[from] serde_json::Error),
}
