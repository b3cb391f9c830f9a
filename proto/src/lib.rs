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

use serde::{Deserialize, Serialize};

pub const TOP_1: usize = 1;
pub const TOP_5: usize = 5;

/// Square spatial size fed to a network, with its channel count.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSize {
    pub height: usize,
    pub width: usize,
    pub channels: usize,
}

impl ImageSize {
    pub fn square(size: usize, channels: usize) -> Self {
        Self {
            height: size,
            width: size,
            channels,
        }
    }

    /// Number of `f32` values in one preprocessed image.
    pub fn len(&self) -> usize {
        self.height * self.width * self.channels
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A preprocessed image in CHW order together with its (offset) label.
#[derive(Clone, Debug, PartialEq)]
pub struct Sample {
    pub pixels: Vec<f32>,
    pub label: i64,
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Accuracy {
    pub top1: f64,
    pub top5: f64,
    pub count: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelReport {
    pub checkpoint: String,
    pub accuracy: Accuracy,
}

/// Everything printed at the end of a run, in a serializable form.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub model_name: String,
    pub dataset_name: String,
    pub dataset_split_name: String,
    pub num_batches: usize,
    pub batch_size: usize,
    pub models: Vec<ModelReport>,
    pub ensemble: Accuracy,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_size_len_counts_channels() {
        let size = ImageSize::square(28, 1);
        assert_eq!(size.len(), 784);
        assert_eq!(ImageSize::square(4, 3).len(), 48);
        assert!(!size.is_empty());
    }
}
