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

use burn::record::RecorderError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NetError {
    #[error("unknown model name `{0}`")]
    UnknownModel(String),

    #[error("unknown preprocessing name `{0}`")]
    UnknownPreprocessing(String),

    #[error("unsupported checkpoint format: {}", .0.display())]
    UnsupportedCheckpoint(PathBuf),

    #[error("failed to restore checkpoint {}", path.display())]
    Restore {
        path: PathBuf,
        #[source]
        source: RecorderError,
    },

    #[error("failed to save checkpoint {}", path.display())]
    Save {
        path: PathBuf,
        #[source]
        source: RecorderError,
    },

    #[error("networks take 1 or 3 input channels, got {0}")]
    UnsupportedChannels(usize),

    #[error("cannot preprocess an empty {width}x{height} image")]
    EmptyImage { width: u32, height: u32 },

    #[error(transparent)]
    Image(#[from] image::ImageError),
}
