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

//! Network factory: architecture names to constructed burn modules.

mod conv_norm;
mod inception_v3;
mod inverted_residual;
mod lenet;
mod mobilenet_v2;

use std::path::{Path, PathBuf};

use burn::{
    module::Module,
    record::{BinFileRecorder, FullPrecisionSettings, NamedMpkFileRecorder},
    tensor::{backend::Backend, Tensor},
};
use log::debug;
use proto::ImageSize;

pub use inception_v3::{InceptionV3, InceptionV3Config};
pub use lenet::{LeNet, LeNetConfig};
pub use mobilenet_v2::{MobileNetV2, MobileNetV2Config};

use crate::NetError;

/// Static description of an architecture known to [`get_network`].
#[derive(Debug, PartialEq, Eq)]
pub struct NetworkSpec {
    pub name: &'static str,
    pub default_image_size: usize,
    pub input_channels: usize,
    pub default_preprocessing: &'static str,
}

const NETWORKS: [NetworkSpec; 4] = [
    NetworkSpec {
        name: "lenet",
        default_image_size: 28,
        input_channels: 1,
        default_preprocessing: "lenet",
    },
    NetworkSpec {
        name: "mobilenet_v2",
        default_image_size: 224,
        input_channels: 3,
        default_preprocessing: "inception",
    },
    NetworkSpec {
        name: "mobilenet_v2_140",
        default_image_size: 224,
        input_channels: 3,
        default_preprocessing: "inception",
    },
    NetworkSpec {
        name: "inception_v3",
        default_image_size: 299,
        input_channels: 3,
        default_preprocessing: "inception",
    },
];

pub fn network_spec(name: &str) -> Result<&'static NetworkSpec, NetError> {
    NETWORKS
        .iter()
        .find(|spec| spec.name == name)
        .ok_or_else(|| NetError::UnknownModel(name.to_string()))
}

/// On-disk record formats a checkpoint can be restored from, keyed by extension.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CheckpointFormat {
    NamedMpk,
    Bin,
}

impl CheckpointFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "mpk" => Some(Self::NamedMpk),
            "bin" => Some(Self::Bin),
            _ => None,
        }
    }
}

#[derive(Debug)]
enum Architecture<B: Backend> {
    LeNet(LeNet<B>),
    MobileNetV2(MobileNetV2<B>),
    InceptionV3(InceptionV3<B>),
}

/// A constructed classifier in eval mode.
#[derive(Debug)]
pub struct Network<B: Backend> {
    spec: &'static NetworkSpec,
    num_classes: usize,
    arch: Architecture<B>,
}

/// Builds the named architecture with `num_classes` output logits.
pub fn get_network<B: Backend>(
    name: &str,
    num_classes: usize,
    device: &B::Device,
) -> Result<Network<B>, NetError> {
    let spec = network_spec(name)?;
    let arch = match spec.name {
        "lenet" => Architecture::LeNet(
            LeNetConfig::new()
                .with_num_classes(num_classes)
                .with_channels(spec.input_channels)
                .init(device),
        ),
        "mobilenet_v2" => Architecture::MobileNetV2(
            MobileNetV2Config::new()
                .with_num_classes(num_classes)
                .init(device),
        ),
        "mobilenet_v2_140" => Architecture::MobileNetV2(
            MobileNetV2Config::new()
                .with_num_classes(num_classes)
                .with_width_mult(1.4)
                .init(device),
        ),
        "inception_v3" => Architecture::InceptionV3(
            InceptionV3Config::new()
                .with_num_classes(num_classes)
                .init(device),
        ),
        other => return Err(NetError::UnknownModel(other.to_string())),
    };

    Ok(Network {
        spec,
        num_classes,
        arch,
    })
}

fn load_module<B: Backend, M: Module<B>>(
    module: M,
    path: &Path,
    device: &B::Device,
) -> Result<M, NetError> {
    let format = CheckpointFormat::from_path(path)
        .ok_or_else(|| NetError::UnsupportedCheckpoint(path.to_path_buf()))?;
    debug!("Loading {:?} record {}", format, path.display());
    let loaded = match format {
        CheckpointFormat::NamedMpk => module.load_file(
            path.to_path_buf(),
            &NamedMpkFileRecorder::<FullPrecisionSettings>::new(),
            device,
        ),
        CheckpointFormat::Bin => module.load_file(
            path.to_path_buf(),
            &BinFileRecorder::<FullPrecisionSettings>::new(),
            device,
        ),
    };
    loaded.map_err(|source| NetError::Restore {
        path: path.to_path_buf(),
        source,
    })
}

fn save_module<B: Backend, M: Module<B>>(module: M, path: &Path) -> Result<PathBuf, NetError> {
    let format = CheckpointFormat::from_path(path)
        .ok_or_else(|| NetError::UnsupportedCheckpoint(path.to_path_buf()))?;
    debug!("Saving {:?} record {}", format, path.display());
    let saved = match format {
        CheckpointFormat::NamedMpk => module.save_file(
            path.to_path_buf(),
            &NamedMpkFileRecorder::<FullPrecisionSettings>::new(),
        ),
        CheckpointFormat::Bin => {
            module.save_file(path.to_path_buf(), &BinFileRecorder::<FullPrecisionSettings>::new())
        }
    };
    saved.map_err(|source| NetError::Save {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(path.to_path_buf())
}

impl<B: Backend> Network<B> {
    pub fn spec(&self) -> &'static NetworkSpec {
        self.spec
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    /// Square input at `eval_image_size`; unset or zero means the native size.
    pub fn input_size(&self, eval_image_size: Option<usize>) -> ImageSize {
        ImageSize::square(
            eval_image_size
                .filter(|&size| size > 0)
                .unwrap_or(self.spec.default_image_size),
            self.spec.input_channels,
        )
    }

    /// Logits of shape `[batch, num_classes]` for images of shape `[batch, C, H, W]`.
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        match &self.arch {
            Architecture::LeNet(m) => m.forward(images),
            Architecture::MobileNetV2(m) => m.forward(images),
            Architecture::InceptionV3(m) => m.forward(images),
        }
    }

    /// Replaces every parameter with the values stored in the record at `path`.
    pub fn restore(self, path: &Path, device: &B::Device) -> Result<Self, NetError> {
        let arch = match self.arch {
            Architecture::LeNet(m) => Architecture::LeNet(load_module(m, path, device)?),
            Architecture::MobileNetV2(m) => {
                Architecture::MobileNetV2(load_module(m, path, device)?)
            }
            Architecture::InceptionV3(m) => {
                Architecture::InceptionV3(load_module(m, path, device)?)
            }
        };
        Ok(Self {
            spec: self.spec,
            num_classes: self.num_classes,
            arch,
        })
    }

    /// Writes the parameters as a record file; the format follows the extension of `path`.
    pub fn save(&self, path: &Path) -> Result<PathBuf, NetError> {
        match &self.arch {
            Architecture::LeNet(m) => save_module(m.clone(), path),
            Architecture::MobileNetV2(m) => save_module(m.clone(), path),
            Architecture::InceptionV3(m) => save_module(m.clone(), path),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type B = NdArray<f32>;

    #[test]
    fn unknown_model_is_rejected() {
        let device = Default::default();
        let err = get_network::<B>("alexnet", 10, &device).unwrap_err();
        assert!(matches!(err, NetError::UnknownModel(name) if name == "alexnet"));
    }

    #[test]
    fn network_uses_native_size_unless_overridden() {
        let device = Default::default();
        let net = get_network::<B>("lenet", 10, &device).unwrap();
        assert_eq!(net.input_size(None), ImageSize::square(28, 1));
        assert_eq!(net.input_size(Some(32)), ImageSize::square(32, 1));
        assert_eq!(net.input_size(Some(0)), ImageSize::square(28, 1));
        assert_eq!(network_spec("inception_v3").unwrap().default_image_size, 299);
    }

    #[test]
    fn checkpoint_format_follows_extension() {
        assert_eq!(
            CheckpointFormat::from_path(Path::new("run/model-3.mpk")),
            Some(CheckpointFormat::NamedMpk)
        );
        assert_eq!(
            CheckpointFormat::from_path(Path::new("model.BIN")),
            Some(CheckpointFormat::Bin)
        );
        assert_eq!(CheckpointFormat::from_path(Path::new("model.ckpt")), None);
    }

    fn logits(net: &Network<B>, input: Tensor<B, 4>) -> Vec<f32> {
        net.forward(input).into_data().to_vec::<f32>().unwrap()
    }

    #[test]
    fn restore_reproduces_saved_logits() {
        let dir = tempfile::tempdir().unwrap();
        let device = Default::default();
        let input = Tensor::<B, 4>::ones([2, 1, 28, 28], &device);

        for file in ["model-1.mpk", "model-1.bin"] {
            let path = dir.path().join(file);
            let saved = get_network::<B>("lenet", 4, &device).unwrap();
            saved.save(&path).unwrap();
            let expected = logits(&saved, input.clone());

            let fresh = get_network::<B>("lenet", 4, &device).unwrap();
            let restored = fresh.restore(&path, &device).unwrap();
            let actual = logits(&restored, input.clone());

            assert_eq!(actual.len(), expected.len());
            for (a, e) in actual.iter().zip(&expected) {
                assert!((a - e).abs() < 1e-5, "{file}: {a} != {e}");
            }
        }
    }

    #[test]
    fn restore_of_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let device = Default::default();
        let net = get_network::<B>("lenet", 4, &device).unwrap();
        let err = net
            .restore(&dir.path().join("missing-7.mpk"), &device)
            .unwrap_err();
        assert!(matches!(err, NetError::Restore { .. }));
    }

    #[test]
    fn restore_rejects_unknown_extension() {
        let device = Default::default();
        let net = get_network::<B>("lenet", 4, &device).unwrap();
        let err = net.restore(Path::new("weights.ckpt"), &device).unwrap_err();
        assert!(matches!(err, NetError::UnsupportedCheckpoint(_)));
    }
}
