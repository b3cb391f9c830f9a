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

use burn::{
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        BatchNorm, BatchNormConfig,
    },
    tensor::{backend::Backend, Tensor},
};

use super::conv_norm::{Conv2dNormActivation, Conv2dNormActivationConfig};

/// MobileNetV2 bottleneck: 1x1 expansion, 3x3 depthwise, linear 1x1 projection.
#[derive(Module, Debug)]
pub struct InvertedResidual<B: Backend> {
    use_res_connect: bool,
    expand: Option<Conv2dNormActivation<B>>,
    depthwise: Conv2dNormActivation<B>,
    project: LinearBottleneck<B>,
}

impl<B: Backend> InvertedResidual<B> {
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let mut x = input.clone();

        if let Some(ref expand) = self.expand {
            x = expand.forward(x);
        }

        x = self.depthwise.forward(x);
        x = self.project.forward(x);

        if self.use_res_connect {
            x + input
        } else {
            x
        }
    }
}

#[derive(Module, Debug)]
struct LinearBottleneck<B: Backend> {
    conv: Conv2d<B>,
    norm: BatchNorm<B, 2>,
}

impl<B: Backend> LinearBottleneck<B> {
    fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv.forward(input);
        self.norm.forward(x)
    }
}

#[derive(Debug, Clone)]
pub struct InvertedResidualConfig {
    pub inp: usize,
    pub oup: usize,
    pub stride: usize,
    pub expand_ratio: usize,
}

impl InvertedResidualConfig {
    pub fn new(inp: usize, oup: usize, stride: usize, expand_ratio: usize) -> Self {
        Self {
            inp,
            oup,
            stride,
            expand_ratio,
        }
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> InvertedResidual<B> {
        let use_res_connect = self.stride == 1 && self.inp == self.oup;
        let hidden_dim = self.inp * self.expand_ratio;

        let expand = (self.expand_ratio != 1).then(|| {
            Conv2dNormActivationConfig::new(self.inp, hidden_dim)
                .with_kernel_size(1)
                .with_relu6(true)
                .init(device)
        });

        let depthwise = Conv2dNormActivationConfig::new(hidden_dim, hidden_dim)
            .with_kernel_size(3)
            .with_stride(self.stride)
            .with_groups(hidden_dim)
            .with_relu6(true)
            .init(device);

        let project = LinearBottleneck {
            conv: Conv2dConfig::new([hidden_dim, self.oup], [1, 1])
                .with_bias(false)
                .init(device),
            norm: BatchNormConfig::new(self.oup).init(device),
        };

        InvertedResidual {
            use_res_connect,
            expand,
            depthwise,
            project,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type B = NdArray<f32>;

    #[test]
    fn residual_block_preserves_shape() {
        let device = Default::default();
        let block = InvertedResidualConfig::new(16, 16, 1, 6).init::<B>(&device);
        assert!(block.use_res_connect);
        let out = block.forward(Tensor::zeros([1, 16, 8, 8], &device));
        assert_eq!(out.dims(), [1, 16, 8, 8]);
    }

    #[test]
    fn strided_block_downsamples_without_residual() {
        let device = Default::default();
        let block = InvertedResidualConfig::new(16, 24, 2, 1).init::<B>(&device);
        assert!(!block.use_res_connect);
        assert!(block.expand.is_none());
        let out = block.forward(Tensor::zeros([1, 16, 8, 8], &device));
        assert_eq!(out.dims(), [1, 24, 4, 4]);
    }
}
