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
        BatchNorm, BatchNormConfig, PaddingConfig2d,
    },
    tensor::{activation::relu, backend::Backend, Tensor},
};

/// Convolution without bias, batch norm, then ReLU (or ReLU6).
#[derive(Module, Debug)]
pub struct Conv2dNormActivation<B: Backend> {
    conv: Conv2d<B>,
    norm: BatchNorm<B, 2>,
    relu6: bool,
}

impl<B: Backend> Conv2dNormActivation<B> {
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv.forward(input);
        let x = self.norm.forward(x);
        if self.relu6 {
            x.clamp(0.0, 6.0)
        } else {
            relu(x)
        }
    }
}

/// Builder for [`Conv2dNormActivation`].
///
/// Square kernels default to "same" padding for stride 1; call
/// [`with_padding`](Self::with_padding) with `[0, 0]` for a valid convolution.
#[derive(Debug, Clone)]
pub struct Conv2dNormActivationConfig {
    pub in_channels: usize,
    pub out_channels: usize,
    pub kernel_size: [usize; 2],
    pub stride: usize,
    pub padding: [usize; 2],
    pub groups: usize,
    pub epsilon: f64,
    pub relu6: bool,
}

impl Conv2dNormActivationConfig {
    pub fn new(in_channels: usize, out_channels: usize) -> Self {
        Self {
            in_channels,
            out_channels,
            kernel_size: [3, 3],
            stride: 1,
            padding: [1, 1],
            groups: 1,
            epsilon: 1e-5,
            relu6: false,
        }
    }

    pub fn with_kernel_size(mut self, kernel_size: usize) -> Self {
        self.kernel_size = [kernel_size, kernel_size];
        self.padding = [kernel_size / 2, kernel_size / 2];
        self
    }

    /// Rectangular kernel, padded so the spatial size is preserved.
    pub fn with_kernel(mut self, height: usize, width: usize) -> Self {
        self.kernel_size = [height, width];
        self.padding = [height / 2, width / 2];
        self
    }

    pub fn with_stride(mut self, stride: usize) -> Self {
        self.stride = stride;
        self
    }

    pub fn with_padding(mut self, padding: [usize; 2]) -> Self {
        self.padding = padding;
        self
    }

    pub fn with_groups(mut self, groups: usize) -> Self {
        self.groups = groups;
        self
    }

    pub fn with_epsilon(mut self, epsilon: f64) -> Self {
        self.epsilon = epsilon;
        self
    }

    pub fn with_relu6(mut self, relu6: bool) -> Self {
        self.relu6 = relu6;
        self
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> Conv2dNormActivation<B> {
        let padding = if self.padding == [0, 0] {
            PaddingConfig2d::Valid
        } else {
            PaddingConfig2d::Explicit(self.padding[0], self.padding[1])
        };

        Conv2dNormActivation {
            conv: Conv2dConfig::new([self.in_channels, self.out_channels], self.kernel_size)
                .with_stride([self.stride, self.stride])
                .with_padding(padding)
                .with_groups(self.groups)
                .with_bias(false)
                .init(device),
            norm: BatchNormConfig::new(self.out_channels)
                .with_epsilon(self.epsilon)
                .init(device),
            relu6: self.relu6,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type B = NdArray<f32>;

    #[test]
    fn same_padding_keeps_spatial_size() {
        let device = Default::default();
        let block = Conv2dNormActivationConfig::new(3, 8)
            .with_kernel(1, 7)
            .init::<B>(&device);
        let out = block.forward(Tensor::zeros([2, 3, 9, 9], &device));
        assert_eq!(out.dims(), [2, 8, 9, 9]);
    }

    #[test]
    fn valid_stride_two_shrinks() {
        let device = Default::default();
        let block = Conv2dNormActivationConfig::new(3, 4)
            .with_stride(2)
            .with_padding([0, 0])
            .init::<B>(&device);
        let out = block.forward(Tensor::zeros([1, 3, 11, 11], &device));
        assert_eq!(out.dims(), [1, 4, 5, 5]);
    }

    #[test]
    fn relu6_clamps_output() {
        let device = Default::default();
        let block = Conv2dNormActivationConfig::new(1, 1)
            .with_kernel_size(1)
            .with_relu6(true)
            .init::<B>(&device);
        let input = Tensor::<B, 4>::ones([1, 1, 2, 2], &device).mul_scalar(1000.0);
        let max = block.forward(input).max().into_scalar();
        assert!(max <= 6.0);
    }
}
