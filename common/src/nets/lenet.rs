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
    config::Config,
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig},
        Dropout, DropoutConfig, Linear, LinearConfig, PaddingConfig2d,
    },
    tensor::{activation::relu, backend::Backend, Tensor},
};

// Spatial size after the two 2x2 pools on the native 28x28 input.
const FEATURE_SIZE: usize = 7;

#[derive(Module, Debug)]
pub struct LeNet<B: Backend> {
    conv1: Conv2d<B>,
    conv2: Conv2d<B>,
    pool: MaxPool2d,
    resize: AdaptiveAvgPool2d,
    fc3: Linear<B>,
    dropout: Dropout,
    fc4: Linear<B>,
}

impl<B: Backend> LeNet<B> {
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.pool.forward(relu(self.conv1.forward(input)));
        let x = self.pool.forward(relu(self.conv2.forward(x)));
        // Identity at 28x28; lets other eval sizes reach the same classifier.
        let x = self.resize.forward(x);
        let x = x.flatten(1, 3);
        let x = relu(self.fc3.forward(x));
        let x = self.dropout.forward(x);
        self.fc4.forward(x)
    }
}

#[derive(Debug, Config)]
pub struct LeNetConfig {
    #[config(default = "10")]
    num_classes: usize,
    #[config(default = "1")]
    channels: usize,
    #[config(default = "0.5")]
    dropout: f64,
}

impl LeNetConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> LeNet<B> {
        let conv = |inp: usize, out: usize| {
            Conv2dConfig::new([inp, out], [5, 5])
                .with_padding(PaddingConfig2d::Explicit(2, 2))
                .init(device)
        };

        LeNet {
            conv1: conv(self.channels, 32),
            conv2: conv(32, 64),
            pool: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
            resize: AdaptiveAvgPool2dConfig::new([FEATURE_SIZE, FEATURE_SIZE]).init(),
            fc3: LinearConfig::new(64 * FEATURE_SIZE * FEATURE_SIZE, 1024).init(device),
            dropout: DropoutConfig::new(self.dropout).init(),
            fc4: LinearConfig::new(1024, self.num_classes).init(device),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type B = NdArray<f32>;

    #[test]
    fn native_and_larger_inputs_share_the_classifier() {
        let device = Default::default();
        let model = LeNetConfig::new().with_num_classes(9).init::<B>(&device);

        let native = model.forward(Tensor::zeros([3, 1, 28, 28], &device));
        assert_eq!(native.dims(), [3, 9]);

        let larger = model.forward(Tensor::zeros([1, 1, 56, 56], &device));
        assert_eq!(larger.dims(), [1, 9]);
    }
}
