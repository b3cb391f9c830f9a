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

use core::cmp::max;

use burn::{
    config::Config,
    module::Module,
    nn::{
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig},
        Dropout, DropoutConfig, Linear, LinearConfig,
    },
    tensor::{backend::Backend, Tensor},
};

use super::conv_norm::{Conv2dNormActivation, Conv2dNormActivationConfig};
use super::inverted_residual::{InvertedResidual, InvertedResidualConfig};

// t (expansion), c (channels), n (repeats), s (first stride)
const INVERTED_RESIDUAL_SETTINGS: [[usize; 4]; 7] = [
    [1, 16, 1, 1],
    [6, 24, 2, 2],
    [6, 32, 3, 2],
    [6, 64, 4, 2],
    [6, 96, 3, 1],
    [6, 160, 3, 2],
    [6, 320, 1, 1],
];
const ROUND_NEAREST: usize = 8;

#[derive(Module, Debug)]
pub struct MobileNetV2<B: Backend> {
    features: Vec<ConvBlock<B>>,
    classifier: Classifier<B>,
    avg_pool: AdaptiveAvgPool2d,
}

impl<B: Backend> MobileNetV2<B> {
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 2> {
        let mut x = input;
        for layer in &self.features {
            x = match layer {
                ConvBlock::InvertedResidual(block) => block.forward(x),
                ConvBlock::Conv(conv) => conv.forward(x),
            };
        }
        let x = self.avg_pool.forward(x);
        let x = x.flatten(1, 3);
        self.classifier.forward(x)
    }
}

#[allow(clippy::large_enum_variant)]
#[derive(Module, Debug)]
enum ConvBlock<B: Backend> {
    InvertedResidual(InvertedResidual<B>),
    Conv(Conv2dNormActivation<B>),
}

#[derive(Module, Debug)]
struct Classifier<B: Backend> {
    dropout: Dropout,
    linear: Linear<B>,
}

impl<B: Backend> Classifier<B> {
    fn forward(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        let x = self.dropout.forward(input);
        self.linear.forward(x)
    }
}

#[derive(Debug, Config)]
pub struct MobileNetV2Config {
    #[config(default = "1001")]
    num_classes: usize,
    #[config(default = "1.0")]
    width_mult: f32,
    #[config(default = "0.2")]
    dropout: f64,
}

/// Rounds `value` to the nearest multiple of `divisor`, never going below 90% of it.
fn make_divisible(value: f32, divisor: usize) -> usize {
    let rounded = (value + divisor as f32 / 2.0) as usize / divisor * divisor;
    let mut rounded = max(rounded, divisor);
    if (rounded as f32) < 0.9 * value {
        rounded += divisor;
    }
    rounded
}

impl MobileNetV2Config {
    pub fn init<B: Backend>(&self, device: &B::Device) -> MobileNetV2<B> {
        let mut input_channel = make_divisible(32.0 * self.width_mult, ROUND_NEAREST);
        let last_channel = make_divisible(1280.0 * f32::max(1.0, self.width_mult), ROUND_NEAREST);

        let mut features = vec![ConvBlock::Conv(
            Conv2dNormActivationConfig::new(3, input_channel)
                .with_kernel_size(3)
                .with_stride(2)
                .with_relu6(true)
                .init(device),
        )];

        for [t, c, n, s] in INVERTED_RESIDUAL_SETTINGS.into_iter() {
            let output_channel = make_divisible(c as f32 * self.width_mult, ROUND_NEAREST);
            for i in 0..n {
                let stride = if i == 0 { s } else { 1 };
                features.push(ConvBlock::InvertedResidual(
                    InvertedResidualConfig::new(input_channel, output_channel, stride, t)
                        .init(device),
                ));
                input_channel = output_channel;
            }
        }

        features.push(ConvBlock::Conv(
            Conv2dNormActivationConfig::new(input_channel, last_channel)
                .with_kernel_size(1)
                .with_relu6(true)
                .init(device),
        ));

        let classifier = Classifier {
            dropout: DropoutConfig::new(self.dropout).init(),
            linear: LinearConfig::new(last_channel, self.num_classes).init(device),
        };

        MobileNetV2 {
            features,
            classifier,
            avg_pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type B = NdArray<f32>;

    #[test]
    fn channels_round_to_multiples_of_eight() {
        assert_eq!(make_divisible(32.0, 8), 32);
        assert_eq!(make_divisible(32.0 * 1.4, 8), 48);
        assert_eq!(make_divisible(1280.0 * 1.4, 8), 1792);
        assert_eq!(make_divisible(3.0, 8), 8);
    }

    #[test]
    fn emits_one_logit_per_class() {
        let device = Default::default();
        let model = MobileNetV2Config::new()
            .with_num_classes(7)
            .with_width_mult(0.25)
            .init::<B>(&device);
        let logits = model.forward(Tensor::zeros([2, 3, 32, 32], &device));
        assert_eq!(logits.dims(), [2, 7]);
    }
}
