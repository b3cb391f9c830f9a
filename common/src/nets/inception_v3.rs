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

//! Inception v3 without the auxiliary head, which is only used for training.

use burn::{
    config::Config,
    module::Module,
    nn::{
        pool::{
            AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, AvgPool2d, AvgPool2dConfig, MaxPool2d,
            MaxPool2dConfig,
        },
        Dropout, DropoutConfig, Linear, LinearConfig, PaddingConfig2d,
    },
    tensor::{backend::Backend, Tensor},
};

use super::conv_norm::{Conv2dNormActivation, Conv2dNormActivationConfig};

const BN_EPSILON: f64 = 1e-3;

fn basic_conv(inp: usize, out: usize, kernel: usize) -> Conv2dNormActivationConfig {
    Conv2dNormActivationConfig::new(inp, out)
        .with_kernel_size(kernel)
        .with_epsilon(BN_EPSILON)
}

fn factorized_conv(inp: usize, out: usize, height: usize, width: usize) -> Conv2dNormActivationConfig {
    Conv2dNormActivationConfig::new(inp, out)
        .with_kernel(height, width)
        .with_epsilon(BN_EPSILON)
}

fn reduction_conv(inp: usize, out: usize) -> Conv2dNormActivationConfig {
    basic_conv(inp, out, 3).with_stride(2).with_padding([0, 0])
}

fn avg_pool_3x3() -> AvgPool2d {
    AvgPool2dConfig::new([3, 3])
        .with_strides([1, 1])
        .with_padding(PaddingConfig2d::Explicit(1, 1))
        .with_count_include_pad(false)
        .init()
}

fn max_pool_3x3_s2() -> MaxPool2d {
    MaxPool2dConfig::new([3, 3]).with_strides([2, 2]).init()
}

/// 35x35 block (Mixed_5b..Mixed_5d).
#[derive(Module, Debug)]
struct InceptionA<B: Backend> {
    branch1x1: Conv2dNormActivation<B>,
    branch5x5_1: Conv2dNormActivation<B>,
    branch5x5_2: Conv2dNormActivation<B>,
    branch3x3dbl_1: Conv2dNormActivation<B>,
    branch3x3dbl_2: Conv2dNormActivation<B>,
    branch3x3dbl_3: Conv2dNormActivation<B>,
    pool: AvgPool2d,
    branch_pool: Conv2dNormActivation<B>,
}

impl<B: Backend> InceptionA<B> {
    fn new(inp: usize, pool_features: usize, device: &B::Device) -> Self {
        Self {
            branch1x1: basic_conv(inp, 64, 1).init(device),
            branch5x5_1: basic_conv(inp, 48, 1).init(device),
            branch5x5_2: basic_conv(48, 64, 5).init(device),
            branch3x3dbl_1: basic_conv(inp, 64, 1).init(device),
            branch3x3dbl_2: basic_conv(64, 96, 3).init(device),
            branch3x3dbl_3: basic_conv(96, 96, 3).init(device),
            pool: avg_pool_3x3(),
            branch_pool: basic_conv(inp, pool_features, 1).init(device),
        }
    }

    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let b1 = self.branch1x1.forward(x.clone());
        let b5 = self.branch5x5_2.forward(self.branch5x5_1.forward(x.clone()));
        let b3 = self.branch3x3dbl_1.forward(x.clone());
        let b3 = self.branch3x3dbl_3.forward(self.branch3x3dbl_2.forward(b3));
        let bp = self.branch_pool.forward(self.pool.forward(x));
        Tensor::cat(vec![b1, b5, b3, bp], 1)
    }
}

/// Grid reduction 35x35 -> 17x17 (Mixed_6a).
#[derive(Module, Debug)]
struct InceptionB<B: Backend> {
    branch3x3: Conv2dNormActivation<B>,
    branch3x3dbl_1: Conv2dNormActivation<B>,
    branch3x3dbl_2: Conv2dNormActivation<B>,
    branch3x3dbl_3: Conv2dNormActivation<B>,
    pool: MaxPool2d,
}

impl<B: Backend> InceptionB<B> {
    fn new(inp: usize, device: &B::Device) -> Self {
        Self {
            branch3x3: reduction_conv(inp, 384).init(device),
            branch3x3dbl_1: basic_conv(inp, 64, 1).init(device),
            branch3x3dbl_2: basic_conv(64, 96, 3).init(device),
            branch3x3dbl_3: reduction_conv(96, 96).init(device),
            pool: max_pool_3x3_s2(),
        }
    }

    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let b3 = self.branch3x3.forward(x.clone());
        let bd = self.branch3x3dbl_1.forward(x.clone());
        let bd = self.branch3x3dbl_3.forward(self.branch3x3dbl_2.forward(bd));
        let bp = self.pool.forward(x);
        Tensor::cat(vec![b3, bd, bp], 1)
    }
}

/// 17x17 block with factorized 7x7 convolutions (Mixed_6b..Mixed_6e).
#[derive(Module, Debug)]
struct InceptionC<B: Backend> {
    branch1x1: Conv2dNormActivation<B>,
    branch7x7: Vec<Conv2dNormActivation<B>>,
    branch7x7dbl: Vec<Conv2dNormActivation<B>>,
    pool: AvgPool2d,
    branch_pool: Conv2dNormActivation<B>,
}

impl<B: Backend> InceptionC<B> {
    fn new(inp: usize, c7: usize, device: &B::Device) -> Self {
        Self {
            branch1x1: basic_conv(inp, 192, 1).init(device),
            branch7x7: vec![
                basic_conv(inp, c7, 1).init(device),
                factorized_conv(c7, c7, 1, 7).init(device),
                factorized_conv(c7, 192, 7, 1).init(device),
            ],
            branch7x7dbl: vec![
                basic_conv(inp, c7, 1).init(device),
                factorized_conv(c7, c7, 7, 1).init(device),
                factorized_conv(c7, c7, 1, 7).init(device),
                factorized_conv(c7, c7, 7, 1).init(device),
                factorized_conv(c7, 192, 1, 7).init(device),
            ],
            pool: avg_pool_3x3(),
            branch_pool: basic_conv(inp, 192, 1).init(device),
        }
    }

    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let b1 = self.branch1x1.forward(x.clone());
        let b7 = chain(&self.branch7x7, x.clone());
        let bd = chain(&self.branch7x7dbl, x.clone());
        let bp = self.branch_pool.forward(self.pool.forward(x));
        Tensor::cat(vec![b1, b7, bd, bp], 1)
    }
}

/// Grid reduction 17x17 -> 8x8 (Mixed_7a).
#[derive(Module, Debug)]
struct InceptionD<B: Backend> {
    branch3x3: Vec<Conv2dNormActivation<B>>,
    branch7x7x3: Vec<Conv2dNormActivation<B>>,
    pool: MaxPool2d,
}

impl<B: Backend> InceptionD<B> {
    fn new(inp: usize, device: &B::Device) -> Self {
        Self {
            branch3x3: vec![
                basic_conv(inp, 192, 1).init(device),
                reduction_conv(192, 320).init(device),
            ],
            branch7x7x3: vec![
                basic_conv(inp, 192, 1).init(device),
                factorized_conv(192, 192, 1, 7).init(device),
                factorized_conv(192, 192, 7, 1).init(device),
                reduction_conv(192, 192).init(device),
            ],
            pool: max_pool_3x3_s2(),
        }
    }

    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let b3 = chain(&self.branch3x3, x.clone());
        let b7 = chain(&self.branch7x7x3, x.clone());
        let bp = self.pool.forward(x);
        Tensor::cat(vec![b3, b7, bp], 1)
    }
}

/// 8x8 block with expanded filter banks (Mixed_7b, Mixed_7c).
#[derive(Module, Debug)]
struct InceptionE<B: Backend> {
    branch1x1: Conv2dNormActivation<B>,
    branch3x3_1: Conv2dNormActivation<B>,
    branch3x3_2a: Conv2dNormActivation<B>,
    branch3x3_2b: Conv2dNormActivation<B>,
    branch3x3dbl_1: Conv2dNormActivation<B>,
    branch3x3dbl_2: Conv2dNormActivation<B>,
    branch3x3dbl_3a: Conv2dNormActivation<B>,
    branch3x3dbl_3b: Conv2dNormActivation<B>,
    pool: AvgPool2d,
    branch_pool: Conv2dNormActivation<B>,
}

impl<B: Backend> InceptionE<B> {
    fn new(inp: usize, device: &B::Device) -> Self {
        Self {
            branch1x1: basic_conv(inp, 320, 1).init(device),
            branch3x3_1: basic_conv(inp, 384, 1).init(device),
            branch3x3_2a: factorized_conv(384, 384, 1, 3).init(device),
            branch3x3_2b: factorized_conv(384, 384, 3, 1).init(device),
            branch3x3dbl_1: basic_conv(inp, 448, 1).init(device),
            branch3x3dbl_2: basic_conv(448, 384, 3).init(device),
            branch3x3dbl_3a: factorized_conv(384, 384, 1, 3).init(device),
            branch3x3dbl_3b: factorized_conv(384, 384, 3, 1).init(device),
            pool: avg_pool_3x3(),
            branch_pool: basic_conv(inp, 192, 1).init(device),
        }
    }

    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let b1 = self.branch1x1.forward(x.clone());

        let b3 = self.branch3x3_1.forward(x.clone());
        let b3 = Tensor::cat(
            vec![
                self.branch3x3_2a.forward(b3.clone()),
                self.branch3x3_2b.forward(b3),
            ],
            1,
        );

        let bd = self.branch3x3dbl_1.forward(x.clone());
        let bd = self.branch3x3dbl_2.forward(bd);
        let bd = Tensor::cat(
            vec![
                self.branch3x3dbl_3a.forward(bd.clone()),
                self.branch3x3dbl_3b.forward(bd),
            ],
            1,
        );

        let bp = self.branch_pool.forward(self.pool.forward(x));
        Tensor::cat(vec![b1, b3, bd, bp], 1)
    }
}

fn chain<B: Backend>(layers: &[Conv2dNormActivation<B>], input: Tensor<B, 4>) -> Tensor<B, 4> {
    layers.iter().fold(input, |x, layer| layer.forward(x))
}

#[derive(Module, Debug)]
pub struct InceptionV3<B: Backend> {
    stem: Vec<Conv2dNormActivation<B>>,
    stem_pool: MaxPool2d,
    stem_tail: Vec<Conv2dNormActivation<B>>,
    mixed_5: Vec<InceptionA<B>>,
    mixed_6a: InceptionB<B>,
    mixed_6: Vec<InceptionC<B>>,
    mixed_7a: InceptionD<B>,
    mixed_7: Vec<InceptionE<B>>,
    avg_pool: AdaptiveAvgPool2d,
    dropout: Dropout,
    logits: Linear<B>,
}

impl<B: Backend> InceptionV3<B> {
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = chain(&self.stem, input);
        let x = self.stem_pool.forward(x);
        let x = chain(&self.stem_tail, x);
        let x = self.stem_pool.forward(x);

        let x = self.mixed_5.iter().fold(x, |x, block| block.forward(x));
        let x = self.mixed_6a.forward(x);
        let x = self.mixed_6.iter().fold(x, |x, block| block.forward(x));
        let x = self.mixed_7a.forward(x);
        let x = self.mixed_7.iter().fold(x, |x, block| block.forward(x));

        let x = self.avg_pool.forward(x).flatten(1, 3);
        let x = self.dropout.forward(x);
        self.logits.forward(x)
    }
}

#[derive(Debug, Config)]
pub struct InceptionV3Config {
    #[config(default = "1001")]
    num_classes: usize,
    #[config(default = "0.2")]
    dropout: f64,
}

impl InceptionV3Config {
    pub fn init<B: Backend>(&self, device: &B::Device) -> InceptionV3<B> {
        InceptionV3 {
            stem: vec![
                reduction_conv(3, 32).init(device),
                basic_conv(32, 32, 3).with_padding([0, 0]).init(device),
                basic_conv(32, 64, 3).init(device),
            ],
            stem_pool: max_pool_3x3_s2(),
            stem_tail: vec![
                basic_conv(64, 80, 1).init(device),
                basic_conv(80, 192, 3).with_padding([0, 0]).init(device),
            ],
            mixed_5: vec![
                InceptionA::new(192, 32, device),
                InceptionA::new(256, 64, device),
                InceptionA::new(288, 64, device),
            ],
            mixed_6a: InceptionB::new(288, device),
            mixed_6: vec![
                InceptionC::new(768, 128, device),
                InceptionC::new(768, 160, device),
                InceptionC::new(768, 160, device),
                InceptionC::new(768, 192, device),
            ],
            mixed_7a: InceptionD::new(768, device),
            mixed_7: vec![InceptionE::new(1280, device), InceptionE::new(2048, device)],
            avg_pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            dropout: DropoutConfig::new(self.dropout).init(),
            logits: LinearConfig::new(2048, self.num_classes).init(device),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type B = NdArray<f32>;

    #[test]
    fn mixed_blocks_emit_documented_depths() {
        let device = Default::default();

        let a = InceptionA::<B>::new(192, 32, &device);
        assert_eq!(a.forward(Tensor::zeros([1, 192, 5, 5], &device)).dims(), [1, 256, 5, 5]);

        let b = InceptionB::<B>::new(288, &device);
        assert_eq!(b.forward(Tensor::zeros([1, 288, 7, 7], &device)).dims(), [1, 768, 3, 3]);

        let d = InceptionD::<B>::new(768, &device);
        assert_eq!(d.forward(Tensor::zeros([1, 768, 7, 7], &device)).dims(), [1, 1280, 3, 3]);

        let e = InceptionE::<B>::new(1280, &device);
        assert_eq!(e.forward(Tensor::zeros([1, 1280, 3, 3], &device)).dims(), [1, 2048, 3, 3]);
    }

    #[test]
    fn factorized_block_keeps_grid() {
        let device = Default::default();
        let c = InceptionC::<B>::new(768, 128, &device);
        assert_eq!(c.forward(Tensor::zeros([1, 768, 4, 4], &device)).dims(), [1, 768, 4, 4]);
    }
}
