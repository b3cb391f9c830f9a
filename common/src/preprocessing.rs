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

//! Eval-time image preprocessing, selected by name.

use image::{imageops::FilterType, DynamicImage, GenericImageView};
use proto::ImageSize;

use crate::NetError;

const CENTRAL_FRACTION: f32 = 0.875;
const RESIZE_SIDE: u32 = 256;
const CHANNEL_MEANS: [f32; 3] = [123.68, 116.78, 103.94];

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Preprocessing {
    /// Central crop, bilinear resize, scale to `[-1, 1]`.
    Inception,
    /// Aspect preserving resize, central crop, channel mean subtraction.
    Vgg,
    /// Crop or zero-pad to size, then `(x - 128) / 128`.
    LeNet,
}

/// Maps a preprocessing or model name to its preprocessing.
pub fn get_preprocessing(name: &str) -> Result<Preprocessing, NetError> {
    match name {
        "inception" | "inception_v1" | "inception_v2" | "inception_v3" | "inception_v4"
        | "inception_resnet_v2" | "mobilenet_v1" | "mobilenet_v2" | "mobilenet_v2_140" => {
            Ok(Preprocessing::Inception)
        }
        "vgg" | "vgg_a" | "vgg_16" | "vgg_19" => Ok(Preprocessing::Vgg),
        name if name.starts_with("resnet_") => Ok(Preprocessing::Vgg),
        "lenet" => Ok(Preprocessing::LeNet),
        _ => Err(NetError::UnknownPreprocessing(name.to_string())),
    }
}

impl Preprocessing {
    pub fn name(&self) -> &'static str {
        match self {
            Preprocessing::Inception => "inception",
            Preprocessing::Vgg => "vgg",
            Preprocessing::LeNet => "lenet",
        }
    }

    /// Produces `size.len()` values in CHW order.
    pub fn apply(&self, image: &DynamicImage, size: ImageSize) -> Result<Vec<f32>, NetError> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(NetError::EmptyImage { width, height });
        }
        let image = match size.channels {
            1 => DynamicImage::ImageLuma8(image.to_luma8()),
            3 => DynamicImage::ImageRgb8(image.to_rgb8()),
            n => return Err(NetError::UnsupportedChannels(n)),
        };
        let (tw, th) = (size.width as u32, size.height as u32);

        let pixels = match self {
            Preprocessing::Inception => {
                let image = central_crop(&image, CENTRAL_FRACTION)
                    .resize_exact(tw, th, FilterType::Triangle);
                to_chw(&image, |_, v| (v / 255.0 - 0.5) * 2.0)
            }
            Preprocessing::Vgg => {
                let image = aspect_preserving_resize(&image, RESIZE_SIDE.max(tw.max(th)));
                let image = crop_to(&image, tw, th);
                to_chw(&image, |c, v| v - CHANNEL_MEANS[c])
            }
            Preprocessing::LeNet => {
                let image = crop_or_pad(&image, tw, th);
                to_chw(&image, |_, v| (v - 128.0) / 128.0)
            }
        };
        debug_assert_eq!(pixels.len(), size.len());
        Ok(pixels)
    }
}

/// Keeps the central `fraction` of both dimensions.
fn central_crop(image: &DynamicImage, fraction: f32) -> DynamicImage {
    let (w, h) = image.dimensions();
    let x = ((w as f32 - w as f32 * fraction) / 2.0) as u32;
    let y = ((h as f32 - h as f32 * fraction) / 2.0) as u32;
    image.crop_imm(x, y, w - 2 * x, h - 2 * y)
}

/// Resizes so that the smaller side equals `side`.
fn aspect_preserving_resize(image: &DynamicImage, side: u32) -> DynamicImage {
    let (w, h) = image.dimensions();
    let scale = side as f32 / w.min(h) as f32;
    let nw = ((w as f32 * scale).round() as u32).max(side);
    let nh = ((h as f32 * scale).round() as u32).max(side);
    image.resize_exact(nw, nh, FilterType::Triangle)
}

/// Centered crop of `width x height`; the image must be at least that large.
fn crop_to(image: &DynamicImage, width: u32, height: u32) -> DynamicImage {
    let (w, h) = image.dimensions();
    image.crop_imm((w - width) / 2, (h - height) / 2, width, height)
}

/// Centered crop where the image is larger and zero padding where it is smaller.
fn crop_or_pad(image: &DynamicImage, width: u32, height: u32) -> DynamicImage {
    let (w, h) = image.dimensions();
    let cropped = image.crop_imm(
        w.saturating_sub(width) / 2,
        h.saturating_sub(height) / 2,
        w.min(width),
        h.min(height),
    );
    if cropped.dimensions() == (width, height) {
        return cropped;
    }

    let channels = cropped.color().channel_count() as usize;
    let (cw, ch) = cropped.dimensions();
    let (ox, oy) = ((width - cw) / 2, (height - ch) / 2);
    let src = cropped.as_bytes();
    let mut dst = vec![0u8; width as usize * height as usize * channels];
    for row in 0..ch as usize {
        let from = row * cw as usize * channels;
        let to = ((row + oy as usize) * width as usize + ox as usize) * channels;
        let len = cw as usize * channels;
        dst[to..to + len].copy_from_slice(&src[from..from + len]);
    }

    match channels {
        1 => image::GrayImage::from_raw(width, height, dst).map(DynamicImage::ImageLuma8),
        _ => image::RgbImage::from_raw(width, height, dst).map(DynamicImage::ImageRgb8),
    }
    .unwrap_or(cropped)
}

/// Interleaved 8-bit pixels to planar floats, mapping each `(channel, value)`.
fn to_chw(image: &DynamicImage, map: impl Fn(usize, f32) -> f32) -> Vec<f32> {
    let channels = image.color().channel_count() as usize;
    let (w, h) = image.dimensions();
    let plane = w as usize * h as usize;
    let bytes = image.as_bytes();

    let mut out = vec![0.0; plane * channels];
    for (i, px) in bytes.chunks_exact(channels).enumerate() {
        for (c, &v) in px.iter().enumerate() {
            out[c * plane + i] = map(c, v as f32);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, Rgb, RgbImage};

    fn rgb(width: u32, height: u32, value: u8) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([value; 3])))
    }

    #[test]
    fn model_names_select_their_preprocessing() {
        assert_eq!(get_preprocessing("inception_v3").unwrap(), Preprocessing::Inception);
        assert_eq!(get_preprocessing("mobilenet_v2").unwrap(), Preprocessing::Inception);
        assert_eq!(get_preprocessing("resnet_v1_50").unwrap(), Preprocessing::Vgg);
        assert_eq!(get_preprocessing("lenet").unwrap(), Preprocessing::LeNet);
        assert!(matches!(
            get_preprocessing("cifarnet"),
            Err(NetError::UnknownPreprocessing(_))
        ));
    }

    #[test]
    fn inception_scales_to_unit_range() {
        let size = ImageSize::square(8, 3);
        let white = Preprocessing::Inception.apply(&rgb(20, 10, 255), size).unwrap();
        assert_eq!(white.len(), 8 * 8 * 3);
        assert!(white.iter().all(|&v| (v - 1.0).abs() < 1e-6));

        let black = Preprocessing::Inception.apply(&rgb(20, 10, 0), size).unwrap();
        assert!(black.iter().all(|&v| (v + 1.0).abs() < 1e-6));
    }

    #[test]
    fn vgg_subtracts_channel_means() {
        let size = ImageSize::square(4, 3);
        let out = Preprocessing::Vgg.apply(&rgb(6, 9, 200), size).unwrap();
        let plane = 16;
        assert!((out[0] - (200.0 - 123.68)).abs() < 1e-3);
        assert!((out[plane] - (200.0 - 116.78)).abs() < 1e-3);
        assert!((out[2 * plane + 15] - (200.0 - 103.94)).abs() < 1e-3);
    }

    #[test]
    fn lenet_pads_small_images_with_zeros() {
        let image = DynamicImage::ImageLuma8(GrayImage::from_pixel(2, 2, Luma([192])));
        let out = Preprocessing::LeNet
            .apply(&image, ImageSize::square(4, 1))
            .unwrap();
        assert_eq!(out.len(), 16);
        assert_eq!(out[0], -1.0);
        assert_eq!(out[5], 0.5);
        assert_eq!(out[10], 0.5);
        assert_eq!(out[15], -1.0);
    }

    #[test]
    fn lenet_crops_large_images_to_center() {
        let mut image = GrayImage::from_pixel(6, 6, Luma([0]));
        image.put_pixel(2, 2, Luma([255]));
        let out = Preprocessing::LeNet
            .apply(&DynamicImage::ImageLuma8(image), ImageSize::square(2, 1))
            .unwrap();
        assert_eq!(out.len(), 4);
        assert!((out[0] - 127.0 / 128.0).abs() < 1e-6);
        assert_eq!(out[3], -1.0);
    }

    #[test]
    fn color_images_convert_to_requested_channels() {
        let out = Preprocessing::Inception
            .apply(&rgb(4, 4, 255), ImageSize::square(4, 1))
            .unwrap();
        assert_eq!(out.len(), 16);

        let err = Preprocessing::Inception
            .apply(&rgb(4, 4, 255), ImageSize::square(4, 2))
            .unwrap_err();
        assert!(matches!(err, NetError::UnsupportedChannels(2)));
    }

    #[test]
    fn empty_images_are_rejected() {
        let err = Preprocessing::LeNet
            .apply(&rgb(0, 3, 1), ImageSize::square(2, 1))
            .unwrap_err();
        assert!(matches!(err, NetError::EmptyImage { .. }));
    }
}
