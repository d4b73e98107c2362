// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Image preprocessing for the defect detection model

use image::{imageops::FilterType, DynamicImage, GenericImageView};
use ndarray::{ArrayD, IxDyn};

use super::detector::BoundingBox;
use crate::config::{ModelConfig, PixelFormat};

/// How an image is turned into the model's input tensor
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TensorLayout {
    pub min_size: u32,
    pub max_size: u32,
    pub pixel_format: PixelFormat,
    pub scale_to_unit: bool,
    pub batch_input: bool,
}

impl From<&ModelConfig> for TensorLayout {
    fn from(config: &ModelConfig) -> Self {
        Self {
            min_size: config.min_size_test,
            max_size: config.max_size_test,
            pixel_format: config.pixel_format,
            scale_to_unit: config.scale_to_unit,
            batch_input: config.batch_input,
        }
    }
}

/// Relationship between the original image and the tensor fed to the model
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResizePlan {
    pub orig_width: u32,
    pub orig_height: u32,
    pub width: u32,
    pub height: u32,
}

impl ResizePlan {
    /// Plan a shortest-edge resize.
    ///
    /// The shortest edge becomes `min_size` unless that would push the
    /// longest edge past `max_size`, in which case the longest edge is
    /// capped at `max_size`. Aspect ratio is preserved.
    pub fn shortest_edge(orig_width: u32, orig_height: u32, min_size: u32, max_size: u32) -> Self {
        let (w, h) = (orig_width.max(1) as f64, orig_height.max(1) as f64);

        let mut scale = min_size as f64 / w.min(h);
        if w.max(h) * scale > max_size as f64 {
            scale = max_size as f64 / w.max(h);
        }

        Self {
            orig_width,
            orig_height,
            width: ((w * scale + 0.5) as u32).max(1),
            height: ((h * scale + 0.5) as u32).max(1),
        }
    }

    pub fn scale_x(&self) -> f32 {
        self.width as f32 / self.orig_width.max(1) as f32
    }

    pub fn scale_y(&self) -> f32 {
        self.height as f32 / self.orig_height.max(1) as f32
    }

    /// Map a box from tensor coordinates back into the original image,
    /// clamped to the image bounds
    pub fn to_original(&self, raw: [f32; 4]) -> BoundingBox {
        let max_x = self.orig_width as f32;
        let max_y = self.orig_height as f32;
        BoundingBox::new(
            (raw[0] / self.scale_x()).clamp(0.0, max_x),
            (raw[1] / self.scale_y()).clamp(0.0, max_y),
            (raw[2] / self.scale_x()).clamp(0.0, max_x),
            (raw[3] / self.scale_y()).clamp(0.0, max_y),
        )
    }
}

/// Build the model input tensor for an image
///
/// Steps:
/// 1. Shortest-edge resize (bilinear)
/// 2. Reorder channels to the model's pixel format
/// 3. Optionally scale to [0, 1]
/// 4. Lay out as CHW, or NCHW when the model takes a batch dimension
pub fn image_to_tensor(image: &DynamicImage, layout: &TensorLayout) -> (ArrayD<f32>, ResizePlan) {
    let (orig_w, orig_h) = image.dimensions();
    let plan = ResizePlan::shortest_edge(orig_w, orig_h, layout.min_size, layout.max_size);

    let rgb = if plan.width == orig_w && plan.height == orig_h {
        image.to_rgb8()
    } else {
        image
            .resize_exact(plan.width, plan.height, FilterType::Triangle)
            .to_rgb8()
    };

    let (h, w) = (plan.height as usize, plan.width as usize);
    let shape: Vec<usize> = if layout.batch_input {
        vec![1, 3, h, w]
    } else {
        vec![3, h, w]
    };

    let channel_order: [usize; 3] = match layout.pixel_format {
        PixelFormat::Bgr => [2, 1, 0],
        PixelFormat::Rgb => [0, 1, 2],
    };
    let scale = if layout.scale_to_unit { 1.0 / 255.0 } else { 1.0 };

    let plane = h * w;
    let mut data = vec![0f32; 3 * plane];
    for (x, y, pixel) in rgb.enumerate_pixels() {
        let offset = y as usize * w + x as usize;
        for (c, &src) in channel_order.iter().enumerate() {
            data[c * plane + offset] = pixel[src] as f32 * scale;
        }
    }

    // Shape and data length agree by construction
    let tensor = ArrayD::from_shape_vec(IxDyn(&shape), data)
        .unwrap_or_else(|_| ArrayD::zeros(IxDyn(&shape)));

    (tensor, plan)
}
