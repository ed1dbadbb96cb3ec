//! Turns an image on disk into the batched `f32` tensor the model expects.

use std::path::Path;

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, RgbImage};
use ndarray::Array4;
use serde::Serialize;
use tract_onnx::prelude::Tensor;

use crate::config::{Normalization, ResizeMode};
use crate::error::AppError;

const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

pub const DEFAULT_INPUT_SIZE: u32 = 224;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Layout {
    /// `[1, H, W, 3]`, what Keras exports produce.
    Nhwc,
    /// `[1, 3, H, W]`
    Nchw,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct InputSpec {
    pub width: u32,
    pub height: u32,
    pub layout: Layout,
}

impl InputSpec {
    pub fn square(size: u32, layout: Layout) -> Self {
        Self {
            width: size,
            height: size,
            layout,
        }
    }

    /// Derives the input layout and size from a rank-4 shape. `None` entries are dims the
    /// model leaves open; only the batch dim may be open.
    pub fn from_dims(dims: &[Option<usize>]) -> Option<Self> {
        if dims.len() != 4 || dims[0].map_or(false, |n| n != 1) {
            return None;
        }
        let (layout, h, w) = match (dims[1], dims[3]) {
            (_, Some(3)) => (Layout::Nhwc, dims[1]?, dims[2]?),
            (Some(3), _) => (Layout::Nchw, dims[2]?, dims[3]?),
            _ => return None,
        };
        Some(Self {
            width: u32::try_from(w).ok()?,
            height: u32::try_from(h).ok()?,
            layout,
        })
    }

    pub fn shape(&self) -> [usize; 4] {
        let (h, w) = (self.height as usize, self.width as usize);
        match self.layout {
            Layout::Nhwc => [1, h, w, 3],
            Layout::Nchw => [1, 3, h, w],
        }
    }
}

impl Normalization {
    pub fn apply(&self, channel: usize, value: u8) -> f32 {
        let v = value as f32;
        match self {
            Normalization::Raw => v,
            Normalization::Unit => v / 255.0,
            Normalization::Imagenet => (v / 255.0 - IMAGENET_MEAN[channel]) / IMAGENET_STD[channel],
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Preprocessor {
    spec: InputSpec,
    resize: ResizeMode,
    normalization: Normalization,
}

impl Preprocessor {
    pub fn new(spec: InputSpec, resize: ResizeMode, normalization: Normalization) -> Self {
        Self {
            spec,
            resize,
            normalization,
        }
    }

    pub fn spec(&self) -> InputSpec {
        self.spec
    }

    /// Decodes the file at `path`, sniffing the format from its bytes so a
    /// misnamed upload still loads.
    pub fn load(&self, path: &Path) -> Result<Tensor, AppError> {
        let img = image::io::Reader::open(path)?
            .with_guessed_format()?
            .decode()?;
        tracing::debug!(
            width = img.width(),
            height = img.height(),
            "decoded {}",
            path.display()
        );
        Ok(self.to_tensor(&img))
    }

    pub fn to_tensor(&self, img: &DynamicImage) -> Tensor {
        let rgb = self.fit(img);
        let norm = self.normalization;
        let (h, w) = (self.spec.height as usize, self.spec.width as usize);

        let array = match self.spec.layout {
            Layout::Nhwc => Array4::from_shape_fn((1, h, w, 3), |(_, y, x, c)| {
                norm.apply(c, rgb.get_pixel(x as u32, y as u32)[c])
            }),
            Layout::Nchw => Array4::from_shape_fn((1, 3, h, w), |(_, c, y, x)| {
                norm.apply(c, rgb.get_pixel(x as u32, y as u32)[c])
            }),
        };
        array.into()
    }

    fn fit(&self, img: &DynamicImage) -> RgbImage {
        let InputSpec { width, height, .. } = self.spec;
        match self.resize {
            ResizeMode::Stretch => {
                image::imageops::resize(&img.to_rgb8(), width, height, FilterType::Nearest)
            }
            ResizeMode::Letterbox => {
                let resized = img.resize(width, height, FilterType::Triangle).to_rgb8();
                let pad_x = (width - resized.width()) / 2;
                let pad_y = (height - resized.height()) / 2;

                let mut canvas = RgbImage::new(width, height);
                image::imageops::overlay(&mut canvas, &resized, pad_x as i64, pad_y as i64);
                canvas
            }
        }
    }
}
