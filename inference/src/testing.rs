//! Test doubles shared by the unit tests.

use std::io::Cursor;
use std::sync::{Arc, Mutex};

use gen3d_models::{
    Device, FeatureTensor, ImageEncoder, LoadFailure, Mask, ModelError, ModelLifecycle,
    ModelRegistry, ModelSlot, Reconstructor,
};
use gen3d_ply::PointCloud;
use image::{GrayImage, ImageFormat, Luma, Rgb, RgbImage};

#[derive(Default)]
struct Calls {
    count: usize,
    size: Option<(u32, u32)>,
    quality: Option<String>,
    selected: Option<usize>,
}

/// Encoder returning zeros of a fixed shape; clones share call records.
#[derive(Clone)]
pub struct FakeEncoder {
    shape: Vec<usize>,
    calls: Arc<Mutex<Calls>>,
}

impl FakeEncoder {
    pub fn new(shape: Vec<usize>) -> Self {
        Self {
            shape,
            calls: Arc::default(),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.lock().unwrap().count
    }

    pub fn last_size(&self) -> Option<(u32, u32)> {
        self.calls.lock().unwrap().size
    }
}

impl ModelLifecycle for FakeEncoder {}

impl ImageEncoder for FakeEncoder {
    fn features(&self, image: &RgbImage) -> Result<FeatureTensor, ModelError> {
        let mut calls = self.calls.lock().unwrap();
        calls.count += 1;
        calls.size = Some(image.dimensions());
        let len: usize = self.shape.iter().product();
        FeatureTensor::new(self.shape.clone(), vec![0.25; len])
    }
}

/// Reconstructor emitting `points` points, or failing with a fixed message.
#[derive(Clone)]
pub struct FakeReconstructor {
    points: usize,
    colors: bool,
    fail: Option<String>,
    calls: Arc<Mutex<Calls>>,
}

impl FakeReconstructor {
    pub fn new(points: usize, colors: bool) -> Self {
        Self {
            points,
            colors,
            fail: None,
            calls: Arc::default(),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            fail: Some(message.to_string()),
            ..Self::new(0, false)
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.lock().unwrap().count
    }

    pub fn last_quality(&self) -> Option<String> {
        self.calls.lock().unwrap().quality.clone()
    }

    pub fn last_selected(&self) -> Option<usize> {
        self.calls.lock().unwrap().selected
    }
}

impl ModelLifecycle for FakeReconstructor {}

impl Reconstructor for FakeReconstructor {
    fn reconstruct(
        &self,
        _image: &RgbImage,
        mask: &Mask,
        quality: &str,
    ) -> Result<PointCloud, ModelError> {
        let mut calls = self.calls.lock().unwrap();
        calls.count += 1;
        calls.quality = Some(quality.to_string());
        calls.selected = Some(mask.selected_count());
        if let Some(msg) = &self.fail {
            return Err(ModelError::Runtime(msg.clone()));
        }
        let points = (0..self.points).map(|i| [i as f32, 0.5, -1.0]).collect();
        let colors = self.colors.then(|| vec![[255, 128, 0]; self.points]);
        Ok(PointCloud::new(points, colors).unwrap())
    }
}

fn unloaded() -> LoadFailure {
    LoadFailure::BackendMissing {
        tried: vec!["test".to_string()],
    }
}

pub fn registry(
    encoder: Option<FakeEncoder>,
    reconstructor: Option<FakeReconstructor>,
) -> ModelRegistry {
    ModelRegistry::new(
        Device::Cpu,
        match encoder {
            Some(e) => ModelSlot::Loaded(Box::new(e)),
            None => ModelSlot::Unloaded(unloaded()),
        },
        match reconstructor {
            Some(r) => ModelSlot::Loaded(Box::new(r)),
            None => ModelSlot::Unloaded(unloaded()),
        },
    )
}

/// A solid-colour RGB PNG.
pub fn png(width: u32, height: u32, rgb: [u8; 3]) -> Vec<u8> {
    let img = RgbImage::from_pixel(width, height, Rgb(rgb));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png).unwrap();
    out.into_inner()
}

/// A solid grayscale PNG.
pub fn gray_png(width: u32, height: u32, level: u8) -> Vec<u8> {
    let img = GrayImage::from_pixel(width, height, Luma([level]));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png).unwrap();
    out.into_inner()
}
