use gen3d_ply::PointCloud;
use image::{ColorType, DynamicImage, GrayImage, RgbImage};

use crate::device::Device;
use crate::error::ModelError;

/// Mask pixels with a luminance strictly above this value are selected.
pub const MASK_THRESHOLD: u8 = 128;

/// Startup hooks shared by every model capability.
///
/// The lifecycle manager calls [`to_device`](Self::to_device) and then
/// [`eval`](Self::eval) right after a backend builds a model. Backends that
/// are placed on their device at construction and have no training mode can
/// keep the defaults.
pub trait ModelLifecycle {
    /// Moves the model's weights onto `device`.
    fn to_device(&mut self, _device: Device) -> Result<(), ModelError> {
        Ok(())
    }

    /// Switches the model to inference (non-training) mode.
    fn eval(&mut self) -> Result<(), ModelError> {
        Ok(())
    }
}

/// Produces image features for interactive segmentation.
///
/// Setting the image and reading back the computed features is one call, so
/// a shared encoder needs no per-request state.
///
/// # Thread Safety
///
/// Implementations must be safe for concurrent use.
pub trait ImageEncoder: ModelLifecycle + Send + Sync {
    /// Runs the image through the encoder and returns its feature tensor,
    /// `[1, 256, 64, 64]` float32 for the production encoder.
    fn features(&self, image: &RgbImage) -> Result<FeatureTensor, ModelError>;
}

/// Lifts the masked object in an image into a 3-D point cloud.
///
/// # Thread Safety
///
/// Implementations must be safe for concurrent use.
pub trait Reconstructor: ModelLifecycle + Send + Sync {
    /// Reconstructs the selected region of `image`.
    ///
    /// `quality` is an opaque preset (`"fast"`, `"balanced"`, `"high"`, ...)
    /// interpreted by the backend; callers pass it through unchecked.
    fn reconstruct(
        &self,
        image: &RgbImage,
        mask: &Mask,
        quality: &str,
    ) -> Result<PointCloud, ModelError>;
}

/// A dense float32 tensor in row-major order.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureTensor {
    shape: Vec<usize>,
    data: Vec<f32>,
}

impl FeatureTensor {
    /// Shape of the production encoder's output.
    pub const ENCODER_SHAPE: [usize; 4] = [1, 256, 64, 64];

    /// Element type name written next to serialized tensors.
    pub const DTYPE: &'static str = "float32";

    /// Creates a tensor, checking that `data` fills `shape` exactly.
    pub fn new(shape: Vec<usize>, data: Vec<f32>) -> Result<Self, ModelError> {
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            return Err(ModelError::ShapeMismatch {
                shape,
                expected,
                got: data.len(),
            });
        }
        Ok(Self { shape, data })
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Raw element bytes, little-endian, in row-major order.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.data.len() * 4);
        for v in &self.data {
            out.extend_from_slice(&v.to_le_bytes());
        }
        out
    }
}

/// A boolean pixel selection, row-major, `width * height` entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask {
    width: u32,
    height: u32,
    bits: Vec<bool>,
    selected: usize,
}

impl Mask {
    /// Thresholds a decoded mask image. Grayscale images are used as is;
    /// colour images are reduced to ITU-R 601 luma first, alpha ignored.
    pub fn from_image(image: &DynamicImage) -> Self {
        match image.color() {
            ColorType::L8 | ColorType::La8 | ColorType::L16 | ColorType::La16 => {
                Self::from_luma(&image.to_luma8())
            }
            _ => {
                let rgb = image.to_rgb8();
                let luma = GrayImage::from_fn(rgb.width(), rgb.height(), |x, y| {
                    let [r, g, b] = rgb.get_pixel(x, y).0;
                    image::Luma([luma601(r, g, b)])
                });
                Self::from_luma(&luma)
            }
        }
    }

    /// Thresholds a luminance image: pixels above [`MASK_THRESHOLD`] are selected.
    pub fn from_luma(image: &GrayImage) -> Self {
        let bits: Vec<bool> = image.pixels().map(|p| p.0[0] > MASK_THRESHOLD).collect();
        let selected = bits.iter().filter(|&&b| b).count();
        Self {
            width: image.width(),
            height: image.height(),
            bits,
            selected,
        }
    }

    /// Builds a mask from explicit bits.
    pub fn from_bits(width: u32, height: u32, bits: Vec<bool>) -> Result<Self, ModelError> {
        if bits.len() != width as usize * height as usize {
            return Err(ModelError::MaskSize {
                width,
                height,
                got: bits.len(),
            });
        }
        let selected = bits.iter().filter(|&&b| b).count();
        Ok(Self {
            width,
            height,
            bits,
            selected,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Returns whether pixel `(x, y)` is selected; out of range is unselected.
    pub fn get(&self, x: u32, y: u32) -> bool {
        if x >= self.width || y >= self.height {
            return false;
        }
        self.bits[y as usize * self.width as usize + x as usize]
    }

    pub fn as_slice(&self) -> &[bool] {
        &self.bits
    }

    /// Number of selected pixels.
    pub fn selected_count(&self) -> usize {
        self.selected
    }

    /// Returns true when no pixel is selected.
    pub fn is_empty(&self) -> bool {
        self.selected == 0
    }
}

/// Fixed-point `0.299 R + 0.587 G + 0.114 B`, rounded.
fn luma601(r: u8, g: u8, b: u8) -> u8 {
    let y = u32::from(r) * 19595 + u32::from(g) * 38470 + u32::from(b) * 7471 + 0x8000;
    (y >> 16) as u8
}
