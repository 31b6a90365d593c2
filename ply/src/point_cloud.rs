use crate::PlyError;

/// An unordered set of 3-D positions with optional per-point RGB colors.
///
/// When colors are present there is exactly one per point. The constructor
/// enforces this, so encoding never has to check it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointCloud {
    points: Vec<[f32; 3]>,
    colors: Option<Vec<[u8; 3]>>,
}

impl PointCloud {
    /// Creates a point cloud, rejecting a color array of the wrong length.
    pub fn new(points: Vec<[f32; 3]>, colors: Option<Vec<[u8; 3]>>) -> Result<Self, PlyError> {
        if let Some(colors) = &colors {
            if colors.len() != points.len() {
                return Err(PlyError::ColorCountMismatch {
                    points: points.len(),
                    colors: colors.len(),
                });
            }
        }
        Ok(Self { points, colors })
    }

    /// Creates an uncolored point cloud.
    pub fn from_points(points: Vec<[f32; 3]>) -> Self {
        Self {
            points,
            colors: None,
        }
    }

    /// Number of points.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Returns true if the cloud has no points.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[[f32; 3]] {
        &self.points
    }

    pub fn colors(&self) -> Option<&[[u8; 3]]> {
        self.colors.as_deref()
    }

    pub fn has_colors(&self) -> bool {
        self.colors.is_some()
    }
}
