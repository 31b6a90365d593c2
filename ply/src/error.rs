use thiserror::Error;

/// Errors returned when building a point cloud.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlyError {
    #[error("ply: {colors} colors for {points} points")]
    ColorCountMismatch { points: usize, colors: usize },
}
