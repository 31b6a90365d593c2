//! Point clouds and their binary PLY encoding.
//!
//! The reconstruction stage hands its model output to [`encode`], which
//! produces a `binary_little_endian 1.0` PLY file readable by common 3-D
//! tooling.
//!
//! # Layout
//!
//! ```text
//! ply
//! format binary_little_endian 1.0
//! element vertex <N>
//! property float x
//! property float y
//! property float z
//! property uchar red      <- only with colors
//! property uchar green    <- only with colors
//! property uchar blue     <- only with colors
//! end_header
//! <N records: xyz as 3 x f32 LE, then rgb as 3 x u8 when colored>
//! ```

mod error;
mod point_cloud;

pub use error::PlyError;
pub use point_cloud::PointCloud;

/// Size of one position record: three little-endian `f32`.
pub const POSITION_BYTES: usize = 12;

/// Size of one color record: three `u8` channels.
pub const COLOR_BYTES: usize = 3;

/// Returns the ASCII header for `cloud`, including the trailing `end_header\n`.
pub fn header(cloud: &PointCloud) -> String {
    let mut header = String::with_capacity(192);
    header.push_str("ply\n");
    header.push_str("format binary_little_endian 1.0\n");
    header.push_str(&format!("element vertex {}\n", cloud.len()));
    header.push_str("property float x\n");
    header.push_str("property float y\n");
    header.push_str("property float z\n");
    if cloud.has_colors() {
        header.push_str("property uchar red\n");
        header.push_str("property uchar green\n");
        header.push_str("property uchar blue\n");
    }
    header.push_str("end_header\n");
    header
}

/// Returns the size of one vertex record in the body.
pub fn record_len(cloud: &PointCloud) -> usize {
    if cloud.has_colors() {
        POSITION_BYTES + COLOR_BYTES
    } else {
        POSITION_BYTES
    }
}

/// Returns the exact number of bytes [`encode`] produces for `cloud`.
pub fn encoded_len(cloud: &PointCloud) -> usize {
    header(cloud).len() + cloud.len() * record_len(cloud)
}

/// Encodes a point cloud as a binary little-endian PLY file.
///
/// Colored clouds interleave position and color per vertex.
pub fn encode(cloud: &PointCloud) -> Vec<u8> {
    let header = header(cloud);
    let mut out = Vec::with_capacity(header.len() + cloud.len() * record_len(cloud));
    out.extend_from_slice(header.as_bytes());

    match cloud.colors() {
        Some(colors) => {
            for (point, color) in cloud.points().iter().zip(colors) {
                push_position(&mut out, point);
                out.extend_from_slice(color);
            }
        }
        None => {
            for point in cloud.points() {
                push_position(&mut out, point);
            }
        }
    }
    out
}

fn push_position(out: &mut Vec<u8>, point: &[f32; 3]) {
    for v in point {
        out.extend_from_slice(&v.to_le_bytes());
    }
}
