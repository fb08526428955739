use ndarray::Array4;

use crate::engine::EngineError;
use crate::image_impl::Mat;

const MEAN_VALUE: f32 = 127.5;
const SCALE_VALUE: f32 = 127.5;

/// Builds the `[1, 3, H, W]` network input from an image.
///
/// Planes follow the byte order of the source pixels (blue, green, red) and
/// every value is mapped with `(v - 127.5) / 127.5`. Alpha is dropped; a
/// single-channel image is broadcast to all three planes.
pub fn to_tensor(img: &Mat) -> Result<Array4<f32>, EngineError> {
    if img.empty() {
        return Err(EngineError::EmptyImage);
    }

    let h = img.rows() as usize;
    let w = img.cols() as usize;
    let channels = img.channels() as usize;
    let plane = h * w;

    let mut values = vec![0.0f32; 3 * plane];
    let (b_plane, rest) = values.split_at_mut(plane);
    let (g_plane, r_plane) = rest.split_at_mut(plane);

    match channels {
        1 => {
            for (i, &v) in img.as_bytes().iter().enumerate() {
                let n = (v as f32 - MEAN_VALUE) / SCALE_VALUE;
                b_plane[i] = n;
                g_plane[i] = n;
                r_plane[i] = n;
            }
        }
        3 | 4 => {
            for (i, pix) in img.as_bytes().chunks_exact(channels).enumerate() {
                b_plane[i] = (pix[0] as f32 - MEAN_VALUE) / SCALE_VALUE;
                g_plane[i] = (pix[1] as f32 - MEAN_VALUE) / SCALE_VALUE;
                r_plane[i] = (pix[2] as f32 - MEAN_VALUE) / SCALE_VALUE;
            }
        }
        other => return Err(EngineError::UnsupportedChannels(other as u8)),
    }

    Array4::from_shape_vec((1, 3, h, w), values)
        .map_err(|e| EngineError::InvalidBuffer(e.to_string()))
}

fn align_up(size: u32, alignment: u32) -> u32 {
    if alignment > 1 && size % alignment != 0 {
        size + (alignment - size % alignment)
    } else {
        size
    }
}

/// Grows each dimension to the next multiple of `alignment`.
pub fn align_to_multiple(img: &Mat, alignment: u32) -> Mat {
    if img.empty() {
        return img.clone();
    }

    let dst_w = align_up(img.cols(), alignment);
    let dst_h = align_up(img.rows(), alignment);
    if dst_w == img.cols() && dst_h == img.rows() {
        return img.clone();
    }

    img.resize(dst_w, dst_h)
}

/// Resizes to `target_height`, keeping the aspect ratio.
pub fn scale_to_height(img: &Mat, target_height: u32) -> Result<Mat, EngineError> {
    if img.empty() || target_height == 0 {
        return Err(EngineError::EmptyImage);
    }

    let scale = target_height as f64 / img.rows() as f64;
    let new_w = ((img.cols() as f64 * scale).round() as u32).max(1);
    Ok(img.resize(new_w, target_height))
}
