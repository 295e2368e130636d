//! Nearest-neighbour resampling with `[0, 1]` normalization

use camera_capture::{Frame, PixelFormat};
use thiserror::Error;

/// Resampler error types
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PreprocessError {
    #[error("Resampler needs a grayscale frame, got {0:?}")]
    NotGrayscale(PixelFormat),

    #[error("Image dimensions must be non-zero (source {src_w}x{src_h}, destination {dst_w}x{dst_h})")]
    EmptyDimensions {
        src_w: usize,
        src_h: usize,
        dst_w: usize,
        dst_h: usize,
    },

    #[error("Source holds {actual} bytes, {expected} needed")]
    SourceLength { expected: usize, actual: usize },

    #[error("Destination holds {actual} samples, {expected} needed")]
    DestinationLength { expected: usize, actual: usize },
}

/// Resample a row-major 8-bit grayscale image into `dst`.
///
/// `dst[y * dst_w + x] = src[floor(y * src_h / dst_h) * src_w + floor(x * src_w / dst_w)] / 255`
pub fn resample_normalize(
    src: &[u8],
    src_w: usize,
    src_h: usize,
    dst: &mut [f32],
    dst_w: usize,
    dst_h: usize,
) -> Result<(), PreprocessError> {
    if src_w == 0 || src_h == 0 || dst_w == 0 || dst_h == 0 {
        return Err(PreprocessError::EmptyDimensions {
            src_w,
            src_h,
            dst_w,
            dst_h,
        });
    }
    let expected = src_w * src_h;
    if src.len() < expected {
        return Err(PreprocessError::SourceLength {
            expected,
            actual: src.len(),
        });
    }
    let expected = dst_w * dst_h;
    if dst.len() != expected {
        return Err(PreprocessError::DestinationLength {
            expected,
            actual: dst.len(),
        });
    }

    for (y, row) in dst.chunks_exact_mut(dst_w).enumerate() {
        let src_row = &src[(y * src_h / dst_h) * src_w..][..src_w];
        for (x, out) in row.iter_mut().enumerate() {
            *out = src_row[x * src_w / dst_w] as f32 / 255.0;
        }
    }
    Ok(())
}

/// Resample a grayscale camera frame into a `dst_w x dst_h` tensor
pub fn resample_frame(frame: &Frame, dst: &mut [f32], dst_w: usize, dst_h: usize) -> Result<(), PreprocessError> {
    if frame.format() != PixelFormat::Grayscale {
        return Err(PreprocessError::NotGrayscale(frame.format()));
    }
    resample_normalize(
        frame.data(),
        frame.width() as usize,
        frame.height() as usize,
        dst,
        dst_w,
        dst_h,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_downsample_picks_floor_coordinates() {
        #[rustfmt::skip]
        let src = [
            0, 10, 20, 30,
            40, 50, 60, 70,
            80, 90, 100, 110,
            120, 130, 140, 150,
        ];
        let mut dst = [0.0f32; 4];
        resample_normalize(&src, 4, 4, &mut dst, 2, 2).unwrap();
        assert_eq!(dst, [0.0, 20.0 / 255.0, 80.0 / 255.0, 100.0 / 255.0]);
    }

    #[test]
    fn test_upsample_repeats_pixels() {
        let src = [0, 255];
        let mut dst = [0.5f32; 4];
        resample_normalize(&src, 2, 1, &mut dst, 4, 1).unwrap();
        assert_eq!(dst, [0.0, 0.0, 1.0, 1.0]);
    }

    #[test]
    fn test_mid_gray_frame() {
        let frame = Frame::grayscale(vec![128; 96 * 96], 96, 96).unwrap();
        let mut dst = vec![0.0f32; 32 * 32];
        resample_frame(&frame, &mut dst, 32, 32).unwrap();
        assert!(dst.iter().all(|&v| v == 128.0 / 255.0));
    }

    #[test]
    fn test_rejects_jpeg_frame() {
        let frame = Frame::jpeg(vec![0xFF, 0xD8], 2, 1);
        let mut dst = [0.0f32; 1];
        assert_eq!(
            resample_frame(&frame, &mut dst, 1, 1),
            Err(PreprocessError::NotGrayscale(PixelFormat::Jpeg))
        );
    }

    #[test]
    fn test_rejects_bad_lengths() {
        let mut dst = [0.0f32; 4];
        assert!(matches!(
            resample_normalize(&[0; 3], 2, 2, &mut dst, 2, 2),
            Err(PreprocessError::SourceLength { expected: 4, actual: 3 })
        ));
        assert!(matches!(
            resample_normalize(&[0; 4], 2, 2, &mut dst, 3, 1),
            Err(PreprocessError::DestinationLength { expected: 3, actual: 4 })
        ));
        assert!(matches!(
            resample_normalize(&[], 0, 2, &mut dst, 2, 2),
            Err(PreprocessError::EmptyDimensions { .. })
        ));
    }

    proptest! {
        #[test]
        fn prop_matches_nearest_neighbour_formula(
            (src_w, src_h, src) in (1usize..48, 1usize..48)
                .prop_flat_map(|(w, h)| (Just(w), Just(h), prop::collection::vec(any::<u8>(), w * h))),
            dst_w in 1usize..40,
            dst_h in 1usize..40,
        ) {
            let mut dst = vec![-1.0f32; dst_w * dst_h];
            resample_normalize(&src, src_w, src_h, &mut dst, dst_w, dst_h).unwrap();

            for y in 0..dst_h {
                for x in 0..dst_w {
                    let value = dst[y * dst_w + x];
                    prop_assert!((0.0..=1.0).contains(&value));
                    let expected = src[(y * src_h / dst_h) * src_w + x * src_w / dst_w] as f32 / 255.0;
                    prop_assert_eq!(value, expected);
                }
            }
        }
    }
}
