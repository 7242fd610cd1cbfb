// ============================================================
// Layer 4 — Batch Preprocessor
// ============================================================
// Completes the shape of an incoming batch so it is always
// (batch, height, width, channels) before it reaches the model:
//
//   (h, w)        → one grayscale image     → (1, h, w, 1)
//   (a, b, c)     → equals the frame shape  → (1, a, b, c)
//                   otherwise               → (a, b, c, 1)
//   (n, h, w, c)  → unchanged
//
// The rank-3 rule cannot tell a batch of grayscale images from a
// single multi-channel frame when both readings produce the same
// dims; the frame reading wins (see the test at the bottom).

use crate::domain::{
    array::HostArray,
    error::{VaeError, VaeResult},
    hyperparams::InputShape,
};

/// Expand `batch` to rank 4 and check it against `shape`.
pub fn expand_batch(batch: HostArray, shape: &InputShape) -> VaeResult<HostArray> {
    let dims = batch.dims().to_vec();
    let expanded = match dims.as_slice() {
        [h, w] => vec![1, *h, *w, 1],
        [a, b, c] if [*a, *b, *c] == shape.dims() => vec![1, *a, *b, *c],
        [n, h, w] => vec![*n, *h, *w, 1],
        [_, _, _, _] => dims.clone(),
        _ => return Err(VaeError::BadRank(dims.len())),
    };

    check_frame_dims(&expanded[1..], shape)?;
    batch.reshape(expanded)
}

/// Stacked batches are (n, k, h, w, c). Anything of lower rank is
/// treated as single frames and gets a stack axis of length 1.
pub fn expand_stacked_batch(batch: HostArray, shape: &InputShape, k: usize) -> VaeResult<HostArray> {
    if batch.rank() == 5 {
        let dims = batch.dims().to_vec();
        if dims[1] != k {
            return Err(VaeError::ShapeMismatch {
                expected: vec![dims[0], k, shape.height, shape.width, shape.channels],
                actual:   dims,
            });
        }
        check_frame_dims(&dims[2..], shape)?;
        return Ok(batch);
    }

    let frames = expand_batch(batch, shape)?;
    let mut dims = frames.dims().to_vec();
    dims.insert(1, 1);
    frames.reshape(dims)
}

fn check_frame_dims(frame: &[usize], shape: &InputShape) -> VaeResult<()> {
    if frame != shape.dims() {
        return Err(VaeError::ShapeMismatch {
            expected: shape.dims().to_vec(),
            actual:   frame.to_vec(),
        });
    }
    Ok(())
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn array(dims: &[usize]) -> HostArray {
        HostArray::zeros(dims.to_vec())
    }

    #[test]
    fn test_single_grayscale_image() {
        let shape = InputShape::new(4, 6, 1);
        let out = expand_batch(array(&[4, 6]), &shape).unwrap();
        assert_eq!(out.dims(), &[1, 4, 6, 1]);
    }

    #[test]
    fn test_single_color_frame() {
        let shape = InputShape::new(4, 6, 3);
        let out = expand_batch(array(&[4, 6, 3]), &shape).unwrap();
        assert_eq!(out.dims(), &[1, 4, 6, 3]);
    }

    #[test]
    fn test_batch_of_grayscale() {
        let shape = InputShape::new(4, 6, 1);
        let out = expand_batch(array(&[10, 4, 6]), &shape).unwrap();
        assert_eq!(out.dims(), &[10, 4, 6, 1]);
    }

    #[test]
    fn test_wrong_frame_size_rejected() {
        let shape = InputShape::new(4, 6, 1);
        let err = expand_batch(array(&[2, 5, 6, 1]), &shape).unwrap_err();
        assert!(matches!(err, VaeError::ShapeMismatch { .. }));
        assert!(matches!(expand_batch(array(&[7]), &shape), Err(VaeError::BadRank(1))));
    }

    #[test]
    fn test_coincident_shapes_read_as_single_frame() {
        // With a 4-channel frame shape of 4x4, a batch of four grayscale
        // 4x4 images also has dims (4, 4, 4). The frame reading wins and
        // the batch is silently taken as one 4-channel frame.
        let shape = InputShape::new(4, 4, 4);
        let out = expand_batch(array(&[4, 4, 4]), &shape).unwrap();
        assert_eq!(out.dims(), &[1, 4, 4, 4]);
    }

    #[test]
    fn test_stacked_batch_checks_k() {
        let shape = InputShape::new(4, 4, 1);
        assert!(expand_stacked_batch(array(&[2, 3, 4, 4, 1]), &shape, 3).is_ok());
        assert!(expand_stacked_batch(array(&[2, 2, 4, 4, 1]), &shape, 3).is_err());

        let single = expand_stacked_batch(array(&[4, 4]), &shape, 3).unwrap();
        assert_eq!(single.dims(), &[1, 1, 4, 4, 1]);
    }
}
