//! Frame feature extraction

use super::detector::DetectionResult;
use ndarray::Array1;

/// Points in one hand
pub const LANDMARK_COUNT: usize = 21;

/// Values in one feature vector (x, y, z per point)
pub const FEATURE_LEN: usize = LANDMARK_COUNT * 3;

/// Flattened right-hand pose for one frame
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector([f64; FEATURE_LEN]);

impl FeatureVector {
    /// The "no hand" vector
    pub fn zeros() -> Self {
        Self([0.0; FEATURE_LEN])
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|v| *v == 0.0)
    }

    pub fn to_array(&self) -> Array1<f64> {
        Array1::from(self.0.to_vec())
    }
}

/// Flatten the right-hand landmarks as `x0, y0, z0, x1, y1, z1, ...`.
///
/// Returns all zeros when no right hand was detected. Extra points are
/// ignored and missing ones stay zero.
pub fn extract(result: &DetectionResult) -> FeatureVector {
    let mut features = FeatureVector::zeros();
    if let Some(points) = &result.right_hand_landmarks {
        for (slot, point) in features.0.chunks_exact_mut(3).zip(points) {
            slot.copy_from_slice(&[point.x, point.y, point.z]);
        }
    }
    features
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Landmark;

    fn hand(count: usize) -> Vec<Landmark> {
        (0..count)
            .map(|i| Landmark {
                x: i as f64,
                y: i as f64 + 0.1,
                z: -(i as f64),
            })
            .collect()
    }

    #[test]
    fn test_full_hand_is_flattened_point_major() {
        let result = DetectionResult {
            right_hand_landmarks: Some(hand(21)),
            ..Default::default()
        };
        let features = extract(&result);

        assert_eq!(features.as_slice().len(), FEATURE_LEN);
        for i in 0..LANDMARK_COUNT {
            let point = &features.as_slice()[i * 3..i * 3 + 3];
            assert_eq!(point, &[i as f64, i as f64 + 0.1, -(i as f64)]);
        }
    }

    #[test]
    fn test_no_right_hand_is_all_zero() {
        let result = DetectionResult {
            left_hand_landmarks: Some(hand(21)),
            ..Default::default()
        };
        let features = extract(&result);
        assert_eq!(features, FeatureVector::zeros());
        assert!(features.is_zero());
        assert_eq!(extract(&DetectionResult::default()).as_slice(), &[0.0; FEATURE_LEN]);
    }

    #[test]
    fn test_short_hand_is_zero_padded() {
        let result = DetectionResult {
            right_hand_landmarks: Some(hand(2)),
            ..Default::default()
        };
        let features = extract(&result);
        assert_eq!(&features.as_slice()[..6], &[0.0, 0.1, 0.0, 1.0, 1.1, -1.0]);
        assert!(features.as_slice()[6..].iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_to_array() {
        let features = extract(&DetectionResult {
            right_hand_landmarks: Some(hand(21)),
            ..Default::default()
        });
        let array = features.to_array();
        assert_eq!(array.len(), FEATURE_LEN);
        assert_eq!(array[3], 1.0);
    }
}
