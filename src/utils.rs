use crate::errors::{TrellisError, TrellisResult};

/// Right-aligned broadcast of two dimension lists.
/// Matching dimensions must be equal or one must be 1; the result takes
/// the maximum.
pub fn broadcast_shapes(lhs: &[usize], rhs: &[usize]) -> TrellisResult<Vec<usize>> {
    let rank = lhs.len().max(rhs.len());
    let mut out = vec![0; rank];
    for i in 0..rank {
        let l = if i < rank - lhs.len() { 1 } else { lhs[i - (rank - lhs.len())] };
        let r = if i < rank - rhs.len() { 1 } else { rhs[i - (rank - rhs.len())] };
        if l != r && l != 1 && r != 1 {
            return Err(TrellisError::BroadcastMismatch {
                lhs: lhs.to_vec(),
                rhs: rhs.to_vec(),
            });
        }
        out[i] = l.max(r);
    }
    Ok(out)
}

/// Maps a possibly-negative axis into `0..rank`.
pub fn normalize_axis(axis: i64, rank: usize) -> TrellisResult<usize> {
    let adjusted = if axis < 0 { axis + rank as i64 } else { axis };
    if adjusted < 0 || adjusted >= rank as i64 {
        return Err(TrellisError::AxisOutOfRange { axis, rank });
    }
    Ok(adjusted as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broadcast_pads_left_with_ones() {
        assert_eq!(broadcast_shapes(&[3, 4], &[2, 1, 4]).unwrap(), vec![2, 3, 4]);
        assert_eq!(broadcast_shapes(&[], &[5]).unwrap(), vec![5]);
    }

    #[test]
    fn broadcast_takes_maximum() {
        assert_eq!(
            broadcast_shapes(&[4, 1, 6], &[1, 7, 1]).unwrap(),
            vec![4, 7, 6]
        );
    }

    #[test]
    fn broadcast_rejects_mismatch() {
        assert!(broadcast_shapes(&[3, 4], &[2, 4]).is_err());
    }

    #[test]
    fn negative_axis_wraps() {
        assert_eq!(normalize_axis(-1, 3).unwrap(), 2);
        assert_eq!(normalize_axis(0, 3).unwrap(), 0);
        assert!(normalize_axis(3, 3).is_err());
        assert!(normalize_axis(-4, 3).is_err());
    }
}
