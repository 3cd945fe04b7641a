//! Conversions between ndarray and faer containers.
//!
//! ndarray is the crate's public matrix/vector currency; faer is used for
//! internal products and norms in the solver. ndarray is row-major, faer is
//! column-major, so conversions copy element-wise.

use crate::error::Result;
use faer::{Col, Mat};
use ndarray::{Array1, Array2};

/// Convert an ndarray matrix to a faer matrix.
pub fn ndarray_to_faer(arr: &Array2<f64>) -> Result<Mat<f64>> {
    Ok(Mat::from_fn(arr.nrows(), arr.ncols(), |i, j| arr[[i, j]]))
}

/// Convert a faer matrix to an ndarray matrix.
pub fn faer_to_ndarray(mat: &Mat<f64>) -> Result<Array2<f64>> {
    Ok(Array2::from_shape_fn(
        (mat.nrows(), mat.ncols()),
        |(i, j)| *mat.get(i, j),
    ))
}

/// Convert an ndarray vector to a faer column vector.
pub fn ndarray_vec_to_faer(arr: &Array1<f64>) -> Result<Col<f64>> {
    Ok(Col::from_fn(arr.len(), |i| arr[i]))
}

/// Convert a faer column vector to an ndarray vector.
pub fn faer_vec_to_ndarray(col: &Col<f64>) -> Result<Array1<f64>> {
    Ok(Array1::from_shape_fn(col.nrows(), |i| *col.get(i)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array1};

    #[test]
    fn test_matrix_round_trip() {
        let arr = array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]];
        let mat = ndarray_to_faer(&arr).unwrap();

        assert_eq!(mat.nrows(), 2);
        assert_eq!(mat.ncols(), 3);
        assert_eq!(*mat.get(1, 2), 6.0);

        let back = faer_to_ndarray(&mat).unwrap();
        assert_eq!(back, arr);
    }

    #[test]
    fn test_vector_round_trip() {
        let arr: Array1<f64> = array![1.0, -2.5, 4.0];
        let col = ndarray_vec_to_faer(&arr).unwrap();

        assert_eq!(col.nrows(), 3);
        assert_eq!(*col.get(1), -2.5);

        let back = faer_vec_to_ndarray(&col).unwrap();
        assert_eq!(back, arr);
    }
}
