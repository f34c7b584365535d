//! Dense matrix-vector kernel behind [`crate::Matrix::mul_vec`].
//!
//! The inverse Hessian approximation is applied to the gradient once per epoch.
//! By default this is a plain dot-product loop; the `matrixmultiply` feature routes
//! it through `dgemm` with `x` and `y` treated as single-column matrices.

/// `y = A x` for a row-major `A` of shape `(rows, cols)`.
///
/// `y` is overwritten.
#[inline]
pub(crate) fn gemv_row_major(rows: usize, cols: usize, a: &[f64], x: &[f64], y: &mut [f64]) {
    debug_assert_eq!(a.len(), rows * cols);
    debug_assert_eq!(x.len(), cols);
    debug_assert_eq!(y.len(), rows);

    if rows == 0 {
        return;
    }
    if cols == 0 {
        y.fill(0.0);
        return;
    }

    #[cfg(feature = "matrixmultiply")]
    {
        // SAFETY: `a` holds `rows * cols` elements addressed with strides `(cols, 1)`,
        // `x` holds `cols` and `y` holds `rows` elements with unit row stride. `y` is
        // exclusively borrowed and does not alias `a` or `x`.
        unsafe {
            matrixmultiply::dgemm(
                rows,
                cols,
                1,
                1.0,
                a.as_ptr(),
                cols as isize,
                1,
                x.as_ptr(),
                1,
                1,
                0.0,
                y.as_mut_ptr(),
                1,
                1,
            );
        }
    }

    #[cfg(not(feature = "matrixmultiply"))]
    for (row, out) in a.chunks_exact(cols).zip(y.iter_mut()) {
        *out = row
            .iter()
            .zip(x)
            .fold(0.0_f64, |acc, (&aij, &xj)| aij.mul_add(xj, acc));
    }
}
