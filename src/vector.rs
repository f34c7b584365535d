//! Dense vector helpers.
//!
//! Parameter vectors, gradients and training directions are plain `[f64]` slices.
//! These helpers keep the training code close to the math it implements.

#[inline]
pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    debug_assert_eq!(a.len(), b.len());

    let mut sum = 0.0_f64;
    for (&x, &y) in a.iter().zip(b) {
        sum = x.mul_add(y, sum);
    }
    sum
}

/// Euclidean norm.
#[inline]
pub fn norm(a: &[f64]) -> f64 {
    dot(a, a).sqrt()
}

/// `y += alpha * x`.
#[inline]
pub fn axpy(alpha: f64, x: &[f64], y: &mut [f64]) {
    debug_assert_eq!(x.len(), y.len());

    for (yi, &xi) in y.iter_mut().zip(x) {
        *yi = alpha.mul_add(xi, *yi);
    }
}

/// Returns `a + alpha * b` as a new vector.
#[inline]
pub fn add_scaled(a: &[f64], alpha: f64, b: &[f64]) -> Vec<f64> {
    let mut out = a.to_vec();
    axpy(alpha, b, &mut out);
    out
}

#[inline]
pub fn scaled(alpha: f64, a: &[f64]) -> Vec<f64> {
    a.iter().map(|&x| alpha * x).collect()
}

#[inline]
pub fn sub(a: &[f64], b: &[f64]) -> Vec<f64> {
    debug_assert_eq!(a.len(), b.len());
    a.iter().zip(b).map(|(&x, &y)| x - y).collect()
}

/// Scales `a` in place to unit Euclidean norm.
///
/// A zero vector is left untouched.
#[inline]
pub fn normalize(a: &mut [f64]) {
    let n = norm(a);
    if n > 0.0 {
        let inv = 1.0 / n;
        for x in a.iter_mut() {
            *x *= inv;
        }
    }
}

/// Unit-norm steepest-descent direction `-gradient / ||gradient||`.
///
/// Returns the zero vector for a zero gradient.
pub fn steepest_descent_direction(gradient: &[f64]) -> Vec<f64> {
    let mut direction: Vec<f64> = gradient.iter().map(|&g| -g).collect();
    normalize(&mut direction);
    direction
}
