use num_traits::Float;

/// Finite-difference step used for the joint-space gradient.
pub const DEFAULT_STEP: f64 = 0.001;

/// Central-difference gradient of `f` at `x`.
///
/// Each coordinate is perturbed on its own by `±step` while every other
/// coordinate keeps its value at `x`, so a gradient costs `2 * N` calls of
/// `f`. The first failing call aborts the whole gradient.
pub fn central_difference<T, E, F, const N: usize>(mut f: F, x: &[T; N], step: T) -> Result<[T; N], E>
where
    T: Float,
    F: FnMut(&[T; N]) -> Result<T, E>,
{
    let two = T::one() + T::one();
    let mut grad = [T::zero(); N];
    let mut shifted = *x;
    for i in 0..N {
        shifted[i] = x[i] + step;
        let forward = f(&shifted)?;
        shifted[i] = x[i] - step;
        let backward = f(&shifted)?;
        shifted[i] = x[i];
        grad[i] = (forward - backward) / (two * step);
    }
    Ok(grad)
}
