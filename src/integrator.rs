/*!

A fixed-step classical fourth-order Runge-Kutta solver for first-order ODE systems
`dy/dt = f(t, y)`.

The step is constant for the whole run: there is no adaptive step control and no error
estimate, so callers choose a step small enough for the accuracy they need. Identical inputs
always produce bit-identical output.

*/

use crate::error::IxaError;

// Absorbs floating point noise when deciding how many whole steps fit into an interval.
const STEP_COUNT_EPSILON: f64 = 1e-9;

/// How the interval is divided into steps.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Steps {
    /// A fixed step size. The number of steps is the number of whole steps that fit into the
    /// interval; the last sample lands on `t0 + n * size`.
    Size(f64),
    /// A fixed number of equal steps spanning the interval exactly.
    Count(usize),
}

impl Steps {
    /// Resolves to `(step_size, step_count)` for the interval `[t0, t1]`.
    pub fn resolve(self, t0: f64, t1: f64) -> Result<(f64, usize), IxaError> {
        if !(t0.is_finite() && t1.is_finite()) || t1 <= t0 {
            return Err(IxaError::invalid_configuration(format!(
                "integration interval [{t0}, {t1}] is empty"
            )));
        }
        let span = t1 - t0;

        match self {
            Steps::Size(size) => {
                if !size.is_finite() || size <= 0.0 {
                    return Err(IxaError::invalid_configuration(format!(
                        "step size must be positive, got {size}"
                    )));
                }
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let count = (span / size + STEP_COUNT_EPSILON).floor() as usize;
                if count == 0 {
                    return Err(IxaError::invalid_configuration(format!(
                        "step size {size} is larger than the interval length {span}"
                    )));
                }
                Ok((size, count))
            }
            Steps::Count(0) => Err(IxaError::invalid_configuration("step count must be at least 1")),
            #[allow(clippy::cast_precision_loss)]
            Steps::Count(count) => Ok((span / count as f64, count)),
        }
    }
}

/// Integrates `derivative` from `y0` over `interval`, returning the state at every step
/// boundary. The first element is `y0` itself, so the output has `step_count + 1` entries.
///
/// Fails with `InvalidConfiguration` if the interval is empty, the step is unusable, or
/// `derivative` returns a vector whose length differs from `y0`.
pub fn integrate<F>(
    derivative: F,
    y0: &[f64],
    interval: (f64, f64),
    steps: Steps,
) -> Result<Vec<Vec<f64>>, IxaError>
where
    F: Fn(f64, &[f64]) -> Vec<f64>,
{
    let (t0, t1) = interval;
    let (h, count) = steps.resolve(t0, t1)?;

    let mut trajectory = Vec::with_capacity(count + 1);
    trajectory.push(y0.to_vec());

    let mut y = y0.to_vec();
    for n in 0..count {
        #[allow(clippy::cast_precision_loss)]
        let t = t0 + n as f64 * h;
        y = rk4_step(&derivative, t, &y, h)?;
        trajectory.push(y.clone());
    }

    Ok(trajectory)
}

/// Advances `y` by one step of size `h` from time `t`.
pub fn rk4_step<F>(derivative: &F, t: f64, y: &[f64], h: f64) -> Result<Vec<f64>, IxaError>
where
    F: Fn(f64, &[f64]) -> Vec<f64>,
{
    let half = h / 2.0;

    let k1 = evaluate(derivative, t, y)?;
    let k2 = evaluate(derivative, t + half, &offset(y, &k1, half))?;
    let k3 = evaluate(derivative, t + half, &offset(y, &k2, half))?;
    let k4 = evaluate(derivative, t + h, &offset(y, &k3, h))?;

    Ok(y.iter()
        .enumerate()
        .map(|(i, yi)| yi + h / 6.0 * (k1[i] + 2.0 * k2[i] + 2.0 * k3[i] + k4[i]))
        .collect())
}

fn evaluate<F>(derivative: &F, t: f64, y: &[f64]) -> Result<Vec<f64>, IxaError>
where
    F: Fn(f64, &[f64]) -> Vec<f64>,
{
    let dy = derivative(t, y);
    if dy.len() != y.len() {
        return Err(IxaError::invalid_configuration(format!(
            "derivative returned {} components for a state of arity {}",
            dy.len(),
            y.len()
        )));
    }
    Ok(dy)
}

fn offset(y: &[f64], slope: &[f64], scale: f64) -> Vec<f64> {
    y.iter().zip(slope).map(|(yi, ki)| yi + scale * ki).collect()
}
