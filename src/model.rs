/*!

The three-compartment (SIR) epidemic model.

The differential system is defined over population *fractions*:

```text
dS/dt = -beta * S * I
dI/dt =  beta * S * I - gamma * I
dR/dt =  gamma * I
```

A run starts from exactly one infected person, `I(0) = 1 / population`, integrates over
`[0, horizon]` with a fixed step, and converts each fraction back to a whole number of people.

A population of one is accepted: the single person starts infected and there is no susceptible
pool, so the trajectory is degenerate but well defined.

*/

use crate::error::IxaError;
use crate::integrator::{integrate, Steps};
use log::debug;
use serde::{Deserialize, Serialize};

const SUSCEPTIBLE: usize = 0;
const INFECTED: usize = 1;
const RECOVERED: usize = 2;

/// The parameters shared by every region in a session. A `SimulationRequest` is this policy
/// applied to one region's population.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelPolicy {
    /// Transmission rate
    pub beta: f64,
    /// Recovery rate
    pub gamma: f64,
    /// Total simulated time units
    pub horizon: f64,
    /// Integration step size
    pub step: f64,
}

impl Default for ModelPolicy {
    fn default() -> Self {
        ModelPolicy {
            beta: 0.2,
            gamma: 0.1,
            horizon: 100.0,
            step: 1.0,
        }
    }
}

impl ModelPolicy {
    #[must_use]
    pub fn request(&self, population: u64) -> SimulationRequest {
        SimulationRequest {
            beta: self.beta,
            gamma: self.gamma,
            population,
            horizon: self.horizon,
            step: self.step,
        }
    }

    /// Checks everything except the population, which is only known per region.
    pub fn validate(&self) -> Result<(), IxaError> {
        check_positive("beta", self.beta)?;
        check_positive("gamma", self.gamma)?;
        check_positive("horizon", self.horizon)?;
        check_positive("step", self.step)?;
        if self.step > self.horizon {
            return Err(IxaError::invalid_configuration(format!(
                "step {} exceeds horizon {}",
                self.step, self.horizon
            )));
        }
        Ok(())
    }

    /// The last valid time index, `horizon / step` in whole steps.
    pub fn last_tick(&self) -> Result<usize, IxaError> {
        self.validate()?;
        let (_, count) = Steps::Size(self.step).resolve(0.0, self.horizon)?;
        Ok(count)
    }
}

fn check_positive(name: &str, value: f64) -> Result<(), IxaError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(IxaError::invalid_configuration(format!(
            "{name} must be a positive number, got {value}"
        )))
    }
}

/// Inputs to one model run.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimulationRequest {
    pub beta: f64,
    pub gamma: f64,
    pub population: u64,
    pub horizon: f64,
    pub step: f64,
}

impl SimulationRequest {
    pub fn validate(&self) -> Result<(), IxaError> {
        if self.population < 1 {
            return Err(IxaError::invalid_configuration(
                "population must be at least 1",
            ));
        }
        self.policy().validate()
    }

    #[must_use]
    pub fn policy(&self) -> ModelPolicy {
        ModelPolicy {
            beta: self.beta,
            gamma: self.gamma,
            horizon: self.horizon,
            step: self.step,
        }
    }

    /// The initial state as population fractions `[S, I, R]`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn initial_state(&self) -> [f64; 3] {
        let infected = 1.0 / self.population as f64;
        [1.0 - infected, infected, 0.0]
    }
}

/// The right-hand side of the SIR system over population fractions `y = [S, I, R]`.
pub fn sir_derivative(beta: f64, gamma: f64) -> impl Fn(f64, &[f64]) -> Vec<f64> {
    move |_t, y| {
        let force = beta * y[SUSCEPTIBLE] * y[INFECTED];
        let recovery = gamma * y[INFECTED];
        vec![-force, force - recovery, recovery]
    }
}

/// Runs the model for one request.
pub fn simulate(request: &SimulationRequest) -> Result<SimulationResult, IxaError> {
    request.validate()?;
    if request.population == 1 {
        debug!("population of 1 produces a degenerate trajectory with no susceptible pool");
    }

    let trajectory = integrate(
        sir_derivative(request.beta, request.gamma),
        &request.initial_state(),
        (0.0, request.horizon),
        Steps::Size(request.step),
    )?;
    check_stable(&trajectory, request.step)?;

    Ok(SimulationResult::from_fractions(&trajectory, request.population))
}

/// How far a fraction may stray outside `[0, 1]` before the run counts as unstable.
const FRACTION_TOLERANCE: f64 = 1e-6;

/// Rejects a trajectory that left the unit interval: RK4 with a step too coarse for the rates
/// overshoots and diverges.
fn check_stable(trajectory: &[Vec<f64>], step: f64) -> Result<(), IxaError> {
    let in_range = |fraction: &f64| {
        fraction.is_finite()
            && (-FRACTION_TOLERANCE..=1.0 + FRACTION_TOLERANCE).contains(fraction)
    };
    match trajectory
        .iter()
        .position(|state| !state.iter().all(in_range))
    {
        None => Ok(()),
        Some(index) => Err(IxaError::invalid_configuration(format!(
            "step {step} too large for a stable integration (diverged at step {index})"
        ))),
    }
}

/// The output of one run: whole-person counts per compartment, indexed by time step.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SimulationResult {
    population: u64,
    susceptible: Vec<u64>,
    infected: Vec<u64>,
    recovered: Vec<u64>,
}

impl SimulationResult {
    fn from_fractions(trajectory: &[Vec<f64>], population: u64) -> Self {
        let column = |compartment: usize| -> Vec<u64> {
            trajectory
                .iter()
                .map(|y| to_count(y[compartment], population))
                .collect()
        };

        SimulationResult {
            population,
            susceptible: column(SUSCEPTIBLE),
            infected: column(INFECTED),
            recovered: column(RECOVERED),
        }
    }

    #[must_use]
    pub fn population(&self) -> u64 {
        self.population
    }

    #[must_use]
    pub fn susceptible(&self) -> &[u64] {
        &self.susceptible
    }

    #[must_use]
    pub fn infected(&self) -> &[u64] {
        &self.infected
    }

    #[must_use]
    pub fn recovered(&self) -> &[u64] {
        &self.recovered
    }

    /// Number of time indices in each series.
    #[must_use]
    pub fn len(&self) -> usize {
        self.infected.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.infected.is_empty()
    }

    #[must_use]
    pub fn infected_at(&self, tick: usize) -> Option<u64> {
        self.infected.get(tick).copied()
    }
}

#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn to_count(fraction: f64, population: u64) -> u64 {
    (fraction * population as f64).round().max(0.0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(beta: f64, gamma: f64, population: u64, horizon: f64, step: f64) -> SimulationRequest {
        SimulationRequest { beta, gamma, population, horizon, step }
    }

    fn assert_conserved(result: &SimulationResult) {
        let population = result.population();
        for t in 0..result.len() {
            let total = result.susceptible()[t] + result.infected()[t] + result.recovered()[t];
            assert!(total.abs_diff(population) <= 1, "t = {t}: {total} vs {population}");
        }
    }

    #[test]
    fn reference_scenario() {
        let result = simulate(&request(0.2, 0.1, 1000, 100.0, 10.0)).unwrap();

        assert_eq!(result.len(), 11);
        assert_eq!(result.infected(), &[1, 3, 7, 19, 45, 91, 140, 153, 126, 87, 54]);
        let total = result.susceptible()[9] + result.infected()[9] + result.recovered()[9];
        assert!(total.abs_diff(1000) <= 1);
        assert_conserved(&result);
    }

    #[test]
    fn initial_condition_is_one_case() {
        for population in [2, 10, 1000, 7_000_000] {
            let result = simulate(&request(0.3, 0.1, population, 50.0, 1.0)).unwrap();
            assert_eq!(result.infected()[0], 1);
            assert_eq!(result.susceptible()[0], population - 1);
            assert_eq!(result.recovered()[0], 0);
        }
    }

    #[test]
    fn population_is_conserved() {
        for (beta, gamma) in [(0.2, 0.1), (0.5, 0.1), (0.1, 0.2), (1.5, 0.3)] {
            for population in [1, 2, 97, 1000, 10_000, 3_500_000] {
                let result = simulate(&request(beta, gamma, population, 200.0, 1.0)).unwrap();
                assert_conserved(&result);
            }
        }
    }

    #[test]
    fn recovered_never_decreases() {
        for (beta, gamma) in [(0.2, 0.1), (0.1, 0.2), (0.9, 0.05)] {
            let result = simulate(&request(beta, gamma, 50_000, 150.0, 0.5)).unwrap();
            assert!(result.recovered().windows(2).all(|w| w[0] <= w[1]));
        }
    }

    #[test]
    fn outbreak_grows_above_threshold() {
        let result = simulate(&request(0.2, 0.1, 1000, 100.0, 1.0)).unwrap();
        let infected = result.infected();
        let peak = infected
            .iter()
            .enumerate()
            .max_by_key(|(_, count)| **count)
            .map(|(t, _)| t)
            .unwrap();

        assert!(infected[peak] > infected[0]);
        assert!(peak < infected.len() - 1);
        assert!(*infected.last().unwrap() < infected[peak]);
    }

    #[test]
    fn outbreak_dies_out_below_threshold() {
        let result = simulate(&request(0.1, 0.2, 1000, 100.0, 1.0)).unwrap();
        assert!(result.infected().windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn single_person_is_degenerate_but_valid() {
        let result = simulate(&request(0.2, 0.1, 1, 100.0, 1.0)).unwrap();
        assert_eq!(result.susceptible()[0], 0);
        assert_eq!(result.infected()[0], 1);
        assert!(result.susceptible().iter().all(|&s| s == 0));
        assert_conserved(&result);
    }

    #[test]
    fn invalid_requests_fail_fast() {
        let invalid = [
            request(0.2, 0.1, 0, 100.0, 1.0),
            request(0.0, 0.1, 100, 100.0, 1.0),
            request(0.2, -0.1, 100, 100.0, 1.0),
            request(0.2, 0.1, 100, 0.0, 1.0),
            request(0.2, 0.1, 100, 100.0, 0.0),
            request(0.2, 0.1, 100, 100.0, 200.0),
            request(f64::NAN, 0.1, 100, 100.0, 1.0),
        ];
        for request in invalid {
            assert!(
                matches!(simulate(&request), Err(IxaError::InvalidConfiguration(_))),
                "{request:?}"
            );
        }
    }

    #[test]
    fn coarse_steps_that_diverge_are_rejected() {
        for request in [request(2.0, 0.1, 1000, 100.0, 5.0), request(1.0, 0.1, 1000, 100.0, 10.0)] {
            let error = simulate(&request).unwrap_err();
            assert!(
                matches!(&error, IxaError::InvalidConfiguration(message) if message.contains("stable")),
                "{error}"
            );
        }
        // The same rates integrate cleanly with a finer step.
        let result = simulate(&request(2.0, 0.1, 1000, 100.0, 0.5)).unwrap();
        assert_conserved(&result);
    }

    #[test]
    fn last_tick_matches_series_length() {
        let policy = ModelPolicy { horizon: 100.0, step: 10.0, ..ModelPolicy::default() };
        let result = simulate(&policy.request(500)).unwrap();
        assert_eq!(policy.last_tick().unwrap(), result.len() - 1);
        assert_eq!(ModelPolicy::default().last_tick().unwrap(), 100);
    }
}
