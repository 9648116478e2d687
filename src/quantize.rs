/*!

Maps infected counts to a discrete color palette for choropleth rendering.

The domain `[0, max_expected_infected]` is split into as many equal-width buckets as the palette
has colors. Values outside the domain clamp to the first or last bucket. Regions without data get
a neutral color rather than a bucket.

*/

use crate::error::IxaError;

/// Nine sequential purples, light to dark.
pub const PURPLES: [&str; 9] = [
    "#fcfbfd", "#efedf5", "#dadaeb", "#bcbddc", "#9e9ac8", "#807dba", "#6a51a3", "#54278f",
    "#3f007d",
];

pub const NO_DATA_COLOR: &str = "#ffffff";

pub const DEFAULT_MAX_EXPECTED_INFECTED: f64 = 10_000.0;

#[derive(Clone, Debug, PartialEq)]
pub struct QuantizeScale {
    max: f64,
    palette: Vec<String>,
}

impl Default for QuantizeScale {
    fn default() -> Self {
        QuantizeScale {
            max: DEFAULT_MAX_EXPECTED_INFECTED,
            palette: PURPLES.iter().map(ToString::to_string).collect(),
        }
    }
}

impl QuantizeScale {
    pub fn new(max_expected_infected: f64, palette: Vec<String>) -> Result<Self, IxaError> {
        if !max_expected_infected.is_finite() || max_expected_infected <= 0.0 {
            return Err(IxaError::invalid_configuration(format!(
                "color scale maximum must be positive, got {max_expected_infected}"
            )));
        }
        if palette.is_empty() {
            return Err(IxaError::invalid_configuration("color palette is empty"));
        }
        Ok(QuantizeScale {
            max: max_expected_infected,
            palette,
        })
    }

    #[must_use]
    pub fn bucket_count(&self) -> usize {
        self.palette.len()
    }

    /// The bucket index for `value`.
    #[must_use]
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn bucket(&self, value: u64) -> usize {
        let buckets = self.palette.len();
        let position = (value as f64 * buckets as f64 / self.max).floor();
        (position.max(0.0) as usize).min(buckets - 1)
    }

    /// The color for a value, or `NO_DATA_COLOR` for a region without data.
    #[must_use]
    pub fn color(&self, value: Option<u64>) -> &str {
        value.map_or(NO_DATA_COLOR, |value| self.palette[self.bucket(value)].as_str())
    }
}
