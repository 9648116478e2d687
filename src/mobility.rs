/*!

Air-travel volumes between regions.

The table is loaded alongside the population data and can be queried, but the epidemic model
treats every region independently: nothing here feeds the differential equations.

*/

use crate::context::{Context, DataPlugin};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MobilityRecord {
    pub origin: String,
    pub destination: String,
    pub passengers: f64,
}

struct MobilityData {
    records: Vec<MobilityRecord>,
}

impl DataPlugin for MobilityData {
    #[allow(non_upper_case_globals)]
    const new: &'static dyn Fn() -> Self = &|| MobilityData { records: Vec::new() };
}

pub trait ContextMobilityExt {
    fn add_mobility_record(&mut self, record: MobilityRecord);

    fn mobility_records(&self) -> &[MobilityRecord];

    /// Total passengers leaving `code` across every recorded route.
    fn outbound_passengers(&self, code: &str) -> f64;
}

impl ContextMobilityExt for Context {
    fn add_mobility_record(&mut self, record: MobilityRecord) {
        self.get_data_container_mut::<MobilityData>()
            .records
            .push(record);
    }

    fn mobility_records(&self) -> &[MobilityRecord] {
        self.get_data_container::<MobilityData>()
            .map(|mobility| mobility.records.as_slice())
            .unwrap_or_default()
    }

    fn outbound_passengers(&self, code: &str) -> f64 {
        self.mobility_records()
            .iter()
            .filter(|record| record.origin == code)
            .map(|record| record.passengers)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(origin: &str, destination: &str, passengers: f64) -> MobilityRecord {
        MobilityRecord {
            origin: origin.to_string(),
            destination: destination.to_string(),
            passengers,
        }
    }

    #[test]
    fn records_are_queryable() {
        let mut context = Context::new();
        assert!(context.mobility_records().is_empty());

        context.add_mobility_record(route("GBR", "USA", 1200.0));
        context.add_mobility_record(route("GBR", "FRA", 800.0));
        context.add_mobility_record(route("USA", "GBR", 1100.0));

        assert_eq!(context.mobility_records().len(), 3);
        assert_eq!(context.outbound_passengers("GBR"), 2000.0);
        assert_eq!(context.outbound_passengers("FRA"), 0.0);
    }
}
