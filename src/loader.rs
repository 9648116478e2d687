/*!

CSV ingestion at the edge of the core.

Population tables have `code` and `pop` columns. Rows are handed one at a time to a
`RowConsumer`; a row with a missing or unusable population is skipped with a warning instead of
aborting the load, so one bad line never keeps the other regions off the map. A region whose
population is rejected by the model (zero people) is skipped the same way.

Mobility tables have `origin`, `destination` and `passengers` columns.

*/

use crate::context::Context;
use crate::error::IxaError;
use crate::mobility::{ContextMobilityExt, MobilityRecord};
use crate::region::RowConsumer;
use log::{info, warn};
use serde::Deserialize;
use std::fs::File;
use std::io::Read;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct PopulationRecord {
    code: String,
    #[serde(deserialize_with = "csv::invalid_option")]
    pop: Option<f64>,
}

/// Counts of rows taken and rows skipped by a load.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct LoadSummary {
    pub accepted: usize,
    pub skipped: usize,
}

fn csv_reader<R: Read>(reader: R, columns: &[&str]) -> Result<csv::Reader<R>, IxaError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = reader.headers()?;
    for column in columns {
        if !headers.iter().any(|header| header == *column) {
            return Err(IxaError::invalid_configuration(format!(
                "missing column {column:?} (found {:?})",
                headers.iter().collect::<Vec<_>>()
            )));
        }
    }
    Ok(reader)
}

// A malformed row is skipped; anything else (I/O, UTF-8 framing) aborts the load.
fn is_row_error(error: &csv::Error) -> bool {
    matches!(
        error.kind(),
        csv::ErrorKind::Deserialize { .. } | csv::ErrorKind::UnequalLengths { .. }
    )
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn whole_population(value: Option<f64>) -> Option<u64> {
    match value {
        Some(population) if population.is_finite() && population >= 0.0 => {
            Some(population.round() as u64)
        }
        _ => None,
    }
}

/// Streams population rows from `reader` into `consumer`.
pub fn load_population<R: Read>(
    reader: R,
    consumer: &mut impl RowConsumer,
) -> Result<LoadSummary, IxaError> {
    let mut reader = csv_reader(reader, &["code", "pop"])?;
    let mut summary = LoadSummary::default();

    for (index, row) in reader.deserialize::<PopulationRecord>().enumerate() {
        // Line 1 is the header.
        let line = index + 2;
        let record = match row {
            Ok(record) => record,
            Err(error) if is_row_error(&error) => {
                warn!("skipping population line {line}: {error}");
                summary.skipped += 1;
                continue;
            }
            Err(error) => return Err(error.into()),
        };

        if record.code.is_empty() {
            warn!("skipping population line {line}: empty region code");
            summary.skipped += 1;
            continue;
        }
        let Some(population) = whole_population(record.pop) else {
            warn!("skipping region {} on line {line}: no usable population", record.code);
            summary.skipped += 1;
            continue;
        };

        match consumer.on_row(&record.code, population) {
            Ok(()) => summary.accepted += 1,
            Err(IxaError::InvalidConfiguration(message)) => {
                warn!("skipping population line {line}: {message}");
                summary.skipped += 1;
            }
            Err(error) => return Err(error),
        }
    }

    info!(
        "loaded {} population rows ({} skipped)",
        summary.accepted, summary.skipped
    );
    Ok(summary)
}

pub fn load_population_file(
    path: impl AsRef<Path>,
    consumer: &mut impl RowConsumer,
) -> Result<LoadSummary, IxaError> {
    let path = path.as_ref();
    info!("loading population from {}", path.display());
    load_population(File::open(path)?, consumer)
}

/// Reads mobility rows from `reader` into the context's mobility table.
pub fn load_mobility<R: Read>(context: &mut Context, reader: R) -> Result<LoadSummary, IxaError> {
    let mut reader = csv_reader(reader, &["origin", "destination", "passengers"])?;
    let mut summary = LoadSummary::default();

    for (index, row) in reader.deserialize::<MobilityRecord>().enumerate() {
        match row {
            Ok(record) => {
                context.add_mobility_record(record);
                summary.accepted += 1;
            }
            Err(error) if is_row_error(&error) => {
                warn!("skipping mobility line {}: {error}", index + 2);
                summary.skipped += 1;
            }
            Err(error) => return Err(error.into()),
        }
    }

    info!(
        "loaded {} mobility rows ({} skipped)",
        summary.accepted, summary.skipped
    );
    Ok(summary)
}

pub fn load_mobility_file(
    context: &mut Context,
    path: impl AsRef<Path>,
) -> Result<LoadSummary, IxaError> {
    let path = path.as_ref();
    info!("loading mobility from {}", path.display());
    load_mobility(context, File::open(path)?)
}
