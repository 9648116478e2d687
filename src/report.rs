/*!

A CSV report of every published frame: one row per region per tick with the infected count
and its palette color. It is the render adapter used when no interactive renderer is attached.

*/

use crate::context::{Context, DataPlugin};
use crate::error::IxaError;
use crate::quantize::QuantizeScale;
use crate::timeline::{ContextTimelineExt, Frame};
use log::{error, info};
use serde::Serialize;
use std::fs::File;
use std::path::Path;

#[derive(Serialize)]
struct FrameRow<'a> {
    tick: usize,
    region: &'a str,
    infected: u64,
    color: &'a str,
}

struct FrameReportData {
    writer: Option<csv::Writer<File>>,
    scale: QuantizeScale,
    rows_written: usize,
}

impl DataPlugin for FrameReportData {
    #[allow(non_upper_case_globals)]
    const new: &'static dyn Fn() -> Self = &|| FrameReportData {
        writer: None,
        scale: QuantizeScale::default(),
        rows_written: 0,
    };
}

impl FrameReportData {
    fn write_frame(&mut self, frame: &Frame) -> Result<(), IxaError> {
        let Some(writer) = self.writer.as_mut() else {
            return Ok(());
        };
        let rows = frame.sorted();
        for (region, infected) in &rows {
            writer.serialize(FrameRow {
                tick: frame.tick(),
                region,
                infected: *infected,
                color: self.scale.color(Some(*infected)),
            })?;
        }
        writer.flush()?;
        self.rows_written += rows.len();
        Ok(())
    }
}

pub trait ContextFrameReportExt {
    /// Writes every frame published from now on to the CSV file at `path`, coloring values
    /// with `scale`. Only one frame report may be active.
    fn add_frame_report(&mut self, path: impl AsRef<Path>, scale: QuantizeScale) -> Result<(), IxaError>;

    fn frame_report_rows(&self) -> usize;
}

impl ContextFrameReportExt for Context {
    fn add_frame_report(&mut self, path: impl AsRef<Path>, scale: QuantizeScale) -> Result<(), IxaError> {
        let path = path.as_ref();
        let report = self.get_data_container_mut::<FrameReportData>();
        if report.writer.is_some() {
            return Err(IxaError::IxaError("a frame report is already active".to_string()));
        }
        report.writer = Some(csv::Writer::from_path(path)?);
        report.scale = scale;
        info!("writing frame report to {}", path.display());

        self.subscribe_to_frames(|context, frame| {
            let report = context.get_data_container_mut::<FrameReportData>();
            if let Err(e) = report.write_frame(frame) {
                error!("failed to write frame {}: {e}", frame.tick());
            }
        });
        Ok(())
    }

    fn frame_report_rows(&self) -> usize {
        self.get_data_container::<FrameReportData>()
            .map_or(0, |report| report.rows_written)
    }
}
