use std::io::Write;
use std::path::Path;

use log::info;

use crate::kql::executor::QueryResult;

/// Writes headers then rows to `path`, replacing any existing file.
pub fn write_csv(path: &Path, result: &QueryResult) -> Result<(), csv::Error> {
    let writer = csv::Writer::from_path(path)?;
    write_records(writer, result)?;
    info!("Exported {} rows to CSV: {}", result.row_count(), path.display());
    Ok(())
}

pub fn write_csv_to<W: Write>(out: W, result: &QueryResult) -> Result<(), csv::Error> {
    write_records(csv::Writer::from_writer(out), result)
}

fn write_records<W: Write>(mut writer: csv::Writer<W>, result: &QueryResult) -> Result<(), csv::Error> {
    writer.write_record(&result.headers)?;
    for row in &result.rows {
        writer.write_record(row)?;
    }
    writer.flush()?;
    Ok(())
}
