// Primitives for reading CSV files.

use crate::pkw::io_common::{make_ward, simplify_file_name};
use crate::pkw::*;

/// Reads the wards from a CSV file with a header row:
/// `community_code,no,latitude,longitude`.
pub fn read_csv_wards(path: &str) -> PkwResult<Vec<Ward>> {
    let rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(path)
        .context(CsvOpenSnafu { path })?;

    let mut res: Vec<Ward> = Vec::new();
    for (idx, line_r) in rdr.into_records().enumerate() {
        // The header is line 1.
        let lineno = idx + 2;
        let line = line_r.context(CsvLineParseSnafu {})?;
        debug!("read_csv_wards: lineno: {:?} row: {:?}", lineno, line);
        if line.iter().all(|s| s.is_empty()) {
            continue;
        }
        let community_code = line.get(0).context(CsvLineTooShortSnafu { lineno })?;
        let no = line.get(1).context(CsvLineTooShortSnafu { lineno })?;
        res.push(make_ward(community_code, no, line.get(2), line.get(3), lineno)?);
    }
    info!(
        "read_csv_wards: {} wards in {}",
        res.len(),
        simplify_file_name(path)
    );
    Ok(res)
}
