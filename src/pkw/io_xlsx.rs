// Primitives for reading Excel workbooks.

use calamine::{open_workbook, DataType, Reader, Xlsx};

use crate::pkw::io_common::{make_ward, simplify_file_name};
use crate::pkw::*;

/// Reads the wards from a worksheet, with the same columns as the CSV files.
///
/// The first worksheet is used when no name is given.
pub fn read_excel_wards(path: &str, worksheet_name: Option<&str>) -> PkwResult<Vec<Ward>> {
    let mut workbook: Xlsx<_> = open_workbook(path).context(OpeningExcelSnafu { path })?;
    let wrange = match worksheet_name {
        Some(name) => workbook.worksheet_range(name),
        None => workbook.worksheet_range_at(0),
    }
    .context(EmptyExcelSnafu {})?
    .context(OpeningExcelSnafu { path })?;

    let mut iter = wrange.rows();
    let header = iter.next().context(EmptyExcelSnafu {})?;
    debug!("read_excel_wards: header: {:?}", header);

    let mut res: Vec<Ward> = Vec::new();
    for (idx, row) in iter.enumerate() {
        let lineno = idx + 2;
        let cells: Vec<Option<String>> = row
            .iter()
            .map(|c| read_cell(c, lineno))
            .collect::<PkwResult<Vec<_>>>()?;
        if cells.iter().all(|c| c.is_none()) {
            continue;
        }
        let cell = |i: usize| cells.get(i).cloned().flatten();
        let community_code = cell(0).context(ExcelWrongCellTypeSnafu {
            lineno,
            content: "missing community code".to_string(),
        })?;
        let no = cell(1).context(ExcelWrongCellTypeSnafu {
            lineno,
            content: "missing ward number".to_string(),
        })?;
        let latitude = cell(2);
        let longitude = cell(3);
        res.push(make_ward(
            &community_code,
            &no,
            latitude.as_deref(),
            longitude.as_deref(),
            lineno,
        )?);
    }
    info!(
        "read_excel_wards: {} wards in {}",
        res.len(),
        simplify_file_name(path)
    );
    Ok(res)
}

// The text of a cell, None if blank.
fn read_cell(cell: &DataType, lineno: usize) -> PkwResult<Option<String>> {
    match cell {
        DataType::Empty => Ok(None),
        DataType::String(s) if s.trim().is_empty() => Ok(None),
        DataType::String(s) => Ok(Some(s.trim().to_string())),
        DataType::Int(i) => Ok(Some(i.to_string())),
        // Integral numbers are written without a fractional part, so that
        // numeric codes and ward numbers parse back.
        DataType::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => {
            Ok(Some(format!("{}", *f as i64)))
        }
        DataType::Float(f) => Ok(Some(f.to_string())),
        x => ExcelWrongCellTypeSnafu {
            lineno,
            content: format!("{:?}", x),
        }
        .fail(),
    }
}
