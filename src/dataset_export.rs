use std::path::Path;

use rust_xlsxwriter::{Workbook, Worksheet};

use crate::error::Result;
use crate::features::FeatureCatalog;
use crate::fixtures::format_date;
use crate::pipeline::MatchFeatures;

const ID_COLUMNS: [&str; 7] = [
    "fixture_id",
    "league_id",
    "season",
    "date",
    "home_team_id",
    "away_team_id",
    "target",
];

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Text(String),
    Number(f64),
    Empty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportReport {
    pub rows: usize,
    pub columns: usize,
    pub imputed_cells: usize,
}

pub fn header(catalog: &FeatureCatalog) -> Vec<String> {
    ID_COLUMNS
        .iter()
        .map(|c| c.to_string())
        .chain(catalog.names())
        .collect()
}

/// Header plus one row per fixture, features in catalog order.
pub fn dataset_rows(catalog: &FeatureCatalog, rows: &[MatchFeatures]) -> Vec<Vec<Cell>> {
    let mut out = Vec::with_capacity(rows.len() + 1);
    out.push(header(catalog).into_iter().map(Cell::Text).collect());
    for row in rows {
        let mut cells = vec![
            Cell::Number(f64::from(row.fixture_id)),
            Cell::Number(f64::from(row.league_id)),
            Cell::Number(f64::from(row.season)),
            Cell::Text(format_date(row.date)),
            Cell::Number(f64::from(row.home_team_id)),
            Cell::Number(f64::from(row.away_team_id)),
            row.target
                .map(|t| Cell::Number(f64::from(t)))
                .unwrap_or(Cell::Empty),
        ];
        for feature in catalog.features() {
            cells.push(
                row.features
                    .get(feature)
                    .map(Cell::Number)
                    .unwrap_or(Cell::Empty),
            );
        }
        out.push(cells);
    }
    out
}

pub fn write_xlsx(
    path: &Path,
    catalog: &FeatureCatalog,
    rows: &[MatchFeatures],
) -> Result<ExportReport> {
    let data = dataset_rows(catalog, rows);
    let columns: Vec<Vec<Cell>> = std::iter::once(vec![
        Cell::Text("feature".to_string()),
        Cell::Text("default".to_string()),
    ])
    .chain(catalog.features().iter().map(|f| {
        vec![Cell::Text(f.name()), Cell::Number(f.default_value())]
    }))
    .collect();

    let mut workbook = Workbook::new();
    {
        let sheet = workbook.add_worksheet();
        sheet.set_name("Dataset")?;
        write_rows(sheet, &data)?;
    }
    {
        let sheet = workbook.add_worksheet();
        sheet.set_name("Columns")?;
        write_rows(sheet, &columns)?;
    }
    if let Some(dir) = path.parent()
        && !dir.as_os_str().is_empty()
    {
        std::fs::create_dir_all(dir)?;
    }
    workbook.save(path)?;

    Ok(ExportReport {
        rows: rows.len(),
        columns: ID_COLUMNS.len() + catalog.len(),
        imputed_cells: rows.iter().map(MatchFeatures::imputed_count).sum(),
    })
}

fn write_rows(worksheet: &mut Worksheet, rows: &[Vec<Cell>]) -> Result<()> {
    for (row_idx, row) in rows.iter().enumerate() {
        for (col_idx, cell) in row.iter().enumerate() {
            let (r, c) = (row_idx as u32, col_idx as u16);
            match cell {
                Cell::Text(value) => {
                    worksheet.write_string(r, c, value)?;
                }
                Cell::Number(value) => {
                    worksheet.write_number(r, c, *value)?;
                }
                Cell::Empty => {}
            }
        }
    }
    Ok(())
}
