use tabled::{settings::Style, Table, Tabled};

use crate::builder::BuildReport;
use crate::query::CacheStats;

#[derive(Tabled)]
pub struct TableRow {
    #[tabled(rename = "Table")]
    pub table: String,
    #[tabled(rename = "Rows")]
    pub rows: String,
}

pub struct TableBuilder {
    rows: Vec<TableRow>,
}

impl Default for TableBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TableBuilder {
    pub fn new() -> Self {
        Self { rows: Vec::new() }
    }

    pub fn add_row(&mut self, label: &str, value: impl ToString) {
        self.rows.push(TableRow {
            table: label.to_string(),
            rows: value.to_string(),
        });
    }

    pub fn build(&self) -> String {
        if self.rows.is_empty() {
            return String::new();
        }

        Table::new(&self.rows).with(Style::rounded()).to_string()
    }
}

pub fn stats_table(stats: &CacheStats) -> String {
    let mut builder = TableBuilder::new();
    builder.add_row("packages", stats.packages);
    for (table, rows) in &stats.tables {
        builder.add_row(table, rows);
    }
    builder.build()
}

pub fn report_table(report: &BuildReport) -> String {
    let mut builder = TableBuilder::new();
    builder.add_row("added", report.added);
    builder.add_row("kept", report.kept);
    builder.add_row("removed", report.removed);
    builder.add_row("duplicates", report.duplicates);
    builder.add_row("rows written", report.rows.written);
    builder.add_row("rows dropped", report.rows.dropped);
    builder.build()
}
