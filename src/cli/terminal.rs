//! Renders turns to a terminal. Charts can't be drawn inline so they
//! are written out as standalone HTML files.

use std::fs;
use std::io::{self, Stdout, Write};
use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::chat::{ChartFragment, ChartScript, Surface, Table};

pub struct TerminalSurface<W: Write + Send = Stdout> {
    out: W,
    chart_dir: PathBuf,
}

impl TerminalSurface<Stdout> {
    pub fn stdout(chart_dir: &Path) -> Self {
        Self::new(io::stdout(), chart_dir)
    }
}

impl<W: Write + Send> TerminalSurface<W> {
    pub fn new(out: W, chart_dir: &Path) -> Self {
        Self {
            out,
            chart_dir: chart_dir.to_path_buf(),
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn line(&mut self, text: &str) {
        if let Err(e) = writeln!(self.out, "{}", text) {
            tracing::error!("Failed to write to terminal: {}", e);
        }
    }

    fn write_chart(&self, chart: &ChartFragment) -> Result<PathBuf> {
        fs::create_dir_all(&self.chart_dir)?;
        let path = self.chart_dir.join(format!("{}.html", chart.container_id));
        fs::write(&path, chart_document(chart))?;
        Ok(path)
    }
}

impl<W: Write + Send> Surface for TerminalSurface<W> {
    fn text(&mut self, text: &str) {
        self.line(text);
    }

    fn table(&mut self, table: &Table) {
        let rendered = format_table(table);
        self.line(&rendered);
    }

    fn chart(&mut self, chart: &ChartFragment) {
        match self.write_chart(chart) {
            Ok(path) => self.line(&format!("Chart saved to {}", path.display())),
            Err(e) => {
                tracing::error!("Failed to save chart {}: {}", chart.container_id, e);
                self.line("Chart could not be saved");
            }
        }
    }

    fn empty(&mut self, message: &str) {
        self.line(message);
    }

    fn failure(&mut self, message: &str) {
        self.line(message);
    }
}

/// Align columns to the widest cell
pub fn format_table(table: &Table) -> String {
    let mut widths: Vec<usize> = table.headers.iter().map(|h| h.chars().count()).collect();
    for row in &table.rows {
        for (i, cell) in row.iter().enumerate() {
            if let Some(width) = widths.get_mut(i) {
                *width = (*width).max(cell.chars().count());
            }
        }
    }

    let format_row = |cells: &[String]| {
        cells
            .iter()
            .zip(&widths)
            .map(|(cell, width)| format!("{:<width$}", cell, width = *width))
            .collect::<Vec<_>>()
            .join(" | ")
            .trim_end()
            .to_string()
    };

    let mut lines = vec![format_row(table.headers.as_slice())];
    lines.push(
        widths
            .iter()
            .map(|w| "-".repeat(*w))
            .collect::<Vec<_>>()
            .join("-+-"),
    );
    lines.extend(table.rows.iter().map(|row| format_row(row.as_slice())));
    lines.join("\n")
}

fn chart_document(chart: &ChartFragment) -> String {
    let scripts = chart
        .scripts
        .iter()
        .map(|script| match script {
            ChartScript::External { src } => format!(r#"<script src="{}"></script>"#, src),
            ChartScript::Inline { source } => format!("<script>{}</script>", source),
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "<!DOCTYPE html>\n<html>\n<body>\n{}\n{}\n</body>\n</html>\n",
        chart.markup, scripts
    )
}
