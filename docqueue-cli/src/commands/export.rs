//! `docqueue export`

use super::{with_spinner, Target, INFO, SUCCESS};
use anyhow::{Context, Result};
use console::style;
use docqueue::export::{ExportOptions, Exporter, SqliteSink};
use std::path::PathBuf;

/// Export one run into a `SQLite` file.
pub struct ExportCommand {
    target: Target,
    outfile: PathBuf,
    run: String,
    scan_max: Option<usize>,
}

impl ExportCommand {
    pub const fn new(
        target: Target,
        outfile: PathBuf,
        run: String,
        scan_max: Option<usize>,
    ) -> Self {
        Self {
            target,
            outfile,
            run,
            scan_max,
        }
    }

    fn options(&self) -> ExportOptions {
        let options = ExportOptions::new(self.run.as_str())
            .with_table(self.target.config.export.table.as_str())
            .with_window(self.target.config.store.scan_window)
            .with_numeric_widening(self.target.config.export.widen_numbers);
        match self.scan_max {
            Some(max) => options.with_scan_max(max),
            None => options,
        }
    }

    /// Infer the schema and write every record of the run.
    ///
    /// # Errors
    ///
    /// Returns an error on a type ambiguity, an unreachable store, or a
    /// `SQLite` failure.
    pub async fn execute(&self) -> Result<()> {
        println!(
            "\n{} Exporting run {} to {}",
            INFO,
            style(&self.run).green(),
            style(self.outfile.display()).cyan()
        );

        let store = self.target.store()?;
        let mut sink = SqliteSink::open(&self.outfile)
            .await
            .with_context(|| format!("cannot open {}", self.outfile.display()))?;

        let exporter = Exporter::new(&store, self.options());
        let report = with_spinner("scanning collection", exporter.export(&mut sink))
            .await
            .context("export failed")?;

        for dropped in &report.dropped {
            println!(
                "  {} {} ({:?})",
                style("skipped").yellow(),
                dropped.name,
                dropped.reason
            );
        }
        println!(
            "{} {} rows, {} columns",
            SUCCESS,
            style(report.rows).bold(),
            report.columns.len()
        );
        Ok(())
    }
}
