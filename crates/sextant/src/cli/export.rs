//! `sextant export` command implementation.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use colored::Colorize;
use sextant::{ExportFormat, ExportTable, Sextant};

use super::display::parse_kind;

/// Options for the export command.
pub struct ExportArgs {
    /// Table name
    pub table: String,
    /// `json` or `csv`; inferred from `output` when absent
    pub format: Option<String>,
    /// Definition kind filter
    pub kind: Option<String>,
    /// Output file; stdout when absent
    pub output: Option<PathBuf>,
}

/// Run the export command.
pub fn run(workspace: &Path, args: &ExportArgs) -> Result<(), sextant::Error> {
    let table = ExportTable::parse(&args.table)?;
    let kind = args.kind.as_deref().map(parse_kind).transpose()?;
    let format = match (&args.format, &args.output) {
        (Some(format), _) => ExportFormat::parse(format)?,
        (None, Some(path)) => ExportFormat::from_path(path).unwrap_or(ExportFormat::Json),
        (None, None) => ExportFormat::Json,
    };

    let sextant = Sextant::open(workspace)?;
    let rows = sextant.query()?.export(table, kind)?;

    match &args.output {
        Some(path) => {
            let mut writer = BufWriter::new(File::create(path)?);
            rows.write(format, &mut writer)?;
            writer.flush()?;
            eprintln!(
                "{} {} rows to {}",
                "Exported".green().bold(),
                rows.rows.len(),
                path.display()
            );
        }
        None => rows.write(format, std::io::stdout().lock())?,
    }

    Ok(())
}
