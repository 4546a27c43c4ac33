//! Terminal output for search results

use crate::query::ResultRecord;
use crate::service::{ITEM_NAME, SIZE};
use std::io;
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

/// Stdout honoring the `--color` choice
pub fn stdout(color: bool) -> StandardStream {
    let choice = if color {
        ColorChoice::Auto
    } else {
        ColorChoice::Never
    };
    StandardStream::stdout(choice)
}

/// Print one result per line: its path, and with `long` its size and name
pub fn print_results<W: WriteColor>(out: &mut W, results: &[ResultRecord], long: bool) -> io::Result<()> {
    for record in results {
        if long {
            let size = record
                .properties
                .get(SIZE)
                .and_then(|v| v.as_i64())
                .map(|n| n.to_string())
                .unwrap_or_else(|| "-".to_string());
            out.set_color(ColorSpec::new().set_fg(Some(Color::Green)))?;
            write!(out, "{:>10}", size)?;
            out.reset()?;
            write!(out, "  ")?;
        }

        let location = record.path().unwrap_or(&record.url);
        out.set_color(ColorSpec::new().set_fg(Some(Color::Magenta)))?;
        write!(out, "{}", location)?;
        out.reset()?;

        if long && let Some(name) = record.properties.get(ITEM_NAME).and_then(|v| v.as_str()) {
            out.set_color(ColorSpec::new().set_fg(Some(Color::Cyan)))?;
            write!(out, "  [{}]", name)?;
            out.reset()?;
        }

        writeln!(out)?;
    }
    out.flush()
}

/// Print a labelled query text
pub fn print_sql<W: WriteColor>(out: &mut W, label: &str, sql: &str) -> io::Result<()> {
    out.set_color(ColorSpec::new().set_fg(Some(Color::Cyan)).set_bold(true))?;
    write!(out, "{}:", label)?;
    out.reset()?;
    writeln!(out, " {}", sql)
}

/// Print a result count summary
pub fn print_count<W: WriteColor>(out: &mut W, what: &str, count: u64) -> io::Result<()> {
    out.set_color(ColorSpec::new().set_bold(true))?;
    write!(out, "{}", count)?;
    out.reset()?;
    writeln!(out, " {}", what)
}
