//! Printing harvest results.
//!
//! Harvested data goes to the writer a command passes in (stdout in
//! practice); notes and failures go to stderr so piped output stays clean.

use std::io::Write;

use anyhow::{Context, Result};
use colored::Colorize;

use oaiharvest::RecordHeader;

/// How the `headers` command prints each header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderFormat {
    /// Identifier, datestamp and a deleted marker, separated by two spaces.
    Text,
    /// One compact JSON object per line.
    JsonLines,
}

impl HeaderFormat {
    pub fn from_json_flag(json: bool) -> Self {
        if json { Self::JsonLines } else { Self::Text }
    }
}

pub fn write_header(out: &mut impl Write, header: &RecordHeader, format: HeaderFormat) -> Result<()> {
    match format {
        HeaderFormat::JsonLines => {
            serde_json::to_writer(&mut *out, header).context("Failed to encode header")?;
        }
        HeaderFormat::Text => {
            let datestamp = header
                .datestamp()
                .map_or_else(|| "-".to_string(), |d| d.to_rfc3339());
            write!(out, "{}  {}", header.oai_identifier(), datestamp.dimmed())?;
            if header.is_deleted() {
                write!(out, "  {}", "deleted".red())?;
            }
        }
    }
    writeln!(out)?;
    Ok(())
}

/// Header of a fetched record as pretty JSON.
pub fn write_header_json(out: &mut impl Write, header: &RecordHeader) -> Result<()> {
    serde_json::to_writer_pretty(&mut *out, header).context("Failed to encode header")?;
    writeln!(out)?;
    Ok(())
}

/// `label: value` lines for the header, then a blank line before the metadata.
pub fn write_record_header(out: &mut impl Write, header: &RecordHeader) -> Result<()> {
    writeln!(out, "{}: {}", "identifier".dimmed(), header.oai_identifier())?;
    if let Some(datestamp) = header.datestamp() {
        writeln!(out, "{}: {}", "datestamp".dimmed(), datestamp.to_rfc3339())?;
    }
    for set_spec in header.set_specs() {
        writeln!(out, "{}: {}", "set".dimmed(), set_spec)?;
    }
    writeln!(out)?;
    Ok(())
}

/// Metadata bytes exactly as extracted, plus a trailing newline.
pub fn write_metadata(out: &mut impl Write, metadata: &[u8]) -> Result<()> {
    out.write_all(metadata).context("Failed to write metadata")?;
    writeln!(out)?;
    Ok(())
}

/// The list size a repository reported. Prints nothing to `out` if it gave none.
pub fn write_list_size(out: &mut impl Write, count: Option<u64>) -> Result<()> {
    match count {
        Some(count) => writeln!(out, "{count}")?,
        None => note("Repository does not report a list size."),
    }
    Ok(())
}

pub fn note(msg: &str) {
    eprintln!("{}", msg.dimmed());
}

/// Report a failed command with its full context chain.
pub fn failure(err: &anyhow::Error) {
    eprintln!("{} {err:#}", "harvest failed:".red().bold());
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use oaiharvest::RecordHeader;

    use super::*;

    fn header(deleted: bool) -> RecordHeader {
        RecordHeader::new(
            "oai:example.org:7",
            deleted,
            Some(Utc.with_ymd_and_hms(2020, 1, 2, 3, 4, 5).unwrap()),
        )
        .with_set_specs(vec!["setA".to_string()])
    }

    fn render(write: impl FnOnce(&mut Vec<u8>) -> Result<()>) -> String {
        let mut out = Vec::new();
        write(&mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn json_lines_are_one_object_per_line() {
        let text = render(|out| write_header(out, &header(false), HeaderFormat::JsonLines));
        assert_eq!(text.lines().count(), 1);
        let value: serde_json::Value = serde_json::from_str(text.trim_end()).unwrap();
        assert_eq!(value["oai_identifier"], "oai:example.org:7");
    }

    #[test]
    fn text_line_marks_deleted_headers() {
        let live = render(|out| write_header(out, &header(false), HeaderFormat::Text));
        let deleted = render(|out| write_header(out, &header(true), HeaderFormat::Text));

        assert!(live.starts_with("oai:example.org:7  "));
        assert!(live.contains("2020-01-02T03:04:05+00:00"));
        assert!(!live.contains("deleted"));
        assert!(deleted.contains("deleted"));
    }

    #[test]
    fn record_header_lists_sets() {
        let text = render(|out| write_record_header(out, &header(false)));
        assert!(text.contains("oai:example.org:7"));
        assert!(text.contains("setA"));
        assert!(text.ends_with("\n\n"));
    }

    #[test]
    fn metadata_is_written_verbatim() {
        let text = render(|out| write_metadata(out, b"<dc:title>x</dc:title>"));
        assert_eq!(text, "<dc:title>x</dc:title>\n");
    }

    #[test]
    fn missing_list_size_writes_nothing() {
        assert_eq!(render(|out| write_list_size(out, Some(107))), "107\n");
        assert_eq!(render(|out| write_list_size(out, None)), "");
    }
}
