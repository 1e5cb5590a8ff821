use actix_web::{http::header, HttpResponse};
use chrono::{DateTime, Utc};

/// Builds an RFC 4180 document in memory. Exports are bounded by the list
/// filters, so rows are not streamed.
pub struct CsvWriter {
    buffer: String,
    columns: usize,
}

impl CsvWriter {
    pub fn with_header(header: &[&str]) -> Self {
        let mut writer = Self {
            buffer: String::new(),
            columns: header.len(),
        };
        writer.push_cells(header.iter().copied());
        writer
    }

    pub fn push_row<I, S>(&mut self, cells: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.push_cells(cells);
    }

    fn push_cells<I, S>(&mut self, cells: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut written = 0;
        for cell in cells {
            if written > 0 {
                self.buffer.push(',');
            }
            self.buffer.push_str(&escape_cell(cell.as_ref()));
            written += 1;
        }
        if written != self.columns {
            log::warn!("CSV row has {} cells, header has {}", written, self.columns);
        }
        self.buffer.push_str("\r\n");
    }

    pub fn finish(self) -> String {
        self.buffer
    }

    pub fn into_response(self, filename: &str) -> HttpResponse {
        HttpResponse::Ok()
            .content_type("text/csv; charset=utf-8")
            .insert_header((
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename.replace('"', "")),
            ))
            .body(self.finish())
    }
}

/// Timestamp cell; a missing time (a running timer, an open ticket) is
/// left empty.
pub fn datetime_cell(value: Option<&DateTime<Utc>>) -> String {
    value.map(|v| v.format("%Y-%m-%d %H:%M").to_string()).unwrap_or_default()
}

/// Quotes a cell when needed and neutralizes spreadsheet formulas.
pub fn escape_cell(value: &str) -> String {
    let guarded = if value.starts_with(['=', '+', '-', '@']) {
        format!("'{}", value)
    } else {
        value.to_string()
    };

    let needs_quotes = guarded.contains([',', '"', '\r', '\n'])
        || guarded.starts_with(' ')
        || guarded.ends_with(' ');

    if needs_quotes {
        format!("\"{}\"", guarded.replace('"', "\"\""))
    } else {
        guarded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_plain_cells_are_untouched() {
        assert_eq!(escape_cell("Website maintenance"), "Website maintenance");
        assert_eq!(escape_cell(""), "");
    }

    #[test]
    fn test_special_characters_are_quoted() {
        assert_eq!(escape_cell("a,b"), "\"a,b\"");
        assert_eq!(escape_cell("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(escape_cell("line1\nline2"), "\"line1\nline2\"");
        assert_eq!(escape_cell(" padded"), "\" padded\"");
    }

    #[test]
    fn test_formula_prefix_is_neutralized() {
        assert_eq!(escape_cell("=SUM(A1:A2)"), "'=SUM(A1:A2)");
        assert_eq!(escape_cell("@cmd"), "'@cmd");
        assert_eq!(escape_cell("-1,5"), "\"'-1,5\"");
    }

    #[test]
    fn test_missing_datetime_is_an_empty_cell() {
        let started = DateTime::parse_from_rfc3339("2026-10-01T09:30:00Z").unwrap().with_timezone(&Utc);
        let mut writer = CsvWriter::with_header(&["Start", "End"]);
        writer.push_row([datetime_cell(Some(&started)), datetime_cell(None)]);
        assert_eq!(writer.finish(), "Start,End\r\n2026-10-01 09:30,\r\n");
    }

    #[test]
    fn test_document_layout() {
        let mut writer = CsvWriter::with_header(&["Date", "Minutes", "Description"]);
        writer.push_row(["2026-10-01", "90", "Server update, backups"]);
        writer.push_row(["2026-10-02", "15", "Call"]);
        assert_eq!(
            writer.finish(),
            "Date,Minutes,Description\r\n2026-10-01,90,\"Server update, backups\"\r\n2026-10-02,15,Call\r\n"
        );
    }
}
