//! Minimal CSV parse/write helpers (quotes + CRLF tolerant). std-only; the
//! two store files have fixed, narrow schemas and need nothing more.

use std::io::{self, Write};
use std::mem::take;

/// Parse CSV text into rows of fields. Blank lines are skipped.
pub fn parse_rows(text: &str) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    let mut field = String::new();
    let mut row: Vec<String> = Vec::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '"' => {
                if in_quotes {
                    if matches!(chars.peek(), Some('"')) {
                        chars.next(); // double-quote escape
                        field.push('"');
                    } else {
                        in_quotes = false;
                    }
                } else {
                    in_quotes = true;
                }
            }
            ',' if !in_quotes => {
                row.push(take(&mut field));
            }
            '\n' | '\r' if !in_quotes => {
                if ch == '\r' && matches!(chars.peek(), Some('\n')) {
                    chars.next();
                }
                row.push(take(&mut field));
                if !(row.len() == 1 && row[0].is_empty()) {
                    rows.push(take(&mut row));
                } else {
                    row.clear();
                }
            }
            _ => field.push(ch),
        }
    }

    // Flush any trailing field/row even if quotes were unterminated.
    row.push(field);
    if !(row.len() == 1 && row[0].is_empty()) {
        rows.push(row);
    }

    rows
}

fn needs_quotes(field: &str) -> bool {
    field.contains(',') || field.contains('"') || field.contains('\n') || field.contains('\r')
}

/// Write one CSV row, quoting only where required.
pub fn write_row<W: Write>(mut w: W, row: &[String]) -> io::Result<()> {
    let mut first = true;
    for cell in row {
        if !first {
            write!(w, ",")?;
        } else {
            first = false;
        }
        if needs_quotes(cell) {
            let escaped = cell.replace('"', "\"\"");
            write!(w, "\"{}\"", escaped)?;
        } else {
            write!(w, "{}", cell)?;
        }
    }
    writeln!(w)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parses_plain_and_quoted_fields() {
        let rows = parse_rows("a,b,c\n\"x, y\",\"he said \"\"hi\"\"\",z\r\n");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], row(&["a", "b", "c"]));
        assert_eq!(rows[1], row(&["x, y", "he said \"hi\"", "z"]));
    }

    #[test]
    fn skips_blank_lines() {
        let rows = parse_rows("a,b\n\n\nc,d\n");
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn write_quotes_only_when_needed() {
        let mut buf = Vec::new();
        write_row(&mut buf, &row(&["B1", "Main Library, East", "500"])).unwrap();
        assert_eq!(
            String::from_utf8(buf).unwrap(),
            "B1,\"Main Library, East\",500\n"
        );
    }

    #[test]
    fn write_then_parse_preserves_fields() {
        let original = row(&["id", "name \"odd\"", "1.5"]);
        let mut buf = Vec::new();
        write_row(&mut buf, &original).unwrap();
        let rows = parse_rows(std::str::from_utf8(&buf).unwrap());
        assert_eq!(rows, vec![original]);
    }
}
