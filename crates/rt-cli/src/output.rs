use chrono::{DateTime, Utc};
use serde::Serialize;

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{json}");
    Ok(())
}

/// Left-aligned columns two spaces apart, a dashed rule under the header.
pub fn table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (w, cell) in widths.iter_mut().zip(row) {
            *w = (*w).max(cell.chars().count());
        }
    }

    let line = |cells: &mut dyn Iterator<Item = &str>| -> String {
        let padded: Vec<String> = cells
            .zip(&widths)
            .map(|(cell, &w)| format!("{cell:w$}"))
            .collect();
        padded.join("  ").trim_end().to_string()
    };

    let rule: Vec<String> = widths.iter().map(|&w| "-".repeat(w)).collect();
    let mut out = Vec::with_capacity(rows.len() + 2);
    out.push(line(&mut headers.iter().copied()));
    out.push(line(&mut rule.iter().map(String::as_str)));
    for row in rows {
        out.push(line(&mut row.iter().map(String::as_str)));
    }
    out.join("\n")
}

pub fn print_table(headers: &[&str], rows: Vec<Vec<String>>) {
    println!("{}", table(headers, &rows));
}

/// Local wall-clock time, or `-` when unknown.
pub fn time(t: Option<DateTime<Utc>>) -> String {
    t.map(|t| {
        t.with_timezone(&chrono::Local)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string()
    })
    .unwrap_or_else(|| "-".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn columns_pad_to_widest_cell() {
        let rendered = table(
            &["PREFIX", "LAST"],
            &[
                vec!["stable".into(), "13".into()],
                vec!["canary-long".into(), "2".into()],
            ],
        );
        assert_eq!(
            rendered,
            "PREFIX       LAST\n-----------  ----\nstable       13\ncanary-long  2"
        );
    }

    #[test]
    fn unknown_time_is_dash() {
        assert_eq!(time(None), "-");
    }
}
