use crate::core::models::TrackedAddress;
use crate::core::settings::DisplaySettings;
use chrono::Local;
use std::fmt::Write;

const HIGHLIGHT: char = '*';

pub fn render_table(rows: &[TrackedAddress], display: &DisplaySettings) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<42}  {:<6}  {:>14}  {:>15}  {:<19}",
        "Address", "Audit", "ETH", "Token", "Last updated"
    );

    for row in rows {
        let _ = writeln!(
            out,
            "{:<42}  {:<6}  {:>14.6}  {:>15}  {:<19}",
            row.address,
            audit_label(row),
            row.balance_primary,
            token_cell(row.balance_token, display.token_highlight_threshold),
            last_updated_label(row),
        );
    }

    out
}

fn audit_label(row: &TrackedAddress) -> &'static str {
    match (row.never_fetched(), row.audit_passed) {
        (true, _) => "-",
        (false, true) => "ok",
        (false, false) => "FAILED",
    }
}

fn token_cell(balance: f32, threshold: f32) -> String {
    if balance > threshold {
        format!("{balance:.2}{HIGHLIGHT}")
    } else {
        format!("{balance:.2} ")
    }
}

fn last_updated_label(row: &TrackedAddress) -> String {
    row.last_updated
        .map(|t| {
            t.with_timezone(&Local)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string()
        })
        .unwrap_or_else(|| "never".to_string())
}
