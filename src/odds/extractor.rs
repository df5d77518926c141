use std::sync::LazyLock;

use regex::Regex;

use crate::types::{TotalsLine, TotalsOutcome};

static RE_QUARTER_HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+-я четверть: Тотал$").unwrap());

const UNDER: &str = "меньше";
const OVER: &str = "больше";

/// Tokens per odds row: under-label, under-price, threshold, over-label, over-price.
const ROW_WIDTH: usize = 5;

/// Find the first quarter-totals block among `blocks` and read its odds rows.
pub fn extract_totals<S: AsRef<str>>(blocks: &[S]) -> TotalsOutcome {
    blocks
        .iter()
        .find_map(|block| parse_block(block.as_ref()))
        .unwrap_or(TotalsOutcome::NotFound)
}

/// `None` unless the block's first non-blank line is a quarter-totals header.
fn parse_block(block: &str) -> Option<TotalsOutcome> {
    let mut lines = block.lines().map(str::trim).filter(|l| !l.is_empty());
    let header = lines.next()?;
    if !RE_QUARTER_HEADER.is_match(header) {
        return None;
    }

    let quarter = header.split(':').next().unwrap_or(header).to_string();
    let tokens: Vec<&str> = lines.collect();
    Some(TotalsOutcome::Found {
        quarter,
        lines: scan_rows(&tokens),
    })
}

/// Slide over the flat token stream; stray tokens between rows are skipped one at a time.
fn scan_rows(tokens: &[&str]) -> Vec<TotalsLine> {
    let mut rows = Vec::new();
    let mut i = 0;
    while i + ROW_WIDTH - 1 < tokens.len() {
        if tokens[i].to_lowercase() == UNDER && tokens[i + 3].to_lowercase() == OVER {
            rows.push(TotalsLine {
                lower: tokens[i + 1].to_string(),
                threshold: tokens[i + 2].to_string(),
                upper: tokens[i + 4].to_string(),
            });
            i += ROW_WIDTH;
        } else {
            i += 1;
        }
    }
    rows
}
