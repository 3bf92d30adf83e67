/// Numeric magnitude of a display price, for ranking only.
///
/// "Sur demande" and anything without digits rank as 0.
pub fn parse_price(text: &str) -> u64 {
    if text.is_empty() || text.to_lowercase().contains("demande") {
        return 0;
    }
    let compact = strip_separators(text);
    compact
        .split(|c: char| !c.is_ascii_digit())
        .find(|run| !run.is_empty())
        // An all-digit run only fails to parse on overflow
        .map(|run| run.parse::<u64>().unwrap_or(u64::MAX))
        .unwrap_or(0)
}

/// Drop whitespace (incl. NBSP and narrow NBSP) and `.`/`,` used as thousands
/// separators, i.e. followed by exactly three digits.
fn strip_separators(text: &str) -> String {
    let chars: Vec<char> = text
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '\u{a0}' && *c != '\u{202f}')
        .collect();
    let mut out = String::with_capacity(chars.len());
    for (i, &c) in chars.iter().enumerate() {
        if (c == '.' || c == ',') && i > 0 && chars[i - 1].is_ascii_digit() {
            let group = &chars[i + 1..];
            let three = group.len() >= 3 && group[..3].iter().all(|d| d.is_ascii_digit());
            let closed = group.get(3).map_or(true, |d| !d.is_ascii_digit());
            if three && closed {
                continue;
            }
        }
        out.push(c);
    }
    out
}
