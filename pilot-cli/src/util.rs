use std::time::Duration;

/// Format an elapsed duration for status lines.
///
/// - `< 1s` → "420ms"
/// - `< 1m` → "3.2s"
/// - otherwise → "2m 13s"
pub fn format_elapsed(elapsed: Duration) -> String {
    format_duration_ms(elapsed_ms(elapsed))
}

/// Whole milliseconds, saturating at `u64::MAX`.
pub fn elapsed_ms(elapsed: Duration) -> u64 {
    elapsed.as_millis().try_into().unwrap_or(u64::MAX)
}

pub fn format_duration_ms(ms: u64) -> String {
    match ms {
        0..1_000 => format!("{ms}ms"),
        1_000..60_000 => format!("{:.1}s", ms as f64 / 1_000.0),
        _ => format!("{}m {}s", ms / 60_000, (ms % 60_000) / 1_000),
    }
}

/// Parse a 1-based line selection: `12` or `12:20`.
pub fn parse_line_range(range: &str) -> anyhow::Result<(usize, usize)> {
    let parse = |s: &str| -> anyhow::Result<usize> {
        let n: usize = s
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("invalid line number \"{s}\""))?;
        anyhow::ensure!(n > 0, "line numbers start at 1");
        Ok(n)
    };
    let (start, end) = match range.split_once(':') {
        Some((start, end)) => (parse(start)?, parse(end)?),
        None => {
            let line = parse(range)?;
            (line, line)
        }
    };
    anyhow::ensure!(start <= end, "line range {start}:{end} is reversed");
    Ok((start, end))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations() {
        assert_eq!(format_duration_ms(42), "42ms");
        assert_eq!(format_duration_ms(14_600), "14.6s");
        assert_eq!(format_duration_ms(133_000), "2m 13s");
        assert_eq!(format_elapsed(Duration::from_millis(999)), "999ms");
    }

    #[test]
    fn elapsed_ms_saturates() {
        assert_eq!(elapsed_ms(Duration::from_millis(1_500)), 1_500);
        assert_eq!(elapsed_ms(Duration::MAX), u64::MAX);
    }

    #[test]
    fn line_ranges() {
        assert_eq!(parse_line_range("12:20").unwrap(), (12, 20));
        assert_eq!(parse_line_range("7").unwrap(), (7, 7));
        assert_eq!(parse_line_range(" 3 : 4 ").unwrap(), (3, 4));
        assert!(parse_line_range("0:2").is_err());
        assert!(parse_line_range("5:2").is_err());
        assert!(parse_line_range("a:b").is_err());
    }
}
