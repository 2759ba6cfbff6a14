use std::time::Duration;

/// Parse a duration such as `25ms`, `1.5s` or `1h2m3s`.
///
/// Every number needs a unit (`ns`, `us`, `µs`, `ms`, `s`, `m`, `h`) except
/// a bare `0`. Negative durations are rejected.
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let s = input.trim();
    let s = s.strip_prefix('+').unwrap_or(s);
    if s.is_empty() {
        return Err(format!("invalid duration {input:?}"));
    }
    if s.starts_with('-') {
        return Err(format!("negative duration {input:?}"));
    }
    if s == "0" {
        return Ok(Duration::ZERO);
    }

    let mut nanos = 0f64;
    let mut rest = s;
    while !rest.is_empty() {
        let number_end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if number_end == 0 {
            return Err(format!("invalid duration {input:?}"));
        }
        let value: f64 = rest[..number_end]
            .parse()
            .map_err(|_| format!("invalid duration {input:?}"))?;
        rest = &rest[number_end..];

        let unit_end = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let scale = match &rest[..unit_end] {
            "ns" => 1.0,
            "us" | "µs" | "μs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            "" => return Err(format!("missing unit in duration {input:?}")),
            unit => return Err(format!("unknown unit {unit:?} in duration {input:?}")),
        };
        rest = &rest[unit_end..];

        nanos += value * scale;
    }

    if !nanos.is_finite() || nanos > u64::MAX as f64 {
        return Err(format!("duration {input:?} out of range"));
    }
    Ok(Duration::from_nanos(nanos.round() as u64))
}
