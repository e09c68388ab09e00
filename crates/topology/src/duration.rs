// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Parses the informal duration literals HCL topology files use for
//! `timeout { after = "30s" }` (HCL has no native duration type).

use std::time::Duration;

use crate::error::TopologyError;

pub fn parse_duration(raw: &str) -> Result<Duration, TopologyError> {
    let trimmed = raw.trim();
    let split_at = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| TopologyError::InvalidDuration(raw.to_string()))?;
    let (digits, suffix) = trimmed.split_at(split_at);
    if digits.is_empty() {
        return Err(TopologyError::InvalidDuration(raw.to_string()));
    }
    let amount: u64 = digits
        .parse()
        .map_err(|_| TopologyError::InvalidDuration(raw.to_string()))?;
    let duration = match suffix {
        "ms" => Duration::from_millis(amount),
        "s" => Duration::from_secs(amount),
        "m" => Duration::from_secs(amount.saturating_mul(60)),
        "h" => Duration::from_secs(amount.saturating_mul(3600)),
        _ => return Err(TopologyError::InvalidDuration(raw.to_string())),
    };
    Ok(duration)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_each_supported_suffix() {
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("2h").unwrap(), Duration::from_secs(7200));
    }

    #[test]
    fn rejects_missing_or_unknown_suffix() {
        assert!(parse_duration("30").is_err());
        assert!(parse_duration("30x").is_err());
        assert!(parse_duration("s").is_err());
    }
}
