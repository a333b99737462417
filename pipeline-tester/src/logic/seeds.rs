use anyhow::{Result, bail};
use sha2::{Digest, Sha256};
use std::collections::HashSet;

const DEFAULT_SEED: u64 = 1337;

/// Seed plus the token it was parsed from, for reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedInfo {
    pub seed: u64,
    pub label: String,
}

impl SeedInfo {
    #[must_use]
    pub fn from_numeric(seed: u64) -> Self {
        Self {
            seed,
            label: seed.to_string(),
        }
    }

    /// Hash a free-form phrase into a seed so runs can be named.
    #[must_use]
    pub fn from_phrase(phrase: &str) -> Self {
        let digest = Sha256::digest(phrase.trim().to_lowercase().as_bytes());
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest[..8]);
        Self {
            seed: u64::from_le_bytes(bytes),
            label: phrase.trim().to_string(),
        }
    }
}

/// Split a comma-separated CLI list, dropping blanks.
pub fn split_csv(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}

/// Resolve CLI seed tokens into seeds.
///
/// Accepts decimal integers (negative values use their magnitude),
/// `0x`-prefixed hex, `range:A..B` spans and `phrase:<text>` words.
pub fn resolve_seed_inputs(tokens: &[String]) -> Result<Vec<SeedInfo>> {
    let mut pending = Vec::new();
    for token in tokens {
        if token.is_empty() {
            continue;
        }
        if let Ok(value) = token.parse::<i64>() {
            pending.push(SeedInfo::from_numeric(value.unsigned_abs()));
        } else if let Ok(value) = token.parse::<u64>() {
            pending.push(SeedInfo::from_numeric(value));
        } else if let Some(hex) = token.strip_prefix("0x").or_else(|| token.strip_prefix("0X")) {
            match u64::from_str_radix(hex, 16) {
                Ok(value) => pending.push(SeedInfo::from_numeric(value)),
                Err(_) => bail!("Unrecognized seed token: {token}"),
            }
        } else if let Some(span) = token.strip_prefix("range:") {
            pending.extend(parse_range(span, token)?);
        } else if let Some(phrase) = token.strip_prefix("phrase:")
            && !phrase.trim().is_empty()
        {
            pending.push(SeedInfo::from_phrase(phrase));
        } else {
            bail!("Unrecognized seed token: {token}");
        }
    }

    let mut seen = HashSet::new();
    pending.retain(|info| seen.insert(info.seed));
    if pending.is_empty() {
        pending.push(SeedInfo::from_numeric(DEFAULT_SEED));
    }
    Ok(pending)
}

fn parse_range(span: &str, token: &str) -> Result<Vec<SeedInfo>> {
    let Some((start, end)) = span.split_once("..") else {
        bail!("Seed range must look like range:A..B, got {token}");
    };
    let (Ok(start), Ok(end)) = (start.trim().parse::<u64>(), end.trim().parse::<u64>()) else {
        bail!("Seed range bounds must be integers: {token}");
    };
    if end <= start {
        bail!("Seed range is empty: {token}");
    }
    Ok((start..end).map(SeedInfo::from_numeric).collect())
}
