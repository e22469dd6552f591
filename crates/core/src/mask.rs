//! Execution-mask decoding: raw hex bitfields to per-lane state.

use lanescope_protocol::{Lane, LaneState};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MaskError {
    /// The backend returned something other than a number (`void`,
    /// `<unavailable>`, ...). The owning thread has no SIMD data.
    #[error("mask is not numeric: {0:?}")]
    NotNumeric(String),
}

/// Raw masks for one thread at one stop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionMaskSet {
    pub execution_mask: String,
    pub hit_lanes_mask: Option<String>,
    /// SIMD width from the independent width query.
    pub length: u32,
}

/// Width-hint patterns (low 32 bits of the inactive-lanes mask) and the
/// SIMD width each one identifies.
const WIDTH_PATTERNS: [(u64, u32); 3] = [(0xffff_ff00, 8), (0xffff_0000, 16), (0x0000_0000, 32)];

/// Decode a mask set into `length` lanes.
///
/// Lane `i` is bit `i` of the mask. The mask is padded to `length` with
/// inactive lanes; bits above `length` are ignored. A hit bit on an active
/// lane turns it into [`LaneState::Hit`]. Only the execution mask must be
/// numeric; an unreadable hit mask decodes as no hits.
pub fn decode(mask: &ExecutionMaskSet, current_lane: Option<u32>) -> Result<Vec<Lane>, MaskError> {
    let width = mask.length as usize;
    let active = lane_bits(&mask.execution_mask, width)?;
    let hit = match mask.hit_lanes_mask.as_deref().map(|hit| lane_bits(hit, width)) {
        Some(Ok(hit)) => hit,
        Some(Err(err)) => {
            debug!(%err, "ignoring hit-lanes mask");
            vec![false; width]
        }
        None => vec![false; width],
    };

    Ok(active
        .iter()
        .zip(&hit)
        .enumerate()
        .map(|(i, (&active, &hit))| {
            let state = match (active, hit) {
                (false, _) => LaneState::Inactive,
                (true, true) => LaneState::Hit,
                (true, false) => LaneState::Active,
            };
            let lane_id = i as u32;
            Lane {
                current: current_lane == Some(lane_id),
                ..Lane::new(lane_id, state)
            }
        })
        .collect())
}

/// Parse a hex mask into exactly `width` lane bits, lane 0 first.
///
/// Digits are read from the least significant end, so leading zeros the
/// backend drops never shift lane positions.
pub fn lane_bits(mask: &str, width: usize) -> Result<Vec<bool>, MaskError> {
    let digits = hex_digits(mask)?;
    let mut bits = vec![false; width];
    for (nibble_index, digit) in digits.iter().rev().enumerate() {
        for bit in 0..4 {
            let lane = nibble_index * 4 + bit;
            if lane >= width {
                return Ok(bits);
            }
            bits[lane] = digit & (1 << bit) != 0;
        }
    }
    Ok(bits)
}

fn hex_digits(mask: &str) -> Result<Vec<u8>, MaskError> {
    let trimmed = mask.trim();
    let body = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    if body.is_empty() {
        return Err(MaskError::NotNumeric(mask.to_string()));
    }
    body.chars()
        .filter(|c| *c != '_')
        .map(|c| {
            c.to_digit(16)
                .map(|d| d as u8)
                .ok_or_else(|| MaskError::NotNumeric(mask.to_string()))
        })
        .collect()
}

/// Whether a backend value parses as a hex mask.
pub fn is_numeric(mask: &str) -> bool {
    hex_digits(mask).is_ok()
}

/// Map a width-hint mask to a SIMD width; unknown patterns give 0.
pub fn width_from_hint(hint: &str) -> u32 {
    let Ok(digits) = hex_digits(hint) else {
        return 0;
    };
    // Compare on the low 32 bits only.
    let low = digits
        .iter()
        .rev()
        .take(8)
        .rev()
        .fold(0u64, |acc, d| (acc << 4) | u64::from(*d));
    WIDTH_PATTERNS
        .iter()
        .find(|(pattern, _)| *pattern == low)
        .map_or(0, |(_, width)| *width)
}

/// Lane-scope bitmask covering every lane of `width`, hex encoded.
pub fn full_lanes_mask(width: u32) -> String {
    let width = width.min(64);
    let mask: u128 = (1u128 << width) - 1;
    format!("{mask:#x}")
}
