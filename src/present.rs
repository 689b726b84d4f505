//! Compresses a sorted integer set into a short range list for log lines.
//!
//! Not on any coordination path — this exists purely so a heartbeat's "set
//! values to ..." log line stays readable when a client owns hundreds of
//! slots.

use std::fmt::Write as _;

/// Formats `values` as `"N/ranges"`, e.g. `"5/0-2,7,9"`. Sorts a copy of the
/// input; does not assume it is already sorted.
pub fn present_integers(values: &[i64]) -> String {
    let mut sorted = values.to_vec();
    sorted.sort_unstable();

    let mut out = format!("{}/", sorted.len());

    match sorted.len() {
        0 => {
            out.push('-');
            return out;
        }
        1 => {
            let _ = write!(out, "{}", sorted[0]);
            return out;
        }
        _ => {}
    }

    let last_index = sorted.len() - 1;
    let mut is_range_start = false;
    let mut prev = sorted[0];
    for (i, &current) in sorted.iter().enumerate().skip(1) {
        if prev + 1 == current {
            if !is_range_start {
                let _ = write!(out, "{prev}-");
            }
            if last_index == i {
                let _ = write!(out, "{current}");
            }
            is_range_start = true;
        } else {
            let _ = write!(out, "{prev},");
            is_range_start = false;
            if last_index == i {
                let _ = write!(out, "{current}");
            }
        }
        prev = current;
    }

    out
}
