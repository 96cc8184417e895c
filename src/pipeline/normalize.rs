//! Sentinel-code normalization.
//!
//! NHANES encodes "refused" and "don't know" with codes whose width follows
//! the field's domain (7/9 for one-digit answers, 77/99 for two-digit ones,
//! and so on). Only the codes of a field's own group are nulled, so a
//! legitimate 7 in a two-digit field survives.

use std::collections::BTreeMap;

use crate::domain::{NanGroup, RecordFrame};

/// Replace sentinel codes with missing values.
///
/// Fields not listed in any group, and listed fields absent from the frame,
/// are left alone. Returns the number of cells nulled.
pub fn normalize(frame: &mut RecordFrame, groups: &BTreeMap<String, NanGroup>) -> usize {
    let mut nulled = 0;

    for (group, spec) in groups {
        for field in &spec.fields {
            let Some(value) = frame.value(field) else {
                continue;
            };
            if spec.is_sentinel(value) {
                frame.clear(field);
                nulled += 1;
                tracing::debug!(field = %field, group = %group, "sentinel code treated as missing");
            }
        }
    }

    nulled
}
