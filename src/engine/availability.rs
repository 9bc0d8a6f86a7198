use crate::model::*;

/// Free windows of one resource-day.
///
/// Starts from the operating hours and subtracts every reservation that still
/// holds its slot. Returned spans are sorted and disjoint.
pub fn free_windows(ledger: Option<&DayLedger>, open: TimeOfDay, close: TimeOfDay) -> Vec<TimeSpan> {
    let Some(hours) = TimeSpan::try_new(open, close) else {
        return Vec::new();
    };
    let mut blocked: Vec<TimeSpan> = ledger
        .into_iter()
        .flat_map(|l| l.overlapping(&hours))
        .filter(|r| r.status.blocks_slot())
        .map(|r| r.span)
        .collect();
    if blocked.is_empty() {
        return vec![hours];
    }
    blocked.sort_by_key(|s| s.start);
    let blocked = merge_overlapping(&blocked);
    subtract_intervals(&[hours], &blocked)
}

/// Merge sorted spans that overlap or touch.
pub fn merge_overlapping(sorted: &[TimeSpan]) -> Vec<TimeSpan> {
    let mut merged: Vec<TimeSpan> = Vec::new();
    for &span in sorted {
        if let Some(last) = merged.last_mut()
            && span.start <= last.end
        {
            last.end = last.end.max(span.end);
            continue;
        }
        merged.push(span);
    }
    merged
}

/// `base` minus `to_remove`. Both inputs must be sorted by start.
pub fn subtract_intervals(base: &[TimeSpan], to_remove: &[TimeSpan]) -> Vec<TimeSpan> {
    let mut result = Vec::new();
    let mut ri = 0;

    for &b in base {
        let mut current_start = b.start;

        while ri < to_remove.len() && to_remove[ri].end <= current_start {
            ri += 1;
        }

        let mut j = ri;
        while j < to_remove.len() && to_remove[j].start < b.end {
            let r = &to_remove[j];
            if r.start > current_start {
                result.push(TimeSpan::new(current_start, r.start));
            }
            current_start = current_start.max(r.end);
            j += 1;
        }

        if current_start < b.end {
            result.push(TimeSpan::new(current_start, b.end));
        }
    }
    result
}
