use alloc::vec::Vec;

use knitc_knitout::Needle;

/// Slack below this never constrains a pair; yarn between adjacent stitches always spans two
/// needle pitches.
pub const MIN_SLACK: i32 = 2;

/// Computes the per-pair slack of a slice: how far slice-consecutive loops may sit apart
/// without tearing the yarn between them.
///
/// `slack[i]` binds the pair (i, i+1); for circular slices the last entry wraps around to
/// index 0, otherwise it is unbounded. Each entry is the larger of the source and target
/// spacing, floored at [MIN_SLACK].
pub fn compute_slack(sources: &[Needle], targets: &[Needle], circular: bool) -> Vec<i32> {
    let n = sources.len();
    let mut slack = Vec::with_capacity(n);
    if n == 0 {
        return slack;
    }
    for i in 0..n {
        let j = (i + 1) % n;
        if j == 0 && !circular {
            slack.push(i32::MAX);
            break;
        }
        let source_gap = (sources[j].offset - sources[i].offset).abs();
        let target_gap = (targets[j].offset - targets[i].offset).abs();
        slack.push(MIN_SLACK.max(source_gap).max(target_gap));
    }
    slack
}

#[cfg(test)]
mod tests {
    use knitc_knitout::Needle;

    use super::*;

    fn front_row(offsets: &[i32]) -> Vec<Needle> {
        offsets.iter().map(|o| Needle::front(*o)).collect()
    }

    #[test]
    fn floors_at_minimum() {
        let sources = front_row(&[0, 1, 2]);
        let slack = compute_slack(&sources, &sources, false);
        assert_eq!(slack, [2, 2, i32::MAX]);
    }

    #[test]
    fn takes_max_of_source_and_target_gaps() {
        let sources = front_row(&[0, 1]);
        let targets = front_row(&[0, 4]);
        assert_eq!(compute_slack(&sources, &targets, false), [4, i32::MAX]);
    }

    #[test]
    fn circular_wraps_around() {
        let sources = front_row(&[0, 1, 2, 5]);
        let slack = compute_slack(&sources, &sources, true);
        assert_eq!(slack.len(), 4);
        assert_eq!(slack[3], 5); // |0 - 5|
    }
}
