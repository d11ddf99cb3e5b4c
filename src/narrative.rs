use std::fmt::Write;

use crate::metrics::{highest_gain, round2};
use crate::models::{GroupMetrics, OverallMetrics};

/// A sub-group breakdown to describe, e.g. gender or class.
#[derive(Debug, Clone, Copy)]
pub struct Breakdown<'a> {
    pub dimension: &'a str,
    pub groups: &'a [GroupMetrics],
}

fn fmt2(value: f64) -> String {
    format!("{:.2}", round2(value))
}

pub fn build_narrative(overall: &OverallMetrics, breakdowns: &[Breakdown<'_>]) -> String {
    let mut output = String::new();

    let _ = writeln!(
        output,
        "A total of {} participants had valid pre-test and post-test scores.",
        overall.count
    );
    let _ = writeln!(
        output,
        "The average pre-test score was {}, while the average post-test score was {}.",
        fmt2(overall.mean_pre),
        fmt2(overall.mean_post)
    );
    let _ = writeln!(
        output,
        "This reflects an average gain of {} points, a {}% change from baseline.",
        fmt2(overall.mean_gain),
        fmt2(overall.percent_gain)
    );
    let _ = write!(
        output,
        "{}% of participants improved between the pre-test and the post-test.",
        fmt2(overall.improvement_rate)
    );

    for breakdown in breakdowns.iter().filter(|b| !b.groups.is_empty()) {
        let _ = writeln!(output);
        let _ = writeln!(output);
        let _ = writeln!(output, "Disaggregated by {}:", breakdown.dimension);
        for group in breakdown.groups {
            let metrics = &group.metrics;
            let _ = writeln!(
                output,
                "{} participants (n={}) moved from {} to {}, an average gain of {} points ({}%).",
                group.key,
                metrics.count,
                fmt2(metrics.mean_pre),
                fmt2(metrics.mean_post),
                fmt2(metrics.mean_gain),
                fmt2(metrics.percent_gain)
            );
        }
        if let Some(best) = highest_gain(breakdown.groups) {
            let _ = write!(
                output,
                "The highest average gain by {} was observed among {} participants ({} points).",
                breakdown.dimension,
                best.key,
                fmt2(best.metrics.mean_gain)
            );
        }
    }

    output
}
