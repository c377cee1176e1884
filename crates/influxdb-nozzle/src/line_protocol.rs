// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! InfluxDB line protocol rendering.
//!
//! Each series becomes exactly one line:
//!
//! ```text
//! <prefix><name>[,<tag>...] value=<v>[,value=<v>...] <timestamp ns>
//! ```
//!
//! All points accumulated for a series during the interval land on the same line as repeated
//! `value=` fields, stamped with the first point's time. Consumers of the written data must
//! expect more than one `value` field per line.
//!
//! Values are assumed finite: the aggregator drops `NaN` and infinite points, which InfluxDB
//! would reject for the whole payload.

use crate::constants::NANOS_PER_SECOND;
use crate::metric::{Batch, SeriesKey, SeriesValue};
use std::fmt::Write as _;

/// Renders `batch` and returns the payload together with the number of series in it.
///
/// `now` (unix seconds) stamps series without points. Lines are sorted by series name.
#[must_use]
pub fn render(batch: &Batch, prefix: &str, now: i64) -> (Vec<u8>, usize) {
    let mut entries: Vec<(&SeriesKey, &SeriesValue)> = batch.iter().collect();
    entries.sort_by(|(a, _), (b, _)| {
        a.name
            .as_str()
            .cmp(b.name.as_str())
            .then_with(|| a.kind.cmp(&b.kind))
            .then_with(|| a.tags_hash.cmp(&b.tags_hash))
    });

    let mut out = String::new();
    for (key, series) in &entries {
        render_line(&mut out, prefix, key.name.as_str(), series, now);
    }
    (out.into_bytes(), entries.len())
}

fn render_line(out: &mut String, prefix: &str, name: &str, series: &SeriesValue, now: i64) {
    out.push_str(prefix);
    out.push_str(name);
    if !series.tags.is_empty() {
        out.push(',');
        let _ = write!(out, "{}", series.tags);
    }

    out.push(' ');
    for (i, point) in series.points.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        let _ = write!(out, "value={}", point.value);
    }

    let seconds = series.points.first().map_or(now, |point| point.timestamp);
    let _ = writeln!(out, " {}", seconds.saturating_mul(NANOS_PER_SECOND));
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::metric::{new_batch, MetricKind, Point};
    use crate::tags::TagSet;
    use ustr::Ustr;

    const NOW: i64 = 1_700_000_000;

    fn insert(batch: &mut Batch, name: &str, tags: TagSet, points: Vec<Point>) {
        batch.insert(
            SeriesKey::new(MetricKind::Value, Ustr::from(name), &tags),
            SeriesValue { tags, points },
        );
    }

    fn point(timestamp: i64, value: f64) -> Point {
        Point { timestamp, value }
    }

    fn render_str(batch: &Batch, prefix: &str) -> String {
        let (bytes, _) = render(batch, prefix, NOW);
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn test_single_point() {
        let mut batch = new_batch();
        insert(
            &mut batch,
            "origin.metricName",
            TagSet::from_pairs([("deployment", "cf"), ("job", "doppler")]),
            vec![point(1, 5.0)],
        );

        let (bytes, count) = render(&batch, "firehose.", NOW);
        assert_eq!(count, 1);
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            "firehose.origin.metricName,deployment=cf,job=doppler value=5 1000000000\n"
        );
    }

    #[test]
    fn test_points_of_a_series_share_one_line() {
        let mut batch = new_batch();
        insert(
            &mut batch,
            "origin.metricName",
            TagSet::from_pairs([("job", "doppler")]),
            vec![point(2, 5.5), point(3, 6.25)],
        );

        let rendered = render_str(&batch, "");
        assert_eq!(rendered.lines().count(), 1);
        assert!(rendered.contains("value=5.5"));
        assert!(rendered.contains("value=6.25"));
        assert_eq!(
            rendered,
            "origin.metricName,job=doppler value=5.5,value=6.25 2000000000\n"
        );
    }

    #[test]
    fn test_untagged_series_has_no_separator() {
        let mut batch = new_batch();
        insert(&mut batch, "origin.bare", TagSet::new(), vec![point(4, 1.0)]);

        assert_eq!(render_str(&batch, ""), "origin.bare value=1 4000000000\n");
    }

    #[test]
    fn test_series_without_points_uses_now() {
        let mut batch = new_batch();
        insert(&mut batch, "origin.empty", TagSet::new(), Vec::new());

        assert_eq!(render_str(&batch, ""), "origin.empty  1700000000000000000\n");
    }

    #[test]
    fn test_float_formatting() {
        let mut batch = new_batch();
        insert(
            &mut batch,
            "origin.float",
            TagSet::new(),
            vec![point(1, 0.1), point(1, -3.0), point(1, 12345678.9)],
        );

        assert_eq!(
            render_str(&batch, ""),
            "origin.float value=0.1,value=-3,value=12345678.9 1000000000\n"
        );
    }

    #[test]
    fn test_every_series_is_rendered_once() {
        let mut batch = new_batch();
        insert(
            &mut batch,
            "origin.metricName",
            TagSet::from_pairs([("job", "doppler")]),
            vec![point(1, 1.0)],
        );
        insert(
            &mut batch,
            "origin.metricName",
            TagSet::from_pairs([("job", "gorouter")]),
            vec![point(1, 2.0)],
        );
        insert(&mut batch, "origin.another", TagSet::new(), vec![point(1, 3.0)]);

        let (bytes, count) = render(&batch, "", NOW);
        let rendered = String::from_utf8(bytes).unwrap();
        let lines: Vec<&str> = rendered.lines().collect();

        assert_eq!(count, 3);
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "origin.another value=3 1000000000");
        assert!(lines.contains(&"origin.metricName,job=doppler value=1 1000000000"));
        assert!(lines.contains(&"origin.metricName,job=gorouter value=2 1000000000"));
    }

    #[test]
    fn test_empty_batch() {
        let (bytes, count) = render(&new_batch(), "prefix.", NOW);
        assert!(bytes.is_empty());
        assert_eq!(count, 0);
    }
}
