//! Prometheus text exposition format.
//!
//! Renders a [`MetricsReport`] for scraping by a Prometheus server or a
//! compatible agent.

use std::fmt::Write;

use scanward_state::ScanStatus;

use crate::counters::MetricsReport;

fn header(out: &mut String, name: &str, kind: &str, help: &str) {
    let _ = writeln!(out, "# HELP {name} {help}");
    let _ = writeln!(out, "# TYPE {name} {kind}");
}

/// Render a metrics report into Prometheus text format.
pub fn render_prometheus(report: &MetricsReport) -> String {
    let mut out = String::new();

    header(
        &mut out,
        "scanward_operations_total",
        "counter",
        "Gateway operations processed by the model writer.",
    );
    for (op, count) in &report.operations {
        let _ = writeln!(
            out,
            "scanward_operations_total{{operation=\"{}\"}} {count}",
            op.as_str()
        );
    }

    header(
        &mut out,
        "scanward_scans_assigned_total",
        "counter",
        "Images handed to scanner workers.",
    );
    let _ = writeln!(out, "scanward_scans_assigned_total {}", report.scans_assigned);

    header(
        &mut out,
        "scanward_scans_finished_total",
        "counter",
        "Accepted scan completions by result.",
    );
    let _ = writeln!(
        out,
        "scanward_scans_finished_total{{result=\"done\"}} {}",
        report.scans_done
    );
    let _ = writeln!(
        out,
        "scanward_scans_finished_total{{result=\"error\"}} {}",
        report.scans_failed
    );

    header(
        &mut out,
        "scanward_scan_retries_total",
        "counter",
        "Failed scans sent back for another attempt.",
    );
    let _ = writeln!(out, "scanward_scan_retries_total {}", report.scan_retries);

    header(
        &mut out,
        "scanward_stalled_scans_total",
        "counter",
        "In-progress scans requeued after exceeding the client timeout.",
    );
    let _ = writeln!(out, "scanward_stalled_scans_total {}", report.stalled_scans);

    header(
        &mut out,
        "scanward_stale_completions_total",
        "counter",
        "Completion reports for images that were not in progress.",
    );
    let _ = writeln!(
        out,
        "scanward_stale_completions_total {}",
        report.stale_completions
    );

    header(
        &mut out,
        "scanward_rejected_requests_total",
        "counter",
        "Requests rejected as invalid.",
    );
    let _ = writeln!(
        out,
        "scanward_rejected_requests_total {}",
        report.rejected_requests
    );

    header(&mut out, "scanward_images", "gauge", "Known images by scan status.");
    for status in ScanStatus::ALL {
        let _ = writeln!(
            out,
            "scanward_images{{status=\"{}\"}} {}",
            status.as_str(),
            report.model.images.get(status)
        );
    }

    header(&mut out, "scanward_pods", "gauge", "Known pods.");
    let _ = writeln!(out, "scanward_pods {}", report.model.pods);

    header(
        &mut out,
        "scanward_concurrency_limit",
        "gauge",
        "Maximum number of simultaneous scans.",
    );
    let _ = writeln!(
        out,
        "scanward_concurrency_limit {}",
        report.model.concurrency_limit
    );

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counters::{OperationKind, ScanMetrics};
    use scanward_state::{ModelStats, StatusCounts};

    #[test]
    fn render_empty() {
        let output = render_prometheus(&ScanMetrics::new().report());
        assert!(output.contains("# TYPE scanward_operations_total counter"));
        assert!(output.contains("scanward_operations_total{operation=\"add_pod\"} 0"));
        assert!(output.contains("scanward_images{status=\"in_progress\"} 0"));
    }

    #[test]
    fn render_counters_and_gauges() {
        let metrics = ScanMetrics::new();
        metrics.record_operation(OperationKind::FinishScan);
        metrics.record_assignment();
        metrics.record_scan_done();
        metrics.record_stalled_scans(2);
        metrics.record_stale_completion();
        metrics.set_model_stats(&ModelStats {
            images: StatusCounts {
                unknown: 1,
                in_progress: 2,
                done: 3,
                error: 4,
            },
            pods: 9,
            concurrency_limit: 7,
        });

        let output = render_prometheus(&metrics.report());
        assert!(output.contains("scanward_operations_total{operation=\"finish_scan\"} 1"));
        assert!(output.contains("scanward_scans_assigned_total 1"));
        assert!(output.contains("scanward_scans_finished_total{result=\"done\"} 1"));
        assert!(output.contains("scanward_stalled_scans_total 2"));
        assert!(output.contains("scanward_stale_completions_total 1"));
        assert!(output.contains("scanward_images{status=\"error\"} 4"));
        assert!(output.contains("scanward_pods 9"));
        assert!(output.contains("scanward_concurrency_limit 7"));
    }

    #[test]
    fn every_sample_line_has_a_value() {
        let output = render_prometheus(&ScanMetrics::new().report());
        for line in output.lines() {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let value = line.rsplit(' ').next().unwrap();
            assert!(value.parse::<u64>().is_ok(), "bad sample line: {line}");
        }
    }
}
