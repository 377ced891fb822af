//! Prometheus text exposition format.
//!
//! Renders latency gauges into the Prometheus text exposition format
//! for scraping by a Prometheus server or compatible agent.

use std::fmt::Write;

use netlag_core::LatencyMeasurement;

struct Gauge {
    name: &'static str,
    help: &'static str,
    value: fn(&LatencyMeasurement) -> f64,
}

const GAUGES: [Gauge; 3] = [
    Gauge {
        name: "node_min_latency_ms",
        help: "Minimum round-trip latency in milliseconds between nodes.",
        value: min_ms,
    },
    Gauge {
        name: "node_max_latency_ms",
        help: "Maximum round-trip latency in milliseconds between nodes.",
        value: max_ms,
    },
    Gauge {
        name: "node_avg_latency_ms",
        help: "Mean round-trip latency in milliseconds between nodes.",
        value: mean_ms,
    },
];

fn min_ms(m: &LatencyMeasurement) -> f64 {
    m.min
}

fn max_ms(m: &LatencyMeasurement) -> f64 {
    m.max
}

fn mean_ms(m: &LatencyMeasurement) -> f64 {
    m.mean
}

/// Render latency samples into Prometheus text format.
///
/// Produces one GAUGE family per statistic with
/// `from_node`, `to_node`, `from_ip` and `to_ip` labels.
pub fn render_prometheus(samples: &[LatencyMeasurement]) -> String {
    let mut out = String::new();

    for gauge in &GAUGES {
        let _ = writeln!(out, "# HELP {} {}", gauge.name, gauge.help);
        let _ = writeln!(out, "# TYPE {} gauge", gauge.name);
        for m in samples {
            let _ = writeln!(
                out,
                "{}{{from_node=\"{}\",to_node=\"{}\",from_ip=\"{}\",to_ip=\"{}\"}} {}",
                gauge.name,
                escape_label(&m.from_name),
                escape_label(&m.to_name),
                escape_label(&m.from_address),
                escape_label(&m.to_address),
                (gauge.value)(m),
            );
        }
    }

    out
}

fn escape_label(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            c => escaped.push(c),
        }
    }
    escaped
}
