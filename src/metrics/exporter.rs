use prometheus::{IntGaugeVec, Opts, Registry};

use super::Metrics;

/// Mirrors jitter buffer snapshots into prometheus gauges, one label set per
/// buffer name. Counters are exported as their cumulative value.
pub struct JitterMetricsExporter {
    elements: IntGaugeVec,
    depth: IntGaugeVec,
}

impl JitterMetricsExporter {
    pub fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let elements = IntGaugeVec::new(
            Opts::new(
                "jitter_buffer_elements_total",
                "Cumulative jitter buffer element counters",
            ),
            &["buffer", "kind"],
        )?;
        let depth = IntGaugeVec::new(
            Opts::new("jitter_buffer_depth_elements", "Jitter buffer playout depth"),
            &["buffer", "kind"],
        )?;
        registry.register(Box::new(elements.clone()))?;
        registry.register(Box::new(depth.clone()))?;
        Ok(JitterMetricsExporter { elements, depth })
    }

    pub fn observe(&self, buffer: &str, metrics: &Metrics) {
        let counters = [
            ("enqueued", metrics.enqueued),
            ("filled_packets", metrics.filled_packets),
            ("dropped_stale", metrics.dropped_stale),
            ("dropped_overflow", metrics.dropped_overflow),
            ("dropped_duplicate", metrics.dropped_duplicate),
            ("concealed", metrics.concealed),
            ("updated", metrics.updated),
            ("update_missed", metrics.update_missed),
            ("skipped", metrics.skipped),
            ("dequeued", metrics.dequeued),
            ("underruns", metrics.underruns),
        ];
        for (kind, value) in counters {
            self.elements
                .with_label_values(&[buffer, kind])
                .set(value.min(i64::MAX as u64) as i64);
        }
        self.depth
            .with_label_values(&[buffer, "current"])
            .set(metrics.current_depth as i64);
        self.depth
            .with_label_values(&[buffer, "peak"])
            .set(metrics.peak_depth as i64);
    }
}

#[cfg(test)]
mod exporter_tests {
    use super::*;

    fn gauge_value(registry: &Registry, name: &str, buffer: &str, kind: &str) -> Option<i64> {
        registry
            .gather()
            .iter()
            .filter(|family| family.get_name() == name)
            .flat_map(|family| family.get_metric().iter())
            .find(|metric| {
                let labels = metric.get_label();
                labels
                    .iter()
                    .any(|l| l.get_name() == "buffer" && l.get_value() == buffer)
                    && labels
                        .iter()
                        .any(|l| l.get_name() == "kind" && l.get_value() == kind)
            })
            .map(|metric| metric.get_gauge().get_value() as i64)
    }

    #[test]
    fn test_exporter_mirrors_snapshot() {
        let registry = Registry::new();
        let exporter = JitterMetricsExporter::new(&registry).unwrap();
        let metrics = Metrics {
            enqueued: 40,
            concealed: 3,
            dropped_stale: 2,
            current_depth: 12,
            peak_depth: 30,
            ..Default::default()
        };
        exporter.observe("audio", &metrics);

        assert_eq!(
            gauge_value(&registry, "jitter_buffer_elements_total", "audio", "enqueued"),
            Some(40)
        );
        assert_eq!(
            gauge_value(&registry, "jitter_buffer_elements_total", "audio", "concealed"),
            Some(3)
        );
        assert_eq!(
            gauge_value(&registry, "jitter_buffer_elements_total", "audio", "dropped_stale"),
            Some(2)
        );
        assert_eq!(
            gauge_value(&registry, "jitter_buffer_depth_elements", "audio", "current"),
            Some(12)
        );
        assert_eq!(
            gauge_value(&registry, "jitter_buffer_depth_elements", "audio", "peak"),
            Some(30)
        );
    }

    #[test]
    fn test_exporter_keeps_buffers_apart() {
        let registry = Registry::new();
        let exporter = JitterMetricsExporter::new(&registry).unwrap();
        exporter.observe(
            "left",
            &Metrics {
                dequeued: 5,
                ..Default::default()
            },
        );
        exporter.observe(
            "right",
            &Metrics {
                dequeued: 9,
                ..Default::default()
            },
        );
        assert_eq!(
            gauge_value(&registry, "jitter_buffer_elements_total", "left", "dequeued"),
            Some(5)
        );
        assert_eq!(
            gauge_value(&registry, "jitter_buffer_elements_total", "right", "dequeued"),
            Some(9)
        );
    }

    #[test]
    fn test_exporter_registers_once_per_registry() {
        let registry = Registry::new();
        assert!(JitterMetricsExporter::new(&registry).is_ok());
        assert!(JitterMetricsExporter::new(&registry).is_err());
    }
}
