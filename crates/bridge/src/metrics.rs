//! Bridge metrics collection and Prometheus text exposition.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;

/// Tracks counters and gauges for bridge operations. The metric
/// cardinality here is fixed and small, so a plain mutexed map is
/// simpler than pulling in a full metrics crate for this process.
pub struct Metrics {
    counters: Mutex<HashMap<String, u64>>,
    gauges: Mutex<HashMap<String, f64>>,
    started_at: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            counters: Mutex::new(HashMap::new()),
            gauges: Mutex::new(HashMap::new()),
            started_at: Instant::now(),
        }
    }

    pub fn inc(&self, name: &str) {
        self.inc_by(name, 1);
    }

    pub fn inc_by(&self, name: &str, value: u64) {
        let mut counters = self.counters.lock().expect("metrics lock poisoned");
        *counters.entry(format!("bridge_{name}")).or_insert(0) += value;
    }

    pub fn set_gauge(&self, name: &str, value: f64) {
        let mut gauges = self.gauges.lock().expect("metrics lock poisoned");
        gauges.insert(format!("bridge_{name}"), value);
    }

    pub fn get_counter(&self, name: &str) -> u64 {
        let counters = self.counters.lock().expect("metrics lock poisoned");
        *counters.get(&format!("bridge_{name}")).unwrap_or(&0)
    }

    pub fn to_prometheus(&self) -> String {
        let mut lines = Vec::new();

        let counters = self.counters.lock().expect("metrics lock poisoned");
        let mut counter_names: Vec<_> = counters.keys().collect();
        counter_names.sort();
        for name in counter_names {
            lines.push(format!("# TYPE {name} counter"));
            lines.push(format!("{name} {}", counters[name]));
        }
        drop(counters);

        let gauges = self.gauges.lock().expect("metrics lock poisoned");
        let mut gauge_names: Vec<_> = gauges.keys().collect();
        gauge_names.sort();
        for name in gauge_names {
            lines.push(format!("# TYPE {name} gauge"));
            lines.push(format!("{name} {}", gauges[name]));
        }
        drop(gauges);

        lines.push("# TYPE bridge_uptime_seconds gauge".to_string());
        lines.push(format!("bridge_uptime_seconds {:.1}", self.started_at.elapsed().as_secs_f64()));

        lines.join("\n") + "\n"
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate_and_render() {
        let metrics = Metrics::new();
        metrics.inc("messages_inbound_total");
        metrics.inc("messages_inbound_total");
        assert_eq!(metrics.get_counter("messages_inbound_total"), 2);

        let rendered = metrics.to_prometheus();
        assert!(rendered.contains("bridge_messages_inbound_total 2"));
        assert!(rendered.contains("bridge_uptime_seconds"));
    }

    #[test]
    fn gauges_overwrite_rather_than_accumulate() {
        let metrics = Metrics::new();
        metrics.set_gauge("sse_connections_active", 3.0);
        metrics.set_gauge("sse_connections_active", 1.0);
        let rendered = metrics.to_prometheus();
        assert!(rendered.contains("bridge_sse_connections_active 1"));
    }
}
