use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus exporter and register all application metrics.
/// Returns a `PrometheusHandle` whose `render()` method produces the
/// text/plain Prometheus scrape payload.
///
/// Safe to call multiple times (e.g. in tests) — subsequent calls return a
/// new handle but silently ignore the global recorder installation error.
pub fn init_metrics() -> PrometheusHandle {
    let builder = PrometheusBuilder::new();
    let handle = match builder.install_recorder() {
        Ok(h) => h,
        Err(_) => {
            // Recorder already installed (happens in tests). Build a standalone
            // handle that still works for rendering.
            PrometheusBuilder::new().build_recorder().handle()
        }
    };

    // Pre-register counters so they appear even before the first increment.
    counter!("signals_accepted").absolute(0);
    counter!("signals_rejected").absolute(0);
    counter!("signals_duplicate").absolute(0);
    counter!("trades_entered").absolute(0);
    counter!("trades_exited").absolute(0);
    counter!("trades_failed").absolute(0);
    counter!("exec_requests_enqueued").absolute(0);
    counter!("monitor_emissions").absolute(0);

    // Pre-register gauges at zero.
    gauge!("open_trades").set(0.0);
    gauge!("monitored_trades").set(0.0);

    // Histogram is lazily created on first record; force creation.
    histogram!("pipeline_latency_seconds").record(0.0);

    handle
}
