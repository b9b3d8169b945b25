//! Statistics export: JSON documents and Prometheus exposition

use std::collections::HashMap;

use prometheus::{Encoder, Gauge, IntCounter, IntGauge, Opts, Registry, TextEncoder};
use serde_json::{Value, json};

use crate::errors::{PoolError, PoolResult};
use crate::pool::ResourcePool;
use crate::stats::{Granularity, PoolStatsPeriod, PoolStatsSnapshot};

fn metrics_error(error: impl std::fmt::Display) -> PoolError {
    PoolError::Metrics(error.to_string())
}

impl PoolStatsPeriod {
    fn ratios(&self) -> Value {
        json!({
            "hit": self.hit_ratio(),
            "miss": self.miss_ratio(),
            "return": self.return_ratio(),
            "error": self.error_ratio(),
            "purge": self.purge_ratio(),
            "wait": self.wait_ratio(),
            "timeout": self.timeout_ratio(),
            "disposed": self.disposed_ratio(),
            "size_change_events": self.size_change_events_ratio(),
        })
    }
}

impl PoolStatsSnapshot {
    /// Render every bucket, with its derived ratios, as a JSON document
    ///
    /// # Examples
    ///
    /// ```
    /// use esox_resourcepool::PoolStats;
    ///
    /// let stats = PoolStats::new();
    /// stats.record_request(true);
    ///
    /// let document = stats.snapshot().to_json().unwrap();
    /// assert_eq!(document["periods"].as_array().unwrap().len(), 6);
    /// assert_eq!(document["periods"][5]["granularity"], "all_time");
    /// assert_eq!(document["periods"][5]["ratios"]["hit"], 1.0);
    /// ```
    pub fn to_json(&self) -> PoolResult<Value> {
        let mut document = serde_json::to_value(self).map_err(metrics_error)?;
        if let Some(periods) = document.get_mut("periods").and_then(Value::as_array_mut) {
            for (value, period) in periods.iter_mut().zip(&self.periods) {
                if let Some(object) = value.as_object_mut() {
                    object.insert("ratios".to_string(), period.ratios());
                    object.insert(
                        "size_change_events_per_minute".to_string(),
                        json!(period.size_change_events_per_minute()),
                    );
                }
            }
        }
        Ok(document)
    }
}

/// Pool sizes exported as gauges
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolGauges {
    pub count: usize,
    pub in_use: usize,
    pub available: usize,
    pub max_size: usize,
}

/// Metrics exporter for Prometheus format
pub struct MetricsExporter;

impl MetricsExporter {
    /// Export gauges, all-time counters and current-minute ratios in
    /// Prometheus exposition format. `pool_name` and `tags` become constant
    /// labels on every series.
    pub fn export_prometheus(
        gauges: &PoolGauges,
        snapshot: Option<&PoolStatsSnapshot>,
        pool_name: &str,
        tags: Option<&HashMap<String, String>>,
    ) -> PoolResult<String> {
        let registry =
            Registry::new_custom(None, Some(Self::const_labels(pool_name, tags))).map_err(metrics_error)?;

        Self::gauge(&registry, "resourcepool_individuals", "Resources owned by the pool", gauges.count)?;
        Self::gauge(&registry, "resourcepool_individuals_in_use", "Resources currently borrowed", gauges.in_use)?;
        Self::gauge(
            &registry,
            "resourcepool_individuals_available",
            "Resources waiting to be borrowed",
            gauges.available,
        )?;
        Self::gauge(&registry, "resourcepool_max_size", "Upper bound on pool size", gauges.max_size)?;

        if let Some(all_time) = snapshot.and_then(|s| s.period(Granularity::AllTime)) {
            Self::counter(&registry, "resourcepool_requests_total", "Borrow requests", all_time.requests)?;
            Self::counter(&registry, "resourcepool_hits_total", "Requests served from the idle queue", all_time.hits)?;
            Self::counter(&registry, "resourcepool_misses_total", "Requests that found the idle queue empty", all_time.misses)?;
            Self::counter(&registry, "resourcepool_returns_total", "Resources recycled on return", all_time.returns)?;
            Self::counter(&registry, "resourcepool_purged_total", "In-use entries reclaimed by purge", all_time.purges)?;
            Self::counter(&registry, "resourcepool_waits_total", "Requests that had to wait", all_time.waits)?;
            Self::counter(&registry, "resourcepool_timeouts_total", "Requests that timed out", all_time.timeouts)?;
            Self::counter(&registry, "resourcepool_errors_total", "Resource factory failures", all_time.errors)?;
            Self::counter(&registry, "resourcepool_disposed_total", "Resources disposed", all_time.disposed)?;
            Self::counter(
                &registry,
                "resourcepool_size_changes_total",
                "Pool size change events",
                all_time.size_change_events,
            )?;
        }

        if let Some(minute) = snapshot.and_then(|s| s.period(Granularity::Minute)) {
            Self::ratio(&registry, "resourcepool_hit_ratio", "Hit ratio over the current minute", minute.hit_ratio())?;
            Self::ratio(&registry, "resourcepool_wait_ratio", "Wait ratio over the current minute", minute.wait_ratio())?;
            Self::ratio(
                &registry,
                "resourcepool_timeout_ratio",
                "Timeout ratio over the current minute",
                minute.timeout_ratio(),
            )?;
            Self::ratio(
                &registry,
                "resourcepool_purge_ratio",
                "Purge ratio over the current minute",
                minute.purge_ratio(),
            )?;
            Self::ratio(
                &registry,
                "resourcepool_error_ratio",
                "Error ratio over the current minute",
                minute.error_ratio(),
            )?;
        }

        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&registry.gather(), &mut buffer)
            .map_err(metrics_error)?;
        String::from_utf8(buffer).map_err(metrics_error)
    }

    fn const_labels(pool_name: &str, tags: Option<&HashMap<String, String>>) -> HashMap<String, String> {
        let mut labels = tags.cloned().unwrap_or_default();
        labels.insert("pool".to_string(), pool_name.to_string());
        labels
    }

    fn gauge(registry: &Registry, name: &str, help: &str, value: usize) -> PoolResult<()> {
        let gauge = IntGauge::with_opts(Opts::new(name, help)).map_err(metrics_error)?;
        gauge.set(value as i64);
        registry.register(Box::new(gauge)).map_err(metrics_error)
    }

    fn counter(registry: &Registry, name: &str, help: &str, value: u64) -> PoolResult<()> {
        let counter = IntCounter::with_opts(Opts::new(name, help)).map_err(metrics_error)?;
        counter.inc_by(value);
        registry.register(Box::new(counter)).map_err(metrics_error)
    }

    fn ratio(registry: &Registry, name: &str, help: &str, value: f64) -> PoolResult<()> {
        let gauge = Gauge::with_opts(Opts::new(name, help)).map_err(metrics_error)?;
        gauge.set(value);
        registry.register(Box::new(gauge)).map_err(metrics_error)
    }
}

impl<T: Send + 'static> ResourcePool<T> {
    pub fn gauges(&self) -> PoolGauges {
        PoolGauges {
            count: self.count(),
            in_use: self.in_use_count(),
            available: self.available_count(),
            max_size: self.max_size(),
        }
    }

    /// Statistics document, `None` when `gather_stats` is off
    pub fn export_stats_json(&self) -> PoolResult<Option<Value>> {
        self.stats().map(|stats| stats.snapshot().to_json()).transpose()
    }

    /// Export metrics in Prometheus format
    ///
    /// # Examples
    ///
    /// ```
    /// use esox_resourcepool::{PoolConfiguration, ResourcePool};
    /// use std::collections::HashMap;
    ///
    /// let pool = ResourcePool::from_fn(|| Ok::<_, std::io::Error>(0u32), PoolConfiguration::default())
    ///     .unwrap();
    ///
    /// let mut tags = HashMap::new();
    /// tags.insert("service".to_string(), "api".to_string());
    ///
    /// let output = pool.export_metrics_prometheus("channels", Some(&tags)).unwrap();
    /// assert!(output.contains("resourcepool_individuals_in_use"));
    /// assert!(output.contains("service=\"api\""));
    /// assert!(output.contains("pool=\"channels\""));
    /// ```
    pub fn export_metrics_prometheus(
        &self,
        pool_name: &str,
        tags: Option<&HashMap<String, String>>,
    ) -> PoolResult<String> {
        let snapshot = self.stats().map(|stats| stats.snapshot());
        MetricsExporter::export_prometheus(&self.gauges(), snapshot.as_ref(), pool_name, tags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::PoolStats;

    fn gauges() -> PoolGauges {
        PoolGauges {
            count: 3,
            in_use: 2,
            available: 1,
            max_size: 5,
        }
    }

    #[test]
    fn test_prometheus_counters_and_ratios() {
        let stats = PoolStats::new();
        stats.record_request(true);
        stats.record_request(false);
        stats.record_timeout();

        let snapshot = stats.snapshot();
        let output = MetricsExporter::export_prometheus(&gauges(), Some(&snapshot), "amqp", None).unwrap();

        assert!(output.contains("# TYPE resourcepool_requests_total counter"));
        assert!(output.contains("resourcepool_requests_total{pool=\"amqp\"} 2"));
        assert!(output.contains("resourcepool_individuals_in_use{pool=\"amqp\"} 2"));
        assert!(output.contains("# TYPE resourcepool_hit_ratio gauge"));
    }

    #[test]
    fn test_prometheus_without_stats_has_only_gauges() {
        let output = MetricsExporter::export_prometheus(&gauges(), None, "amqp", None).unwrap();
        assert!(output.contains("resourcepool_max_size{pool=\"amqp\"} 5"));
        assert!(!output.contains("resourcepool_requests_total"));
    }

    #[test]
    fn test_json_document_has_every_bucket() {
        let stats = PoolStats::new();
        stats.record_size_change(2);
        stats.record_request(false);

        let document = stats.snapshot().to_json().unwrap();
        assert_eq!(document["current_size"], 2);
        let periods = document["periods"].as_array().unwrap();
        let names: Vec<_> = periods.iter().map(|p| p["granularity"].as_str().unwrap()).collect();
        assert_eq!(names, vec!["minute", "hour", "day", "month", "year", "all_time"]);
        assert_eq!(periods[5]["ratios"]["miss"], 1.0);
        assert_eq!(periods[5]["size_change_events_per_minute"], 1.0);
    }
}
