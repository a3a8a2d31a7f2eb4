//! # Metrics Collection
//!
//! Counters are emitted through the `metrics` facade. No exporter is
//! installed here; the embedding service decides where they go.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};

pub const CERTIFICATES_GENERATED_TOTAL: &str = "certkeeper_certificates_generated_total";
pub const CERTIFICATE_GENERATION_SECONDS: &str = "certkeeper_certificate_generation_seconds";
pub const STORE_CONFLICTS_TOTAL: &str = "certkeeper_store_conflicts_total";
pub const CACHE_HITS_TOTAL: &str = "certkeeper_cache_hits_total";
pub const CACHE_MISSES_TOTAL: &str = "certkeeper_cache_misses_total";

/// Metrics recorder for certificate lifecycle events
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsRecorder;

impl MetricsRecorder {
    /// Create a new metrics recorder instance
    pub fn new() -> Self {
        Self
    }

    /// Record a certificate that was generated and won its write
    pub fn record_certificate_generated(&self, certificate_type: &str, outcome: &str) {
        let labels =
            [("certificate_type", certificate_type.to_string()), ("outcome", outcome.to_string())];
        counter!(CERTIFICATES_GENERATED_TOTAL, &labels).increment(1);
    }

    /// Record time spent inside the certificate generator
    pub fn record_generation_duration(&self, certificate_type: &str, duration: f64) {
        let labels = [("certificate_type", certificate_type.to_string())];
        histogram!(CERTIFICATE_GENERATION_SECONDS, &labels).record(duration);
    }

    /// Record a write that lost an optimistic-concurrency race
    pub fn record_store_conflict(&self, certificate_type: &str, operation: &str) {
        let labels = [
            ("certificate_type", certificate_type.to_string()),
            ("operation", operation.to_string()),
        ];
        counter!(STORE_CONFLICTS_TOTAL, &labels).increment(1);
    }

    /// Record a cache lookup outcome
    pub fn record_cache_lookup(&self, key: &str, hit: bool) {
        let labels = [("key", key.to_string())];
        if hit {
            counter!(CACHE_HITS_TOTAL, &labels).increment(1);
        } else {
            counter!(CACHE_MISSES_TOTAL, &labels).increment(1);
        }
    }

    /// Register metric descriptions so exporters show them before the first event
    pub fn register_metrics(&self) {
        describe_counter!(
            CERTIFICATES_GENERATED_TOTAL,
            Unit::Count,
            "Certificates generated and persisted to the shared store"
        );
        describe_histogram!(
            CERTIFICATE_GENERATION_SECONDS,
            Unit::Seconds,
            "Time spent generating a certificate key pair"
        );
        describe_counter!(
            STORE_CONFLICTS_TOTAL,
            Unit::Count,
            "Certificate writes that lost to a concurrent writer"
        );
        describe_counter!(CACHE_HITS_TOTAL, Unit::Count, "Certificate cache hits");
        describe_counter!(CACHE_MISSES_TOTAL, Unit::Count, "Certificate cache misses");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_recorder_is_noop() {
        let recorder = MetricsRecorder::new();
        recorder.register_metrics();
        recorder.record_certificate_generated("Signing", "inserted");
        recorder.record_generation_duration("Signing", 0.01);
        recorder.record_store_conflict("Encryption", "replace");
        recorder.record_cache_lookup("auth.example.com+Signing", true);
        recorder.record_cache_lookup("auth.example.com+Signing", false);
    }
}
