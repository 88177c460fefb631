//! Prometheus counters for memory hits, analysis fallbacks and translation paths.
//!
//! Recording before [`init_metrics`] is a silent no-op.

use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounterVec, Registry, TextEncoder};
use std::sync::OnceLock;

lazy_static! {
    static ref REGISTRY: Registry = Registry::new();
}

static MEMORY_LOOKUPS: OnceLock<IntCounterVec> = OnceLock::new();
static ANALYSIS_FALLBACKS: OnceLock<IntCounterVec> = OnceLock::new();
static TRANSLATION_REQUESTS: OnceLock<IntCounterVec> = OnceLock::new();
static STORE_WRITE_FAILURES: OnceLock<IntCounterVec> = OnceLock::new();

fn counter(name: &str, help: &str, label: &str) -> Option<IntCounterVec> {
    IntCounterVec::new(prometheus::opts!(name, help), &[label]).ok()
}

pub fn init_metrics() {
    let collectors = [
        (&MEMORY_LOOKUPS, "translation_memory_lookups_total", "Translation memory lookups by result", "result"),
        (&ANALYSIS_FALLBACKS, "analysis_fallbacks_total", "Analysis tasks that fell back to defaults", "task"),
        (&TRANSLATION_REQUESTS, "translation_requests_total", "Translation requests by serving path", "path"),
        (&STORE_WRITE_FAILURES, "store_write_failures_total", "Swallowed store write failures", "store"),
    ];

    for (cell, name, help, label) in collectors {
        if cell.get().is_some() {
            continue;
        }
        if let Some(vec) = counter(name, help, label) {
            if cell.set(vec.clone()).is_ok() {
                REGISTRY.register(Box::new(vec)).ok();
            }
        }
    }
}

fn inc(cell: &OnceLock<IntCounterVec>, label: &str) {
    if let Some(counter) = cell.get() {
        counter.with_label_values(&[label]).inc();
    }
}

pub fn inc_memory_lookup(result: &str) {
    inc(&MEMORY_LOOKUPS, result);
}

pub fn inc_analysis_fallback(task: &str) {
    inc(&ANALYSIS_FALLBACKS, task);
}

pub fn inc_translation(path: &str) {
    inc(&TRANSLATION_REQUESTS, path);
}

pub fn inc_store_failure(store: &str) {
    inc(&STORE_WRITE_FAILURES, store);
}

/// Text exposition of every registered metric.
pub fn render() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if encoder.encode(&metric_families, &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
