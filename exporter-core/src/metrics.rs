#![allow(missing_docs)] // proc macros dont play nicely with docstrings

//! # metrics
//!
//! the exporter's own telemetry. These live in the default prometheus registry
//! and are served separately from the Kea snapshot, which is never registered
//! anywhere.
use std::time::Instant;

use lazy_static::lazy_static;
use prometheus::{
    Histogram, IntCounter, IntCounterVec, IntGauge, register_histogram, register_int_counter,
    register_int_counter_vec, register_int_gauge,
};
use prometheus_static_metric::make_static_metric;

make_static_metric! {
    pub label_enum FetchErrorKind {
        unreachable,
        timeout,
        protocol,
        command_failed,
    }
    pub struct FetchErrors: IntCounter {
        "error" => FetchErrorKind
    }
}

lazy_static! {
    /// When the exporter started
    pub static ref START_TIME: Instant = Instant::now();

    /// seconds since the exporter started
    pub static ref UPTIME: IntGauge = register_int_gauge!("kea_exporter_uptime", "kea-exporter uptime (seconds)").unwrap();

    /// scrapes served on the snapshot endpoint
    pub static ref SCRAPE_COUNT: IntCounter = register_int_counter!("kea_exporter_scrapes", "count of snapshot scrapes served").unwrap();

    /// time to build one snapshot, all sources included
    pub static ref SCRAPE_DURATION: Histogram = register_histogram!(
        "kea_exporter_scrape_duration",
        "time to build a snapshot from every control channel (seconds)"
    )
    .unwrap();

    /// time spent on a single control channel exchange
    pub static ref FETCH_DURATION: Histogram = register_histogram!(
        "kea_exporter_fetch_duration",
        "control channel round trip (seconds)"
    )
    .unwrap();

    pub static ref FETCH_ERROR_COUNT_VEC: IntCounterVec = register_int_counter_vec!(
        "kea_exporter_fetch_errors",
        "control channel fetch failures by error class",
        &["error"]
    )
    .unwrap();

    /// fetch failures split by class
    pub static ref FETCH_ERRORS: FetchErrors = FetchErrors::from(&FETCH_ERROR_COUNT_VEC);

    /// statistics skipped because their key or value could not be normalized
    pub static ref MAPPING_WARNINGS: IntCounter = register_int_counter!(
        "kea_exporter_mapping_warnings",
        "count of Kea statistics dropped while mapping"
    )
    .unwrap();

    /// samples in the most recent snapshot
    pub static ref SNAPSHOT_SAMPLES: IntGauge = register_int_gauge!(
        "kea_exporter_snapshot_samples",
        "number of samples in the last snapshot"
    )
    .unwrap();
}

/// refresh [`UPTIME`] from [`START_TIME`]
pub fn touch_uptime() {
    UPTIME.set(START_TIME.elapsed().as_secs() as i64);
}
