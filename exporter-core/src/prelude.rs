//! kea-exporter prelude

pub use crate::{
    anyhow::{self, Context, Result},
    tokio,
    tracing::{self, debug, error, info, instrument, trace, warn},
    tracing_futures::Instrument,
};

pub use std::{sync::Arc, time::Duration};
