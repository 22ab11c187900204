//! exporter cli & tracing configs

pub mod cli {
    //! Parse from either cli or env var

    /// Default scrape listener, 9547 is the port registered for kea-exporter
    pub static DEFAULT_LISTEN: &str = "[::]:9547";
    /// Default control channel timeout (seconds). A scrape waits at most this
    /// long (plus a small grace) for any single Kea daemon
    pub const DEFAULT_TIMEOUT: u64 = 3;
    /// tokio worker thread name
    pub static DEFAULT_THREAD_NAME: &str = "kea-exporter-worker";
    /// default log level. Can use this argument or EXPORTER_LOG env var
    pub const DEFAULT_EXPORTER_LOG: &str = "info";

    use std::{net::SocketAddr, path::PathBuf, time::Duration};

    pub use clap::Parser;

    #[derive(Parser, Debug, Clone, PartialEq, Eq)]
    #[clap(author, name = "kea-exporter", bin_name = "kea-exporter", about, long_about = None)]
    /// parses from cli & environment var. kea-exporter will load `.env` in the same dir as the binary as well
    pub struct Config {
        /// path to the exporter config listing Kea control channels (YAML or JSON)
        #[clap(short, long, value_parser, env)]
        pub config_path: Option<PathBuf>,
        /// additional control channel to poll, written as `<kind>@<address>`,
        /// e.g. `dhcp4@/run/kea/kea4-ctrl-socket` or `dhcp6@http://127.0.0.1:8000`
        #[clap(
            short,
            long = "target",
            env = "TARGETS",
            value_parser,
            value_delimiter = ','
        )]
        pub targets: Vec<String>,
        /// the address the scrape endpoint listens on
        #[clap(long, env, value_parser, default_value = DEFAULT_LISTEN)]
        pub listen: SocketAddr,
        /// control channel timeout in seconds, applies to every source independently
        #[clap(long, env, value_parser, default_value_t = DEFAULT_TIMEOUT)]
        pub timeout: u64,
        /// number of tokio worker threads, defaults to the number of logical CPUs
        #[clap(long, env, value_parser)]
        pub threads: Option<usize>,
        /// Worker thread name
        #[clap(long, env, value_parser, default_value = DEFAULT_THREAD_NAME)]
        pub thread_name: String,
        /// set the log level. All valid RUST_LOG arguments are accepted
        #[clap(long, env, value_parser, default_value = DEFAULT_EXPORTER_LOG)]
        pub exporter_log: String,
    }

    impl Config {
        /// Create new timeout as `Duration`
        pub fn timeout(&self) -> Duration {
            Duration::from_secs(self.timeout)
        }
    }

}

pub mod trace {
    //! tracing configuration
    use anyhow::Result;
    use tracing_subscriber::{
        filter::EnvFilter,
        fmt::{
            self,
            format::{Format, PrettyFields},
        },
        prelude::__tracing_subscriber_SubscriberExt,
        util::SubscriberInitExt,
    };

    use crate::env::parse_var_with_err;

    /// log as "json", "pretty" or "standard" (unstructured)
    static DEFAULT_LOG_FORMAT: &str = "standard";

    /// Configuration for the global tracing subscriber
    #[derive(Debug)]
    pub struct Config {
        /// formatting to apply to logs
        pub log_frmt: String,
    }

    impl Config {
        /// Install the global subscriber. Level comes from `exporter_log`, format
        /// from the `LOG_FORMAT` env var
        pub fn parse(exporter_log: &str) -> Result<Self> {
            let log_frmt: String = parse_var_with_err("LOG_FORMAT", DEFAULT_LOG_FORMAT)?;

            let filter = EnvFilter::try_new(exporter_log)
                .or_else(|_| EnvFilter::try_new("info"))?
                .add_directive("hyper=off".parse()?)
                .add_directive("reqwest=warn".parse()?);

            match &log_frmt[..] {
                "json" => {
                    tracing_subscriber::registry()
                        .with(filter)
                        .with(fmt::layer().json())
                        .init();
                }
                "pretty" => {
                    tracing_subscriber::registry()
                        .with(filter)
                        .with(
                            fmt::layer()
                                .event_format(
                                    Format::default().pretty().with_source_location(false),
                                )
                                .fmt_fields(PrettyFields::new()),
                        )
                        .init();
                }
                _ => {
                    tracing_subscriber::registry()
                        .with(filter)
                        .with(fmt::layer())
                        .init();
                }
            }

            Ok(Self { log_frmt })
        }
    }
}
