//! Logging setup, bridged through indicatif when progress bars are active.
//!
//! The pipeline reports milestones (`stage N completed in ...`,
//! `done [i/N][pct%]: file`) via the `log` facade. On a TTY those lines must
//! not tear the progress bars, so the env_logger output is routed through
//! `MultiProgress::suspend`.

use indicatif::MultiProgress;

fn level_label(level: log::Level) -> &'static str {
    match level {
        log::Level::Error => "ERROR",
        log::Level::Warn => "WARN ",
        log::Level::Info => "INFO ",
        log::Level::Debug => "DEBUG",
        log::Level::Trace => "TRACE",
    }
}

/// env_logger wrapper that prints through a `MultiProgress`.
pub struct IndicatifLogger {
    inner: env_logger::Logger,
    multi: MultiProgress,
}

impl log::Log for IndicatifLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        self.inner.enabled(metadata)
    }

    fn log(&self, record: &log::Record) {
        if self.inner.enabled(record.metadata()) {
            let line = format!("[{}] {}", level_label(record.level()), record.args());
            self.multi.suspend(|| eprintln!("{line}"));
        }
    }

    fn flush(&self) {
        self.inner.flush();
    }
}

/// Initialize the global logger.
///
/// `verbose` lowers the default filter to debug (per-line skip diagnostics,
/// full sort pipelines); `RUST_LOG` still overrides. Pass the progress
/// context's `MultiProgress` when running on a TTY.
pub fn init_logging(verbose: bool, multi: Option<&MultiProgress>) {
    use std::io::Write;

    let default_level = if verbose { "debug" } else { "info" };
    let env = env_logger::Env::default().default_filter_or(default_level);

    match multi {
        Some(multi) => {
            let inner = env_logger::Builder::from_env(env).build();
            let max_level = inner.filter();
            let logger = IndicatifLogger {
                inner,
                multi: multi.clone(),
            };
            log::set_boxed_logger(Box::new(logger)).expect("failed to init logger");
            log::set_max_level(max_level);
        }
        None => {
            // Non-TTY: timestamped lines for log aggregation
            env_logger::Builder::from_env(env)
                .format(|buf, record| {
                    writeln!(
                        buf,
                        "{} [{}] {}",
                        buf.timestamp_seconds(),
                        level_label(record.level()),
                        record.args()
                    )
                })
                .init();
        }
    }
}
