use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, fmt};
use std::sync::OnceLock;

static LOG_INIT: OnceLock<()> = OnceLock::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Installs the global subscriber once; later calls are no-ops.
/// `RUST_LOG` overrides the `info` default.
pub fn setup_logging(format: LogFormat) {
    LOG_INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("info"));

        let registry = tracing_subscriber::registry().with(filter);
        let result = match format {
            LogFormat::Json => registry
                .with(
                    fmt::layer()
                        .json()
                        .with_target(true)
                        .with_file(true)
                        .with_line_number(true),
                )
                .try_init(),
            LogFormat::Text => registry
                .with(
                    fmt::layer()
                        .with_target(true)
                        .with_file(true)
                        .with_line_number(true),
                )
                .try_init(),
        };

        // Embedders may already own the global subscriber.
        if let Err(e) = result {
            tracing::debug!(error = %e, "Global subscriber already set");
        }
    });
}

#[macro_export]
macro_rules! log_dispatch {
    ($level:ident, $conversation:expr, $($arg:tt)*) => {
        tracing::$level!(
            target: "dispatch",
            conversation_id = %$conversation,
            $($arg)*
        );
    };
}
