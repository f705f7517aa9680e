use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "vellum=debug,sqlx=warn";

#[derive(Debug, Clone)]
pub struct TelemetryOptions {
    pub service_name: String,
    pub environment: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl TelemetryOptions {
    pub fn from_config(service_name: impl Into<String>, config: &vellum_core::Config) -> Self {
        Self {
            service_name: service_name.into(),
            environment: config.environment().to_string(),
            json: config.json_logs(),
        }
    }
}

/// Initialize tracing. `RUST_LOG` overrides the default filter.
pub fn init_telemetry(options: &TelemetryOptions) -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into());
    let registry = tracing_subscriber::registry().with(filter);

    if options.json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()?;
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()?;
    }

    tracing::info!(
        service = %options.service_name,
        environment = %options.environment,
        json = options.json,
        "Telemetry initialized"
    );
    Ok(())
}

pub async fn shutdown_telemetry() {
    tracing::debug!("Telemetry shutdown");
}
