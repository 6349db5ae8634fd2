mod app;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use neural_echo::config::{VizConfig, model_info};
use neural_echo::render::PerformanceMode;
use neural_echo::service::{
    HttpInferenceClient, HttpReductionClient, InferenceService, ReductionMethod, ReductionService,
};

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// TOML file with visualization and service settings.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Endpoint that turns text into tokens, attention and embeddings.
    #[arg(long)]
    inference_url: Option<String>,

    /// Endpoint that projects embeddings to 2 or 3 dimensions.
    #[arg(long)]
    reduction_url: Option<String>,

    #[arg(long)]
    model: Option<String>,

    #[arg(long, value_enum)]
    performance_mode: Option<PerformanceMode>,

    #[arg(long, value_enum)]
    reduction_method: Option<ReductionMethod>,

    /// Used when RUST_LOG is unset.
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Analyze this text on startup.
    #[arg(long)]
    text: Option<String>,
}

impl Args {
    fn load_config(&self) -> Result<VizConfig> {
        let mut config = match &self.config {
            Some(path) => VizConfig::load(path)?,
            None => VizConfig::default(),
        };

        if let Some(url) = &self.inference_url {
            config.services.inference_url = Some(url.clone());
        }
        if let Some(url) = &self.reduction_url {
            config.services.reduction_url = Some(url.clone());
        }
        if let Some(model) = &self.model {
            model_info(model).with_context(|| format!("unknown model `{model}`"))?;
            config.services.model = model.clone();
        }
        if let Some(mode) = self.performance_mode {
            config.performance_mode = mode;
        }
        if let Some(method) = self.reduction_method {
            config.reduction_method = method;
        }

        Ok(config.sanitized())
    }
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_level);

    let config = Arc::new(args.load_config()?);
    let timeout = config.services.timeout();
    let inference = config.services.inference_url.as_ref().map(|url| {
        Arc::new(HttpInferenceClient::new(url.as_str(), timeout)) as Arc<dyn InferenceService>
    });
    let reduction = config.services.reduction_url.as_ref().map(|url| {
        Arc::new(HttpReductionClient::new(url.as_str(), timeout)) as Arc<dyn ReductionService>
    });
    info!(
        model = %config.services.model,
        inference = inference.is_some(),
        reduction = reduction.is_some(),
        "starting"
    );

    let services = app::Services {
        config,
        inference,
        reduction,
    };
    let options = eframe::NativeOptions {
        viewport: eframe::egui::ViewportBuilder::default().with_inner_size([1440.0, 920.0]),
        ..Default::default()
    };

    eframe::run_native(
        "Neural Echo",
        options,
        Box::new(move |cc| Ok(Box::new(app::NeuralEchoApp::new(cc, services, args.text)))),
    )
    .map_err(|error| anyhow!("failed to start the UI: {error}"))
}
