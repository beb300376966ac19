//! CLI subcommand handlers.

use crate::Commands;
use crate::ConfigAction;
use modelops_core::ModelOpsConfig;
use modelops_ml::data::{CsvSource, DataContract, Dataset, check_contract};
use modelops_ml::gate::run_gate;
use modelops_ml::registry::{PromoteRequest, ResolveRequest, load_model, promote_best};
use modelops_ml::tracking::MlflowClient;
use modelops_ml::training::{
    RegisterRequest, TrainOutputs, TrainParams, default_candidates, run_training,
    train_and_register, write_outputs,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

/// Invocation-wide settings from the global flags.
pub struct Context {
    pub workspace: PathBuf,
    pub config_file: Option<PathBuf>,
    pub tracking_uri: Option<String>,
}

impl Context {
    fn load_config(&self) -> anyhow::Result<ModelOpsConfig> {
        let mut config =
            modelops_core::load_config(Some(&self.workspace), self.config_file.as_deref())
                .map_err(|e| anyhow::anyhow!("Configuration error: {e}"))?;
        if let Some(uri) = &self.tracking_uri {
            config.tracking.uri = uri.clone();
            config
                .validate()
                .map_err(|e| anyhow::anyhow!("Configuration error: {e}"))?;
        }
        Ok(config)
    }

    /// Configuration for the offline steps. Tracking settings are not
    /// validated, so a bad tracking URI or timeout cannot fail them.
    fn load_local_config(&self) -> anyhow::Result<ModelOpsConfig> {
        modelops_core::load_local_config(Some(&self.workspace), self.config_file.as_deref())
            .map_err(|e| anyhow::anyhow!("Configuration error: {e}"))
    }

    /// Relative paths are taken from the workspace.
    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.workspace.join(path)
        }
    }

    fn resolve_or(&self, flag: Option<PathBuf>, configured: &Path) -> PathBuf {
        self.resolve(flag.as_deref().unwrap_or(configured))
    }
}

/// Handle a CLI subcommand and return the process exit code.
pub async fn handle_command(command: Commands, ctx: &Context) -> anyhow::Result<ExitCode> {
    match command {
        Commands::Train {
            params,
            data,
            model,
        } => handle_train(ctx, params, data, model),
        Commands::TrainRegister { data, out_dir } => handle_train_register(ctx, data, out_dir).await,
        Commands::Gate { metrics, threshold } => handle_gate(ctx, metrics, threshold),
        Commands::CheckData { data, min_rows } => handle_check_data(ctx, data, min_rows),
        Commands::Promote {
            metric,
            alias,
            allow_stage_fallback,
        } => handle_promote(ctx, metric, alias, allow_stage_fallback).await,
        Commands::Predict { inputs } => handle_predict(ctx, &inputs).await,
        Commands::Config { action } => handle_config(ctx, action),
    }
}

fn handle_train(
    ctx: &Context,
    params: Option<PathBuf>,
    data: Option<PathBuf>,
    model: Option<PathBuf>,
) -> anyhow::Result<ExitCode> {
    let config = ctx.load_local_config()?;
    let params = TrainParams::load(&ctx.resolve_or(params, &config.paths.params))?;
    let data_path = ctx.resolve_or(data, &config.paths.data);
    let dataset = Dataset::load_csv(
        &data_path,
        &config.data.feature_column,
        &config.data.target_column,
    )?;

    let report = run_training(&dataset, &params)?;
    let outputs = TrainOutputs {
        model: ctx.resolve_or(model, &config.paths.model),
        metrics_json: ctx.resolve(&config.paths.metrics_json),
        metrics_txt: ctx.resolve(&config.paths.metrics_txt),
    };
    write_outputs(&report, &outputs)?;

    println!(
        "Model: {}, R2: {:.4}, MAE: {:.4} (train={}, test={})",
        report.model.estimator.name(),
        report.metrics.r2,
        report.metrics.mae,
        report.train_rows,
        report.test_rows
    );
    println!(
        "Saved {}, {} and {}",
        outputs.model.display(),
        outputs.metrics_json.display(),
        outputs.metrics_txt.display()
    );
    Ok(ExitCode::SUCCESS)
}

async fn handle_train_register(
    ctx: &Context,
    data: Option<PathBuf>,
    out_dir: PathBuf,
) -> anyhow::Result<ExitCode> {
    let config = ctx.load_config()?;
    let dataset = Dataset::load_csv(
        &ctx.resolve_or(data, &config.paths.data),
        &config.data.feature_column,
        &config.data.target_column,
    )?;
    let client = MlflowClient::new(&config.tracking)?;
    tracing::info!(uri = %config.tracking.uri, experiment = %config.registry.experiment_name, "registering candidates");

    let request = RegisterRequest {
        experiment_name: config.registry.experiment_name.clone(),
        model_name: config.registry.model_name.clone(),
        fit_intercept: true,
        local_dir: ctx.resolve(&out_dir),
    };
    let registered =
        train_and_register(&client, &dataset, &default_candidates(), &request).await?;
    for candidate in &registered {
        println!("{}", candidate.summary());
    }
    Ok(ExitCode::SUCCESS)
}

fn handle_gate(
    ctx: &Context,
    metrics: Option<PathBuf>,
    threshold: Option<PathBuf>,
) -> anyhow::Result<ExitCode> {
    let config = ctx.load_local_config()?;
    let outcome = match run_gate(
        &ctx.resolve_or(metrics, &config.paths.metrics_txt),
        &ctx.resolve_or(threshold, &config.paths.threshold),
    ) {
        Ok(outcome) => outcome,
        Err(e) => {
            // Plain stdout line, like the pass/fail verdicts.
            println!("{e}");
            return Ok(ExitCode::from(e.exit_code()));
        }
    };
    println!("{}", outcome.summary());
    println!("{}", outcome.verdict());
    Ok(ExitCode::from(outcome.exit_code()))
}

fn handle_check_data(
    ctx: &Context,
    data: Option<PathBuf>,
    min_rows: Option<usize>,
) -> anyhow::Result<ExitCode> {
    let config = ctx.load_local_config()?;
    let path = ctx.resolve_or(data, &config.paths.data);
    let mut contract = DataContract::from(&config.data);
    if let Some(min_rows) = min_rows {
        contract.min_rows = min_rows;
    }

    let batch = CsvSource::new(&path).load()?;
    let report = check_contract(&batch, &contract);
    if report.passed() {
        println!(
            "[OK] {}: {} rows; '{}' and '{}' are numeric",
            path.display(),
            report.rows,
            contract.feature_column,
            contract.target_column
        );
        return Ok(ExitCode::SUCCESS);
    }
    for violation in &report.violations {
        println!("[FAIL] {violation}");
    }
    Ok(ExitCode::from(2))
}

async fn handle_promote(
    ctx: &Context,
    metric: Option<String>,
    alias: Option<String>,
    allow_stage_fallback: bool,
) -> anyhow::Result<ExitCode> {
    let config = ctx.load_config()?;
    let mut request = PromoteRequest::from_config(&config);
    if let Some(metric) = metric {
        request.metric = metric;
    }
    if let Some(alias) = alias {
        request.alias = alias;
    }
    request.allow_stage_fallback |= allow_stage_fallback;

    let client = MlflowClient::new(&config.tracking)?;
    tracing::info!(
        uri = %config.tracking.uri,
        experiment = %request.experiment_name,
        model = %request.model_name,
        "promoting best run"
    );
    let report = promote_best(&client, &request).await?;
    println!(
        "Best run: {}  {}={:.4}",
        report.run_id, request.metric, report.metric_value
    );
    println!("{}", report.summary());
    Ok(ExitCode::SUCCESS)
}

async fn handle_predict(ctx: &Context, inputs: &[f64]) -> anyhow::Result<ExitCode> {
    let config = ctx.load_config()?;
    let client = MlflowClient::new(&config.tracking)?;
    let loaded = load_model(&client, &ResolveRequest::from_config(&config)).await?;
    println!("{}", loaded.summary());

    let predictions = loaded.model.predict(inputs);
    println!("Input:");
    println!("  {}", loaded.model.feature);
    for x in inputs {
        println!("  {x}");
    }
    println!("Predictions:");
    println!("  {}", serde_json::to_string(&predictions)?);
    Ok(ExitCode::SUCCESS)
}

fn handle_config(ctx: &Context, action: ConfigAction) -> anyhow::Result<ExitCode> {
    match action {
        ConfigAction::Init => {
            match modelops_core::config::write_default_config(&ctx.workspace)? {
                Some(path) => println!("Created default configuration at: {}", path.display()),
                None => println!(
                    "Configuration file already exists at: {}",
                    modelops_core::config::workspace_config_path(&ctx.workspace).display()
                ),
            }
            Ok(ExitCode::SUCCESS)
        }
        ConfigAction::Show => {
            let config = ctx.load_config()?;
            println!("{}", toml::to_string_pretty(&config)?);
            Ok(ExitCode::SUCCESS)
        }
    }
}
