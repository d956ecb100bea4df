//! CLI subcommand handlers.

use crate::Commands;
use crate::ConfigAction;
use anyhow::Context;
use mlpipe_core::{ConfigPaths, ConfigurationManager};
use mlpipe_ml::data::DownloadOutcome;
use mlpipe_ml::training::EvaluationArtifact;
use mlpipe_ml::{PipelineRunner, StageKind, StageOutput};

/// Handle a CLI subcommand.
pub async fn handle_command(command: Commands, paths: &ConfigPaths) -> anyhow::Result<()> {
    match command {
        Commands::Run => handle_run(paths).await,
        Commands::Stage { name } => handle_stage(name, paths).await,
        Commands::Config { action } => handle_config(action, paths),
    }
}

fn config_context(paths: &ConfigPaths) -> String {
    format!(
        "Configuration error (config: {}, params: {}, schema: {})",
        paths.config.display(),
        paths.params.display(),
        paths.schema.display()
    )
}

fn load_manager(paths: &ConfigPaths) -> anyhow::Result<ConfigurationManager> {
    ConfigurationManager::new(paths).with_context(|| config_context(paths))
}

async fn handle_run(paths: &ConfigPaths) -> anyhow::Result<()> {
    let runner = PipelineRunner::new(load_manager(paths)?);
    let outcome = runner.run_all().await?;
    tracing::info!(
        manifest = %outcome.manifest_path.display(),
        run_id = %outcome.evaluation.run_id,
        "Pipeline finished"
    );

    println!("Validation: {}", outcome.validation.status.status_line());
    println!(
        "Split: {} train rows, {} test rows",
        outcome.split.train_rows, outcome.split.test_rows
    );
    println!("Model: {}", outcome.model.model_path.display());
    print_evaluation(&outcome.evaluation);
    println!("Manifest: {}", outcome.manifest_path.display());
    Ok(())
}

async fn handle_stage(stage: StageKind, paths: &ConfigPaths) -> anyhow::Result<()> {
    let runner = PipelineRunner::new(load_manager(paths)?);
    match runner.run_stage(stage).await? {
        StageOutput::Ingestion(artifact) => {
            match artifact.download {
                DownloadOutcome::Downloaded { bytes } => {
                    println!("Downloaded {} ({bytes} bytes)", artifact.archive.display())
                }
                DownloadOutcome::AlreadyPresent => {
                    println!("Using existing {}", artifact.archive.display())
                }
            }
            for file in &artifact.extracted_files {
                println!("  extracted {}", file.display());
            }
        }
        StageOutput::Validation(artifact) => {
            println!("{}", artifact.status.status_line());
            if !artifact.comparison.missing.is_empty() {
                println!("  missing: {}", artifact.comparison.missing.join(", "));
            }
            if !artifact.comparison.unexpected.is_empty() {
                println!("  unexpected: {}", artifact.comparison.unexpected.join(", "));
            }
            if !artifact.comparison.duplicated.is_empty() {
                println!("  duplicated: {}", artifact.comparison.duplicated.join(", "));
            }
        }
        StageOutput::Transformation(artifact) => {
            println!(
                "Train: {} ({} rows)",
                artifact.train_path.display(),
                artifact.train_rows
            );
            println!(
                "Test: {} ({} rows)",
                artifact.test_path.display(),
                artifact.test_rows
            );
        }
        StageOutput::Training(artifact) => {
            println!(
                "Model: {} ({} features, {} iterations{})",
                artifact.model_path.display(),
                artifact.feature_names.len(),
                artifact.n_iter,
                if artifact.converged { "" } else { ", not converged" }
            );
        }
        StageOutput::Evaluation(artifact) => print_evaluation(&artifact),
    }
    Ok(())
}

fn print_evaluation(evaluation: &EvaluationArtifact) {
    println!(
        "Metrics: rmse={:.4} mae={:.4} r2={:.4} ({})",
        evaluation.metrics.rmse,
        evaluation.metrics.mae,
        evaluation.metrics.r2,
        evaluation.metric_file.display()
    );
    println!("Tracker run: {} ({})", evaluation.run_id, evaluation.tracker);
}

fn handle_config(action: ConfigAction, paths: &ConfigPaths) -> anyhow::Result<()> {
    match action {
        ConfigAction::Show => {
            // Inspection only: nothing is created on disk.
            let manager =
                ConfigurationManager::load(paths).with_context(|| config_context(paths))?;
            print!("{}", manager.to_yaml()?);
            Ok(())
        }
    }
}
