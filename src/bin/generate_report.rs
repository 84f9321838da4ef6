//! One-shot report run: fetch the inventory, summarize it, fill the template
//! and write the PDF to `OUTPUT_DIR/OUTPUT_PDF_FILENAME`.

use std::process::ExitCode;

use tree_risk_reports::Config;
use tree_risk_reports::pipeline::{Pipeline, RunRequest};
use tree_risk_reports::telemetry::init_telemetry;

#[tokio::main]
async fn main() -> ExitCode {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let telemetry_guard = match init_telemetry(&config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("error: failed to initialize telemetry: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    let code = run(&config).await;
    telemetry_guard.shutdown();
    code
}

async fn run(config: &Config) -> ExitCode {
    let pipeline = match Pipeline::from_config(config) {
        Ok(pipeline) => pipeline,
        Err(e) => {
            tracing::error!(error = %e, "Failed to build pipeline");
            return ExitCode::FAILURE;
        }
    };

    match pipeline.run(&RunRequest::from_config(config)).await {
        Ok(run) => {
            let path = std::path::absolute(&run.report.path).unwrap_or(run.report.path);
            tracing::info!(
                path = %path.display(),
                summaries = run.summaries,
                skipped = run.skipped,
                "Report successfully written"
            );
            for failure in &run.failures {
                tracing::warn!(record.id = %failure.record_id, reason = %failure.reason, "Record skipped");
            }
            ExitCode::SUCCESS
        }
        Err(failure) => {
            tracing::error!(
                phase = %failure.phase,
                summarized = failure.summarized,
                error = %failure.error,
                "Report generation failed"
            );
            ExitCode::FAILURE
        }
    }
}
