//! Shared fixtures for unit tests.

use axum::Router;
use axum::http::StatusCode;
use mlpipe_core::ConfigurationManager;
use mlpipe_core::config::{ParamsConfig, PipelineConfig, SchemaConfig, TargetColumn};
use std::io::{Cursor, Write};
use std::path::Path;

/// An in-memory ZIP archive holding `(name, contents)` entries.
pub(crate) fn zip_bytes(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);
    for (name, contents) in entries {
        writer.start_file(*name, options).unwrap();
        writer.write_all(contents.as_bytes()).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

/// Serve `body` with `status` for every request; returns a URL on that server.
pub(crate) async fn serve_bytes(body: Vec<u8>, status: u16) -> String {
    let status = StatusCode::from_u16(status).unwrap();
    let app = Router::new().fallback(move || {
        let body = body.clone();
        async move { (status, body) }
    });
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}/data.zip")
}

/// `a,b,c,target` rows with `target = 1 + 2a - b + 0.5c`.
pub(crate) fn linear_csv(rows: usize) -> String {
    let mut body = String::from("a,b,c,target\n");
    for i in 0..rows {
        let a = i as f64 * 0.5;
        let b = ((i * 3) % 11) as f64;
        let c = ((i * 7) % 5) as f64;
        let target = 1.0 + 2.0 * a - b + 0.5 * c;
        body.push_str(&format!("{a},{b},{c},{target}\n"));
    }
    body
}

/// A manager laid out beneath `root`, tracking runs in `root/mlruns`.
pub(crate) fn manager_for(root: &Path, source_url: &str, columns: &[&str]) -> ConfigurationManager {
    let mut config = PipelineConfig::with_artifacts_root(root.join("artifacts"));
    config.data_ingestion.source_url = source_url.to_string();
    config.model_evaluation.tracker.uri = root.join("mlruns").display().to_string();
    config.model_evaluation.tracker.experiment_name = "unit".to_string();

    let mut params = ParamsConfig::default();
    params.elastic_net.alpha = 0.01;

    let schema = SchemaConfig {
        columns: columns
            .iter()
            .map(|c| (c.to_string(), "float64".to_string()))
            .collect(),
        target_column: TargetColumn {
            name: "target".to_string(),
        },
    };
    ConfigurationManager::from_parts(config, params, schema).unwrap()
}
