//! CLI runner - executes commands

use crate::cli::commands::{Cli, Commands, OutputFormat, PolicyArg};
use crate::config::{Config, SourceDescriptor};
use crate::engine::{RunConfig, RunEngine, RunReport};
use crate::error::Result;
use crate::output::{resolve, CloudStore, DatePrefix, UploadCommitter};
use crate::source::{connect_source, CheckResult};
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tracing::info;

/// CLI runner
pub struct Runner {
    cli: Cli,
}

impl Runner {
    /// Create a new runner
    pub fn new(cli: Cli) -> Self {
        Self { cli }
    }

    /// Run the CLI command
    pub async fn run(&self) -> Result<()> {
        match &self.cli.command {
            Commands::Integrate {
                source,
                start,
                end,
                dry_run,
                policy,
                no_verify,
            } => {
                self.integrate(source, *start, *end, *dry_run, *policy, *no_verify)
                    .await
            }
            Commands::Check { source } => self.check(source).await,
            Commands::Sources => self.sources(),
        }
    }

    /// Load the configuration file
    fn load_config(&self) -> Result<Config> {
        Config::from_file(&self.cli.config)
    }

    /// Extract one source and upload its batches
    async fn integrate(
        &self,
        source_name: &str,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        dry_run: bool,
        policy: PolicyArg,
        no_verify: bool,
    ) -> Result<()> {
        let config = self.load_config()?;
        let descriptor = config.source(source_name)?;
        let window_start = start.unwrap_or(descriptor.start_time);
        let window_end = end.unwrap_or(descriptor.end_time);

        descriptor.validate_window(window_start, window_end)?;

        if dry_run {
            self.plan(&config, descriptor, window_start, window_end);
            return Ok(());
        }

        let storage = CloudStore::from_config(&config.storage)?;
        let mut source = connect_source(descriptor).await?;

        let mut engine = RunEngine::from_config(&config, &storage).with_config(
            RunConfig::new()
                .with_policy(policy.into())
                .with_verify_uploads(!no_verify)
                .with_validate_storage(true),
        );
        let result = engine.run(source.as_mut(), window_start, window_end).await;

        self.output_message(&report_message(engine.report()));
        result.map(|_| ())
    }

    /// Print the remote paths a run would write, without connecting
    fn plan(
        &self,
        config: &Config,
        descriptor: &SourceDescriptor,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) {
        let date_prefix = DatePrefix::now();
        let paths: Vec<String> = descriptor
            .object_labels()
            .iter()
            .map(|object| {
                format!(
                    "{}/{}",
                    config.storage.bucket_name,
                    resolve(&config.client, &descriptor.name, date_prefix.as_str(), object)
                )
            })
            .collect();

        info!(source = %descriptor.name, objects = paths.len(), "dry run");
        self.output_message(&json!({
            "type": "PLAN",
            "plan": {
                "source": descriptor.name,
                "window_start": window_start.to_rfc3339(),
                "window_end": window_end.to_rfc3339(),
                "batch_size": descriptor.batch_size,
                "paths": paths
            }
        }));
    }

    /// Check the upstream connection and storage access
    async fn check(&self, source_name: &str) -> Result<()> {
        let config = self.load_config()?;
        let descriptor = config.source(source_name)?;

        self.output_message(&json!({
            "type": "LOG",
            "log": {
                "level": "INFO",
                "message": format!("Checking connection to {}", descriptor.name)
            }
        }));

        let source_check = match connect_source(descriptor).await {
            Ok(source) => {
                info!(objects = ?source.objects(), "source reachable");
                CheckResult::success()
            }
            Err(e) => CheckResult::failure(e.to_string()),
        };

        let storage_check = match CloudStore::from_config(&config.storage) {
            Ok(storage) => match UploadCommitter::new(&storage, config.client.as_str())
                .validate_access()
                .await
            {
                Ok(()) => CheckResult::success(),
                Err(e) => CheckResult::failure(e.to_string()),
            },
            Err(e) => CheckResult::failure(e.to_string()),
        };

        let succeeded = source_check.success && storage_check.success;
        self.output_message(&json!({
            "type": "CONNECTION_STATUS",
            "connectionStatus": {
                "status": if succeeded { "SUCCEEDED" } else { "FAILED" },
                "source": source_check,
                "storage": storage_check
            }
        }));

        Ok(())
    }

    /// List configured sources
    fn sources(&self) -> Result<()> {
        let config = self.load_config()?;

        let sources: Vec<Value> = config
            .sources
            .iter()
            .map(|source| {
                json!({
                    "name": source.name,
                    "type": source.source_type,
                    "start_time": source.start_time.to_rfc3339(),
                    "end_time": source.end_time.to_rfc3339(),
                    "cadence": source.cadence,
                    "batch_size": source.batch_size,
                    "objects": source.object_labels()
                })
            })
            .collect();

        self.output_message(&json!({
            "type": "SOURCES",
            "client": config.client,
            "sources": sources
        }));

        Ok(())
    }

    /// Output a message to stdout
    fn output_message(&self, msg: &Value) {
        match self.cli.format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string(msg).unwrap_or_default());
            }
            OutputFormat::Pretty => {
                println!("{}", serde_json::to_string_pretty(msg).unwrap_or_default());
            }
        }
    }
}

/// Run report as an output message
fn report_message(report: &RunReport) -> Value {
    let phases: Vec<String> = report.phases.iter().map(ToString::to_string).collect();
    let mut destinations: Vec<String> = report
        .destinations
        .iter()
        .map(ToString::to_string)
        .collect();
    destinations.dedup();

    json!({
        "type": "RUN_REPORT",
        "report": {
            "source": report.source,
            "succeeded": report.succeeded(),
            "phases": phases,
            "artifacts_staged": report.artifacts_staged,
            "rows_staged": report.rows_staged,
            "artifacts_committed": report.artifacts_committed,
            "artifacts_removed": report.artifacts_removed,
            "destinations": destinations,
            "duration_ms": report.duration_ms
        }
    })
}
