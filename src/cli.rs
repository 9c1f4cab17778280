//! Command-line entry points for the pipeline stages.

use std::io::Read;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use log::debug;

use crate::config::PipelineConfig;
use crate::pipeline::PipelineContext;
use crate::query::{compile, QuerySpec};

#[derive(Parser, Debug)]
#[command(
    name = "usage-pipeline",
    version,
    about = "Transform, load and query app usage survey files"
)]
pub struct Cli {
    /// JSON configuration file; PIPELINE_* environment variables override it
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args, Debug, Clone)]
pub struct ObjectArgs {
    /// Bucket holding the object
    #[arg(long)]
    pub bucket: String,

    /// Object key inside the bucket
    #[arg(long)]
    pub key: String,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Enrich a raw survey file into the staging bucket
    Transform(ObjectArgs),
    /// Load a staged file into the database
    Load(ObjectArgs),
    /// Enrich a raw survey file and load it without staging
    Run(ObjectArgs),
    /// Run an aggregate query request
    Query {
        /// JSON request file; stdin when omitted
        #[arg(long)]
        request: Option<PathBuf>,

        /// Print the compiled statement without executing it
        #[arg(long)]
        explain: bool,
    },
}

fn read_request(path: Option<&PathBuf>) -> Result<String> {
    match path {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read request {}", path.display())),
        None => {
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .context("failed to read request from stdin")?;
            Ok(buffer)
        }
    }
}

pub async fn run(cli: Cli) -> Result<()> {
    let config = PipelineConfig::load(cli.config.as_deref())?;
    debug!("Using configuration: {config:?}");

    if let Command::Query {
        request,
        explain: true,
    } = &cli.command
    {
        let spec = QuerySpec::from_json(&read_request(request.as_ref())?)?;
        let compiled = compile(&spec)?;
        println!("{}", compiled.sql);
        for (index, param) in compiled.params.iter().enumerate() {
            println!("  ?{} = {:?}", index + 1, param);
        }
        return Ok(());
    }

    let context = PipelineContext::from_config(config)?;

    let output = match &cli.command {
        Command::Transform(args) => {
            serde_json::to_string_pretty(&context.transform(&args.bucket, &args.key).await?)?
        }
        Command::Load(args) => {
            serde_json::to_string_pretty(&context.load(&args.bucket, &args.key).await?)?
        }
        Command::Run(args) => {
            serde_json::to_string_pretty(&context.run(&args.bucket, &args.key).await?)?
        }
        Command::Query { request, .. } => {
            let spec = QuerySpec::from_json(&read_request(request.as_ref())?)?;
            let result = context.query(&spec).await?;
            serde_json::to_string_pretty(&result.rows)?
        }
    };

    println!("{output}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_stage_commands() {
        let cli = Cli::parse_from([
            "usage-pipeline",
            "--config",
            "pipeline.json",
            "run",
            "--bucket",
            "raw",
            "--key",
            "survey.csv",
        ]);
        assert_eq!(cli.config, Some(PathBuf::from("pipeline.json")));
        match cli.command {
            Command::Run(args) => {
                assert_eq!(args.bucket, "raw");
                assert_eq!(args.key, "survey.csv");
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn query_reads_optional_request() {
        let cli = Cli::parse_from(["usage-pipeline", "query", "--explain"]);
        assert!(matches!(
            cli.command,
            Command::Query {
                request: None,
                explain: true
            }
        ));
    }
}
