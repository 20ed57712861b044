mod config;
mod error;
mod llm;
mod models;
mod prompt;
mod quest;
mod service;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;

use config::Config;
use llm::ProviderRegistry;
use models::catalog::{self, Tier};
use models::ImportMode;
use service::{
    GenerateRequest, GenerateResponse, ModelsResponse, QuestService, ValidationResponse,
};

#[derive(Debug, Parser)]
#[command(
    name = "questgen",
    version,
    about = "Generate branching quests from a free-text setting",
    after_help = "Logging: set RUST_LOG=debug or RUST_LOG=trace for verbose output"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Generate a quest and print it as JSON.
    Generate {
        /// Provider id: groq, openai, gemini or local.
        #[arg(short, long)]
        provider: String,
        /// Model id, or the model file name for the local provider.
        #[arg(short, long)]
        model: Option<String>,
        #[arg(long, env = "QUESTGEN_API_KEY", hide_env_values = true)]
        api_key: Option<String>,
        /// Reject quests that break the structural rules.
        #[arg(long)]
        strict: bool,
        /// Read the setting from a file instead of the command line.
        #[arg(long, conflicts_with = "setting")]
        setting_file: Option<PathBuf>,
        /// The setting, as free text.
        setting: Vec<String>,
    },
    /// Check that an API key is accepted by the provider.
    ValidateKey {
        #[arg(short, long)]
        provider: String,
        #[arg(long, env = "QUESTGEN_API_KEY", hide_env_values = true)]
        api_key: Option<String>,
    },
    /// List the models a provider offers.
    Models {
        #[arg(short, long)]
        provider: String,
        #[arg(long, env = "QUESTGEN_API_KEY", hide_env_values = true)]
        api_key: Option<String>,
    },
    /// Show GGUF models known to work well locally.
    Recommended {
        #[arg(long, value_enum)]
        tier: Option<Tier>,
    },
    /// Copy GGUF files into the local model directory.
    ImportModel {
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Move the files instead of copying them.
        #[arg(long = "move")]
        move_files: bool,
        /// Replace models that already exist.
        #[arg(long)]
        force: bool,
    },
    /// Delete a model file from the local model directory.
    DeleteModel { name: String },
    /// Print the prompt that would be sent for a setting.
    Prompt { setting: Vec<String> },
}

fn main() -> Result<ExitCode> {
    // Initialize logging. Control verbosity with RUST_LOG env var:
    //   RUST_LOG=info   questgen generate ...   # provider calls + outcomes
    //   RUST_LOG=debug  questgen generate ...   # + extracted JSON, model thinking
    //   RUST_LOG=trace  questgen generate ...   # + full rendered prompt and raw output
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();
    let config = Config::from_env().context("invalid configuration")?;

    match cli.command {
        Command::Generate {
            provider,
            model,
            api_key,
            strict,
            setting_file,
            setting,
        } => {
            let setting = match setting_file {
                Some(path) => std::fs::read_to_string(&path)
                    .with_context(|| format!("failed to read {}", path.display()))?,
                None => setting.join(" "),
            };
            let service = build_service(&config)?.with_schema_check(strict);
            let request = GenerateRequest {
                setting: Some(setting),
                api_key,
                provider: Some(provider),
                model,
            };
            let response: GenerateResponse = service.generate_quest(&request).into();
            let failed = response.is_error();
            emit(&response, failed)
        }
        Command::ValidateKey { provider, api_key } => {
            let service = build_service(&config)?;
            let response: ValidationResponse = service
                .validate_credential(&provider, api_key.as_deref())
                .into();
            let failed = response.is_error();
            emit(&response, failed)
        }
        Command::Models { provider, api_key } => {
            let service = build_service(&config)?;
            let response: ModelsResponse =
                service.list_models(&provider, api_key.as_deref()).into();
            let failed = response.is_error();
            emit(&response, failed)
        }
        Command::Recommended { tier } => emit(&catalog::recommended(tier), false),
        Command::ImportModel {
            files,
            move_files,
            force,
        } => {
            let mode = if move_files {
                ImportMode::Move
            } else {
                ImportMode::Copy
            };
            let mut failed = false;
            for file in &files {
                match models::import_local(&config.model_dir, file, mode, force) {
                    Ok(path) => println!("Imported {}", path.display()),
                    Err(e) => {
                        eprintln!("Failed to import {}: {e:#}", file.display());
                        failed = true;
                    }
                }
            }
            Ok(if failed {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            })
        }
        Command::DeleteModel { name } => {
            models::delete_local(&config.model_dir, &name)
                .with_context(|| format!("failed to delete model '{name}'"))?;
            println!("Deleted {name}");
            Ok(ExitCode::SUCCESS)
        }
        Command::Prompt { setting } => {
            println!("{}", prompt::build_prompt(&setting.join(" ")));
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn build_service(config: &Config) -> Result<QuestService> {
    let registry = ProviderRegistry::from_config(config)?;
    Ok(QuestService::new(registry))
}

fn emit(value: &impl Serialize, failed: bool) -> Result<ExitCode> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}
