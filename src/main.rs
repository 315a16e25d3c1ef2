//! CLI entry point for the apkmend pipeline.

use apkmend::{
    cli::{Cli, Commands},
    config::{generate_default_config, Config},
    patterns::builtin_patterns,
    reporters::{report, ConsoleReporter, FindingsReport, OutputFormat},
    EvidenceRenderer, PatchPolicy, PatternSet, Pipeline, RunStatus, Scanner,
};
use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use std::io;
use std::path::Path;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| log_level.into()))
        .with_target(false)
        .init();

    match cli.command {
        Commands::Run {
            apk,
            output,
            policy,
        } => {
            // Missing configuration or target is fatal before any stage runs.
            let mut config = if let Some(ref config_path) = cli.config {
                Config::load(config_path)?
            } else {
                Config::load_default()?
            };
            if let Some(output) = output {
                config.report_dir = output;
            }
            if let Some(ref policy) = policy {
                config.patch_policy = parse_policy(policy)?;
            }
            if !apk.exists() {
                return Err(anyhow::anyhow!("APK not found: {}", apk.display()));
            }

            let pipeline = Pipeline::new(config).with_reporter(Box::new(ConsoleReporter::new()));
            let run = pipeline.run(&apk).await?;

            match run.status {
                RunStatus::Done => {
                    println!(
                        "{} signed package: {}",
                        "[+]".green(),
                        run.rebuilt.display()
                    );
                }
                RunStatus::Failed(stage) => {
                    eprintln!(
                        "{}",
                        format!("pipeline halted at the {stage} stage").red()
                    );
                    std::process::exit(1);
                }
                RunStatus::Running => unreachable!("pipeline returned mid-run"),
            }
        }

        Commands::Scan {
            path,
            format,
            output,
            evidence_dir,
        } => {
            if !path.is_dir() {
                return Err(anyhow::anyhow!(
                    "source tree not found: {}",
                    path.display()
                ));
            }
            // Config is optional here; defaults carry the builtin patterns.
            let config = match cli.config {
                Some(ref config_path) => Config::load(config_path)?,
                None => Config::default(),
            };
            let patterns = PatternSet::builtin_with_extra(&config.extra_patterns);

            let scanner = Scanner::new(patterns);
            let findings = scanner.scan_tree(&path);

            if let Some(evidence_dir) = evidence_dir {
                let renderer = EvidenceRenderer::new(&config.evidence);
                let artifacts = renderer.render_all(&findings, &evidence_dir);
                eprintln!(
                    "{} evidence image(s) written to {}",
                    artifacts.len(),
                    evidence_dir.display()
                );
            }

            let format: OutputFormat = format.parse().map_err(|e| anyhow::anyhow!("{}", e))?;
            let findings_report = FindingsReport::new(path, findings);

            if let Some(output_path) = output {
                let mut file = std::fs::File::create(&output_path)?;
                report(&findings_report, format, &mut file)?;
                eprintln!("Report written to: {}", output_path.display());
            } else {
                let mut stdout = io::stdout().lock();
                report(&findings_report, format, &mut stdout)?;
            }
        }

        Commands::Patterns { json } => {
            let tokens = builtin_patterns();
            if json {
                println!("{}", serde_json::to_string_pretty(&tokens)?);
            } else {
                println!("{}", "Builtin patterns".bold().underline());
                for token in &tokens {
                    println!("  {}", token.bright_cyan());
                }
                println!();
                println!("Total: {} patterns", tokens.len());
            }
        }

        Commands::Init { output } => {
            if output.exists() {
                eprintln!(
                    "{}",
                    format!("Config file already exists: {}", output.display()).yellow()
                );
                eprintln!("Use a different path or remove the existing file.");
                std::process::exit(1);
            }

            std::fs::write(&output, generate_default_config())?;
            println!(
                "{}",
                format!("Created config file: {}", output.display()).green()
            );
            println!("Edit this file to set tool paths and signing material.");
            print_tool_hint(&output);
        }
    }

    Ok(())
}

fn parse_policy(s: &str) -> Result<PatchPolicy> {
    match s.to_lowercase().as_str() {
        "redact" => Ok(PatchPolicy::Redact),
        "flip" => Ok(PatchPolicy::Flip),
        "delete" => Ok(PatchPolicy::Delete),
        _ => Err(anyhow::anyhow!("Unknown patch policy: {}", s)),
    }
}

fn print_tool_hint(config_path: &Path) {
    if !Path::new("tools/apktool/apktool.jar").exists() {
        eprintln!(
            "Note: apktool.jar was not found at the default path; update [tools] in {}.",
            config_path.display()
        );
    }
}
