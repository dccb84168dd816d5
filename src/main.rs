//! urlforms CLI - render, evaluate and validate form configs

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use serde_json::Value;

use urlforms::{Config, DocumentFormat, FixSuggestion, Instance, UrlformsError};

#[derive(Parser)]
#[command(name = "urlforms")]
#[command(about = "urlforms - build URLs and files from validated forms")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the render model of a config
    Render {
        /// Path to the config (.json, .toml, .yaml)
        file: PathBuf,

        /// Submit form data from a file before rendering (KEY=FILE, repeatable)
        #[arg(short, long = "data", value_parser = parse_data)]
        data: Vec<(String, PathBuf)>,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,
    },

    /// Print one rendered template
    Eval {
        /// Path to the config (.json, .toml, .yaml)
        file: PathBuf,

        /// Template name (checks as checks/<label>)
        template: String,

        /// Submit form data from a file before evaluating (KEY=FILE, repeatable)
        #[arg(short, long = "data", value_parser = parse_data)]
        data: Vec<(String, PathBuf)>,
    },

    /// Load a config, resolve its documents and parse every template
    Validate {
        /// Path to the config (.json, .toml, .yaml)
        file: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Json,
    Yaml,
}

fn parse_data(arg: &str) -> Result<(String, PathBuf), String> {
    let (key, file) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=FILE, got '{arg}'"))?;
    if key.is_empty() || file.is_empty() {
        return Err(format!("expected KEY=FILE, got '{arg}'"));
    }
    Ok((key.to_string(), PathBuf::from(file)))
}

#[tokio::main]
async fn main() {
    // Initialize tracing (stderr keeps stdout clean for output)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Render { file, data, format } => render(&file, &data, format).await,
        Commands::Eval { file, template, data } => eval(&file, &template, &data).await,
        Commands::Validate { file } => validate(&file).await,
    };

    if let Err(e) = result {
        eprintln!("{} {}", "Error:".red().bold(), e);
        if let Some(suggestion) = e.fix_suggestion() {
            eprintln!("  {} {}", "Fix:".yellow(), suggestion);
        }
        std::process::exit(1);
    }
}

async fn read_document(path: &Path) -> Result<Value, UrlformsError> {
    let text = tokio::fs::read_to_string(path).await?;
    let display = path.display().to_string();
    DocumentFormat::from_path(&display)
        .unwrap_or(DocumentFormat::Json)
        .parse(&text)
        .map_err(|details| UrlformsError::DocumentParse {
            location: display,
            details,
        })
}

async fn load_with_data(file: &Path, data: &[(String, PathBuf)]) -> Result<Instance, UrlformsError> {
    let mut instance = Instance::load(file).await?;
    for (key, path) in data {
        let value = read_document(path).await?;
        let errors = instance.submit(key, value)?;
        if !errors.is_empty() {
            eprintln!(
                "{} form '{}' has {} validation error(s)",
                "!".yellow(),
                key.cyan(),
                errors.len()
            );
        }
    }
    Ok(instance)
}

fn output_error(format: &str, e: impl std::fmt::Display) -> UrlformsError {
    UrlformsError::Output {
        format: format.to_string(),
        details: e.to_string(),
    }
}

async fn render(file: &Path, data: &[(String, PathBuf)], format: OutputFormat) -> Result<(), UrlformsError> {
    let instance = load_with_data(file, data).await?;
    let model = instance.render();
    let text = match format {
        OutputFormat::Json => serde_json::to_string_pretty(&model).map_err(|e| output_error("json", e))?,
        OutputFormat::Yaml => serde_yaml::to_string(&model).map_err(|e| output_error("yaml", e))?,
    };
    println!("{text}");
    Ok(())
}

async fn eval(file: &Path, template: &str, data: &[(String, PathBuf)]) -> Result<(), UrlformsError> {
    let instance = load_with_data(file, data).await?;
    println!("{}", instance.evaluate(template)?);
    Ok(())
}

async fn validate(file: &Path) -> Result<(), UrlformsError> {
    let config = Config::from_file(file)?;
    config.check_templates()?;
    let instance = Instance::load(file).await?;

    println!("{} Config is valid", "✓".green());
    println!("  Forms: {}", instance.ranked_keys().join(", "));
    println!("  Templates: {}", config.templates.len());
    println!("  Checks: {}", config.checks.len());
    Ok(())
}
