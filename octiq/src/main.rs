use std::io::Write;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use indicatif::{HumanBytes, ProgressBar, ProgressStyle};

use octiq::config::{
    config_file_path, default_data_dir, AppConfig, ConfigKey, ConfigStore, JsonFileStore,
};
use octiq::models::{ModelRegistry, RunOutput, DEFAULT_BASE_URL};
use octiq::shell::{shell_proxy, DEFAULT_SHELL_BASE_URL};
use octiq::{App, Error, Result};
use octiq_cache::{ProxyFetch, ResponseSource};

/// Octiq - OCT image quality classification with offline model caching
#[derive(Parser)]
#[command(name = "octiq", version, about = "Grade OCT scans with locally cached ONNX classifiers", long_about = None)]
struct Cli {
    /// Data directory for cached models, shell assets, and config
    #[arg(long, global = true, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    /// Base URL the model artifacts are served from (overrides config)
    #[arg(long, global = true, value_name = "URL")]
    base_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the model catalog with cache status
    Models {
        /// Print as JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Download a model into the cache (served from disk if already there)
    Fetch {
        /// Catalog name, e.g. "GCIPL"
        #[arg(value_name = "MODEL")]
        model: String,
    },
    /// Grade one or more images with a model
    Classify {
        /// Catalog name; defaults to the previously used model
        #[arg(short, long, value_name = "MODEL")]
        model: Option<String>,

        /// Image files to grade
        #[arg(value_name = "IMAGE", required = true)]
        images: Vec<PathBuf>,

        /// Also write the results to a CSV file
        #[arg(long, value_name = "FILE")]
        csv: Option<PathBuf>,
    },
    /// Manage the offline copy of the demo shell
    Shell {
        /// Where the demo shell is hosted
        #[arg(long, value_name = "URL", default_value = DEFAULT_SHELL_BASE_URL)]
        shell_url: String,

        #[command(subcommand)]
        command: ShellCommand,
    },
    /// Manage the local caches
    Cache {
        #[command(subcommand)]
        command: CacheCommand,
    },
}

/// Subcommands for `octiq shell`
#[derive(Subcommand)]
enum ShellCommand {
    /// Fetch and store every shell asset into the current generation
    Install,
    /// Delete the generations left behind by older versions
    Activate,
    /// Fetch one URL through the offline-first proxy
    Fetch {
        #[arg(value_name = "URL")]
        url: String,
    },
    /// Show the manifest and which entries are cached
    Status,
}

/// Subcommands for `octiq cache`
#[derive(Subcommand)]
enum CacheCommand {
    /// Delete every cached model and shell asset
    Clear,
}

#[tokio::main]
async fn main() {
    env_logger::builder()
        .format(|buf, record| {
            writeln!(
                buf,
                "<{}> - [{}] - {}",
                record.target(),
                record.level(),
                record.args()
            )
        })
        .init();

    if let Err(e) = run_command(Cli::parse()).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run_command(cli: Cli) -> Result<()> {
    let Cli {
        data_dir,
        base_url,
        command,
    } = cli;
    let data_dir = data_dir.unwrap_or_else(default_data_dir);
    let config = JsonFileStore::open(config_file_path(&data_dir));

    match command {
        Command::Models { json } => {
            let app = open_app(&data_dir, base_url, &config)?;
            cmd_models(&app, json)
        }
        Command::Fetch { model } => {
            let app = open_app(&data_dir, base_url, &config)?;
            cmd_fetch(&app, &model).await
        }
        Command::Classify { model, images, csv } => {
            let app = open_app(&data_dir, base_url, &config)?;
            cmd_classify(&app, &config, model, &images, csv.as_deref()).await
        }
        Command::Shell { shell_url, command } => cmd_shell(&data_dir, &shell_url, command).await,
        Command::Cache { command } => {
            let app = open_app(&data_dir, base_url, &config)?;
            cmd_cache(&app, &data_dir, command).await
        }
    }
}

/// Base URL precedence: CLI flag, then config, then the published bucket.
fn open_app(data_dir: &Path, base_url: Option<String>, config: &JsonFileStore) -> Result<App> {
    let app_config: AppConfig = config.get(&ConfigKey::APP).unwrap_or_default();
    let base = base_url
        .or(app_config.model_base_url)
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
    App::open(data_dir, ModelRegistry::with_base_url(&base))
}

fn cmd_models(app: &App, json: bool) -> Result<()> {
    let models = app.list_models();

    if json {
        println!("{}", serde_json::to_string_pretty(&models)?);
        return Ok(());
    }

    println!(
        "{:<8} {:<8} {:<12} {}",
        "NAME", "PIPELINE", "CACHED", "DISPLAY NAME"
    );
    for model in models {
        let cached = if model.is_cached {
            HumanBytes(model.cached_bytes).to_string()
        } else {
            "-".to_string()
        };
        println!(
            "{:<8} {:<8} {:<12} {}",
            model.name, model.pipeline, cached, model.display_name
        );
    }
    Ok(())
}

async fn cmd_fetch(app: &App, name: &str) -> Result<()> {
    let pb = fraction_bar(&format!("downloading {}", name));
    let observer = |fraction: f64| pb.set_position((fraction * 100.0) as u64);
    let bytes = app.fetch_model(name, &observer).await?;
    pb.finish_and_clear();

    println!("{} cached ({})", name, HumanBytes(bytes.len() as u64));
    Ok(())
}

async fn cmd_classify(
    app: &App,
    config: &JsonFileStore,
    model: Option<String>,
    images: &[PathBuf],
    csv: Option<&Path>,
) -> Result<()> {
    let mut app_config: AppConfig = config.get(&ConfigKey::APP).unwrap_or_default();
    let name = model
        .or_else(|| app_config.selected_model.clone())
        .ok_or(Error::NoModelSelected)?;

    let pb = fraction_bar(&format!("loading {}", name));
    let observer = |fraction: f64| pb.set_position((fraction * 100.0) as u64);
    let session = app.load_model(&name, &observer).await?;
    pb.finish_and_clear();

    // Remember the selection so the next classify can omit --model.
    if app_config.selected_model.as_deref() != Some(name.as_str()) {
        app_config.selected_model = Some(name.clone());
        config.set(&ConfigKey::APP, app_config)?;
    }

    println!(
        "{:<28} {:<8} {:>12} {:>8} {:>8} {:>9} {:>8}",
        "IMAGE", "QUALITY", "RAW", "SIGMOID", "PRE(ms)", "INFER(ms)", "POST(ms)"
    );

    let mut rows = Vec::with_capacity(images.len());
    for path in images {
        let image = image::open(path)?;
        let output = session.run(&image)?;
        println!(
            "{:<28} {:<8} {:>12.8} {:>8.4} {:>8.1} {:>9.1} {:>8.1}",
            short_name(path),
            output.prediction.label,
            output.prediction.raw,
            output.prediction.sigmoid,
            output.preprocess_ms,
            output.inference_ms,
            output.postprocess_ms
        );
        rows.push((path.clone(), output));
    }

    if let Some(csv_path) = csv {
        write_csv(csv_path, &rows)?;
        println!("results written to {}", csv_path.display());
    }
    Ok(())
}

async fn cmd_shell(data_dir: &Path, shell_url: &str, command: ShellCommand) -> Result<()> {
    let proxy = shell_proxy(data_dir, shell_url);

    match command {
        ShellCommand::Install => {
            proxy.install().await?;
            println!(
                "installed shell generation {} ({} assets)",
                proxy.generation(),
                proxy.manifest().len()
            );
        }
        ShellCommand::Activate => {
            proxy.activate().await?;
            println!("active shell generation: {}", proxy.generation());
        }
        ShellCommand::Fetch { url } => match proxy.fetch(&url).await {
            ProxyFetch::Bypass => println!("bypassed (not an http(s) URL): {}", url),
            ProxyFetch::Response(response) => {
                let source = match response.source {
                    ResponseSource::Network => "network",
                    ResponseSource::Cache => "cache",
                    ResponseSource::Synthesized => "synthesized",
                };
                println!(
                    "{} {} ({} from {})",
                    response.status.as_u16(),
                    url,
                    HumanBytes(response.body.len() as u64),
                    source
                );
            }
        },
        ShellCommand::Status => {
            println!("generation: {}", proxy.generation());
            for url in proxy.manifest() {
                let state = match proxy.cached_lookup(url).await {
                    Some(hit) => format!("cached ({})", HumanBytes(hit.body.len() as u64)),
                    None => "missing".to_string(),
                };
                println!("{:<20} {}", state, url);
            }
        }
    }
    Ok(())
}

async fn cmd_cache(app: &App, data_dir: &Path, command: CacheCommand) -> Result<()> {
    match command {
        CacheCommand::Clear => {
            app.clear_model_cache().await?;
            shell_proxy(data_dir, DEFAULT_SHELL_BASE_URL)
                .purge_all()
                .await?;
            println!("cleared model and shell caches under {}", data_dir.display());
        }
    }
    Ok(())
}

/// Progress bar driven by download fractions in [0, 1].
fn fraction_bar(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new(100);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} {msg} [{bar:40.cyan/blue}] {percent:>3}%")
            .unwrap()
            .progress_chars("█▓▒░  "),
    );
    pb.set_message(msg.to_string());
    pb
}

fn short_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Every cell quoted, inner quotes doubled.
fn csv_row(cells: &[String]) -> String {
    cells
        .iter()
        .map(|cell| format!("\"{}\"", cell.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(",")
}

fn write_csv(path: &Path, rows: &[(PathBuf, RunOutput)]) -> Result<()> {
    let header = [
        "image",
        "quality",
        "raw",
        "sigmoid",
        "preprocess_ms",
        "inference_ms",
        "postprocess_ms",
    ]
    .map(String::from);

    let mut lines = vec![csv_row(&header)];
    for (image, output) in rows {
        lines.push(csv_row(&[
            image.display().to_string(),
            output.prediction.label.to_string(),
            format!("{:.8}", output.prediction.raw),
            format!("{:.4}", output.prediction.sigmoid),
            format!("{:.3}", output.preprocess_ms),
            format!("{:.3}", output.inference_ms),
            format!("{:.3}", output.postprocess_ms),
        ]));
    }

    std::fs::write(path, lines.join("\n"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_cells_are_quoted_and_escaped() {
        let row = csv_row(&[
            "scan \"A\".png".to_string(),
            "Good".to_string(),
            "-1.25000000".to_string(),
        ]);
        assert_eq!(row, "\"scan \"\"A\"\".png\",\"Good\",\"-1.25000000\"");
    }

    #[test]
    fn short_name_strips_directories() {
        assert_eq!(short_name(Path::new("/data/scans/eye.png")), "eye.png");
        assert_eq!(short_name(Path::new("eye.png")), "eye.png");
    }
}
