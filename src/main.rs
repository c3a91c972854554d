//! tokpass - token-passing beam-search speech decoder
//!
//! Run `tokpass decode <LIST>` to decode the acoustic score files in LIST.
//! Use `tokpass check` to validate the configured models.
//! Use `tokpass config` to show the effective configuration, or
//! `tokpass config --save FILE` to record it next to a decoding run.

use anyhow::Context;
use clap::Parser;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokpass::batch;
use tokpass::cli::{Cli, Commands};
use tokpass::config::{self, Config};
use tokpass::lm::{create_language_model, ConfiguredLm, LanguageModel};
use tokpass::scorer::{create_duration_model, create_lookahead, DurationModel, LookaheadScorer};
use tokpass::{Decoder, RecognitionResult, SearchNetwork, TotalStats, Vocabulary};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.quiet {
        "error"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(format!("tokpass={},warn", log_level))),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    // Load configuration
    let mut config = config::load_config(cli.config.as_deref())?;

    // Apply CLI overrides
    if let Some(threads) = cli.threads {
        config.threads = Some(threads);
    }
    if let Some(lm_scale) = cli.lm_scale {
        config.search.lm_scale = lm_scale;
    }
    if let Some(global_beam) = cli.global_beam {
        config.search.global_beam = global_beam;
    }
    if let Some(token_limit) = cli.token_limit {
        config.search.token_limit = token_limit;
    }

    match cli.command {
        Commands::Decode { list, nbest, json } => {
            if nbest.is_some() {
                config.nbest.enabled = true;
            }
            let output = Output { nbest, json };
            run_decode(&config, &list, &output).await?;
        }

        Commands::Check => {
            run_check(&config)?;
        }

        Commands::Config { init, save } => {
            if init {
                init_config(cli.config.as_deref())?;
            }
            if let Some(path) = save {
                config::save_config(&config, &path)?;
                println!("Saved effective config to {:?}\n", path);
            }
            show_config(&config)?;
        }
    }

    Ok(())
}

/// Everything except the language model, which picks the decoder type
struct Models {
    network: SearchNetwork,
    vocab: Vocabulary,
    lookahead: Box<dyn LookaheadScorer>,
    duration: Option<Box<dyn DurationModel>>,
}

struct Output {
    nbest: Option<PathBuf>,
    json: bool,
}

fn load_models(config: &Config) -> anyhow::Result<(Models, ConfiguredLm)> {
    config.search.validate()?;

    let vocab = Vocabulary::load(
        &config.models.vocabulary,
        config.search.word_boundary.as_deref(),
    )?;
    let network = SearchNetwork::load(&config.models.graph)?;
    let lm = create_language_model(&config.lm, &vocab)?;
    let lookahead = create_lookahead(&config.models)?;
    let duration = create_duration_model(&config.models)?;

    Ok((
        Models {
            network,
            vocab,
            lookahead,
            duration,
        },
        lm,
    ))
}

fn build_decoder<L: LanguageModel>(
    config: &Config,
    models: Models,
    lm: L,
) -> anyhow::Result<Decoder<L>> {
    let decoder = Decoder::new(models.network, models.vocab, lm, config.search.clone())?
        .with_lookahead(models.lookahead)
        .with_duration_model(models.duration)
        .with_nbest(config.nbest.clone());
    Ok(decoder)
}

/// Read the file list, resolving relative entries against its directory
fn read_list(list: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let contents = std::fs::read_to_string(list)
        .with_context(|| format!("Failed to read file list {:?}", list))?;
    let base = list.parent().unwrap_or_else(|| Path::new("."));
    Ok(contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| base.join(line))
        .collect())
}

async fn run_decode(config: &Config, list: &Path, output: &Output) -> anyhow::Result<()> {
    let files = read_list(list)?;
    if files.is_empty() {
        anyhow::bail!("File list {:?} is empty", list);
    }

    let (models, lm) = load_models(config)?;
    match lm {
        ConfiguredLm::Ngram(lm) => decode_with(config, models, lm, files, output).await,
        ConfiguredLm::Class(lm) => decode_with(config, models, lm, files, output).await,
        ConfiguredLm::Interpolated(lm) => decode_with(config, models, lm, files, output).await,
    }
}

async fn decode_with<L: LanguageModel + 'static>(
    config: &Config,
    models: Models,
    lm: L,
    files: Vec<PathBuf>,
    output: &Output,
) -> anyhow::Result<()> {
    let decoder = Arc::new(build_decoder(config, models, lm)?);
    let outcomes = batch::decode_files(decoder, files.clone(), config.resolve_threads()).await;

    let mut nbest_file = match &output.nbest {
        Some(path) => Some(std::io::BufWriter::new(
            std::fs::File::create(path)
                .with_context(|| format!("Failed to create n-best file {:?}", path))?,
        )),
        None => None,
    };

    let mut totals = TotalStats::default();
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for (path, outcome) in files.iter().zip(outcomes) {
        match outcome {
            Ok(result) => {
                print_result(&mut out, path, &result, output.json)?;
                if let Some(file) = nbest_file.as_mut() {
                    write_alternates(file, path, &result)?;
                }
                totals.add(&result);
            }
            Err(e) => {
                tracing::warn!("{}: {}", path.display(), e);
                if output.json {
                    let line = serde_json::json!({
                        "file": path,
                        "error": e.to_string(),
                    });
                    writeln!(out, "{}", line)?;
                }
                totals.add_failure();
            }
        }
    }

    if let Some(mut file) = nbest_file {
        file.flush()?;
    }
    if !output.json {
        writeln!(out, "\n{}", totals)?;
    }
    Ok(())
}

fn print_result(
    out: &mut impl Write,
    path: &Path,
    result: &RecognitionResult,
    json: bool,
) -> anyhow::Result<()> {
    if json {
        let line = serde_json::json!({
            "file": path,
            "result": result,
            "elapsed_secs": result.elapsed.as_secs_f64(),
        });
        writeln!(out, "{}", line)?;
    } else {
        writeln!(out, "{}: {}", path.display(), result.best.text)?;
        tracing::debug!(
            "{}: total={:.3} am={:.3} lm={:.3} frames={}",
            path.display(),
            result.best.total_log_prob,
            result.best.am_log_prob,
            result.best.lm_log_prob,
            result.frames
        );
    }
    Ok(())
}

/// One line per alternate: file, rank, total, am and lm log-probs, text
fn write_alternates(
    out: &mut impl Write,
    path: &Path,
    result: &RecognitionResult,
) -> anyhow::Result<()> {
    for (rank, hypothesis) in result.alternates.iter().enumerate() {
        writeln!(
            out,
            "{}\t{}\t{:.3}\t{:.3}\t{:.3}\t{}",
            path.display(),
            rank + 1,
            hypothesis.total_log_prob,
            hypothesis.am_log_prob,
            hypothesis.lm_log_prob,
            hypothesis.units.join(" ")
        )?;
    }
    Ok(())
}

/// Load every configured model and build a decoder to catch configuration
/// mismatches before a long run
fn run_check(config: &Config) -> anyhow::Result<()> {
    println!("Checking tokpass models\n");

    let (models, lm) = load_models(config)?;
    let has_lookahead = config.models.lookahead.is_some();
    let has_duration = models.duration.is_some();
    let summary = match lm {
        ConfiguredLm::Ngram(lm) => describe(&build_decoder(config, models, lm)?),
        ConfiguredLm::Class(lm) => describe(&build_decoder(config, models, lm)?),
        ConfiguredLm::Interpolated(lm) => describe(&build_decoder(config, models, lm)?),
    };
    println!("{}", summary);
    println!("  lookahead: {}", if has_lookahead { "table" } else { "none" });
    println!("  duration model: {}", if has_duration { "table" } else { "none" });
    println!("\nAll models loaded successfully.");
    Ok(())
}

fn describe<L: LanguageModel>(decoder: &Decoder<L>) -> String {
    let network = decoder.network();
    let vocab = decoder.vocab();
    let markers = decoder.markers();
    let mut lines = vec![
        format!(
            "  network: {} nodes, {} arcs, decode start {}",
            network.len(),
            network.arc_count(),
            network.decode_start()
        ),
        format!("  vocabulary: {} units", vocab.len()),
        format!("  language model: {}", decoder.lm().describe()),
    ];
    if let Some(boundary) = markers.word_boundary {
        lines.push(format!("  word boundary: {}", vocab.label(boundary)));
    }
    if let Some(last) = network.last_silence_state() {
        lines.push(format!("  silence states: 0..={}", last));
    }
    lines.join("\n")
}

/// Write the documented default config file
fn init_config(path: Option<&Path>) -> anyhow::Result<()> {
    let path = path
        .map(PathBuf::from)
        .or_else(Config::default_path)
        .context("Could not determine config path")?;
    if path.exists() {
        println!("Config file already exists: {:?}\n", path);
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, config::DEFAULT_CONFIG)?;
    println!("Wrote default config to {:?}\n", path);
    Ok(())
}

fn show_config(config: &Config) -> anyhow::Result<()> {
    println!("Current Configuration\n");
    println!("=====================\n");
    print!("{}", toml::to_string_pretty(config)?);

    if let Some(path) = Config::default_path() {
        println!("\n# Default config file: {:?}", path);
    }
    Ok(())
}
