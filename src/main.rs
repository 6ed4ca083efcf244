use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, info};

use agent_chunks::config::{self, ConfigLoadStatus};
use agent_chunks::{Transformer, UIMessageChunk, logging};

#[derive(Parser, Debug)]
#[command(name = "agent-chunks")]
#[command(about = "Reads agent SDK stream-json messages as NDJSON and writes UI message chunks as NDJSON")]
#[command(version)]
struct Args {
    /// Read upstream messages from this file instead of stdin
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Use this config file instead of the platform default
    #[arg(long)]
    config: Option<PathBuf>,

    /// Include the result message uuid in the metadata chunk
    #[arg(long, default_value_t = false)]
    emit_sdk_message_uuid: bool,

    /// Log every raw upstream message at debug level
    #[arg(long, default_value_t = false)]
    ollama: bool,

    /// Pretty-print each chunk
    #[arg(long, default_value_t = false)]
    pretty: bool,
}

fn main() -> Result<()> {
    let start_time = Instant::now();
    let args = Args::parse();

    let loaded_config = config::load_config(args.config.as_deref());

    let logging_ctx = match logging::init(&loaded_config.config.logging.level) {
        Ok(ctx) => {
            logging::cleanup_old_logs(&ctx.log_directory);
            Some(ctx)
        }
        Err(e) => {
            eprintln!("Warning: Failed to initialize logging: {}", e);
            None
        }
    };

    debug!(
        config_path = %loaded_config.config_path.display(),
        project_config = ?loaded_config.project_config_path,
        status = ?loaded_config.status,
        "config_loaded"
    );
    if let ConfigLoadStatus::Error(e) = &loaded_config.status {
        eprintln!("Warning: {}; using default configuration", e);
    }

    let mut options = loaded_config.config.transform_options();
    options.emit_sdk_message_uuid |= args.emit_sdk_message_uuid;
    options.is_using_ollama |= args.ollama;

    let reader: Box<dyn BufRead> = match &args.input {
        Some(path) => Box::new(BufReader::new(
            File::open(path).with_context(|| format!("failed to open {}", path.display()))?,
        )),
        None => Box::new(BufReader::new(io::stdin())),
    };

    let stdout = io::stdout();
    let mut writer = BufWriter::new(stdout.lock());
    let stats = run(reader, &mut writer, Transformer::new(options), args.pretty)?;

    if let Some(ctx) = logging_ctx {
        info!(
            run_id = %ctx.run_id,
            lines = stats.lines,
            chunks = stats.chunks,
            duration_secs = start_time.elapsed().as_secs_f64(),
            "run_end"
        );
    }

    Ok(())
}

#[derive(Debug, Default, PartialEq, Eq)]
struct RunStats {
    lines: usize,
    chunks: usize,
}

/// Feeds every input line through the transformer and writes each chunk as
/// one JSON line. Output is flushed after each input line so downstream
/// readers see chunks as soon as they exist.
fn run(
    reader: impl BufRead,
    writer: &mut impl Write,
    mut transformer: Transformer,
    pretty: bool,
) -> Result<RunStats> {
    let mut stats = RunStats::default();

    for line in reader.lines() {
        let line = line.context("failed to read input line")?;
        if line.trim().is_empty() {
            continue;
        }
        stats.lines += 1;

        let chunks = transformer.process_line(&line);
        stats.chunks += chunks.len();
        for chunk in &chunks {
            write_chunk(writer, chunk, pretty)?;
        }
        writer.flush().context("failed to flush output")?;
    }

    Ok(stats)
}

fn write_chunk(writer: &mut impl Write, chunk: &UIMessageChunk, pretty: bool) -> Result<()> {
    if pretty {
        serde_json::to_writer_pretty(&mut *writer, chunk)?;
    } else {
        serde_json::to_writer(&mut *writer, chunk)?;
    }
    writer.write_all(b"\n")?;
    Ok(())
}
