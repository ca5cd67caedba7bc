use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use clap::{Parser, ValueEnum};
use serde_json::Value;

use suprsend_client::{
    BulkResponse, Client, ClientConfig, Event, RecordError, UserEdit, WorkflowTrigger,
};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Kind {
    Workflow,
    Event,
    UserEdit,
}

#[derive(Parser, Debug)]
#[command(
    name = "suprsend-bulk",
    about = "Submit a JSON-lines file of workflows, events or user edits in bulk"
)]
struct Args {
    /// Record kind contained in the input file.
    #[arg(long, value_enum)]
    kind: Kind,

    /// Path to a file with one JSON object per line.
    #[arg(long)]
    input: PathBuf,

    /// Override SUPRSEND_BASE_URL.
    #[arg(long)]
    base_url: Option<String>,
}

fn read_records<T>(
    input: &Path,
    parse: impl Fn(Value) -> Result<T, RecordError>,
) -> io::Result<Vec<T>> {
    let reader = BufReader::new(File::open(input)?);
    let mut records = Vec::new();

    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let parsed = serde_json::from_str::<Value>(&line)
            .map_err(|err| RecordError::new(err.to_string()))
            .and_then(&parse);
        match parsed {
            Ok(record) => records.push(record),
            Err(err) => log::warn!("skipping line {}: {}", idx + 1, err),
        }
    }
    Ok(records)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    suprsend_client::init_logger();

    let args = Args::parse();
    let mut config = ClientConfig::from_env()?;
    if let Some(base_url) = args.base_url {
        config.base_url = base_url;
    }
    let client = Client::from_config(config)?;

    let response: BulkResponse = match args.kind {
        Kind::Workflow => {
            let mut bulk = client.bulk_workflows();
            bulk.append(read_records(&args.input, WorkflowTrigger::from_value)?);
            bulk.trigger().await
        }
        Kind::Event => {
            let mut bulk = client.bulk_events();
            bulk.append(read_records(&args.input, Event::from_value)?);
            bulk.trigger().await
        }
        Kind::UserEdit => {
            let mut bulk = client.bulk_user_edits();
            bulk.append(read_records(&args.input, UserEdit::from_value)?);
            bulk.save().await
        }
    };

    let mut stdout = io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, &response)?;
    writeln!(stdout)?;

    if response.failure_count > 0 {
        std::process::exit(1);
    }
    Ok(())
}
