//! CLI argument parsing for tracelabel

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use serde_json::{Map, Value};
use tracelabel_core::RequestContext;

#[derive(Parser, Debug)]
#[command(name = "tracelabel")]
#[command(version)]
#[command(about = "Request fingerprinting, dedup and archival for profiler transaction labels", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Label one request: record it if new and print its transaction name
    Label(LabelArgs),

    /// Drain the request table into the archive log
    Archive {
        /// Archive file (default: <archive_dir>/<archive_prefix>YYYY-MM-DD.log)
        #[arg(long, value_name = "PATH")]
        path: Option<PathBuf>,
    },

    /// Record the files a request resolved (arguments, or stdin one per line)
    RecordDeps {
        #[arg(value_name = "FILE")]
        files: Vec<String>,
    },

    /// Remove recorded dependency paths from a log file
    FilterNoise {
        #[arg(long, value_name = "PATH")]
        log: PathBuf,
    },

    /// Remove every occurrence of a line from a file
    StripLine {
        #[arg(long, value_name = "PATH")]
        file: PathBuf,

        #[arg(long, value_name = "TEXT")]
        line: String,
    },
}

#[derive(Args, Debug)]
pub struct LabelArgs {
    /// Entry point script as seen by the web server (e.g. /index.php)
    #[arg(long, value_name = "PATH")]
    pub entry_point: String,

    /// Request URI including the query string
    #[arg(long, value_name = "URI", default_value = "")]
    pub request_path: String,

    /// Absolute path of the entry point script on disk
    #[arg(long, value_name = "PATH", default_value = "")]
    pub script_file: String,

    /// Query parameters as a JSON object, in request order
    #[arg(long, value_name = "JSON", default_value = "{}", value_parser = parse_json_object)]
    pub query: Map<String, Value>,

    /// Body parameters as a JSON object
    #[arg(long, value_name = "JSON", default_value = "{}", value_parser = parse_json_object)]
    pub body: Map<String, Value>,

    /// Do not print the transaction name
    #[arg(short, long)]
    pub quiet: bool,
}

impl LabelArgs {
    pub fn to_context(&self) -> RequestContext {
        RequestContext {
            entry_point: self.entry_point.clone(),
            query: self.query.clone(),
            request_path: self.request_path.clone(),
            script_file: self.script_file.clone(),
            body: self.body.clone(),
        }
    }
}

fn parse_json_object(raw: &str) -> Result<Map<String, Value>, String> {
    match serde_json::from_str(raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(format!("expected a JSON object, got {other}")),
        Err(e) => Err(format!("invalid JSON: {e}")),
    }
}
