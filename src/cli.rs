use clap::{Parser, Subcommand};
use serde_json::Value;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "toolbox2")]
#[command(author, version, about = "Supervised pipelines of external media tools")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List the registered actions
    Actions,

    /// Run an action on one or more input files
    Run {
        /// Action name (see `toolbox2 actions`)
        action: String,

        /// Input file; repeat for several inputs
        #[arg(short, long, required = true)]
        input: Vec<PathBuf>,

        /// Job id; the action works in `<base_dir>/job-<id>`
        #[arg(long)]
        id: Option<String>,

        /// Action parameter as key=value; JSON values are decoded
        #[arg(short, long = "param", value_parser = parse_param)]
        params: Vec<(String, Value)>,

        /// Keep the working directory when the action fails
        #[arg(long)]
        keep: bool,

        /// Print resources as JSON
        #[arg(long)]
        json: bool,
    },

    /// Probe a media file and display information
    Probe {
        /// File to probe
        #[arg(required = true)]
        file: PathBuf,

        /// Output the full probe metadata as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check that the external tools are available
    CheckTools,

    /// Check whether ffmpeg or ffprobe supports an option
    Capability {
        /// `ffmpeg` or `ffprobe`
        tool: String,

        /// Option name without the leading dash
        option: String,

        /// Treat the option as a regular expression
        #[arg(long)]
        regex: bool,
    },

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses --config if not specified)
        config: Option<PathBuf>,
    },
}

/// `key=value`, the value decoded as JSON when it parses, else a string.
pub fn parse_param(s: &str) -> Result<(String, Value), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{s}'"))?;
    if key.is_empty() {
        return Err(format!("empty parameter name in '{s}'"));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn params_decode_json_values() {
        assert_eq!(parse_param("bitrate=30000").unwrap(), ("bitrate".into(), json!(30000)));
        assert_eq!(parse_param("container=mov").unwrap(), ("container".into(), json!("mov")));
        assert_eq!(
            parse_param(r#"manzanita={"global":{}}"#).unwrap().1,
            json!({"global": {}})
        );
        assert_eq!(parse_param("args=a=b").unwrap().1, json!("a=b"));
        assert!(parse_param("novalue").is_err());
        assert!(parse_param("=1").is_err());
    }

    #[test]
    fn cli_parses_run() {
        let cli = Cli::try_parse_from([
            "toolbox2", "run", "transcode", "-i", "/media/a.mxf", "--id", "7", "-p", "container=mov",
        ])
        .unwrap();
        match cli.command {
            Commands::Run { action, input, id, params, .. } => {
                assert_eq!(action, "transcode");
                assert_eq!(input, [PathBuf::from("/media/a.mxf")]);
                assert_eq!(id.as_deref(), Some("7"));
                assert_eq!(params.len(), 1);
            }
            _ => panic!("expected run"),
        }
    }
}
