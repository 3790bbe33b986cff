mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use serde_json::Value;
use std::path::{Path, PathBuf};

use tb_core::{Config, Params, Section};
use tb_pipeline::{Progress, ProgressSender, Toolbox, ACTIONS};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "toolbox2=debug,tb_pipeline=debug,tb_worker=debug,tb_core=debug".to_string()
        } else {
            "toolbox2=info,tb_pipeline=info,tb_worker=warn,tb_core=warn".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Actions => list_actions(),
        Commands::Run {
            action,
            input,
            id,
            params,
            keep,
            json,
        } => {
            let toolbox = Toolbox::new(Config::load_or_default(cli.config.as_deref()));
            let params: Params = params.into_iter().collect();
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(run_action(&toolbox, &action, &input, id.as_deref(), &params, keep, json))
        }
        Commands::Probe { file, json } => {
            let toolbox = Toolbox::new(Config::load_or_default(cli.config.as_deref()));
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(probe_file(&toolbox, &file, json))
        }
        Commands::CheckTools => check_tools(cli.config.as_deref()),
        Commands::Capability {
            tool,
            option,
            regex,
        } => {
            let toolbox = Toolbox::new(Config::load_or_default(cli.config.as_deref()));
            let rt = tokio::runtime::Runtime::new()?;
            let available = rt.block_on(toolbox.is_option_available(&tool, &option, regex))?;
            println!("{tool} -{option}: {}", if available { "available" } else { "not available" });
            if !available {
                std::process::exit(1);
            }
            Ok(())
        }
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
    }
}

fn list_actions() -> Result<()> {
    for spec in ACTIONS {
        let engines = if spec.engines.is_empty() {
            "-".to_string()
        } else {
            spec.engines.join(", ")
        };
        println!("{:<20} {:<14} {}", spec.name, spec.category, spec.description);
        println!("{:<20} engines: {engines}", "");
    }
    Ok(())
}

fn report(progress: &Progress) {
    eprintln!(
        "[{:>3}%] {} stage {}/{} {} ({}%)",
        progress.overall,
        progress.pipeline,
        progress.stage + 1,
        progress.stages,
        progress.tool,
        progress.stage_progress
    );
}

async fn run_action(
    toolbox: &Toolbox,
    action: &str,
    inputs: &[PathBuf],
    id: Option<&str>,
    params: &Params,
    keep: bool,
    json: bool,
) -> Result<()> {
    for input in inputs {
        if !input.exists() {
            anyhow::bail!("Input file does not exist: {}", input.display());
        }
    }

    let mut pipeline = toolbox.pipeline(action, id, params)?;
    for input in inputs {
        let path = std::fs::canonicalize(input).unwrap_or_else(|_| input.clone());
        pipeline.add_input(path)?;
    }

    let token = pipeline.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling pipeline");
            token.cancel();
        }
    });

    let result = toolbox.run(&mut pipeline, &ProgressSender::new(report)).await;
    if let Err(e) = result {
        if !keep {
            pipeline.clean();
        }
        return Err(e).with_context(|| format!("action {action} failed"));
    }

    let resources = pipeline.resources();
    if json {
        let outputs: serde_json::Map<String, Value> = resources
            .get_all(Section::Outputs)
            .into_iter()
            .map(|(index, payload)| (index, payload.into_value()))
            .collect();
        let report = serde_json::json!({
            "pipeline": pipeline.label(),
            "working_dir": pipeline.working_dir(),
            "outputs": outputs,
            "metadata": resources.metadata(),
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Completed {action} in {}", pipeline.working_dir().display());
        for (index, payload) in resources.get_all(Section::Outputs) {
            match payload.str("path") {
                Some(path) => println!("  output {index}: {path}"),
                None => println!("  output {index}: {}", payload.clone().into_value()),
            }
        }
        for (key, value) in resources.metadata().iter() {
            if !value.is_object() && !value.is_array() {
                println!("  {key}: {value}");
            }
        }
    }
    Ok(())
}

async fn probe_file(toolbox: &Toolbox, file: &Path, json: bool) -> Result<()> {
    if !file.exists() {
        anyhow::bail!("File does not exist: {}", file.display());
    }

    if json {
        let metadata = toolbox.probe_metadata(file).await?;
        println!("{}", serde_json::to_string_pretty(&metadata)?);
        return Ok(());
    }

    let info = toolbox.probe(file).await?;
    println!("File: {}", file.display());
    if let Some(name) = info.format.get("format_name").and_then(Value::as_str) {
        println!("Format: {name}");
    }
    if let Some(duration) = info.format.get("duration").and_then(Value::as_str) {
        println!("Duration: {duration} s");
    }
    println!("Timecode: {}", info.timecode);

    println!("\nVideo Streams: {}", info.video_streams.len());
    if info.has_video() {
        let res = info.video_res.as_deref().unwrap_or("unknown");
        print!("  {res} @ {:.3} fps, DAR {}", info.video_fps, info.video_dar);
        if let Some(ref pix_fmt) = info.pix_fmt {
            print!(", {pix_fmt}");
        }
        if info.video_has_vbi {
            print!(" [VBI]");
        }
        println!();
        if let Some(frames) = info.nb_frames() {
            println!("  {frames} frames");
        }
    }

    println!("\nAudio Streams: {}", info.nb_audio_streams());
    for (i, stream) in info.audio_streams.iter().enumerate() {
        let codec = stream.get("codec_name").and_then(Value::as_str).unwrap_or("unknown");
        println!("  [{i}] {codec}");
    }
    if !info.data_streams.is_empty() {
        println!("\nData Streams: {}", info.data_streams.len());
    }

    Ok(())
}

fn check_tools(config_path: Option<&Path>) -> Result<()> {
    println!("Checking external tools...\n");

    let config = Config::load_or_default(config_path);
    let toolbox = Toolbox::new(config);
    let mut all_ok = true;

    for tool in toolbox.tools().check_all() {
        let status = if tool.available {
            "✓"
        } else {
            all_ok = false;
            "✗"
        };

        print!("{} {}", status, tool.name);

        if let Some(ref version) = tool.version {
            print!(" ({})", version.lines().next().unwrap_or(""));
        }

        println!(" - {}", tool.path.display());
    }

    println!();
    if all_ok {
        println!("All tools are available!");
    } else {
        println!("Some tools are missing. Actions using them will fail.");
    }

    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    match path {
        Some(p) => {
            println!("Validating config: {}", p.display());
            let contents = std::fs::read_to_string(p)
                .with_context(|| format!("Failed to read {}", p.display()))?;
            let config = Config::from_json(&contents)?;
            println!("✓ Configuration is valid");
            print_config(&config);
            for warning in config.validate() {
                println!("  warning: {warning}");
            }
        }
        None => {
            println!("No config file specified, using defaults");
            print_config(&Config::default());
        }
    }

    Ok(())
}

fn print_config(config: &Config) {
    let pipeline = &config.pipeline;
    println!("  Base dir: {}", pipeline.base_dir.display());
    println!("  Poll timeout: {} ms", pipeline.poll_timeout_ms);
    println!("  Callback interval: {} ms", pipeline.callback_interval_ms);
    println!("  Kill timeout: {} s", pipeline.kill_timeout_secs);
    println!("  Debug: {}", pipeline.debug);
    println!("  Tool overrides: {}", config.tools.paths.len());
}
