mod cli;

use std::path::Path;

use anyhow::{Context, Result};
use base64::Engine;
use clap::Parser;
use cli::{Cli, Commands};
use pb_convert::{Converter, ToolRegistry};
use pb_core::config::Config;
use pb_core::{formats, ConversionOptions, ConversionRequest};
use rand::RngCore;

/// Load the config file, then layer `.env` and process environment on top.
fn load_config(path: Option<&Path>) -> Config {
    let mut config = Config::load_or_default(path);
    for warning in config.apply_env() {
        tracing::warn!("{warning}");
    }
    config
}

async fn start_server(
    host: Option<String>,
    port: Option<u16>,
    config_path: Option<&Path>,
) -> Result<()> {
    let mut config = load_config(config_path);

    // CLI flags win over config and environment.
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    tracing::info!(
        "Server will listen on {}:{}",
        config.server.host,
        config.server.port
    );
    pb_server::start(config).await?;
    Ok(())
}

fn main() -> Result<()> {
    // A missing .env file is normal.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Respect RUST_LOG if set; otherwise use LOG_LEVEL / config, or trace
    // when verbose.
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "pandoc_bridge=trace,pb_server=trace,pb_convert=trace,pb_core=debug,tower_http=debug"
                .to_string()
        } else {
            let level = std::env::var("LOG_LEVEL")
                .map(|l| l.to_lowercase())
                .unwrap_or_else(|_| {
                    Config::load_or_default(cli.config.as_deref()).server.log_level
                });
            format!("pandoc_bridge={level},pb_server={level},pb_convert={level},pb_core={level},tower_http={level}")
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Start { host, port } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(start_server(host, port, cli.config.as_deref()))
        }
        Commands::Convert {
            input,
            to,
            from,
            output,
            pdf_engine,
        } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(convert_file(
                &input,
                &to,
                from,
                output.as_deref(),
                pdf_engine,
                cli.config.as_deref(),
            ))
        }
        Commands::Formats { json } => list_formats(json),
        Commands::CheckTools => check_tools(cli.config.as_deref()),
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("pandoc-bridge {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Commands::GenerateApiKey => generate_api_key(),
    }
}

async fn convert_file(
    input: &Path,
    to: &str,
    from: Option<String>,
    output: Option<&Path>,
    pdf_engine: Option<String>,
    config_path: Option<&Path>,
) -> Result<()> {
    let config = load_config(config_path);

    if !input.exists() {
        anyhow::bail!("Input file does not exist: {}", input.display());
    }
    let bytes = std::fs::read(input)
        .with_context(|| format!("Failed to read {}", input.display()))?;
    let filename = input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".into());

    let mut request = ConversionRequest::file(bytes, filename, to).with_options(ConversionOptions {
        pdf_engine,
        ..Default::default()
    });
    request.source_format = from;
    request.options.validate()?;

    let tools = ToolRegistry::discover(&config.tools);
    let converter = Converter::from_config(&config, &tools);
    let result = converter
        .convert(&request, converter.default_timeout())
        .await
        .into_result()?;

    match output {
        Some(path) => {
            std::fs::write(path, &result.content)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!(
                "Converted {} -> {} ({}, {} bytes)",
                result.source_format,
                result.target_format,
                path.display(),
                result.content.len()
            );
        }
        None if result.is_binary => {
            anyhow::bail!(
                "{} output is binary; use --output to write it to a file",
                result.target_format
            );
        }
        None => print!("{}", String::from_utf8_lossy(&result.content)),
    }

    Ok(())
}

fn list_formats(json: bool) -> Result<()> {
    let lists = formats::list_formats();
    if json {
        println!("{}", serde_json::to_string_pretty(&lists)?);
    } else {
        println!("Input formats ({}):", lists.input.len());
        println!("  {}", lists.input.join(", "));
        println!("\nOutput formats ({}):", lists.output.len());
        println!("  {}", lists.output.join(", "));
    }
    Ok(())
}

fn check_tools(config_path: Option<&Path>) -> Result<()> {
    println!("Checking external tools...\n");

    let config = load_config(config_path);
    let registry = ToolRegistry::discover(&config.tools);
    let mut required_ok = true;

    for tool in registry.check_all() {
        let status = if tool.available {
            "✓"
        } else {
            if tool.required {
                required_ok = false;
            }
            "✗"
        };

        print!("{} {}", status, tool.name);
        if tool.required {
            print!(" (required)");
        }
        if let Some(ref version) = tool.version {
            print!(" ({version})");
        }
        if let Some(ref path) = tool.path {
            print!(" - {}", path.display());
        }
        println!();
    }

    println!();
    if required_ok {
        println!("All required tools are available!");
        Ok(())
    } else {
        anyhow::bail!("Pandoc is not installed or not found in PATH")
    }
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {}", p.display());
            let contents = std::fs::read_to_string(p)
                .with_context(|| format!("Failed to read {}", p.display()))?;
            let config = Config::from_json(&contents)?;
            println!("✓ Configuration is valid");
            config
        }
        None => {
            println!("No config file specified, using defaults");
            Config::default()
        }
    };

    println!("  Server: {}:{}", config.server.host, config.server.port);
    println!("  Auth enabled: {}", config.auth.enabled);
    println!("  API keys: {}", config.auth.parsed_keys().len());
    println!(
        "  Rate limit: {} ({}/min, burst {})",
        config.rate_limit.enabled,
        config.rate_limit.requests_per_minute,
        config.rate_limit.burst_size
    );
    println!("  Conversion timeout: {}s", config.conversion.timeout_secs);
    println!("  Max file size: {} MB", config.conversion.max_file_size_mb);
    println!(
        "  Max concurrent processes: {}",
        config.conversion.max_concurrent_processes
    );

    for warning in config.validate() {
        println!("  ⚠ {warning}");
    }

    Ok(())
}

fn generate_api_key() -> Result<()> {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    let key = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes);
    println!("sk-{key}");
    Ok(())
}
