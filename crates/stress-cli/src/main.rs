use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::rc::Rc;
use stress_codegen::{
    generate_execution_files, HintPathResolver, LoadSuiteConfig, LoadTestInfo, Platform,
    ResolutionPolicy,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "stress", version, about = "Stress run bundle generator")]
struct Cli {
    /// Log debug output to stderr (RUST_LOG overrides).
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum PlatformArg {
    #[value(name = "posix")]
    Posix,
    #[value(name = "windows")]
    Windows,
}

impl From<PlatformArg> for Platform {
    fn from(value: PlatformArg) -> Self {
        match value {
            PlatformArg::Posix => Platform::Posix,
            PlatformArg::Windows => Platform::Windows,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Write launcher and runner scripts for each test into <out-dir>/<test-name>.
    Generate {
        #[arg(long = "test-name", required = true)]
        test_names: Vec<String>,
        #[arg(long)]
        out_dir: PathBuf,
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long, value_enum)]
        platform: Option<PlatformArg>,
        #[arg(long)]
        host: Option<String>,
        #[arg(long = "env")]
        env_values: Vec<String>,
        /// Also write publish_manifest.json per test.
        #[arg(long)]
        manifest: bool,
        #[arg(long)]
        json: bool,
    },
    /// Resolve assemblies against hint paths.
    Resolve {
        #[arg(long = "name", required = true)]
        names: Vec<String>,
        #[arg(long = "hint-path", required = true)]
        hint_paths: Vec<PathBuf>,
        #[arg(long, default_value = "dll")]
        extension: String,
        #[arg(long)]
        first_match: bool,
        #[arg(long)]
        json: bool,
    },
}

fn install_subscriber(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    install_subscriber(cli.verbose);
    let json_mode = command_json_mode(&cli.command);
    let result = run_command(cli.command);
    match result {
        Ok(Some(payload)) => {
            let ok = payload.get("ok").and_then(Value::as_bool).unwrap_or(true);
            emit_json(&payload);
            if !ok {
                std::process::exit(1);
            }
            Ok(())
        }
        Ok(None) => Ok(()),
        Err(err) => {
            if json_mode {
                emit_json(&json_error("command_failed", format!("{:#}", err), json!({})));
                std::process::exit(1);
            }
            Err(err)
        }
    }
}

fn run_command(command: Commands) -> Result<Option<Value>> {
    match command {
        Commands::Generate {
            test_names,
            out_dir,
            config,
            platform,
            host,
            env_values,
            manifest,
            json,
        } => {
            let mut suite_config = match &config {
                Some(path) => LoadSuiteConfig::load(path)?,
                None => LoadSuiteConfig::default(),
            };
            if host.is_some() {
                suite_config.host = host;
            }
            let platform = platform.map(Platform::from).unwrap_or_else(Platform::host);
            tracing::debug!(
                tests = test_names.len(),
                platform = platform.as_str(),
                out_dir = %out_dir.display(),
                "generating execution files"
            );
            let environment = suite_config.shared_environment();
            for (name, value) in parse_env_pairs(&env_values)? {
                environment.borrow_mut().insert(name, value);
            }

            let mut generated = Vec::new();
            for test_name in &test_names {
                let mut info = LoadTestInfo::new(
                    test_name.as_str(),
                    out_dir.join(test_name),
                    Rc::clone(&environment),
                    suite_config.clone(),
                );
                let artifacts = generate_execution_files(&mut info, platform)?;
                let manifest_path = if manifest {
                    Some(
                        info.source_files
                            .write_manifest(&info.source_directory, &info.test_name)?,
                    )
                } else {
                    None
                };
                if !json {
                    println!("{}: {}", test_name, artifacts.launcher.display());
                }
                generated.push(json!({
                    "test_name": info.test_name,
                    "build_id": info.build_id(),
                    "launcher": artifacts.launcher.display().to_string(),
                    "runner": artifacts.runner.display().to_string(),
                    "manifest": manifest_path.map(|p| p.display().to_string()),
                    "source_files": info
                        .source_files
                        .iter()
                        .map(|e| json!({"path": e.relative_path, "action": e.action}))
                        .collect::<Vec<_>>(),
                }));
            }
            if json {
                return Ok(Some(json!({
                    "ok": true,
                    "command": "generate",
                    "platform": platform.as_str(),
                    "tests": generated,
                })));
            }
            Ok(None)
        }
        Commands::Resolve {
            names,
            hint_paths,
            extension,
            first_match,
            json,
        } => {
            let policy = if first_match {
                ResolutionPolicy::FirstMatch
            } else {
                ResolutionPolicy::LastMatch
            };
            let resolver = HintPathResolver::new(hint_paths)
                .extension(extension)
                .policy(policy);
            let set = resolver.resolve_all(names.iter().map(String::as_str))?;
            if json {
                return Ok(Some(json!({
                    "ok": set.is_complete(),
                    "command": "resolve",
                    "resolved": set
                        .resolved
                        .iter()
                        .map(|a| json!({"name": a.name, "path": a.path.display().to_string(), "bytes": a.image.len()}))
                        .collect::<Vec<_>>(),
                    "missing": set.missing,
                })));
            }
            for assembly in &set.resolved {
                println!("{} -> {}", assembly.name, assembly.path.display());
            }
            for name in &set.missing {
                println!("{} -> not found", name);
            }
            if !set.is_complete() {
                return Err(anyhow!(
                    "{} assembly(ies) not found: {}",
                    set.missing.len(),
                    set.missing.join(", ")
                ));
            }
            Ok(None)
        }
    }
}

fn emit_json(value: &Value) {
    match serde_json::to_string(value) {
        Ok(s) => println!("{}", s),
        Err(_) => println!(
            "{{\"ok\":false,\"error\":{{\"code\":\"serialization_error\",\"message\":\"failed to serialize JSON payload\",\"details\":{{}}}}}}"
        ),
    }
}

fn json_error(code: &str, message: String, details: Value) -> Value {
    json!({
        "ok": false,
        "error": {
            "code": code,
            "message": message,
            "details": details
        }
    })
}

fn command_json_mode(command: &Commands) -> bool {
    match command {
        Commands::Generate { json, .. } | Commands::Resolve { json, .. } => *json,
    }
}

fn parse_env_pairs(values: &[String]) -> Result<Vec<(String, String)>> {
    let mut out = Vec::with_capacity(values.len());
    for raw in values {
        let (key, value) = raw
            .split_once('=')
            .ok_or_else(|| anyhow!("invalid --env '{}': expected NAME=VALUE", raw))?;
        if key.trim().is_empty() {
            return Err(anyhow!("invalid --env '{}': name cannot be empty", raw));
        }
        out.push((key.to_string(), value.to_string()));
    }
    Ok(out)
}
