use std::process;

use anyhow::{Context, bail};
use cpbridge::{
    Axis, BridgeClient, CPBRIDGE_VERSION, CleanFlags, ClientConfig, FeatureDescriptor, ImageSet,
    ImageTensor,
};
use indexmap::IndexMap;
use serde::Serialize;
use tokio::io::AsyncReadExt;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const AXIS_LABELS: [&str; 5] = ["X", "Y", "Z", "Time", "Channel"];

#[derive(Debug)]
enum Command {
    Info,
    Clean { remove: Vec<String> },
    Run { shape: Vec<usize> },
}

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().collect();

    let (address, command) = match parse_args(&args) {
        Ok(v) => v,
        Err(msg) => {
            if !msg.is_empty() {
                eprintln!("error: {msg}");
                eprintln!();
            }
            eprintln!("cpbridge {CPBRIDGE_VERSION}");
            eprintln!();
            eprintln!("Usage: cpbridge <address> <command> < pipeline.cppipe");
            eprintln!();
            eprintln!("Arguments:");
            eprintln!("  <address>    Worker address: tcp://host:port or host:port");
            eprintln!();
            eprintln!("Commands:");
            eprintln!("  info                        Print channels, groups and features");
            eprintln!("  clean [--remove <what>]...  Print the pipeline without those modules");
            eprintln!("                              (database, spreadsheet, exports,");
            eprintln!("                              save-images, all, or a module name)");
            eprintln!("                              [default: all]");
            eprintln!("  run --shape <X>x<Y>[x...]   Run one cycle on blank images");
            eprintln!("                              and print row counts");
            process::exit(2);
        }
    };

    init_tracing();

    if let Err(e) = run(&address, command).await {
        eprintln!("error: {e:#}");
        process::exit(1);
    }
}

fn init_tracing() {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match std::env::var("CPBRIDGE_LOG").as_deref() {
            Ok("trace") => "trace",
            Ok("debug") => "debug",
            Ok("info") => "info",
            Ok("error") => "error",
            _ => "warn",
        };
        EnvFilter::new(format!("cpbridge={level}"))
    };

    let registry = tracing_subscriber::registry().with(filter);
    let _ = if std::env::var("LOG_FORMAT").as_deref() == Ok("json") {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .try_init()
    };
}

fn parse_args(args: &[String]) -> Result<(String, Command), String> {
    let mut positional: Vec<&str> = Vec::new();
    let mut remove = Vec::new();
    let mut shape: Option<Vec<usize>> = None;

    let mut i = 1; // skip argv[0]
    while i < args.len() {
        match args[i].as_str() {
            "--remove" => {
                i += 1;
                remove.push(args.get(i).ok_or("--remove requires a value")?.clone());
            }
            "--shape" => {
                i += 1;
                let value = args.get(i).ok_or("--shape requires a value")?;
                shape = Some(parse_shape(value)?);
            }
            "--help" | "-h" => return Err(String::new()),
            arg if arg.starts_with('-') => return Err(format!("unknown flag: {arg}")),
            arg => positional.push(arg),
        }
        i += 1;
    }

    let [address, command] = positional[..] else {
        return Err("expected <address> <command>".to_string());
    };
    let command = match command {
        "info" => Command::Info,
        "clean" => Command::Clean { remove },
        "run" => Command::Run {
            shape: shape.ok_or("run requires --shape")?,
        },
        other => return Err(format!("unknown command: {other}")),
    };
    Ok((address.to_string(), command))
}

fn parse_shape(value: &str) -> Result<Vec<usize>, String> {
    let dims = value
        .split('x')
        .map(|d| match d.parse::<usize>() {
            Ok(n) if n > 0 => Ok(n),
            _ => Err(format!("invalid dimension '{d}' in shape '{value}'")),
        })
        .collect::<Result<Vec<_>, _>>()?;
    if dims.len() < 2 || dims.len() > AXIS_LABELS.len() {
        return Err(format!(
            "shape '{value}' must have 2 to {} dimensions",
            AXIS_LABELS.len()
        ));
    }
    Ok(dims)
}

/// Category names accepted by `--remove`; anything else is a module name.
fn clean_flag(name: &str) -> Option<CleanFlags> {
    match name {
        "database" => Some(CleanFlags::EXPORT_TO_DATABASE),
        "spreadsheet" => Some(CleanFlags::EXPORT_TO_SPREADSHEET),
        "exports" => Some(CleanFlags::EXPORT_MODULES),
        "save-images" => Some(CleanFlags::SAVE_IMAGES),
        "all" => Some(CleanFlags::ALL),
        _ => None,
    }
}

fn modules_to_remove(remove: &[String]) -> Vec<String> {
    if remove.is_empty() {
        return CleanFlags::ALL.module_names();
    }
    let mut flags = CleanFlags::NONE;
    let mut modules = Vec::new();
    for item in remove {
        match clean_flag(item) {
            Some(flag) => flags |= flag,
            None => modules.push(item.clone()),
        }
    }
    let mut names = flags.module_names();
    for module in modules {
        if !names.contains(&module) {
            names.push(module);
        }
    }
    names
}

#[derive(Serialize)]
struct InfoOutput<'a> {
    channels: &'a [String],
    groups: &'a [String],
    features: Vec<FeatureDescriptor>,
}

async fn run(address: &str, command: Command) -> anyhow::Result<()> {
    let mut pipeline = String::new();
    tokio::io::stdin()
        .read_to_string(&mut pipeline)
        .await
        .context("failed to read pipeline from stdin")?;
    if pipeline.trim().is_empty() {
        bail!("no pipeline text on stdin");
    }

    let mut client = BridgeClient::connect(address, ClientConfig::default())
        .await
        .with_context(|| format!("failed to connect to {address}"))?;

    let result = execute(&mut client, &pipeline, command).await;
    finish(result, client.disconnect().await)
}

/// The command's own fault wins over a failed disconnect.
fn finish(result: anyhow::Result<()>, disconnect: cpbridge::Result<()>) -> anyhow::Result<()> {
    result?;
    disconnect.context("failed to disconnect from worker")
}

async fn execute(
    client: &mut BridgeClient,
    pipeline: &str,
    command: Command,
) -> anyhow::Result<()> {
    match command {
        Command::Info => {
            client.load_pipeline(pipeline).await?;
            let output = InfoOutput {
                channels: client.input_channels(),
                groups: client.result_groups(),
                features: client.sorted_features(),
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Command::Clean { remove } => {
            let cleaned = client.clean(pipeline, &modules_to_remove(&remove)).await?;
            print!("{cleaned}");
        }
        Command::Run { shape } => {
            let channels = client.load_pipeline(pipeline).await?.channels().to_vec();
            let axes: Vec<Axis> = AXIS_LABELS
                .iter()
                .zip(&shape)
                .map(|(label, len)| Axis::new(*label, *len))
                .collect();
            let mut images = ImageSet::new();
            for channel in channels {
                images.insert(channel, ImageTensor::zeros(axes.clone())?);
            }

            let groups = client.result_groups().to_vec();
            let bundle = client.run(&images).await?;
            tracing::debug!(groups = ?bundle.groups(), "Run finished");
            let counts: IndexMap<&str, Option<usize>> = groups
                .iter()
                .map(|group| (group.as_str(), bundle.row_count(Some(group))))
                .collect();
            println!("{}", serde_json::to_string_pretty(&counts)?);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(parts: &[&str]) -> Vec<String> {
        std::iter::once("cpbridge")
            .chain(parts.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn parses_commands() {
        let (address, command) = parse_args(&args(&["tcp://localhost:8086", "info"])).unwrap();
        assert_eq!(address, "tcp://localhost:8086");
        assert!(matches!(command, Command::Info));

        let (_, command) =
            parse_args(&args(&["host:1", "run", "--shape", "64x32x4"])).unwrap();
        assert!(matches!(command, Command::Run { ref shape } if shape == &[64, 32, 4]));

        let (_, command) = parse_args(&args(&[
            "host:1",
            "clean",
            "--remove",
            "exports",
            "--remove",
            "MeasureTexture",
        ]))
        .unwrap();
        assert!(matches!(command, Command::Clean { ref remove } if remove.len() == 2));
    }

    #[test]
    fn rejects_bad_arguments() {
        assert!(parse_args(&args(&[])).is_err());
        assert!(parse_args(&args(&["host:1"])).is_err());
        assert!(parse_args(&args(&["host:1", "explode"])).is_err());
        assert!(parse_args(&args(&["host:1", "run"])).is_err());
        assert!(parse_args(&args(&["host:1", "run", "--shape", "64"])).is_err());
        assert!(parse_args(&args(&["host:1", "run", "--shape", "64x0"])).is_err());
        assert!(parse_args(&args(&["host:1", "info", "--verbose"])).is_err());
        assert_eq!(parse_args(&args(&["--help"])).unwrap_err(), "");
    }

    #[test]
    fn command_fault_outranks_disconnect_fault() {
        let err = finish(
            Err(anyhow::anyhow!("pipeline error: bad module")),
            Err(cpbridge::BridgeError::ConnectionClosed),
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "pipeline error: bad module");

        let err = finish(Ok(()), Err(cpbridge::BridgeError::ConnectionClosed)).unwrap_err();
        assert_eq!(err.to_string(), "failed to disconnect from worker");

        assert!(finish(Ok(()), Ok(())).is_ok());
    }

    #[test]
    fn remove_mixes_categories_and_modules() {
        assert_eq!(
            modules_to_remove(&[]),
            ["ExportToDatabase", "ExportToSpreadsheet", "SaveImages"]
        );
        assert_eq!(
            modules_to_remove(&["save-images".into(), "MeasureTexture".into()]),
            ["SaveImages", "MeasureTexture"]
        );
        assert_eq!(
            modules_to_remove(&["database".into(), "ExportToDatabase".into()]),
            ["ExportToDatabase"]
        );
    }
}
