use std::path::{Path, PathBuf};
use std::process;

use anyhow::{Context, bail};
use evrbridge::{
    BRIDGE_VERSION, BridgeConfig, HelperBridge, HelperCommand, PYTHON_CANDIDATES,
    ProbingResolver, VersionSpec,
};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const HELPER_ENV: &str = "EVRBRIDGE_HELPER";

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Compare {
        v1: String,
        v2: String,
    },
    Query {
        action: String,
        provides: String,
        version: Option<String>,
        arch: Option<String>,
    },
    FlushCache,
    Version,
}

#[derive(Debug, PartialEq, Eq)]
struct Args {
    helper: Option<PathBuf>,
    python: Option<PathBuf>,
    command: Command,
}

fn main() {
    let args: Vec<String> = std::env::args().collect();

    let args = match parse_args(&args) {
        Ok(v) => v,
        Err(msg) => {
            if !msg.is_empty() {
                eprintln!("error: {msg}");
                eprintln!();
            }
            print_usage();
            process::exit(2);
        }
    };

    if args.command == Command::Version {
        println!("evrbridge {BRIDGE_VERSION}");
        return;
    }

    init_tracing();

    if let Err(e) = run(args) {
        eprintln!("error: {e:#}");
        process::exit(1);
    }
}

fn print_usage() {
    eprintln!("Usage: evrbridge [--helper <script>] [--python <interpreter>] <command>");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  compare <v1> <v2>                               Three-way version comparison");
    eprintln!("  query <action> <provides> [<version>] [<arch>]  Look up a package");
    eprintln!("  flushcache                                      Drop the helper's cached metadata");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --helper <script>       Helper script [default: ${HELPER_ENV}]");
    eprintln!("  --python <interpreter>  Interpreter for the helper [default: probe PATH]");
    eprintln!("  --version               Print version and exit");
}

fn parse_args(args: &[String]) -> Result<Args, String> {
    let mut helper: Option<PathBuf> = None;
    let mut python: Option<PathBuf> = None;
    let mut positional: Vec<String> = Vec::new();

    let mut i = 1; // skip argv[0]
    while i < args.len() {
        match args[i].as_str() {
            "--helper" => {
                i += 1;
                helper = Some(PathBuf::from(args.get(i).ok_or("--helper requires a value")?));
            }
            "--python" => {
                i += 1;
                python = Some(PathBuf::from(args.get(i).ok_or("--python requires a value")?));
            }
            "--version" | "-V" => {
                return Ok(Args {
                    helper,
                    python,
                    command: Command::Version,
                });
            }
            "--help" | "-h" => return Err("".to_string()),
            arg if arg.starts_with("--") => return Err(format!("unknown flag: {arg}")),
            arg => positional.push(arg.to_string()),
        }
        i += 1;
    }

    let (name, rest) = positional
        .split_first()
        .ok_or("missing required argument: <command>")?;

    let command = match (name.as_str(), rest) {
        ("compare", [v1, v2]) => Command::Compare {
            v1: v1.clone(),
            v2: v2.clone(),
        },
        ("compare", _) => return Err("compare takes exactly two versions".to_string()),
        ("query", [action, provides, extra @ ..]) if extra.len() <= 2 => Command::Query {
            action: action.clone(),
            provides: provides.clone(),
            version: extra.first().cloned(),
            arch: extra.get(1).cloned(),
        },
        ("query", _) => {
            return Err("query takes <action> <provides> [<version>] [<arch>]".to_string());
        }
        ("flushcache", []) => Command::FlushCache,
        ("flushcache", _) => return Err("flushcache takes no arguments".to_string()),
        (other, _) => return Err(format!("unknown command: {other}")),
    };

    Ok(Args {
        helper,
        python,
        command,
    })
}

fn init_tracing() {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match std::env::var("EVRBRIDGE_LOG").as_deref() {
            Ok("trace") => "trace",
            Ok("debug") => "debug",
            Ok("info") => "info",
            Ok("error") => "error",
            _ => "warn",
        };
        EnvFilter::new(format!("evrbridge={level}"))
    };

    let use_json = std::env::var("LOG_FORMAT").as_deref() == Ok("json");

    if use_json {
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr));
        let _ = subscriber.try_init();
    } else {
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr));
        let _ = subscriber.try_init();
    }
}

fn run(args: Args) -> anyhow::Result<()> {
    let Args {
        helper,
        python,
        command,
    } = args;

    let script = match helper {
        Some(path) => path,
        None => match std::env::var_os(HELPER_ENV) {
            Some(path) => PathBuf::from(path),
            None => bail!("no helper script given: pass --helper or set {HELPER_ENV}"),
        },
    };

    let rt = tokio::runtime::Runtime::new().context("failed to start async runtime")?;
    rt.block_on(async {
        let helper = helper_command(python, &script).await?;
        tracing::debug!(program = %helper.program.display(), script = %script.display(), "Using helper");

        let bridge = HelperBridge::new(BridgeConfig::from_env(helper));
        let output = execute(&bridge, command).await;
        bridge.shutdown().await;

        println!("{}", output?);
        Ok(())
    })
}

async fn helper_command(python: Option<PathBuf>, script: &Path) -> anyhow::Result<HelperCommand> {
    match python {
        Some(interpreter) => Ok(HelperCommand::new(interpreter).arg(script)),
        None => HelperCommand::resolve(&ProbingResolver::python(), PYTHON_CANDIDATES, script)
            .await
            .context("failed to find an interpreter for the helper"),
    }
}

async fn execute(bridge: &HelperBridge, command: Command) -> anyhow::Result<String> {
    match command {
        Command::Compare { v1, v2 } => {
            let ordering = bridge
                .compare_versions(&v1, &v2)
                .await
                .with_context(|| format!("comparing {v1} with {v2}"))?;
            Ok(ordering.to_string())
        }
        Command::Query {
            action,
            provides,
            version,
            arch,
        } => {
            let spec = bridge
                .query(action.as_str(), &provides, version.as_deref(), arch.as_deref())
                .await
                .with_context(|| format!("{action} query for {provides}"))?;
            Ok(format_spec(spec.as_ref()))
        }
        Command::FlushCache => {
            bridge.flush_cache().await.context("flushing helper cache")?;
            Ok("ok".to_string())
        }
        Command::Version => Ok(BRIDGE_VERSION.to_string()),
    }
}

/// `epoch version release` with absent fields as `nil`, the helper's own form.
fn format_spec(spec: Option<&VersionSpec>) -> String {
    let Some(spec) = spec else {
        return "no match".to_string();
    };
    [&spec.epoch, &spec.version, &spec.release]
        .iter()
        .map(|field| field.as_deref().unwrap_or("nil"))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(args: &[&str]) -> Vec<String> {
        std::iter::once("evrbridge")
            .chain(args.iter().copied())
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn parses_compare_with_options() {
        let args = parse_args(&argv(&[
            "--helper",
            "/opt/helper.py",
            "--python",
            "/usr/bin/python2",
            "compare",
            "1.0-1",
            "1.0-2",
        ]))
        .unwrap();

        assert_eq!(args.helper, Some(PathBuf::from("/opt/helper.py")));
        assert_eq!(args.python, Some(PathBuf::from("/usr/bin/python2")));
        assert_eq!(
            args.command,
            Command::Compare {
                v1: "1.0-1".to_string(),
                v2: "1.0-2".to_string()
            }
        );
    }

    #[test]
    fn parses_query_with_optional_fields() {
        let args = parse_args(&argv(&["query", "whatavailable", "foo"])).unwrap();
        assert_eq!(
            args.command,
            Command::Query {
                action: "whatavailable".to_string(),
                provides: "foo".to_string(),
                version: None,
                arch: None,
            }
        );

        let args =
            parse_args(&argv(&["query", "whatinstalled", "foo", "1:2.0-3", "noarch"])).unwrap();
        assert_eq!(
            args.command,
            Command::Query {
                action: "whatinstalled".to_string(),
                provides: "foo".to_string(),
                version: Some("1:2.0-3".to_string()),
                arch: Some("noarch".to_string()),
            }
        );
    }

    #[test]
    fn versions_starting_with_dash_are_positional() {
        let args = parse_args(&argv(&["compare", "-1", "2"])).unwrap();
        assert_eq!(
            args.command,
            Command::Compare {
                v1: "-1".to_string(),
                v2: "2".to_string()
            }
        );
    }

    #[test]
    fn rejects_bad_usage() {
        assert_eq!(
            parse_args(&argv(&[])).unwrap_err(),
            "missing required argument: <command>"
        );
        assert!(parse_args(&argv(&["compare", "1"])).is_err());
        assert!(parse_args(&argv(&["query", "whatavailable"])).is_err());
        assert!(parse_args(&argv(&["query", "a", "b", "c", "d", "e"])).is_err());
        assert!(parse_args(&argv(&["flushcache", "now"])).is_err());
        assert_eq!(
            parse_args(&argv(&["frobnicate"])).unwrap_err(),
            "unknown command: frobnicate"
        );
        assert_eq!(
            parse_args(&argv(&["--verbose", "flushcache"])).unwrap_err(),
            "unknown flag: --verbose"
        );
        assert_eq!(
            parse_args(&argv(&["--helper"])).unwrap_err(),
            "--helper requires a value"
        );
        assert_eq!(parse_args(&argv(&["-h"])).unwrap_err(), "");
    }

    #[test]
    fn version_short_circuits() {
        let args = parse_args(&argv(&["--version", "bogus"])).unwrap();
        assert_eq!(args.command, Command::Version);
    }

    #[test]
    fn formats_specs_like_the_helper() {
        assert_eq!(format_spec(None), "no match");
        assert_eq!(
            format_spec(Some(&VersionSpec::new(
                None,
                Some("1.0".to_string()),
                None
            ))),
            "nil 1.0 nil"
        );
        assert_eq!(format_spec(Some(&VersionSpec::parse("2:1.2-3"))), "2 1.2 3");
    }
}
