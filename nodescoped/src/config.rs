//! Daemon configuration: defaults, an optional TOML file, environment
//! variables and command-line flags, applied in that order of increasing
//! precedence.

use std::path::PathBuf;

use serde::Deserialize;

/// Settings controlling how `nodescoped` binds, persists its session
/// artifacts and logs. `port = 0` asks the OS for an ephemeral port, same
/// as leaving the original daemon's `QV_PORT` unset.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub port: u16,
    pub tmpdir: PathBuf,
    pub no_daemonize: bool,
    pub bind_address: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            port: 0,
            tmpdir: std::env::temp_dir(),
            no_daemonize: false,
            bind_address: "127.0.0.1".to_string(),
        }
    }
}

impl DaemonConfig {
    /// Starts from defaults, folds in `path` (a TOML file) if given and
    /// present, then environment variables, then explicit CLI flags.
    pub fn load(path: Option<&std::path::Path>, cli: CliOverrides) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(p) if p.exists() => {
                let text = std::fs::read_to_string(p)?;
                toml::from_str(&text)?
            }
            _ => DaemonConfig::default(),
        };

        if let Ok(port) = std::env::var("NODESCOPE_PORT") {
            config.port = port.parse()?;
        }
        if let Ok(dir) = std::env::var("NODESCOPE_TMPDIR") {
            config.tmpdir = PathBuf::from(dir);
        }

        if let Some(port) = cli.port {
            config.port = port;
        }
        if let Some(no_daemonize) = cli.no_daemonize {
            config.no_daemonize = no_daemonize;
        }

        Ok(config)
    }

    /// The session directory's marker file advertising a reachable port:
    /// `<tmpdir>/nodescoped.<port>`.
    pub fn port_marker_path(&self, port: u16) -> PathBuf {
        self.tmpdir.join(format!("nodescoped.{port}"))
    }

    pub fn hwtopo_path(&self, pid: u32) -> PathBuf {
        self.tmpdir.join(format!("hwtopo.{pid}.xml"))
    }
}

/// Flags parsed off the command line; each overrides the config file and
/// environment when present.
#[derive(Debug, Default)]
pub struct CliOverrides {
    pub port: Option<u16>,
    pub no_daemonize: Option<bool>,
    pub config_path: Option<PathBuf>,
}

impl CliOverrides {
    pub fn parse(args: impl Iterator<Item = String>) -> anyhow::Result<Self> {
        let mut overrides = CliOverrides::default();
        let mut args = args.peekable();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--port" => {
                    let v = args.next().ok_or_else(|| anyhow::anyhow!("--port needs a value"))?;
                    overrides.port = Some(v.parse()?);
                }
                "--no-daemonize" => overrides.no_daemonize = Some(true),
                "--config" => {
                    let v = args.next().ok_or_else(|| anyhow::anyhow!("--config needs a value"))?;
                    overrides.config_path = Some(PathBuf::from(v));
                }
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                other if other.starts_with("--port=") => {
                    overrides.port = Some(other["--port=".len()..].parse()?);
                }
                other => {
                    anyhow::bail!("unrecognized argument: {other}");
                }
            }
        }
        Ok(overrides)
    }
}

fn print_usage() {
    println!(
        "usage: nodescoped [--port <u16>] [--no-daemonize] [--config <path>]\n\n\
         --port           listen on this TCP port (0, the default, picks an ephemeral one)\n\
         --no-daemonize   stay attached to the controlling terminal\n\
         --config <path>  read a TOML file with the same fields before env/CLI overrides"
    );
}
