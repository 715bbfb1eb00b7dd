use std::path::Path;
use std::path::PathBuf;

use clap::Args;
use clap::ValueEnum;

use crate::domain::provider::NodeCapacity;
use crate::domain::provider::NodeConfig;
use crate::infrastructure::systemd::BusKind;

pub const DEFAULT_NODE_NAME: &str = "unitlet";
const HOSTNAME_FILE: &str = "/etc/hostname";
const KERNEL_RELEASE_FILE: &str = "/proc/sys/kernel/osrelease";

/// Provider settings shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct ProviderArgs {
    #[arg(
        long,
        global = true,
        help = "Directory holding generated unit files",
        env = "UNITLET_UNIT_DIR",
        value_hint = clap::ValueHint::DirPath,
        default_value = "/opt/unitlet/units"
    )]
    pub unit_dir: PathBuf,

    #[arg(
        long,
        global = true,
        help = "Node name reported in pod specs [default: host name]",
        env = "UNITLET_NODE_NAME"
    )]
    pub node_name: Option<String>,

    #[arg(
        long,
        global = true,
        help = "Talk to the per-user service manager instead of the system one"
    )]
    pub user_bus: bool,

    #[arg(
        long,
        global = true,
        help = "Deadline for the whole command in seconds",
        default_value_t = 30
    )]
    pub timeout_secs: u64,

    #[arg(
        long,
        global = true,
        help = "Log file or directory receiving a rolling copy of the logs",
        env = utils::logging::LOG_PATH_ENV_VAR,
        value_hint = clap::ValueHint::AnyPath
    )]
    pub log_path: Option<PathBuf>,

    #[arg(long, global = true, help = "Advertised CPU capacity", default_value = "20")]
    pub cpu: String,

    #[arg(long, global = true, help = "Advertised memory capacity", default_value = "100Gi")]
    pub memory: String,

    #[arg(long, global = true, help = "Advertised pod capacity", default_value = "20")]
    pub pods: String,
}

impl ProviderArgs {
    pub fn bus(&self) -> BusKind {
        if self.user_bus {
            BusKind::Session
        } else {
            BusKind::System
        }
    }

    pub fn node_name(&self) -> String {
        resolve_node_name(self.node_name.as_deref(), Path::new(HOSTNAME_FILE))
    }

    pub fn node_config(&self) -> NodeConfig {
        NodeConfig {
            capacity: NodeCapacity {
                cpu: self.cpu.clone(),
                memory: self.memory.clone(),
                pods: self.pods.clone(),
            },
            kernel_version: first_line(Path::new(KERNEL_RELEASE_FILE)).unwrap_or_default(),
            ..Default::default()
        }
    }
}

/// Explicit name, else the host name, else [`DEFAULT_NODE_NAME`].
pub fn resolve_node_name(explicit: Option<&str>, hostname_file: &Path) -> String {
    explicit
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .or_else(|| first_line(hostname_file))
        .unwrap_or_else(|| DEFAULT_NODE_NAME.to_string())
}

fn first_line(path: &Path) -> Option<String> {
    let content = std::fs::read_to_string(path).ok()?;
    let line = content.lines().next()?.trim();
    (!line.is_empty()).then(|| line.to_string())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    #[default]
    Yaml,
}

#[derive(Args, Debug, Clone)]
pub struct OutputArgs {
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Yaml)]
    pub output: OutputFormat,
}

#[derive(Args, Debug, Clone)]
pub struct ManifestArgs {
    #[arg(
        short = 'f',
        long = "filename",
        help = "Pod manifest (YAML or JSON)",
        value_hint = clap::ValueHint::FilePath
    )]
    pub file: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct PodRefArgs {
    #[arg(help = "Pod namespace")]
    pub namespace: String,

    #[arg(help = "Pod name")]
    pub name: String,

    #[command(flatten)]
    pub output: OutputArgs,
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;

    #[test]
    fn node_name_resolution_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        let hostname = dir.path().join("hostname");
        let missing = dir.path().join("missing");

        assert_eq!(resolve_node_name(Some("edge-1"), &missing), "edge-1");
        assert_eq!(resolve_node_name(None, &missing), DEFAULT_NODE_NAME);

        std::fs::write(&hostname, "box-7\n").expect("write");
        assert_eq!(resolve_node_name(None, &hostname), "box-7");
        assert_eq!(resolve_node_name(Some("  "), &hostname), "box-7");

        std::fs::write(&hostname, "\n").expect("write");
        assert_eq!(resolve_node_name(None, &hostname), DEFAULT_NODE_NAME);
    }
}
