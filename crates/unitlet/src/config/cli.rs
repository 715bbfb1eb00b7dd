use clap::Parser;
use clap::Subcommand;
use utils::version;

use crate::config::provider::ManifestArgs;
use crate::config::provider::OutputArgs;
use crate::config::provider::PodRefArgs;
use crate::config::provider::ProviderArgs;

#[derive(Parser)]
#[command(about, long_about, version = &**version::VERSION)]
pub struct Cli {
    #[command(flatten)]
    pub provider: ProviderArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Provision and start the units of a pod
    Create(ManifestArgs),
    /// Stop and unload the units of a pod
    Delete(ManifestArgs),
    /// Show a pod rebuilt from its units
    Get(PodRefArgs),
    /// Show the status of a pod
    Status(PodRefArgs),
    /// List every pod managed on this host
    List(OutputArgs),
    /// Show the node object this host advertises
    Node(OutputArgs),
}
