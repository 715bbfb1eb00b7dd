use anyhow::Result;
use clap::Parser;
use unitlet::cmd;
use unitlet::config::Cli;
use utils::version;

/// Sets up global panic hooks.
fn setup_global_hooks() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        default_hook(panic_info);
        tracing::error!("Thread panicked: {}", panic_info);
    }));
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_global_hooks();

    let cli = Cli::parse();
    let _guard = utils::logging::init(cli.provider.log_path.clone());

    tracing::debug!("unitlet {}", &**version::VERSION);

    cmd::run(cli)
        .await
        .map_err(|report| anyhow::anyhow!("{report:?}"))
}
