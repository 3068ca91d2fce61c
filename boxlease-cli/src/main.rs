mod cli;
mod commands;
mod config;
mod formatter;

use boxlease::BoxleaseError;
use boxlease::shim::ShimArgs;
use boxlease_shared::constants::shim as shim_const;
use clap::{CommandFactory, Parser};
use cli::{Cli, Commands};
use tracing_subscriber::EnvFilter;

fn main() {
    // The supervisor entry point has its own flags (including `--home`), so it
    // is dispatched before the user-facing parser sees the arguments.
    let argv: Vec<String> = std::env::args().collect();
    if argv.get(1).map(String::as_str) == Some(shim_const::SUBCOMMAND) {
        std::process::exit(run_shim(&argv[2..]));
    }

    let cli = Cli::parse();
    init_logging(cli.global.debug);

    let code = match dispatch(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            e.downcast_ref::<BoxleaseError>()
                .map(BoxleaseError::exit_code)
                .unwrap_or(1)
        }
    };
    std::process::exit(code);
}

fn dispatch(cli: Cli) -> anyhow::Result<i32> {
    let global = cli.global;
    match cli.command {
        Commands::Create(args) => commands::create::execute(args, &global).map(|_| 0),
        Commands::Run(args) => commands::run::execute(args, &global),
        Commands::Exec(args) => commands::exec::execute(args, &global),
        Commands::Start(args) => commands::start::execute(args, &global).map(|_| 0),
        Commands::Stop(args) => commands::stop::execute(args, &global).map(|_| 0),
        Commands::Restart(args) => commands::restart::execute(args, &global).map(|_| 0),
        Commands::Rm(args) => commands::rm::execute(args, &global).map(|_| 0),
        Commands::List(args) => commands::list::execute(args, &global).map(|_| 0),
        Commands::Info(args) => commands::info::execute(args, &global).map(|_| 0),
        Commands::Metrics(args) => commands::metrics::execute(args, &global).map(|_| 0),
        Commands::Completion(args) => {
            let mut cmd = Cli::command();
            cli::generate_completion(
                &args.shell,
                &mut cmd,
                "boxlease",
                &mut std::io::stdout(),
            );
            Ok(0)
        }
    }
}

fn init_logging(debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn run_shim(args: &[String]) -> i32 {
    let args = ShimArgs::parse_from(
        std::iter::once(shim_const::BINARY_NAME.to_string()).chain(args.iter().cloned()),
    );

    let rt = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: failed to build supervisor runtime: {}", e);
            return 1;
        }
    };

    match rt.block_on(boxlease::shim::run(args)) {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}
