use clap::{CommandFactory, Parser};

use secretsfs::Args;

fn main() {
    let args = Args::parse();

    if args.mountpoint.is_none() && !args.introspection() {
        Args::command()
            .error(
                clap::error::ErrorKind::MissingRequiredArgument,
                "a MOUNTPOINT is required unless a --print-* option is given",
            )
            .exit();
    }

    secretsfs::init_tracing(&args.log_level);

    if let Err(e) = secretsfs::run(args) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
