use anyhow::{Context, Result};
use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};
use rosebud::build::{build_site, unindexed, Options};
use rosebud::config::Config;
use rosebud::watch::serve;
use tracing::level_filters::LevelFilter;
use tracing::{error, info};

fn main() {
    let from_scratch = Arg::with_name("from-scratch")
        .long("from-scratch")
        .help("Deletes the output directory and rebuilds every item");
    let matches = App::new("rosebud")
        .version(env!("CARGO_PKG_VERSION"))
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .multiple(true)
                .global(true)
                .help("Logs more (-v for debug, -vv for trace)"),
        )
        .subcommand(
            SubCommand::with_name("build")
                .about("Builds the site into the output directory")
                .arg(from_scratch.clone()),
        )
        .subcommand(
            SubCommand::with_name("serve")
                .about("Builds and serves the site, rebuilding on changes")
                .arg(from_scratch),
        )
        .subcommand(
            SubCommand::with_name("unindexed")
                .about("Lists the items which aren't part of the index"),
        )
        .get_matches();

    setup_logging(matches.occurrences_of("verbose"));

    if let Err(e) = run(&matches) {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

fn run(matches: &ArgMatches) -> Result<()> {
    let cwd = std::env::current_dir().context("Getting the working directory")?;
    let config = Config::from_directory(&cwd)?;

    match matches.subcommand() {
        ("build", Some(matches)) => {
            let options = options(matches);
            let summary = build_site(&config, &options)?;
            info!(
                "built {} of {} items into '{}'",
                summary.built,
                summary.items,
                config.output_directory.display()
            );
            Ok(())
        }
        ("serve", Some(matches)) => serve(&config, &options(matches)),
        ("unindexed", Some(_)) => {
            for item in unindexed(&config)? {
                println!("{}\t{}", item.location.display(), item.title);
            }
            Ok(())
        }
        _ => unreachable!("clap requires a subcommand"),
    }
}

fn options(matches: &ArgMatches) -> Options {
    Options {
        from_scratch: matches.is_present("from-scratch"),
    }
}

fn setup_logging(verbosity: u64) {
    let filter = match verbosity {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(filter)
        .with_target(false)
        .init();
}
