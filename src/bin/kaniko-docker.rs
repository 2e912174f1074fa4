use clap::Parser;
use kaniko_plugin::commands::{docker::DockerCommand, load_env_file, PluginCommand};
use kaniko_plugin_process::{logging::Logger, signal_handler};
use log::LevelFilter;

fn main() {
    if let Err(e) = load_env_file() {
        eprintln!("{e:?}");
        std::process::exit(1);
    }

    let mut command = DockerCommand::parse();

    Logger::new()
        .filter_level(command.log.verbosity.log_level_filter())
        .filter_modules([("reqwest", LevelFilter::Info), ("rustls", LevelFilter::Info)])
        .log_out_dir(command.log.log_dir.as_ref())
        .init();

    log::trace!("Parsed arguments: {command:#?}");

    signal_handler::init(move || command.run());
}
