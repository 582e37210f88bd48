use std::process;

use mygit::cli;

fn main() {
    cli::init_logging();
    cli::install_interrupt_handler("sync interrupted");

    let matches = cli::pull::cmd().get_matches();
    process::exit(cli::finish(cli::pull::run(&matches)));
}
