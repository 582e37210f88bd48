use std::process;

use mygit::cli;

fn main() {
    cli::init_logging();
    cli::install_interrupt_handler("push interrupted");

    let matches = cli::push::cmd().get_matches();
    process::exit(cli::finish(cli::push::run(&matches)));
}
