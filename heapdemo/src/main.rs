extern crate bestfit;
extern crate clap;
extern crate env_logger;
extern crate log;

use std::io;
use std::process;

use clap::{value_parser, Arg, ArgMatches, Command};

use bestfit::{constants, Heap, HeapConfig};

mod error;
mod gctest;
mod memtest;

use crate::error::DemoError;

/// Default object count for the collector workloads
const DEFAULT_OBJECTS: usize = 10;

fn objects_arg() -> Arg {
    Arg::new("objects")
        .help("Number of objects to allocate")
        .value_parser(value_parser!(usize))
        .index(1)
}

/// Dispatch the selected workload against stdout
fn run(matches: &ArgMatches) -> Result<(), DemoError> {
    let region_size = matches
        .get_one::<usize>("heap-size")
        .copied()
        .unwrap_or(constants::DEFAULT_REGION_SIZE);
    let config = HeapConfig::default().with_region_size(region_size);

    log::info!("Heap region size {} bytes", region_size);

    let stdout = io::stdout();
    let mut out = stdout.lock();

    match matches.subcommand() {
        Some(("memtest", _)) => {
            let mut heap = Heap::with_config(config);
            memtest::run(&mut heap, &mut out)
        }

        Some(("gctest", sub)) => {
            let objects = sub.get_one::<usize>("objects").copied().unwrap_or(DEFAULT_OBJECTS);
            gctest::run_list(config, objects, &mut out)
        }

        Some(("gcarray", sub)) => {
            let objects = sub.get_one::<usize>("objects").copied().unwrap_or(DEFAULT_OBJECTS);
            gctest::run_array(config, objects, &mut out)
        }

        _ => Ok(()),
    }
}

fn main() {
    env_logger::init();

    // parse command line arguments, a workload and an optional heap size
    let matches = Command::new("heapdemo")
        .about("Exercise the best-fit heap and its collector")
        .arg(
            Arg::new("heap-size")
                .long("heap-size")
                .value_name("BYTES")
                .help("Size of the heap region to reserve")
                .value_parser(value_parser!(usize)),
        )
        .subcommand_required(true)
        .subcommand(Command::new("memtest").about("Allocate, resize and free raw blocks"))
        .subcommand(
            Command::new("gctest")
                .about("Collect a linked list as it is cut apart")
                .arg(objects_arg()),
        )
        .subcommand(
            Command::new("gcarray")
                .about("Collect an array of pointers to integers")
                .arg(objects_arg()),
        )
        .get_matches();

    run(&matches).unwrap_or_else(|err| {
        eprintln!("Terminated: {}", err);
        process::exit(1);
    });
}
