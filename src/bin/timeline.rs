use std::io;
use std::path::PathBuf;

use clap::Parser;

use scorch::score::load::{LoadState, Loader};
use scorch::score::{report, timeline};

#[derive(Debug, Parser)]
#[command(
    name = "scorch-timeline",
    about = "Print the reconstructed execution timeline of one compiled unit"
)]
struct Opt {
    /// Score file (.scor); timeline files are located next to it
    infile: PathBuf,

    /// Unit to print, by recorded name or by index
    unit: String,
}

fn main() -> io::Result<()> {
    env_logger::init();
    let opt = Opt::parse();

    let mut loader = Loader::new();
    loader.request_load(&opt.infile);
    loader.wait_idle();

    if loader.state() != LoadState::Loaded {
        eprintln!("no usable score data at {}", opt.infile.display());
        return Ok(());
    }

    let data = loader.data();
    let unit_index = match opt.unit.parse::<u32>() {
        Ok(index) if data.unit(index).is_some() => index,
        _ => match data.unit_by_name(&opt.unit) {
            Some(unit) => unit.index,
            None => {
                return Err(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("no unit named {:?} in this score", opt.unit),
                ));
            }
        },
    };

    match timeline::load(&opt.infile, data, unit_index)? {
        Some(timeline) => report::write_timeline(&timeline, io::stdout().lock()),
        None => {
            eprintln!("no timeline data for unit {}", unit_index);
            Ok(())
        }
    }
}
