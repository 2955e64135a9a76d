use std::io;
use std::path::PathBuf;

use clap::Parser;

use scorch::score::load::{LoadState, Loader};
use scorch::score::report::{self, ReportOptions};
use scorch::score::Category;

#[derive(Debug, Parser)]
#[command(
    name = "scorch-summary",
    about = "Summarize a build score file: totals and the most expensive values per compile phase"
)]
struct Opt {
    /// Score file (.scor)
    infile: PathBuf,

    /// How many values to list per category
    #[arg(short = 'n', long, default_value_t = 10)]
    top: usize,

    /// Restrict the value tables to one category
    #[arg(short, long)]
    category: Option<Category>,

    /// Also decode the globals extension tables
    #[arg(short, long)]
    globals: bool,
}

fn main() -> io::Result<()> {
    env_logger::init();
    let opt = Opt::parse();

    let mut loader = Loader::new();
    loader.request_load(&opt.infile);
    if opt.globals {
        loader.hydrate_globals();
    }
    loader.wait_idle();

    match loader.state() {
        LoadState::NotFound => {
            eprintln!("no score data at {}", opt.infile.display());
            return Ok(());
        }
        LoadState::Failed => {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "score decode failed (run with RUST_LOG=error for details)",
            ));
        }
        LoadState::Loaded | LoadState::Unloaded => {}
    }

    let options = ReportOptions {
        top: opt.top,
        category: opt.category,
    };
    report::write_summary(loader.data(), &options, io::stdout().lock())
}
