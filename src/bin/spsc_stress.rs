use clap::Parser;
use color_eyre::eyre::{bail, Result};
use colored::Colorize;

use std::time::{Duration, Instant};

use spsc_data::stress::{self, Params, StressConfig, DEFAULT_ITERATIONS};
use spsc_data::sync::store::SpscData;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Iterations run by each of the two threads.
    #[arg(short, long, default_value_t = DEFAULT_ITERATIONS)]
    iterations: usize,
    /// Microseconds the writer sleeps between commits.
    #[arg(long, default_value_t = 1)]
    writer_pause_us: u64,
    /// Microseconds the reader sleeps between polls.
    #[arg(long, default_value_t = 1)]
    reader_pause_us: u64,
    #[arg(long)]
    skip_single_thread: bool,
}

impl From<&Args> for StressConfig {
    fn from(args: &Args) -> Self {
        StressConfig {
            iterations: args.iterations,
            writer_pause: Duration::from_micros(args.writer_pause_us),
            reader_pause: Duration::from_micros(args.reader_pause_us),
        }
    }
}

fn main() -> Result<()> {
    color_eyre::install()?;
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let start = Instant::now();
    println!("{}", ">> test started".bold());

    if !args.skip_single_thread {
        println!("{}", ">> testing single thread".bold());
        stress::single_thread_exclusivity(&SpscData::<Params>::new())?;
        println!("   {}", "ok".green());
    }

    println!("{}", ">> testing multiple threads".bold());
    let report = stress::run(&StressConfig::from(&args))?;

    println!("   writes:      {} ({} denied)", report.writes, report.write_denied);
    println!(
        "   reads:       {} ({} stale, {} denied)",
        report.reads, report.stale_polls, report.read_denied
    );
    println!("   last value:  {}", report.last_counter);
    println!("   run time:    {:?}", report.elapsed);

    if !report.is_clean() {
        println!("   {}", format!("{} violations", report.violations).red());
        bail!("consumer observed {} stale or repeated values", report.violations);
    }
    println!("   {}", "ok".green());

    println!("test took {} us", start.elapsed().as_micros());
    Ok(())
}
