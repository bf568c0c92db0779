//! Two-thread stress run over a [`SpscData`].
//!
//! A producer commits records with an increasing counter while a consumer
//! polls. Every fresh value the consumer sees must differ from the previous
//! one and carry a strictly larger counter; anything else is counted as a
//! violation.
use std::sync::Barrier;
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use color_eyre::eyre::{ensure, eyre, Result};
use log::{debug, info, warn};
use random_number::random;

use crate::sync::store::SpscData;

pub const DEFAULT_ITERATIONS: usize = 100_000;
pub const DEFAULT_PAUSE: Duration = Duration::from_micros(1);

/// Payload passed through the store during a run.
#[derive(Default, Clone, Copy, Debug, PartialEq)]
pub struct Params {
    pub fvalue: f32,
    pub timestamp: i64,
    pub counter: i64,
}

impl Params {
    pub fn update(&mut self, counter: i64) {
        let raw: u32 = random!();
        self.counter = counter;
        self.fvalue = raw as f32 / u32::MAX as f32;
        self.timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as i64)
            .unwrap_or_default();
    }
}

#[derive(Clone, Debug)]
pub struct StressConfig {
    /// Loop count for each side.
    pub iterations: usize,
    /// Sleep after every producer iteration.
    pub writer_pause: Duration,
    /// Sleep after every consumer iteration.
    pub reader_pause: Duration,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            iterations: DEFAULT_ITERATIONS,
            writer_pause: DEFAULT_PAUSE,
            reader_pause: DEFAULT_PAUSE,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StressReport {
    pub writes: usize,
    pub write_denied: usize,
    pub reads: usize,
    pub stale_polls: usize,
    pub read_denied: usize,
    pub violations: usize,
    /// Counter of the last value the consumer saw.
    pub last_counter: i64,
    pub elapsed: Duration,
}

impl StressReport {
    pub fn is_clean(&self) -> bool {
        self.violations == 0
    }
}

#[derive(Default)]
struct ProducerStats {
    writes: usize,
    denied: usize,
}

#[derive(Default)]
struct ConsumerStats {
    reads: usize,
    stale: usize,
    denied: usize,
    violations: usize,
    last_counter: i64,
}

fn pause(d: Duration) {
    if !d.is_zero() {
        thread::sleep(d);
    }
}

fn produce(data: &SpscData<Params>, start: &Barrier, config: &StressConfig) -> ProducerStats {
    start.wait();
    info!("writer started");

    let mut stats = ProducerStats::default();
    let mut counter = 0;
    for _ in 0..config.iterations {
        {
            let mut scope = data.write();
            match scope.get_mut() {
                Some(params) => {
                    counter += 1;
                    params.update(counter);
                    stats.writes += 1;
                }
                None => stats.denied += 1,
            }
        }
        pause(config.writer_pause);
    }

    info!("writer finished");
    stats
}

fn consume(data: &SpscData<Params>, start: &Barrier, config: &StressConfig) -> ConsumerStats {
    start.wait();
    info!("reader started");

    let mut stats = ConsumerStats::default();
    let mut prev = Params::default();
    for _ in 0..config.iterations {
        {
            let scope = data.read();
            match scope.get() {
                Some(params) => {
                    if *params == prev {
                        warn!("new data equals the old one: {params:?}");
                        stats.violations += 1;
                    } else if params.counter <= prev.counter {
                        warn!(
                            "unexpected counter value {}, previous value {}",
                            params.counter, prev.counter
                        );
                        stats.violations += 1;
                    }
                    prev = *params;
                    stats.reads += 1;
                }
                None if scope.is_valid() => stats.stale += 1,
                None => stats.denied += 1,
            }
        }
        pause(config.reader_pause);
    }
    stats.last_counter = prev.counter;

    info!("reader finished, reads: {}", stats.reads);
    stats
}

/// Runs one producer and one consumer against a fresh store.
pub fn run(config: &StressConfig) -> Result<StressReport> {
    let data = SpscData::<Params>::new();
    let start = Barrier::new(3);

    let (elapsed, producer, consumer) = thread::scope(|s| {
        let producer = s.spawn(|| produce(&data, &start, config));
        let consumer = s.spawn(|| consume(&data, &start, config));

        info!("data ready for processing");
        start.wait();
        let began = Instant::now();
        let producer = producer.join();
        let consumer = consumer.join();
        (began.elapsed(), producer, consumer)
    });

    let producer = producer.map_err(|_| eyre!("writer thread panicked"))?;
    let consumer = consumer.map_err(|_| eyre!("reader thread panicked"))?;

    let report = StressReport {
        writes: producer.writes,
        write_denied: producer.denied,
        reads: consumer.reads,
        stale_polls: consumer.stale,
        read_denied: consumer.denied,
        violations: consumer.violations,
        last_counter: consumer.last_counter,
        elapsed,
    };
    debug!("{report:?}");
    Ok(report)
}

/// A second write scope opened while the first is alive must be denied, and
/// the role must be available again once the first is gone.
pub fn single_thread_exclusivity<T>(data: &SpscData<T>) -> Result<()> {
    {
        let first = data.write();
        ensure!(first.is_valid(), "first writer was denied");

        let second = data.write();
        ensure!(!second.is_valid(), "second writer was granted access");
    }
    let again = data.write();
    ensure!(again.is_valid(), "writer denied after the first was released");
    Ok(())
}
