extern crate playout_jitter;

use std::{
    net::SocketAddr,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

use anyhow::anyhow;
use clap::Parser;
use crossbeam::channel::{unbounded, Receiver, Sender};
use log::Level;
use playout_jitter::{
    metrics::JitterMetricsExporter, ConcealmentSlot, JitterBuffer, JitterBufferConfig, LogSink,
    Packet, SharedConcealment,
};
use rand::Rng;

const ELEMENT_SIZE: usize = 4;
const CLOCK_RATE: u64 = 48000;
const PACKET_ELEMENTS: usize = 960;
const PACKET_INTERVAL: Duration = Duration::from_millis(20);
const PLAYOUT_ELEMENTS: usize = 480;
const PLAYOUT_INTERVAL: Duration = Duration::from_millis(10);

struct StdoutSink;

impl LogSink for StdoutSink {
    fn log(&self, level: Level, message: &str, fatal: bool) {
        if fatal {
            println!("[{level}] FATAL {message}");
        } else {
            println!("[{level}] {message}");
        }
    }

    fn enabled(&self, level: Level) -> bool {
        level <= Level::Info
    }
}

/// Plays a simulated lossy network into a jitter buffer and reports what
/// the buffer had to conceal and drop.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Settings {
    /// How long to run, in seconds
    #[arg(long, default_value_t = 10)]
    seconds: u64,

    /// Probability that a packet is lost
    #[arg(long, default_value_t = 0.02)]
    loss: f64,

    /// Probability that a packet is delivered twice
    #[arg(long, default_value_t = 0.01)]
    duplicate: f64,

    /// Upper bound of the random network delay
    #[arg(long, default_value_t = 60)]
    max_delay_ms: u64,

    /// Address to serve prometheus metrics on
    #[arg(long)]
    prometheus: Option<SocketAddr>,
}

/// Emits one packet per interval and hands it to the network after a random
/// delay, so packets overtake each other. Some are lost, some sent twice.
fn run_sender(settings: &Settings, output: Sender<Packet>, stop: Arc<AtomicBool>) {
    let mut rng = rand::thread_rng();
    let mut in_flight: Vec<(Instant, Packet)> = Vec::new();
    let mut sequence_number = 0u64;
    while !stop.load(Ordering::Relaxed) {
        let now = Instant::now();
        if !rng.gen_bool(settings.loss) {
            let data: Vec<u8> = (0..PACKET_ELEMENTS * ELEMENT_SIZE)
                .map(|i| (sequence_number as usize + i) as u8)
                .collect();
            let packet = Packet::new(sequence_number, PACKET_ELEMENTS, data);
            let copies = if rng.gen_bool(settings.duplicate) { 2 } else { 1 };
            for _ in 0..copies {
                let delay = Duration::from_millis(rng.gen_range(0..=settings.max_delay_ms));
                in_flight.push((now + delay, packet.clone()));
            }
        }
        sequence_number += PACKET_ELEMENTS as u64;

        let (due, pending): (Vec<_>, Vec<_>) =
            in_flight.drain(..).partition(|(release, _)| *release <= now);
        in_flight = pending;
        for (_, packet) in due {
            if output.send(packet).is_err() {
                return;
            }
        }
        thread::sleep(PACKET_INTERVAL);
    }
}

fn run_network(buffer: Arc<JitterBuffer>, input: Receiver<Packet>, concealment: SharedConcealment) {
    for packet in input.iter() {
        if let Err(error) = buffer.enqueue(&packet, &concealment) {
            println!("Dropping malformed packet: {}", error);
        }
    }
}

fn run_playout(
    buffer: Arc<JitterBuffer>,
    exporter: Option<JitterMetricsExporter>,
    stop: Arc<AtomicBool>,
) {
    let mut destination = vec![0u8; PLAYOUT_ELEMENTS * ELEMENT_SIZE];
    let mut ticks = 0u64;
    while !stop.load(Ordering::Relaxed) {
        if let Err(error) = buffer.dequeue(&mut destination, PLAYOUT_ELEMENTS) {
            println!("Playout failed: {}", error);
            return;
        }
        ticks += 1;
        if ticks % 100 == 0 {
            let metrics = buffer.get_metrics();
            println!(
                "depth {}ms, concealed {}, dropped {}",
                buffer.get_current_depth_ms(),
                metrics.concealed,
                metrics.dropped()
            );
            if let Some(exporter) = exporter.as_ref() {
                exporter.observe(&buffer.config().name, &metrics);
            }
        }
        thread::sleep(PLAYOUT_INTERVAL);
    }
}

fn main() -> anyhow::Result<()> {
    let settings = Settings::parse();

    let config = JitterBufferConfig::builder()
        .element_size(ELEMENT_SIZE)
        .packet_elements(PACKET_ELEMENTS)
        .clock_rate(CLOCK_RATE)
        .max_length_ms(200)
        .min_length_ms(40)
        .name("simulated")
        .build()?;
    let buffer = Arc::new(JitterBuffer::new(config, Arc::new(StdoutSink))?);

    let _prometheus = match settings.prometheus {
        Some(address) => Some(prometheus_exporter::start(address)?),
        None => None,
    };
    let exporter = match settings.prometheus {
        Some(_) => Some(JitterMetricsExporter::new(prometheus::default_registry())?),
        None => None,
    };

    let concealed_calls = Arc::new(AtomicU64::new(0));
    let calls = concealed_calls.clone();
    // Slots arrive zeroed, which is already silence for PCM.
    let concealment: SharedConcealment = Arc::new(move |_slots: &mut [ConcealmentSlot<'_>]| {
        calls.fetch_add(1, Ordering::Relaxed);
    });
    buffer.prepare(0, &concealment);

    let run_for = Duration::from_secs(settings.seconds);
    let stop = Arc::new(AtomicBool::new(false));
    let (packet_sender, packet_receiver) = unbounded::<Packet>();

    let network = {
        let buffer = buffer.clone();
        let concealment = concealment.clone();
        thread::spawn(move || run_network(buffer, packet_receiver, concealment))
    };
    let playout = {
        let buffer = buffer.clone();
        let stop = stop.clone();
        thread::spawn(move || run_playout(buffer, exporter, stop))
    };
    let sender = {
        let stop = stop.clone();
        thread::spawn(move || run_sender(&settings, packet_sender, stop))
    };

    thread::sleep(run_for);
    stop.store(true, Ordering::Relaxed);
    sender
        .join()
        .map_err(|_| anyhow!("Sender thread panicked"))?;
    network
        .join()
        .map_err(|_| anyhow!("Network thread panicked"))?;
    playout
        .join()
        .map_err(|_| anyhow!("Playout thread panicked"))?;

    let metrics = buffer.get_metrics();
    println!("{:#?}", metrics);
    println!(
        "Concealment handler calls: {}",
        concealed_calls.load(Ordering::Relaxed)
    );
    Ok(())
}
