//! A WAL-backed circular buffer surviving a restart.
//!
//! Run with:
//!   cargo run --example durable-queue

use courier::frame::{Message, Status};
use courier::queue::{CircularBuffer, Queue};
use courier::wal::{WalConfig, WalQueue, WalRegistry};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let root = std::env::temp_dir().join(format!("courier-durable-{}", std::process::id()));

    {
        let registry = WalRegistry::new(&root, WalConfig::default())?;
        let queue = WalQueue::open(CircularBuffer::new("ticks", 3), &registry)?;
        for n in 1..=5 {
            let body = format!("tick {n}");
            queue.offer(Message::text(Status::Event, "text/plain", "UTF-8", &body)?)?;
        }
        let first = queue.poll()?;
        eprintln!("polled before restart: {:?}", first.map(|m| m.text_payload()));
        registry.shutdown()?;
    }

    let registry = WalRegistry::new(&root, WalConfig::default())?;
    let queue = WalQueue::open(CircularBuffer::new("ticks", 3), &registry)?;
    let report = queue.reload()?;
    eprintln!(
        "reloaded {} messages ({} acknowledged, {} evicted)",
        report.recovered, report.acknowledged, report.evicted
    );
    while let Some(message) = queue.poll()? {
        eprintln!("  {}", message.text_payload()?);
    }

    queue.on_remove()?;
    let _ = std::fs::remove_dir_all(&root);
    Ok(())
}
