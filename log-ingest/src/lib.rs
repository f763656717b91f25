//! Log ingestion: tails the server's rolling log (C5), buffers it
//! through a bounded drop-oldest queue (C6), parses it line-by-line
//! against a rule table (C7), and correlates the single-line results
//! into the multi-line events described in §3/§4.8 (C8).

pub mod correlation;
pub mod queue;
pub mod reader;
pub mod rules;

use domain::error::SupervisorError;
use tokio::sync::mpsc;

pub use correlation::{CorrelationStore, LogEvent, TeamResultRaw};
pub use queue::{BoundedQueue, BoundedQueueConfig, QueueStats};
pub use reader::{FtpTail, LocalTail, LogSource, SftpTail};
pub use rules::{default_rules, parse_line, parse_prefix, LinePrefix, RawLine, Rule};

/// Runs the reader → queue → parser → correlator pipeline to completion,
/// driven by whatever `LogSource` the caller constructed. Each parsed and
/// correlated event is forwarded to `sink`; lines that fail to parse are
/// dropped silently, matching the rule table's own discard semantics.
///
/// The bounded queue absorbs bursts between the reader (which must never
/// block on a slow downstream) and the parser/correlator, which run
/// synchronously on the same task.
pub async fn run_pipeline(
    mut source: Box<dyn LogSource>,
    rules: Vec<Rule>,
    queue_config: BoundedQueueConfig,
    sink: mpsc::Sender<LogEvent>,
) -> Result<(), SupervisorError> {
    let (line_tx, mut line_rx) = mpsc::channel::<String>(1024);
    source.watch(line_tx).await?;

    let mut queue = BoundedQueue::new(queue_config);
    let mut store = CorrelationStore::new();

    loop {
        tokio::select! {
            line = line_rx.recv() => {
                match line {
                    Some(line) => queue.enqueue(line),
                    None => break,
                }
            }
            _ = tokio::time::sleep(std::time::Duration::from_millis(10)), if !queue.is_empty() => {
                while let Some(line) = queue.dequeue() {
                    if let Some(raw) = parse_line(&line, &rules) {
                        for event in store.ingest(raw) {
                            if sink.send(event).await.is_err() {
                                return Ok(());
                            }
                        }
                    }
                }
            }
        }
    }

    source.unwatch().await
}
