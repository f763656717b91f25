//! Command queue bookkeeping (C3): FIFO admission, single in-flight
//! command, multi-packet response assembly terminated by the `END` echo.
//! Owned exclusively by the connection actor in `connection.rs` — never
//! shared, so no locking is needed.

use std::collections::VecDeque;

use domain::error::{ErrorContext, SupervisorError};
use tokio::sync::oneshot;
use tokio::time::Instant;

/// A command submitted by a caller, waiting for its turn.
pub struct PendingCommand {
    pub command: String,
    /// Monotonically increasing 16-bit tag (§4.3): log correlation only,
    /// never used to match a response to this command.
    pub count: u16,
    pub deadline: Option<Instant>,
    pub respond_to: oneshot::Sender<Result<String, SupervisorError>>,
}

/// The command currently sent to the server, awaiting its terminating
/// `END` echo.
pub struct InFlight {
    pub command: String,
    pub count: u16,
    pub deadline: Instant,
    pub body: String,
    pub respond_to: oneshot::Sender<Result<String, SupervisorError>>,
}

#[derive(Debug, Clone, Default)]
pub struct QueueStats {
    pub submitted: u64,
    pub completed: u64,
    pub timed_out: u64,
    pub aborted: u64,
}

/// FIFO of commands awaiting admission, plus the one currently in flight.
#[derive(Default)]
pub struct CommandQueue {
    pending: VecDeque<PendingCommand>,
    in_flight: Option<InFlight>,
    next_count: u16,
    pub stats: QueueStats,
}

impl CommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_count(&mut self) -> u16 {
        let count = self.next_count;
        self.next_count = self.next_count.wrapping_add(1);
        count
    }

    pub fn submit(&mut self, mut pending: PendingCommand) {
        pending.count = self.next_count();
        self.stats.submitted += 1;
        self.pending.push_back(pending);
    }

    pub fn has_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn is_idle(&self) -> bool {
        self.in_flight.is_none() && self.pending.is_empty()
    }

    /// Admits the next pending command as in-flight, skipping any whose
    /// deadline has already passed (§5: "the queue rejects past-deadline
    /// commands without sending").
    pub fn admit_next(&mut self, default_timeout: std::time::Duration) -> Option<(String, u16)> {
        while let Some(next) = self.pending.pop_front() {
            if let Some(deadline) = next.deadline {
                if deadline <= Instant::now() {
                    self.stats.aborted += 1;
                    let _ = next.respond_to.send(Err(SupervisorError::CommandAborted {
                        command: next.command.clone(),
                        context: ErrorContext::new(),
                    }));
                    continue;
                }
            }
            let deadline = next.deadline.unwrap_or_else(|| Instant::now() + default_timeout);
            let command = next.command.clone();
            let count = next.count;
            self.in_flight = Some(InFlight {
                command: next.command,
                count: next.count,
                deadline,
                body: String::new(),
                respond_to: next.respond_to,
            });
            return Some((command, count));
        }
        None
    }

    pub fn in_flight_deadline(&self) -> Option<Instant> {
        self.in_flight.as_ref().map(|f| f.deadline)
    }

    pub fn append_fragment(&mut self, fragment: &str) {
        if let Some(in_flight) = self.in_flight.as_mut() {
            in_flight.body.push_str(fragment);
        }
    }

    /// The `END` echo arrived: the in-flight command is complete.
    pub fn complete_in_flight(&mut self) {
        if let Some(in_flight) = self.in_flight.take() {
            self.stats.completed += 1;
            let _ = in_flight.respond_to.send(Ok(in_flight.body));
        }
    }

    pub fn timeout_in_flight(&mut self) {
        if let Some(in_flight) = self.in_flight.take() {
            self.stats.timed_out += 1;
            let _ = in_flight.respond_to.send(Err(SupervisorError::CommandTimeout {
                command: in_flight.command,
                context: ErrorContext::new(),
            }));
        }
    }

    /// Disconnection: every queued and in-flight command fails with
    /// `COMMAND_ABORTED` (§4.2 cancellation).
    pub fn abort_all(&mut self) {
        if let Some(in_flight) = self.in_flight.take() {
            self.stats.aborted += 1;
            let _ = in_flight.respond_to.send(Err(SupervisorError::CommandAborted {
                command: in_flight.command,
                context: ErrorContext::new(),
            }));
        }
        while let Some(pending) = self.pending.pop_front() {
            self.stats.aborted += 1;
            let _ = pending.respond_to.send(Err(SupervisorError::CommandAborted {
                command: pending.command,
                context: ErrorContext::new(),
            }));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn submit(queue: &mut CommandQueue, command: &str) -> oneshot::Receiver<Result<String, SupervisorError>> {
        let (tx, rx) = oneshot::channel();
        queue.submit(PendingCommand {
            command: command.to_string(),
            count: 0,
            deadline: None,
            respond_to: tx,
        });
        rx
    }

    #[tokio::test]
    async fn completes_in_fifo_order() {
        let mut queue = CommandQueue::new();
        let rx_a = submit(&mut queue, "A");
        let rx_b = submit(&mut queue, "B");

        let (cmd, _count) = queue.admit_next(std::time::Duration::from_secs(5)).unwrap();
        assert_eq!(cmd, "A");
        queue.append_fragment("result-a");
        queue.complete_in_flight();
        assert_eq!(rx_a.await.unwrap().unwrap(), "result-a");

        let (cmd, _count) = queue.admit_next(std::time::Duration::from_secs(5)).unwrap();
        assert_eq!(cmd, "B");
        queue.complete_in_flight();
        assert!(rx_b.await.unwrap().unwrap().is_empty());
    }

    #[tokio::test]
    async fn abort_all_fails_queued_and_in_flight() {
        let mut queue = CommandQueue::new();
        let rx_a = submit(&mut queue, "A");
        let rx_b = submit(&mut queue, "B");
        queue.admit_next(std::time::Duration::from_secs(5));

        queue.abort_all();
        assert!(matches!(rx_a.await.unwrap(), Err(SupervisorError::CommandAborted { .. })));
        assert!(matches!(rx_b.await.unwrap(), Err(SupervisorError::CommandAborted { .. })));
    }
}
