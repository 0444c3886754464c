use crossbeam::channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

/// Payload of a point-to-point message.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Indices(Vec<usize>),
    Values(Vec<f64>),
}

impl Message {
    /// Returns the indices carried by the message.
    ///
    /// # Panics
    ///
    /// Panics if the message carries values.
    pub fn into_indices(self) -> Vec<usize> {
        match self {
            Message::Indices(indices) => indices,
            Message::Values(_) => panic!("Expected a message with indices, received values"),
        }
    }

    /// Returns the values carried by the message.
    ///
    /// # Panics
    ///
    /// Panics if the message carries indices.
    pub fn into_values(self) -> Vec<f64> {
        match self {
            Message::Values(values) => values,
            Message::Indices(_) => panic!("Expected a message with values, received indices"),
        }
    }
}

/// A group of ranks that exchange messages.
///
/// Failure of a peer is not recoverable: implementations panic if a peer disappears while a
/// rank is waiting for it.
pub trait Communicator: Debug + Send + Sync {
    fn rank(&self) -> usize;

    fn size(&self) -> usize;

    /// Sends every outgoing `(destination, message)` pair and then receives exactly one message
    /// from each rank in `sources`.
    ///
    /// Received messages are returned in the order of `sources`. Messages between the same pair
    /// of ranks are received in the order they were sent.
    fn exchange(&self, outgoing: Vec<(usize, Message)>, sources: &[usize]) -> Vec<Message>;

    /// Sums `value` over all ranks. Every rank obtains the bitwise identical result.
    ///
    /// This is a collective operation.
    fn all_reduce_sum(&self, value: f64) -> f64;

    /// Maximum of `value` over all ranks.
    ///
    /// This is a collective operation.
    fn all_reduce_max(&self, value: f64) -> f64;
}

/// The communicator of a single, serial rank.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SelfCommunicator;

impl SelfCommunicator {
    pub fn shared() -> Arc<dyn Communicator> {
        Arc::new(SelfCommunicator)
    }
}

impl Communicator for SelfCommunicator {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn exchange(&self, outgoing: Vec<(usize, Message)>, sources: &[usize]) -> Vec<Message> {
        let mut loopback: VecDeque<Message> = outgoing
            .into_iter()
            .map(|(destination, message)| {
                assert_eq!(destination, 0, "Serial communicator can only send to rank 0");
                message
            })
            .collect();
        sources
            .iter()
            .map(|&source| {
                assert_eq!(source, 0, "Serial communicator can only receive from rank 0");
                loopback
                    .pop_front()
                    .expect("Serial communicator received more messages than were sent")
            })
            .collect()
    }

    fn all_reduce_sum(&self, value: f64) -> f64 {
        value
    }

    fn all_reduce_max(&self, value: f64) -> f64 {
        value
    }
}

struct Envelope {
    source: usize,
    message: Message,
}

/// A communicator connecting ranks that run on separate threads of the same process.
///
/// Channels are unbounded, so sending never blocks. Messages that arrive from a rank other than
/// the one currently being waited for are queued until requested.
pub struct ThreadCommunicator {
    rank: usize,
    senders: Vec<Sender<Envelope>>,
    receiver: Receiver<Envelope>,
    pending: Mutex<Vec<VecDeque<Message>>>,
}

impl Debug for ThreadCommunicator {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadCommunicator")
            .field("rank", &self.rank)
            .field("size", &self.senders.len())
            .finish()
    }
}

impl ThreadCommunicator {
    /// Creates the communicators of all ranks of a group with the given size.
    ///
    /// Entry `r` of the result is the communicator of rank `r`. Each should be moved to its own
    /// thread.
    pub fn world(size: usize) -> Vec<ThreadCommunicator> {
        assert!(size > 0, "A communicator needs at least one rank");
        let (senders, receivers): (Vec<_>, Vec<_>) = (0..size).map(|_| unbounded()).unzip();
        receivers
            .into_iter()
            .enumerate()
            .map(|(rank, receiver)| ThreadCommunicator {
                rank,
                senders: senders.clone(),
                receiver,
                pending: Mutex::new(vec![VecDeque::new(); size]),
            })
            .collect()
    }

    fn send(&self, destination: usize, message: Message) {
        let envelope = Envelope {
            source: self.rank,
            message,
        };
        self.senders[destination]
            .send(envelope)
            .unwrap_or_else(|_| panic!("Rank {} disconnected", destination));
    }

    fn receive_from(&self, source: usize) -> Message {
        let mut pending = self.pending.lock();
        loop {
            if let Some(message) = pending[source].pop_front() {
                return message;
            }
            let envelope = self
                .receiver
                .recv()
                .unwrap_or_else(|_| panic!("Rank {} lost its connection to the group", self.rank));
            pending[envelope.source].push_back(envelope.message);
        }
    }
}

impl Communicator for ThreadCommunicator {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.senders.len()
    }

    fn exchange(&self, outgoing: Vec<(usize, Message)>, sources: &[usize]) -> Vec<Message> {
        for (destination, message) in outgoing {
            self.send(destination, message);
        }
        sources
            .iter()
            .map(|&source| self.receive_from(source))
            .collect()
    }

    fn all_reduce_sum(&self, value: f64) -> f64 {
        // Summing in rank order gives the same rounding on every rank
        self.all_gather(value).into_iter().sum()
    }

    fn all_reduce_max(&self, value: f64) -> f64 {
        self.all_gather(value).into_iter().fold(f64::NEG_INFINITY, f64::max)
    }
}

impl ThreadCommunicator {
    /// Collects one value from every rank, indexed by rank.
    fn all_gather(&self, value: f64) -> Vec<f64> {
        let size = self.size();
        let others: Vec<usize> = (0..size).filter(|&r| r != self.rank).collect();
        let outgoing = others
            .iter()
            .map(|&r| (r, Message::Values(vec![value])))
            .collect();
        let received = self.exchange(outgoing, &others);

        let mut contributions = vec![0.0; size];
        contributions[self.rank] = value;
        for (&source, message) in others.iter().zip(received) {
            contributions[source] = message.into_values()[0];
        }
        contributions
    }
}
