//! Priority queues and transmit backpressure
//!
//! Both directions run three FIFO queues, one per traffic class, drained in
//! strict priority order: Serial before Control before Other, never
//! round-robin. Serial carries the control channel, Control carries HCI, and
//! everything else (station/AP data, test traffic) is Other.
//!
//! Only the Other class is flow-controlled. A pending counter tracks
//! enqueued-but-unsent Other frames against a high watermark; crossing it
//! asks the producer to pause, and the pause only clears once a dequeue
//! drops the counter strictly below the low watermark (one fifth of the
//! high). The gap between the two watermarks keeps the pause/resume
//! signaling from oscillating under steady load.

use std::collections::VecDeque;

use hostlink_wire::{Frame, InterfaceType};

/// Number of priority classes
pub const CLASS_COUNT: usize = 3;

/// Traffic class, in strict dequeue priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TrafficClass {
    /// Serial/control channel
    Serial,
    /// Bluetooth HCI
    Control,
    /// Data and test traffic
    Other,
}

impl TrafficClass {
    /// Classify a frame by its interface type
    pub fn from_interface(if_type: InterfaceType) -> Self {
        match if_type {
            InterfaceType::Serial => TrafficClass::Serial,
            InterfaceType::HciBt => TrafficClass::Control,
            _ => TrafficClass::Other,
        }
    }

    fn index(self) -> usize {
        match self {
            TrafficClass::Serial => 0,
            TrafficClass::Control => 1,
            TrafficClass::Other => 2,
        }
    }
}

/// Result of accepting a transmit frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PushOutcome {
    /// Frame queued, keep sending
    Accepted,
    /// Frame queued, and this push crossed the high watermark: the producer
    /// must pause Other-class traffic until resume
    AcceptedPaused,
}

/// Push rejected because backpressure is already asserted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Rejected;

/// A dequeued frame plus whether the dequeue cleared backpressure
#[derive(Debug)]
pub(crate) struct PopOutcome {
    pub frame: Frame,
    pub resumed: bool,
}

/// Transmit-side queue set with Other-class flow control
#[derive(Debug)]
pub(crate) struct TxQueues {
    queues: [VecDeque<Frame>; CLASS_COUNT],
    pending_other: usize,
    paused: bool,
    high: usize,
    low: usize,
}

impl TxQueues {
    /// Create with the given high watermark; low is a fifth of it
    pub fn new(high: usize) -> Self {
        Self {
            queues: Default::default(),
            pending_other: 0,
            paused: false,
            high,
            low: (high / 5).max(1),
        }
    }

    /// Queue a frame in its class
    pub fn push(&mut self, frame: Frame) -> Result<PushOutcome, Rejected> {
        let class = TrafficClass::from_interface(frame.if_type());

        if class == TrafficClass::Other {
            if self.paused {
                return Err(Rejected);
            }
            self.queues[class.index()].push_back(frame);
            self.pending_other += 1;
            if self.pending_other >= self.high {
                self.paused = true;
                return Ok(PushOutcome::AcceptedPaused);
            }
        } else {
            self.queues[class.index()].push_back(frame);
        }
        Ok(PushOutcome::Accepted)
    }

    /// Pop the highest-priority pending frame
    pub fn pop(&mut self) -> Option<PopOutcome> {
        for (idx, queue) in self.queues.iter_mut().enumerate() {
            if let Some(frame) = queue.pop_front() {
                let mut resumed = false;
                if idx == TrafficClass::Other.index() {
                    self.pending_other -= 1;
                    if self.paused && self.pending_other < self.low {
                        self.paused = false;
                        resumed = true;
                    }
                }
                return Some(PopOutcome { frame, resumed });
            }
        }
        None
    }

    /// Any frame queued in any class
    pub fn has_pending(&self) -> bool {
        self.queues.iter().any(|q| !q.is_empty())
    }

    /// Total frames queued across all classes
    pub fn len(&self) -> usize {
        self.queues.iter().map(VecDeque::len).sum()
    }

    /// Pending Other-class frames
    pub fn pending_other(&self) -> usize {
        self.pending_other
    }

    /// Backpressure currently asserted
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Drop every queued frame and reset flow control
    ///
    /// Returns the number of frames dropped and whether a pause was cleared,
    /// so the caller can signal producers. Used only during reinit.
    pub fn purge(&mut self) -> (usize, bool) {
        let dropped = self.queues.iter().map(VecDeque::len).sum();
        for q in &mut self.queues {
            q.clear();
        }
        self.pending_other = 0;
        let was_paused = self.paused;
        self.paused = false;
        (dropped, was_paused)
    }
}

/// Receive-side queue set
///
/// Same strict-priority drain, no flow control: the physical link already
/// paces the receive direction one transfer at a time.
#[derive(Debug, Default)]
pub(crate) struct RxQueues {
    queues: [VecDeque<Frame>; CLASS_COUNT],
}

impl RxQueues {
    pub fn push(&mut self, frame: Frame) {
        let class = TrafficClass::from_interface(frame.if_type());
        self.queues[class.index()].push_back(frame);
    }

    pub fn pop(&mut self) -> Option<Frame> {
        self.queues.iter_mut().find_map(VecDeque::pop_front)
    }

    pub fn purge(&mut self) -> usize {
        let dropped = self.queues.iter().map(VecDeque::len).sum();
        for q in &mut self.queues {
            q.clear();
        }
        dropped
    }
}
