use bytes::Bytes;

/// Startup backlog that holds output until enough audio has arrived
///
/// Every node runs the same fixed delay before audible output, which gives
/// slaves time to absorb their extra network and decode latency.
#[derive(Debug)]
pub struct Prebuffer {
    threshold: usize,
    buffers: Vec<Bytes>,
    length: usize,
}

impl Prebuffer {
    /// Creates an empty prebuffer that releases once more than `threshold`
    /// bytes are queued
    pub fn new(threshold: usize) -> Self {
        Prebuffer {
            threshold,
            buffers: Vec::new(),
            length: 0,
        }
    }

    /// Queues a buffer
    ///
    /// Once the cumulative length exceeds the threshold, the whole backlog is
    /// returned in arrival order and the prebuffer must be discarded.
    pub fn push(&mut self, buf: Bytes) -> Option<Vec<Bytes>> {
        self.length += buf.len();
        self.buffers.push(buf);

        if self.length > self.threshold {
            Some(std::mem::take(&mut self.buffers))
        } else {
            None
        }
    }

    /// Bytes queued so far
    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }
}
