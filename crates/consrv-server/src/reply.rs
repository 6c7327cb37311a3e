//! Buffered reply assembly for one command's execution.
//!
//! Handlers write output here through `print`/`println`; diagnostics use
//! the severity-tagged helpers so they travel the same path and appear
//! in-line in the session. What happens when the buffer fills depends on
//! the transport: connectionless personalities grow the buffer and owe
//! the peer a payload-size-update message; the stream and in-process
//! personalities flush the partial buffer through a sink and continue.

use consrv_types::message::PAYLOAD_CHUNK;
use consrv_types::Result;

/// Where a flushed-through partial reply goes (the live connection).
pub trait ReplySink {
    fn flush_chunk(&mut self, bytes: &[u8]) -> Result<()>;
}

/// Overflow behavior, fixed per transport personality.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Reallocate by whole chunks and notify the peer of the new size.
    /// Required on datagram transports: a partial datagram would be
    /// unordered relative to the completion marker.
    GrowAndNotify,
    /// Hand the full buffer to the sink and keep formatting.
    FlushThrough,
}

/// The reply buffer for one dispatch.
pub struct Reply<'s> {
    buf: Vec<u8>,
    /// Current negotiated payload size.
    capacity: usize,
    policy: OverflowPolicy,
    sink: Option<&'s mut dyn ReplySink>,
    /// Control dispatches suppress intermediate flushes.
    suppress_flush: bool,
    /// Set when the buffer grew past the starting capacity.
    grew: bool,
}

impl<'s> Reply<'s> {
    /// A grow-and-notify reply starting at the negotiated size.
    pub fn buffered(capacity: usize) -> Self {
        Self {
            buf: Vec::new(),
            capacity,
            policy: OverflowPolicy::GrowAndNotify,
            sink: None,
            suppress_flush: false,
            grew: false,
        }
    }

    /// A flush-through reply writing overflow to `sink`.
    pub fn streaming(capacity: usize, sink: &'s mut dyn ReplySink) -> Self {
        Self {
            buf: Vec::new(),
            capacity,
            policy: OverflowPolicy::FlushThrough,
            sink: Some(sink),
            suppress_flush: false,
            grew: false,
        }
    }

    /// Suppress intermediate flushes (control-command dispatch).
    pub fn suppress_flush(mut self) -> Self {
        self.suppress_flush = true;
        self
    }

    /// Append text, handling overflow per the policy.
    pub fn print(&mut self, text: &str) {
        if self.buf.len() + text.len() > self.capacity {
            self.overflow(text.len());
        }
        self.buf.extend_from_slice(text.as_bytes());
    }

    /// Append text and a line terminator.
    pub fn println(&mut self, text: &str) {
        self.print(text);
        self.print("\r\n");
    }

    pub fn error(&mut self, text: &str) {
        self.println(&format!("ERROR: {text}"));
    }

    pub fn warning(&mut self, text: &str) {
        self.println(&format!("WARNING: {text}"));
    }

    pub fn info(&mut self, text: &str) {
        self.println(&format!("INFO: {text}"));
    }

    fn overflow(&mut self, incoming: usize) {
        match self.policy {
            OverflowPolicy::GrowAndNotify => self.grow(incoming),
            OverflowPolicy::FlushThrough => {
                if self.suppress_flush || self.sink.is_none() {
                    // Nowhere to flush: fall back to growing.
                    self.grow(incoming);
                    return;
                }
                if let Some(sink) = self.sink.as_deref_mut() {
                    if let Err(e) = sink.flush_chunk(&self.buf) {
                        log::warn!("reply flush failed: {e}");
                    }
                    self.buf.clear();
                }
                // A single oversized write still needs room.
                if incoming > self.capacity {
                    self.grow(incoming);
                }
            },
        }
    }

    fn grow(&mut self, incoming: usize) {
        while self.buf.len() + incoming > self.capacity {
            self.capacity += PAYLOAD_CHUNK;
        }
        self.grew = true;
    }

    /// Whether the negotiated size changed during this dispatch.
    pub fn grew(&self) -> bool {
        self.grew
    }

    /// The (possibly grown) negotiated payload size.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Take the assembled bytes, leaving the buffer empty.
    pub fn take(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.buf)
    }

    /// Assembled text so far (lossy).
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.buf).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct VecSink(Vec<Vec<u8>>);

    impl ReplySink for VecSink {
        fn flush_chunk(&mut self, bytes: &[u8]) -> Result<()> {
            self.0.push(bytes.to_vec());
            Ok(())
        }
    }

    #[test]
    fn print_and_println() {
        let mut reply = Reply::buffered(PAYLOAD_CHUNK);
        reply.print("a");
        reply.println("b");
        assert_eq!(reply.text(), "ab\r\n");
    }

    #[test]
    fn severity_tags() {
        let mut reply = Reply::buffered(PAYLOAD_CHUNK);
        reply.error("broken");
        reply.warning("odd");
        reply.info("fyi");
        let text = reply.text();
        assert!(text.contains("ERROR: broken"));
        assert!(text.contains("WARNING: odd"));
        assert!(text.contains("INFO: fyi"));
    }

    #[test]
    fn grow_policy_records_one_growth() {
        let mut reply = Reply::buffered(8);
        assert!(!reply.grew());
        reply.print("0123456789");
        assert!(reply.grew());
        assert_eq!(reply.capacity(), 8 + PAYLOAD_CHUNK);
        assert_eq!(reply.text(), "0123456789");
    }

    #[test]
    fn grow_policy_extends_by_whole_chunks() {
        let mut reply = Reply::buffered(4);
        let big = "x".repeat(PAYLOAD_CHUNK + 10);
        reply.print(&big);
        assert!(reply.capacity() >= 4 + PAYLOAD_CHUNK);
        assert_eq!(reply.take().len(), big.len());
    }

    #[test]
    fn flush_through_empties_buffer_to_sink() {
        let mut sink = VecSink(Vec::new());
        {
            let mut reply = Reply::streaming(8, &mut sink);
            reply.print("aaaa");
            reply.print("bbbb");
            // Third write overflows: the first 8 bytes flush through.
            reply.print("cc");
            assert_eq!(reply.text(), "cc");
        }
        assert_eq!(sink.0, vec![b"aaaabbbb".to_vec()]);
    }

    #[test]
    fn suppressed_flush_grows_instead() {
        let mut sink = VecSink(Vec::new());
        {
            let mut reply = Reply::streaming(4, &mut sink).suppress_flush();
            reply.print("123456");
            assert_eq!(reply.text(), "123456");
            assert!(reply.grew());
        }
        assert!(sink.0.is_empty());
    }

    #[test]
    fn take_leaves_empty_buffer() {
        let mut reply = Reply::buffered(PAYLOAD_CHUNK);
        reply.print("payload");
        assert_eq!(reply.take(), b"payload".to_vec());
        assert!(reply.is_empty());
    }
}
