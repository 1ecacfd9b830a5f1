use std::fmt;

/// Fixed-capacity formatting buffer with truncation bookkeeping.
///
/// Stores at most `N - 1` bytes; anything beyond that is counted but not
/// written, so a caller can tell how long the output wanted to be and
/// whether it was clamped. Writes never fail and partial lines are kept
/// as-is, clamping is the only recovery.
pub struct BoundedBuf<const N: usize> {
    buf: [u8; N],
    len: usize,
    wanted: usize,
}

impl<const N: usize> BoundedBuf<N> {
    pub fn new() -> Self {
        BoundedBuf {
            buf: [0; N],
            len: 0,
            wanted: 0,
        }
    }

    /// The bytes actually stored, at most `N - 1` of them.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether formatting produced more bytes than the buffer keeps.
    pub fn truncated(&self) -> bool {
        self.wanted > self.len
    }

    pub fn clear(&mut self) {
        self.len = 0;
        self.wanted = 0;
    }

    /// Appends raw bytes, clamping at `N - 1` stored bytes. Clamping may
    /// split a multi-byte character; the output is a byte stream, not
    /// guaranteed UTF-8.
    pub fn push_bytes(&mut self, bytes: &[u8]) {
        self.wanted += bytes.len();
        let room = (N - 1).saturating_sub(self.len);
        let take = room.min(bytes.len());
        self.buf[self.len..self.len + take].copy_from_slice(&bytes[..take]);
        self.len += take;
    }

    pub fn ends_with_newline(&self) -> bool {
        self.buf[..self.len].last() == Some(&b'\n')
    }
}

impl<const N: usize> fmt::Write for BoundedBuf<N> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.push_bytes(s.as_bytes());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt::Write;

    #[test]
    fn short_writes_are_kept_verbatim() {
        let mut buf = BoundedBuf::<16>::new();
        write!(buf, "ab{}", 12).unwrap();
        assert_eq!(buf.as_bytes(), b"ab12");
        assert!(!buf.truncated());
    }

    #[test]
    fn overflow_clamps_to_capacity_minus_one() {
        let mut buf = BoundedBuf::<8>::new();
        write!(buf, "{}", "x".repeat(40)).unwrap();
        assert_eq!(buf.len(), 7);
        assert_eq!(buf.as_bytes(), b"xxxxxxx");
        assert!(buf.truncated());
    }

    #[test]
    fn truncation_counts_across_multiple_writes() {
        let mut buf = BoundedBuf::<8>::new();
        buf.push_bytes(b"aaaa");
        buf.push_bytes(b"bbbb");
        assert_eq!(buf.len(), 7);
        assert_eq!(buf.as_bytes(), b"aaaabbb");
        assert!(buf.truncated());
    }

    #[test]
    fn clear_resets_both_counters() {
        let mut buf = BoundedBuf::<8>::new();
        buf.push_bytes(b"aaaaaaaaaa");
        buf.clear();
        assert_eq!(buf.len(), 0);
        assert!(!buf.truncated());
        buf.push_bytes(b"ok\n");
        assert_eq!(buf.as_bytes(), b"ok\n");
        assert!(buf.ends_with_newline());
    }

    #[test]
    fn empty_buffer_is_not_newline_terminated() {
        let buf = BoundedBuf::<8>::new();
        assert!(!buf.ends_with_newline());
    }
}
