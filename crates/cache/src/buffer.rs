/// Pre-sized, growable byte buffer for chunked downloads.
///
/// The buffer is allocated up front to the size the server declared and
/// filled chunk by chunk. Servers occasionally under-report `Content-Length`,
/// so a chunk that would overflow the buffer triggers a grow to
/// `max(capacity * 1.25, exact fit)`. [`into_bytes`](ChunkBuffer::into_bytes)
/// truncates to the bytes actually received, so the returned buffer's length
/// always equals the true downloaded size, never the allocated capacity.
#[derive(Debug)]
pub struct ChunkBuffer {
    data: Vec<u8>,
    len: usize,
}

impl ChunkBuffer {
    /// Create a buffer pre-sized to the declared content length.
    pub fn with_capacity(expected: usize) -> Self {
        Self {
            data: vec![0; expected],
            len: 0,
        }
    }

    /// Append one network chunk, growing the buffer if the declared size
    /// turned out to be too small.
    pub fn extend_from_chunk(&mut self, chunk: &[u8]) {
        let fit = self.len + chunk.len();
        if fit > self.data.len() {
            let grown = (self.data.len() as f64 * 1.25) as usize;
            self.data.resize(grown.max(fit), 0);
        }
        self.data[self.len..fit].copy_from_slice(chunk);
        self.len = fit;
    }

    /// Bytes received so far.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Current allocated capacity, which starts at the declared size and only
    /// grows.
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Received bytes as a fraction of the current capacity.
    ///
    /// Imprecise while the capacity diverges from the true total, but always
    /// consistent with the bytes actually received.
    pub fn fraction(&self) -> f64 {
        if self.data.is_empty() {
            return 0.0;
        }
        self.len as f64 / self.data.len() as f64
    }

    /// Finish the download, truncating to the exact received length.
    ///
    /// Shrinks the allocation so the slack from an over-reported
    /// `Content-Length` is returned to the allocator rather than carried
    /// around inside the result.
    pub fn into_bytes(mut self) -> Vec<u8> {
        self.data.truncate(self.len);
        self.data.shrink_to_fit();
        self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIB: usize = 1024 * 1024;

    #[test]
    fn fills_exactly_declared_size() {
        let mut buf = ChunkBuffer::with_capacity(10 * MIB);
        let chunk = vec![7u8; 2 * MIB];

        let mut fractions = Vec::new();
        for _ in 0..5 {
            buf.extend_from_chunk(&chunk);
            fractions.push(buf.fraction());
        }

        assert_eq!(fractions, vec![0.2, 0.4, 0.6, 0.8, 1.0]);
        let bytes = buf.into_bytes();
        assert_eq!(bytes.len(), 10 * MIB);
        assert!(bytes.iter().all(|&b| b == 7));
    }

    #[test]
    fn grows_when_declared_size_under_reports() {
        // Server claims 100 bytes but sends 300.
        let mut buf = ChunkBuffer::with_capacity(100);
        buf.extend_from_chunk(&[1u8; 90]);
        assert_eq!(buf.capacity(), 100);

        // 90 + 90 > 100: grow to max(125, 180) = 180.
        buf.extend_from_chunk(&[2u8; 90]);
        assert_eq!(buf.capacity(), 180);

        // 180 + 120 > 180: grow to max(225, 300) = 300.
        buf.extend_from_chunk(&[3u8; 120]);
        assert_eq!(buf.capacity(), 300);

        let bytes = buf.into_bytes();
        assert_eq!(bytes.len(), 300);
        assert_eq!(&bytes[..90], &[1u8; 90][..]);
        assert_eq!(&bytes[90..180], &[2u8; 90][..]);
        assert_eq!(&bytes[180..], &[3u8; 120][..]);
    }

    #[test]
    fn truncates_when_declared_size_over_reports() {
        // Server claims 1000 bytes but sends 250.
        let mut buf = ChunkBuffer::with_capacity(1000);
        buf.extend_from_chunk(&[9u8; 250]);

        assert_eq!(buf.len(), 250);
        assert_eq!(buf.capacity(), 1000);
        assert_eq!(buf.into_bytes().len(), 250);
    }

    #[test]
    fn zero_capacity_grows_to_fit() {
        let mut buf = ChunkBuffer::with_capacity(0);
        assert_eq!(buf.fraction(), 0.0);

        buf.extend_from_chunk(b"abc");
        assert_eq!(buf.capacity(), 3);
        assert_eq!(buf.into_bytes(), b"abc");
    }
}
