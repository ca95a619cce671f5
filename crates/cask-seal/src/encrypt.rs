//! Chunking encryptor: frames the compressed byte stream into sealed chunks.

use std::io::{self, Write};

use chacha20poly1305::{aead::AeadInPlace, ChaCha20Poly1305, Nonce};

use crate::format::{chunk_nonce, CHUNK_HEADER_SIZE, FINAL_CHUNK_INDEX, TAG_SIZE};

/// Sits under the zstd encoder and above the caller's sink. Buffers
/// incoming bytes, seals them into frames of exactly `chunk_size` plaintext
/// bytes (the final frame carries whatever remains, possibly nothing), and
/// defers the envelope prefix so it is written immediately before frame 0
/// and bound into that frame's AAD.
pub(crate) struct Encryptor<W: Write> {
    sink: W,
    chunk_size: usize,
    /// Bytes accepted but not yet committed to a frame. Holds at most
    /// `chunk_size` bytes between calls.
    buf: Vec<u8>,
    /// Preallocated frame staging area: header ‖ ciphertext ‖ tag.
    staging: Vec<u8>,
    /// Caller prefix ‖ envelope header. Written to the sink and used as
    /// AAD for frame 0, then cleared.
    pending_prefix: Option<Vec<u8>>,
    next_index: u32,
    aead: ChaCha20Poly1305,
    failed: Option<io::ErrorKind>,
}

impl<W: Write> Encryptor<W> {
    pub(crate) fn new(
        sink: W,
        chunk_size: usize,
        aead: ChaCha20Poly1305,
        pending_prefix: Vec<u8>,
    ) -> Self {
        Self {
            sink,
            chunk_size,
            buf: Vec::with_capacity(2 * chunk_size),
            staging: vec![0u8; CHUNK_HEADER_SIZE + chunk_size + TAG_SIZE],
            pending_prefix: Some(pending_prefix),
            next_index: 0,
            aead,
            failed: None,
        }
    }

    fn bail_if_failed(&self) -> io::Result<()> {
        match self.failed {
            Some(kind) => Err(io::Error::new(kind, "writer poisoned by an earlier failure")),
            None => Ok(()),
        }
    }

    /// Seals `self.buf[start..end]` into one frame and writes it out,
    /// preceded by the pending prefix if this is the first frame.
    fn flush_chunk(&mut self, start: usize, end: usize, is_final: bool) -> io::Result<()> {
        if let Some(prefix) = &self.pending_prefix {
            self.sink.write_all(prefix)?;
        }

        assert!(
            is_final || self.next_index < FINAL_CHUNK_INDEX,
            "chunk index overflow"
        );
        let header_index = if is_final {
            FINAL_CHUNK_INDEX
        } else {
            self.next_index
        };
        let nonce: Nonce = chunk_nonce(self.next_index, is_final).into();

        let len = end - start;
        self.staging[..CHUNK_HEADER_SIZE].copy_from_slice(&header_index.to_le_bytes());
        self.staging[CHUNK_HEADER_SIZE..CHUNK_HEADER_SIZE + len]
            .copy_from_slice(&self.buf[start..end]);

        let aad = self.pending_prefix.as_deref().unwrap_or(&[]);
        let tag = self
            .aead
            .encrypt_in_place_detached(
                &nonce,
                aad,
                &mut self.staging[CHUNK_HEADER_SIZE..CHUNK_HEADER_SIZE + len],
            )
            .expect("sealing a bounded chunk cannot fail");
        self.staging[CHUNK_HEADER_SIZE + len..CHUNK_HEADER_SIZE + len + TAG_SIZE]
            .copy_from_slice(&tag);

        self.pending_prefix = None;
        self.next_index += 1;

        self.sink
            .write_all(&self.staging[..CHUNK_HEADER_SIZE + len + TAG_SIZE])
    }

    /// Seals the buffered remainder as the final frame and returns the
    /// sink. The final frame is emitted even when nothing was written; an
    /// opener treats a stream without one as truncated.
    pub(crate) fn finish(mut self) -> io::Result<W> {
        self.bail_if_failed()?;
        let end = self.buf.len();
        debug_assert!(end <= self.chunk_size);
        if let Err(e) = self.flush_chunk(0, end, true) {
            self.failed = Some(e.kind());
            return Err(e);
        }
        Ok(self.sink)
    }
}

impl<W: Write> Write for Encryptor<W> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.bail_if_failed()?;
        if data.is_empty() {
            return Ok(0);
        }

        self.buf.extend_from_slice(data);

        let cs = self.chunk_size;
        let mut start = 0;
        while start + cs < self.buf.len() {
            if let Err(e) = self.flush_chunk(start, start + cs, false) {
                self.failed = Some(e.kind());
                return Err(e);
            }
            start += cs;
        }
        if start > 0 {
            self.buf.drain(..start);
        }

        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.bail_if_failed()?;
        self.sink.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chacha20poly1305::aead::{Aead, KeyInit, Payload};

    fn test_aead() -> ChaCha20Poly1305 {
        ChaCha20Poly1305::new(&[0x42u8; 32].into())
    }

    /// Splits `sealed` (after `prefix_len` bytes) into (header_index, body)
    /// frames, assuming every non-final frame carries `chunk_size` bytes.
    fn walk_frames(sealed: &[u8], prefix_len: usize, chunk_size: usize) -> Vec<(u32, Vec<u8>)> {
        let mut frames = Vec::new();
        let mut rest = &sealed[prefix_len..];
        loop {
            let header = u32::from_le_bytes(rest[..4].try_into().unwrap());
            if header == FINAL_CHUNK_INDEX {
                frames.push((header, rest[4..].to_vec()));
                return frames;
            }
            let frame_len = 4 + chunk_size + TAG_SIZE;
            frames.push((header, rest[4..frame_len].to_vec()));
            rest = &rest[frame_len..];
        }
    }

    #[test]
    fn frames_and_prefix_layout() {
        let mut enc = Encryptor::new(Vec::new(), 4, test_aead(), b"PFX".to_vec());
        assert_eq!(enc.write(&[1, 2, 3, 4, 5, 6, 7, 8, 9, 10]).unwrap(), 10);
        let sealed = enc.finish().unwrap();

        assert_eq!(&sealed[..3], b"PFX");
        let frames = walk_frames(&sealed, 3, 4);
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].0, 0);
        assert_eq!(frames[1].0, 1);
        assert_eq!(frames[2].0, FINAL_CHUNK_INDEX);
        // full frames carry 4 plaintext bytes, the final frame the 2 left over
        assert_eq!(frames[0].1.len(), 4 + TAG_SIZE);
        assert_eq!(frames[2].1.len(), 2 + TAG_SIZE);
    }

    #[test]
    fn exact_multiple_keeps_final_payload() {
        let mut enc = Encryptor::new(Vec::new(), 4, test_aead(), Vec::new());
        enc.write(&[0u8; 8]).unwrap();
        let sealed = enc.finish().unwrap();

        let frames = walk_frames(&sealed, 0, 4);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].0, 0);
        assert_eq!(frames[1].0, FINAL_CHUNK_INDEX);
        assert_eq!(frames[1].1.len(), 4 + TAG_SIZE);
    }

    #[test]
    fn empty_stream_is_one_empty_final_frame() {
        let enc = Encryptor::new(Vec::new(), 8, test_aead(), b"hdr".to_vec());
        let sealed = enc.finish().unwrap();

        assert_eq!(&sealed[..3], b"hdr");
        let frames = walk_frames(&sealed, 3, 8);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].0, FINAL_CHUNK_INDEX);
        assert_eq!(frames[0].1.len(), TAG_SIZE);
    }

    #[test]
    fn frame_zero_binds_prefix_as_aad() {
        let prefix = b"bound".to_vec();
        let mut enc = Encryptor::new(Vec::new(), 8, test_aead(), prefix.clone());
        enc.write(b"payload").unwrap();
        let sealed = enc.finish().unwrap();

        let frames = walk_frames(&sealed, prefix.len(), 8);
        let nonce: Nonce = chunk_nonce(0, true).into();

        let opened = test_aead().decrypt(
            &nonce,
            Payload {
                msg: &frames[0].1,
                aad: &prefix,
            },
        );
        assert_eq!(opened.unwrap(), b"payload");

        let wrong_aad = test_aead().decrypt(
            &nonce,
            Payload {
                msg: &frames[0].1,
                aad: b"other",
            },
        );
        assert!(wrong_aad.is_err());
    }

    #[test]
    fn later_frames_use_empty_aad() {
        let mut enc = Encryptor::new(Vec::new(), 2, test_aead(), b"p".to_vec());
        enc.write(&[9u8; 5]).unwrap();
        let sealed = enc.finish().unwrap();

        let frames = walk_frames(&sealed, 1, 2);
        let nonce: Nonce = chunk_nonce(1, false).into();
        let opened = test_aead()
            .decrypt(
                &nonce,
                Payload {
                    msg: &frames[1].1,
                    aad: &[],
                },
            )
            .unwrap();
        assert_eq!(opened, [9u8, 9]);
    }

    struct FailingSink;

    impl Write for FailingSink {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "sink gone"))
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn sink_error_poisons_writer() {
        let mut enc = Encryptor::new(FailingSink, 2, test_aead(), Vec::new());
        let err = enc.write(&[0u8; 10]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);

        // the writer stays failed even for writes that would not flush
        let err = enc.write(&[0u8; 1]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }
}
