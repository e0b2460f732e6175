use std::io::Write;

use rand::RngCore;

use crate::buffer::BufferPool;
use crate::ws::config::Config;
use crate::ws::header::FrameHeader;
use crate::ws::mask::{generate_mask_key, Mask};
use crate::ws::protocol::{OpCode, MAX_CONTROL_PAYLOAD};
use crate::ws::Error;

/// Send half of the protocol: turns messages into frames.
///
/// Every frame is laid out in a pooled scratch buffer (header followed by the, possibly
/// masked, payload) and handed to the stream with a single `write_all` so frames never
/// interleave. The encoder is not reentrant, callers sharing one across threads must
/// serialise access.
#[derive(Debug)]
pub struct Encoder<R> {
    masking: bool,
    fragment_size: usize,
    rng: R,
    pool: BufferPool,
}

impl<R: RngCore> Encoder<R> {
    pub fn new(config: &Config, rng: R, pool: BufferPool) -> Encoder<R> {
        Self {
            masking: config.role.masks_outgoing(),
            fragment_size: config.fragment_size,
            rng,
            pool,
        }
    }

    #[inline]
    pub const fn fragment_size(&self) -> usize {
        self.fragment_size
    }

    /// `0` disables fragmentation.
    #[inline]
    pub fn set_fragment_size(&mut self, fragment_size: usize) {
        self.fragment_size = fragment_size;
    }

    /// Sends a whole message, split into fragments if it is larger than the fragment
    /// size. Returns the number of payload bytes written.
    pub fn send<S: Write + ?Sized>(&mut self, stream: &mut S, op_code: OpCode, payload: &[u8]) -> Result<usize, Error> {
        if op_code == OpCode::Continuation {
            return Err(Error::UnexpectedOpCode(op_code));
        }

        let limit = self.fragment_size;
        if limit == 0 || payload.len() <= limit {
            return self.send_frame(stream, true, op_code, payload);
        }
        if op_code.is_control() {
            return Err(Error::NotFragmentable(op_code, payload.len()));
        }

        let fragments = payload.len().div_ceil(limit);
        let mut written = 0;
        for (i, fragment) in payload.chunks(limit).enumerate() {
            let fin = i + 1 == fragments;
            let op_code = if i == 0 { op_code } else { OpCode::Continuation };
            written += self.send_frame(stream, fin, op_code, fragment)?;
        }
        Ok(written)
    }

    /// Sends a ping, pong or close frame.
    pub fn send_control<S: Write + ?Sized>(&mut self, stream: &mut S, op_code: OpCode, payload: &[u8]) -> Result<usize, Error> {
        if !op_code.is_control() {
            return Err(Error::UnexpectedOpCode(op_code));
        }
        self.send_frame(stream, true, op_code, payload)
    }

    /// Sends exactly one frame. Control frames are validated before anything reaches
    /// the stream.
    pub fn send_frame<S: Write + ?Sized>(
        &mut self,
        stream: &mut S,
        fin: bool,
        op_code: OpCode,
        payload: &[u8],
    ) -> Result<usize, Error> {
        if op_code.is_control() {
            if !fin {
                return Err(Error::NotFragmentable(op_code, payload.len()));
            }
            if payload.len() > MAX_CONTROL_PAYLOAD {
                return Err(Error::ControlPayloadTooLarge(payload.len()));
            }
        }

        let mask_key = self.masking.then(|| generate_mask_key(&mut self.rng));
        let header = FrameHeader::new(fin, op_code, payload.len() as u64, mask_key);

        let mut buf = self.pool.acquire();
        header.encode(&mut buf);
        match mask_key {
            Some(key) => buf.put_masked(&mut Mask::new(key), payload),
            None => buf.put_slice(payload),
        }

        stream.write_all(buf.view())?;
        stream.flush()?;
        Ok(payload.len())
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::io::Cursor;

    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;
    use crate::ws::config::Role;

    fn encoder(role: Role, fragment_size: usize) -> Encoder<StdRng> {
        let config = Config::new(role).with_fragment_size(fragment_size);
        Encoder::new(&config, StdRng::seed_from_u64(42), BufferPool::default())
    }

    /// Splits raw bytes back into (header, unmasked payload) pairs.
    fn frames(bytes: &[u8]) -> Vec<(FrameHeader, Vec<u8>)> {
        let mut cursor = Cursor::new(bytes);
        let mut frames = Vec::new();
        while let Some(header) = FrameHeader::try_decode(&mut cursor).expect("unable to decode header") {
            let start = cursor.position() as usize;
            let end = start + header.payload_length as usize;
            let mut payload = bytes[start..end].to_vec();
            if let Some(key) = header.mask_key {
                Mask::new(key).apply(&mut payload);
            }
            cursor.set_position(end as u64);
            frames.push((header, payload));
        }
        frames
    }

    struct CountingWriter {
        writes: usize,
        bytes: Vec<u8>,
    }

    impl Write for CountingWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.writes += 1;
            self.bytes.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn should_send_single_unmasked_frame_as_server() {
        let mut stream = Vec::new();
        let written = encoder(Role::Server, 0)
            .send(&mut stream, OpCode::Text, b"hello")
            .expect("unable to send");
        assert_eq!(5, written);
        assert_eq!(b"\x81\x05hello", stream.as_slice());
    }

    #[test]
    fn should_mask_as_client() {
        let mut stream = Vec::new();
        encoder(Role::Client, 0)
            .send(&mut stream, OpCode::Binary, b"hello")
            .expect("unable to send");

        assert_eq!(2 + 4 + 5, stream.len());
        assert_eq!(0x82, stream[0]);
        assert_eq!(0x85, stream[1]);
        assert_ne!(b"hello", &stream[6..]);

        let frames = frames(&stream);
        assert_eq!(1, frames.len());
        assert_eq!(b"hello", frames[0].1.as_slice());
    }

    #[test]
    fn should_draw_fresh_key_per_frame() {
        let mut stream = Vec::new();
        let mut encoder = encoder(Role::Client, 0);
        encoder.send(&mut stream, OpCode::Binary, b"a").expect("unable to send");
        encoder.send(&mut stream, OpCode::Binary, b"a").expect("unable to send");

        let frames = frames(&stream);
        assert_ne!(frames[0].0.mask_key, frames[1].0.mask_key);
    }

    #[test]
    fn should_split_into_first_middle_and_final_fragments() {
        let mut stream = Vec::new();
        let written = encoder(Role::Client, 4)
            .send(&mut stream, OpCode::Text, b"0123456789")
            .expect("unable to send");
        assert_eq!(10, written);

        let frames = frames(&stream);
        let shape: Vec<_> = frames.iter().map(|(h, p)| (h.fin, h.op_code, p.as_slice())).collect();
        assert_eq!(
            vec![
                (false, OpCode::Text, &b"0123"[..]),
                (false, OpCode::Continuation, &b"4567"[..]),
                (true, OpCode::Continuation, &b"89"[..]),
            ],
            shape
        );
    }

    #[test]
    fn should_split_exact_multiple_without_empty_tail() {
        let mut stream = Vec::new();
        encoder(Role::Server, 3)
            .send(&mut stream, OpCode::Binary, b"abcdef")
            .expect("unable to send");

        let frames = frames(&stream);
        assert_eq!(2, frames.len());
        assert_eq!((false, OpCode::Binary), (frames[0].0.fin, frames[0].0.op_code));
        assert_eq!((true, OpCode::Continuation), (frames[1].0.fin, frames[1].0.op_code));
        assert_eq!(b"def", frames[1].1.as_slice());
    }

    #[test]
    fn should_not_split_payload_equal_to_fragment_size() {
        let mut stream = Vec::new();
        encoder(Role::Server, 5)
            .send(&mut stream, OpCode::Text, b"hello")
            .expect("unable to send");
        assert_eq!(b"\x81\x05hello", stream.as_slice());
    }

    #[test]
    fn should_write_each_frame_in_one_call() {
        let mut stream = CountingWriter {
            writes: 0,
            bytes: Vec::new(),
        };
        encoder(Role::Client, 100)
            .send(&mut stream, OpCode::Binary, &[7u8; 250])
            .expect("unable to send");
        assert_eq!(3, stream.writes);
        assert_eq!(3, frames(&stream.bytes).len());
    }

    #[test]
    fn should_refuse_to_fragment_control_frames() {
        let mut stream = Vec::new();
        let err = encoder(Role::Server, 10)
            .send(&mut stream, OpCode::Ping, &[0u8; 11])
            .expect_err("expected not fragmentable");
        assert!(matches!(err, Error::NotFragmentable(OpCode::Ping, 11)));
        assert!(stream.is_empty());
    }

    #[test]
    fn should_fail_fast_on_oversized_control_payload() {
        let mut stream = Vec::new();
        let err = encoder(Role::Client, 0)
            .send_control(&mut stream, OpCode::Close, &[0u8; 126])
            .expect_err("expected control payload error");
        assert!(matches!(err, Error::ControlPayloadTooLarge(126)));
        assert!(stream.is_empty());
    }

    #[test]
    fn should_send_max_control_payload() {
        let mut stream = Vec::new();
        encoder(Role::Server, 0)
            .send_control(&mut stream, OpCode::Pong, &[1u8; 125])
            .expect("unable to send");
        assert_eq!(2 + 125, stream.len());
        assert_eq!(0x8A, stream[0]);
    }

    #[test]
    fn should_reject_continuation_as_message() {
        let mut stream = Vec::new();
        let err = encoder(Role::Server, 0)
            .send(&mut stream, OpCode::Continuation, b"x")
            .expect_err("expected unexpected op code");
        assert!(matches!(err, Error::UnexpectedOpCode(OpCode::Continuation)));
    }

    #[test]
    fn should_reject_data_op_code_as_control() {
        let mut stream = Vec::new();
        let err = encoder(Role::Server, 0)
            .send_control(&mut stream, OpCode::Text, b"x")
            .expect_err("expected unexpected op code");
        assert!(matches!(err, Error::UnexpectedOpCode(OpCode::Text)));
    }

    #[test]
    fn should_use_extended_lengths() {
        for length in [126usize, 65535, 65536] {
            let mut stream = Vec::new();
            encoder(Role::Server, 0)
                .send(&mut stream, OpCode::Binary, &vec![3u8; length])
                .expect("unable to send");
            let frames = frames(&stream);
            assert_eq!(length as u64, frames[0].0.payload_length);
            assert_eq!(length, frames[0].1.len());
        }
    }
}
