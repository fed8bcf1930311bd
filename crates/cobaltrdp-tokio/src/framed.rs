use std::io;

use bytes::{Bytes, BytesMut};
use cobaltrdp_pdu::{Action, PduHint};
use tokio::io::{AsyncRead, AsyncReadExt as _, AsyncWrite, AsyncWriteExt as _};

/// Buffered framing over a byte stream, reading exactly one PDU at a time.
///
/// `read_exact`, `read_pdu` and `read_by_hint` are cancel safe: when the
/// enclosing future is dropped, partially received bytes stay in the
/// internal buffer and the next call resumes from them. `write_all` is not
/// cancel safe.
pub struct Framed<S> {
    stream: S,
    buf: BytesMut,
}

impl<S> Framed<S> {
    pub fn new(stream: S) -> Self {
        Self::new_with_leftover(stream, BytesMut::new())
    }

    pub fn new_with_leftover(stream: S, leftover: BytesMut) -> Self {
        Self { stream, buf: leftover }
    }

    pub fn into_inner(self) -> (S, BytesMut) {
        (self.stream, self.buf)
    }

    /// Returns the inner stream, asserting no byte is lost in the buffer.
    pub fn into_inner_no_leftover(self) -> S {
        let (stream, leftover) = self.into_inner();
        debug_assert_eq!(leftover.len(), 0, "unexpected leftover");
        stream
    }

    pub fn peek(&self) -> &[u8] {
        &self.buf
    }
}

impl<S> Framed<S>
where
    S: AsyncRead + Unpin,
{
    /// Accumulates at least `length` bytes and returns exactly `length`
    /// bytes, keeping the leftover in the internal buffer.
    pub async fn read_exact(&mut self, length: usize) -> io::Result<BytesMut> {
        loop {
            if self.buf.len() >= length {
                return Ok(self.buf.split_to(length));
            }

            self.buf.reserve(length - self.buf.len());

            let len = self.read().await?;

            if len == 0 {
                return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "not enough bytes"));
            }
        }
    }

    /// Reads one standard RDP frame (fast-path or TPKT).
    pub async fn read_pdu(&mut self) -> io::Result<(Action, BytesMut)> {
        loop {
            // Try decoding and see whether a frame has been received already.
            match cobaltrdp_pdu::find_size(self.peek()) {
                Ok(Some(pdu_info)) => {
                    let frame = self.read_exact(pdu_info.length).await?;

                    return Ok((pdu_info.action, frame));
                }
                Ok(None) => {
                    let len = self.read().await?;

                    if len == 0 {
                        return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "not enough bytes"));
                    }
                }
                Err(e) => return Err(io::Error::new(io::ErrorKind::InvalidData, e)),
            };
        }
    }

    /// Reads one frame using the provided hint, discarding frames of other
    /// kinds.
    pub async fn read_by_hint(&mut self, hint: &dyn PduHint) -> io::Result<Bytes> {
        loop {
            match hint
                .find_size(self.peek())
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?
            {
                Some((matched, length)) => {
                    let bytes = self.read_exact(length).await?.freeze();
                    if matched {
                        return Ok(bytes);
                    } else {
                        debug!("Received and lost an unexpected PDU");
                    }
                }
                None => {
                    let len = self.read().await?;

                    if len == 0 {
                        return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "not enough bytes"));
                    }
                }
            };
        }
    }

    async fn read(&mut self) -> io::Result<usize> {
        self.stream.read_buf(&mut self.buf).await
    }
}

impl<S> Framed<S>
where
    S: AsyncWrite + Unpin,
{
    pub async fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.stream.write_all(buf).await?;
        self.stream.flush().await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn read_pdu_waits_for_a_full_frame() {
        let frame = [0x03u8, 0x00, 0x00, 0x08, 0x02, 0xf0, 0x80, 0xaa];
        let (client, mut server) = tokio::io::duplex(64);

        let mut framed = Framed::new(client);

        tokio::io::AsyncWriteExt::write_all(&mut server, &frame[..5]).await.unwrap();
        tokio::io::AsyncWriteExt::write_all(&mut server, &frame[5..]).await.unwrap();

        let (action, received) = framed.read_pdu().await.unwrap();
        assert_eq!(action, Action::X224);
        assert_eq!(&received[..], frame);
    }

    #[tokio::test]
    async fn leftover_is_kept_between_frames() {
        let frame_a = [0x00u8, 0x04, 0xaa, 0xbb];
        let frame_b = [0x00u8, 0x03, 0xcc];
        let (client, mut server) = tokio::io::duplex(64);

        let mut framed = Framed::new(client);

        let mut both = frame_a.to_vec();
        both.extend_from_slice(&frame_b);
        tokio::io::AsyncWriteExt::write_all(&mut server, &both).await.unwrap();

        let (action, received) = framed.read_pdu().await.unwrap();
        assert_eq!(action, Action::FastPath);
        assert_eq!(&received[..], frame_a);

        let (_, received) = framed.read_pdu().await.unwrap();
        assert_eq!(&received[..], frame_b);
    }
}
