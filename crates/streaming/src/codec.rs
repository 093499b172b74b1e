//! Length-prefixed frame codec.
//!
//! A frame is a 4-byte big-endian body length followed by the `bincode`
//! encoding of one [`Message`].

use crate::error::{Result, StreamingError};
use crate::protocol::Message;
use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Largest accepted frame body.
pub const MAX_FRAME_LEN: usize = 10 * 1024 * 1024;

const HEADER_LEN: usize = 4;

/// Encodes `msg` into a complete frame.
pub fn encode(msg: &Message) -> Result<Bytes> {
    let body = bincode::serialize(msg)?;
    if body.len() > MAX_FRAME_LEN {
        return Err(StreamingError::FrameTooLarge(body.len()));
    }
    let mut frame = BytesMut::with_capacity(HEADER_LEN + body.len());
    frame.put_u32(body.len() as u32);
    frame.put_slice(&body);
    Ok(frame.freeze())
}

/// Decodes a frame body (without its length header).
pub fn decode(body: &[u8]) -> Result<Message> {
    Ok(bincode::deserialize(body)?)
}

pub async fn write_frame<W>(writer: &mut W, msg: &Message) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let frame = encode(msg)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

pub async fn read_frame<R>(reader: &mut R) -> Result<Message>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; HEADER_LEN];
    reader.read_exact(&mut header).await?;
    let len = u32::from_be_bytes(header) as usize;
    if len > MAX_FRAME_LEN {
        return Err(StreamingError::FrameTooLarge(len));
    }
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    decode(&body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{MessageType, Payload};
    use corelib::Address;

    fn sample() -> Message {
        Message::request(
            MessageType::Insert,
            Address::localhost(9000),
            Address::localhost(5000),
            Payload::pair("alice", "1"),
        )
        .with_countdown(2)
        .with_responsible(Address::localhost(5001))
    }

    #[test]
    fn test_frame_header_is_body_length() {
        let frame = encode(&sample()).unwrap();
        let len = u32::from_be_bytes(frame[..4].try_into().unwrap()) as usize;
        assert_eq!(len, frame.len() - HEADER_LEN);
        assert_eq!(decode(&frame[HEADER_LEN..]).unwrap(), sample());
    }

    #[tokio::test]
    async fn test_read_frame_from_stream() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        write_frame(&mut client, &sample()).await.unwrap();
        let msg = read_frame(&mut server).await.unwrap();
        assert_eq!(msg, sample());
    }

    #[tokio::test]
    async fn test_oversized_header_is_rejected() {
        let (mut client, mut server) = tokio::io::duplex(64);
        client
            .write_all(&((MAX_FRAME_LEN as u32) + 1).to_be_bytes())
            .await
            .unwrap();
        let err = read_frame(&mut server).await.unwrap_err();
        assert!(matches!(err, StreamingError::FrameTooLarge(_)));
    }

    #[tokio::test]
    async fn test_truncated_frame_is_an_io_error() {
        let (mut client, mut server) = tokio::io::duplex(64);
        client.write_all(&8u32.to_be_bytes()).await.unwrap();
        client.write_all(&[1, 2]).await.unwrap();
        drop(client);
        let err = read_frame(&mut server).await.unwrap_err();
        assert!(matches!(err, StreamingError::Io(_)));
    }
}
