//! SSH agent framing codec.
//!
//! Every agent message travels as `uint32 length || byte type || payload`.
//! The codec first reads the `u32` frame length, then decodes the frame body
//! using the specified `Input` type; encoding stamps the length prefix after
//! the body has been assembled. A buffer holding several complete frames
//! yields them one by one, and a partial frame stays buffered until the rest
//! arrives, so back-to-back small frames never mis-segment.

use std::marker::PhantomData;
use std::mem::size_of;

use byteorder::{BigEndian, ReadBytesExt};
use ssh_encoding::{Decode, Encode};
use tokio_util::bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::AgentError;
use crate::proto::ProtoError;

/// Hard ceiling on the serialized size of a single message, in either
/// direction.
pub const MAX_MESSAGE_SIZE: usize = 256 * 1024;

/// Framing codec parameterized over the decoded input and encoded output
/// message types.
#[derive(Debug)]
pub struct Codec<Input, Output>(PhantomData<Input>, PhantomData<Output>)
where
    Input: Decode,
    Output: Encode,
    AgentError: From<Input::Error>;

impl<Input, Output> Default for Codec<Input, Output>
where
    Input: Decode,
    Output: Encode,
    AgentError: From<Input::Error>,
{
    fn default() -> Self {
        Self(PhantomData, PhantomData)
    }
}

impl<Input, Output> Decoder for Codec<Input, Output>
where
    Input: Decode,
    Output: Encode,
    AgentError: From<Input::Error>,
{
    type Item = Input;
    type Error = AgentError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let mut bytes = &src[..];

        if bytes.len() < size_of::<u32>() {
            return Ok(None);
        }

        let length = bytes.read_u32::<BigEndian>()? as usize;

        if length > MAX_MESSAGE_SIZE {
            return Err(ProtoError::MessageTooLarge { size: length }.into());
        }

        if bytes.len() < length {
            return Ok(None);
        }

        // Consume the whole frame up front: a parse failure inside the body
        // must not desynchronize the stream from the next frame boundary.
        let frame = src.split_to(size_of::<u32>() + length);
        let mut body = &frame[size_of::<u32>()..];
        let message = Self::Item::decode(&mut body)?;
        Ok(Some(message))
    }
}

impl<Input, Output> Encoder<Output> for Codec<Input, Output>
where
    Input: Decode,
    Output: Encode,
    AgentError: From<Input::Error>,
{
    type Error = AgentError;

    fn encode(&mut self, item: Output, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let mut bytes = Vec::new();

        let len = item.encoded_len().map_err(ProtoError::SshEncoding)?;
        if len > MAX_MESSAGE_SIZE {
            return Err(ProtoError::MessageTooLarge { size: len }.into());
        }

        (len as u32)
            .encode(&mut bytes)
            .map_err(ProtoError::SshEncoding)?;
        item.encode(&mut bytes).map_err(ProtoError::SshEncoding)?;
        dst.put(&*bytes);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use testresult::TestResult;

    use super::*;
    use crate::proto::{Request, Response};

    type AgentCodec = Codec<Request, Response>;

    fn encoded(request: &Request) -> Vec<u8> {
        let mut payload = Vec::new();
        request.encode(&mut payload).unwrap();
        let mut wire = Vec::new();
        (payload.len() as u32).encode(&mut wire).unwrap();
        wire.extend_from_slice(&payload);
        wire
    }

    #[test]
    fn partial_frame_stays_buffered() -> TestResult {
        let wire = encoded(&Request::RequestIdentities);
        let mut codec = AgentCodec::default();
        let mut buffer = BytesMut::new();

        // First burst is under the 5-byte minimum frame.
        buffer.extend_from_slice(&wire[..3]);
        assert!(codec.decode(&mut buffer)?.is_none());

        buffer.extend_from_slice(&wire[3..]);
        assert_eq!(codec.decode(&mut buffer)?, Some(Request::RequestIdentities));
        assert!(buffer.is_empty());
        Ok(())
    }

    #[test]
    fn two_frames_in_one_read_both_parse() -> TestResult {
        let mut wire = encoded(&Request::RequestIdentities);
        wire.extend_from_slice(&encoded(&Request::RemoveAllIdentities));

        let mut codec = AgentCodec::default();
        let mut buffer = BytesMut::from(&wire[..]);
        assert_eq!(codec.decode(&mut buffer)?, Some(Request::RequestIdentities));
        assert_eq!(
            codec.decode(&mut buffer)?,
            Some(Request::RemoveAllIdentities)
        );
        assert_eq!(codec.decode(&mut buffer)?, None);
        Ok(())
    }

    #[test]
    fn oversized_claimed_length_is_rejected() {
        let mut codec = AgentCodec::default();
        let mut buffer = BytesMut::from(&[0xff, 0xff, 0xff, 0xff, 11][..]);
        assert!(codec.decode(&mut buffer).is_err());
    }
}
