//! Transport messages

use bytes::Bytes;
use lumen_core::{LumenError, LumenResult};

/// Largest message body the transport accepts (256 KiB)
pub const MAX_MESSAGE_SIZE: usize = 256 * 1024;

/// How the message body is stored
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContentType {
    ByteArray,
    String,
}

#[derive(Clone, Debug)]
enum Content {
    Bytes(Bytes),
    Text(String),
}

/// A message handed to or received from the transport
#[derive(Clone, Debug)]
pub struct Message {
    content: Content,
}

impl Message {
    /// Create a byte-array message holding its own copy of `payload`
    pub fn from_payload(payload: &[u8]) -> LumenResult<Self> {
        check_size(payload.len())?;
        Ok(Message {
            content: Content::Bytes(Bytes::copy_from_slice(payload)),
        })
    }

    /// Create a byte-array message that takes ownership of `bytes`
    pub fn from_bytes(bytes: Bytes) -> LumenResult<Self> {
        check_size(bytes.len())?;
        Ok(Message {
            content: Content::Bytes(bytes),
        })
    }

    /// Create a string-typed message
    pub fn from_text(text: impl Into<String>) -> LumenResult<Self> {
        let text = text.into();
        check_size(text.len())?;
        Ok(Message {
            content: Content::Text(text),
        })
    }

    pub fn content_type(&self) -> ContentType {
        match self.content {
            Content::Bytes(_) => ContentType::ByteArray,
            Content::Text(_) => ContentType::String,
        }
    }

    /// Body of a byte-array message. String-typed messages have no byte array.
    pub fn byte_array(&self) -> LumenResult<&[u8]> {
        match &self.content {
            Content::Bytes(bytes) => Ok(&bytes[..]),
            Content::Text(_) => Err(LumenError::ContentTypeMismatch),
        }
    }

    /// Body length in bytes
    pub fn len(&self) -> usize {
        match &self.content {
            Content::Bytes(bytes) => bytes.len(),
            Content::Text(text) => text.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn check_size(size: usize) -> LumenResult<()> {
    if size > MAX_MESSAGE_SIZE {
        return Err(LumenError::MessageTooLarge {
            size,
            max: MAX_MESSAGE_SIZE,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_payload_copies() {
        let mut source = b"hello".to_vec();
        let message = Message::from_payload(&source).unwrap();
        source[0] = b'j';

        assert_eq!(message.byte_array().unwrap(), b"hello");
        assert_eq!(message.content_type(), ContentType::ByteArray);
    }

    #[test]
    fn test_size_limit() {
        let at_limit = vec![0u8; MAX_MESSAGE_SIZE];
        assert!(Message::from_payload(&at_limit).is_ok());

        let over = vec![0u8; MAX_MESSAGE_SIZE + 1];
        assert!(matches!(
            Message::from_payload(&over),
            Err(LumenError::MessageTooLarge { size, .. }) if size == MAX_MESSAGE_SIZE + 1
        ));
    }

    #[test]
    fn test_text_message_has_no_byte_array() {
        let message = Message::from_text("ResetDevice").unwrap();

        assert_eq!(message.content_type(), ContentType::String);
        assert!(matches!(message.byte_array(), Err(LumenError::ContentTypeMismatch)));
        assert_eq!(message.len(), 11);
    }
}
