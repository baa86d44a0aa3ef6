//! Codec callbacks supplied by the embedding layer.
//!
//! The message codec lives with the wire codec, outside this crate. The
//! session needs exactly one thing from it: the Subject of an assembled
//! message, used as the routing-key fallback when an incoming link has no
//! configured key.

use bytes::Bytes;

/// Callback extracting the Subject from an encoded 1.0 message.
type SubjectHook = Box<dyn FnMut(&[u8]) -> Option<Bytes> + Send + 'static>;

/// Callbacks bridging the session to the external message codec.
#[derive(Default)]
pub struct CodecHooks {
    /// Invoked once per completed incoming transfer to pick a routing key.
    pub subject: Option<SubjectHook>,
}

impl CodecHooks {
    /// Build hooks from a subject extractor.
    #[must_use]
    pub fn with_subject(hook: impl FnMut(&[u8]) -> Option<Bytes> + Send + 'static) -> Self {
        Self {
            subject: Some(Box::new(hook)),
        }
    }

    /// Run the subject hook if registered.
    pub fn subject_of(&mut self, payload: &[u8]) -> Option<Bytes> {
        self.subject.as_mut().and_then(|hook| hook(payload))
    }
}
