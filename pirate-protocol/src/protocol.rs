//! PPP protocol definitions and message types

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::ops::Index;
use uuid::Uuid;

use crate::error::ProtocolError;

/// Signals that a worker is ready for work
pub const PPP_READY: &[u8] = b"\x01";

/// Signals that a peer is still alive
pub const PPP_HEARTBEAT: &[u8] = b"\x02";

/// Single-frame control signals exchanged between broker and workers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Ready,
    Heartbeat,
}

impl Signal {
    /// Parse a control frame
    pub fn from_frame(frame: &[u8]) -> Option<Self> {
        match frame {
            PPP_READY => Some(Signal::Ready),
            PPP_HEARTBEAT => Some(Signal::Heartbeat),
            _ => None,
        }
    }

    /// Frame carrying this signal
    pub fn frame(self) -> Bytes {
        match self {
            Signal::Ready => Bytes::from_static(PPP_READY),
            Signal::Heartbeat => Bytes::from_static(PPP_HEARTBEAT),
        }
    }

    /// Single-frame message carrying this signal
    pub fn message(self) -> Multipart {
        Multipart::from(vec![self.frame()])
    }
}

/// Opaque address token of a peer on a router
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Identity(Bytes);

impl Identity {
    /// Wrap raw identity bytes
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    /// Generate a fresh random identity
    pub fn random() -> Self {
        Self(Bytes::copy_from_slice(Uuid::new_v4().as_bytes()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Frame addressing this peer
    pub fn to_frame(&self) -> Bytes {
        self.0.clone()
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match Uuid::from_slice(&self.0) {
            Ok(uuid) => write!(f, "{}", uuid),
            Err(_) => {
                for byte in self.0.iter() {
                    write!(f, "{:02x}", byte)?;
                }
                Ok(())
            }
        }
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identity({})", self)
    }
}

/// An atomic, ordered sequence of frames
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Multipart {
    frames: VecDeque<Bytes>,
}

impl Multipart {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Bytes> {
        self.frames.get(index)
    }

    pub fn first(&self) -> Option<&Bytes> {
        self.frames.front()
    }

    pub fn last(&self) -> Option<&Bytes> {
        self.frames.back()
    }

    pub fn push_front(&mut self, frame: impl Into<Bytes>) {
        self.frames.push_front(frame.into());
    }

    pub fn push_back(&mut self, frame: impl Into<Bytes>) {
        self.frames.push_back(frame.into());
    }

    pub fn pop_front(&mut self) -> Option<Bytes> {
        self.frames.pop_front()
    }

    pub fn pop_back(&mut self) -> Option<Bytes> {
        self.frames.pop_back()
    }

    /// Remove the frame at `index`, shifting later frames forward
    pub fn remove(&mut self, index: usize) -> Option<Bytes> {
        self.frames.remove(index)
    }

    /// Detach the leading address frame
    pub fn unwrap_identity(&mut self) -> Option<Identity> {
        self.frames.pop_front().map(Identity)
    }

    /// Prefix the message with an address frame
    pub fn wrap(&mut self, identity: &Identity) {
        self.frames.push_front(identity.to_frame());
    }

    pub fn iter(&self) -> impl Iterator<Item = &Bytes> {
        self.frames.iter()
    }

    pub fn into_frames(self) -> Vec<Bytes> {
        self.frames.into()
    }
}

impl From<Vec<Bytes>> for Multipart {
    fn from(frames: Vec<Bytes>) -> Self {
        Self {
            frames: frames.into(),
        }
    }
}

impl FromIterator<Bytes> for Multipart {
    fn from_iter<I: IntoIterator<Item = Bytes>>(iter: I) -> Self {
        Self {
            frames: iter.into_iter().collect(),
        }
    }
}

impl Index<usize> for Multipart {
    type Output = Bytes;

    fn index(&self, index: usize) -> &Bytes {
        &self.frames[index]
    }
}

impl fmt::Debug for Multipart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut list = f.debug_list();
        for frame in &self.frames {
            match std::str::from_utf8(frame) {
                Ok(text) if frame.iter().all(|b| !b.is_ascii_control()) => {
                    list.entry(&text);
                }
                _ => {
                    list.entry(&format_args!("<{} bytes>", frame.len()));
                }
            }
        }
        list.finish()
    }
}

/// Capability configuration a worker announces right after READY
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerConfiguration {
    pub supported_languages: Vec<i64>,
    pub is_config_worker: bool,
}

impl WorkerConfiguration {
    pub fn new(supported_languages: Vec<i64>, is_config_worker: bool) -> Self {
        Self {
            supported_languages,
            is_config_worker,
        }
    }

    pub fn to_frame(&self) -> Result<Bytes, ProtocolError> {
        Ok(Bytes::from(serde_json::to_vec(self)?))
    }

    pub fn from_frame(frame: &[u8]) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_slice(frame)?)
    }
}

/// A message type that can travel inside an [`Envelope`]
pub trait TypedMessage: Serialize + DeserializeOwned {
    /// Message name used as the envelope type tag
    const TYPE_TAG: &'static str;
}

/// Tag of the empty acknowledgement message
pub const EMPTY_TYPE_TAG: &str = "Empty";

/// Self-describing container for typed request and response payloads
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub type_tag: String,
    #[serde(with = "base64_payload")]
    pub payload: Vec<u8>,
}

impl Envelope {
    /// Create an envelope from a tag and already encoded bytes
    pub fn new(type_tag: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            type_tag: type_tag.into(),
            payload,
        }
    }

    /// Empty acknowledgement
    pub fn empty() -> Self {
        Self::new(EMPTY_TYPE_TAG, Vec::new())
    }

    /// Encode a typed message
    pub fn pack<T: TypedMessage>(message: &T) -> Result<Self, ProtocolError> {
        Ok(Self::new(T::TYPE_TAG, serde_json::to_vec(message)?))
    }

    /// Decode the payload as `T`, checking the tag first
    pub fn unpack<T: TypedMessage>(&self) -> Result<T, ProtocolError> {
        if !self.is::<T>() {
            return Err(ProtocolError::InvalidMessage(format!(
                "expected {} but envelope carries {}",
                T::TYPE_TAG,
                self.type_tag
            )));
        }
        Ok(serde_json::from_slice(&self.payload)?)
    }

    /// Whether the envelope carries a `T`
    pub fn is<T: TypedMessage>(&self) -> bool {
        self.message_name() == T::TYPE_TAG
    }

    pub fn is_empty(&self) -> bool {
        self.message_name() == EMPTY_TYPE_TAG
    }

    /// Unqualified message name: the part of the tag after the last `/` or `.`
    pub fn message_name(&self) -> &str {
        self.type_tag
            .rsplit(|c: char| c == '/' || c == '.')
            .next()
            .unwrap_or(self.type_tag.as_str())
    }

    pub fn to_frame(&self) -> Result<Bytes, ProtocolError> {
        Ok(Bytes::from(serde_json::to_vec(self)?))
    }

    pub fn from_frame(frame: &[u8]) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_slice(frame)?)
    }
}

mod base64_payload {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(payload: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&STANDARD.encode(payload))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct EvaluateRequest {
        solution: Vec<u8>,
    }

    impl TypedMessage for EvaluateRequest {
        const TYPE_TAG: &'static str = "EvaluateRequest";
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct MutateRequest {
        rate: f64,
    }

    impl TypedMessage for MutateRequest {
        const TYPE_TAG: &'static str = "MutateRequest";
    }

    #[test]
    fn test_signal_frames() {
        assert_eq!(Signal::from_frame(&[0x01]), Some(Signal::Ready));
        assert_eq!(Signal::from_frame(&[0x02]), Some(Signal::Heartbeat));
        assert_eq!(Signal::from_frame(&[0x03]), None);
        assert_eq!(Signal::from_frame(b"\x01\x02"), None);
        assert_eq!(Signal::Heartbeat.message().len(), 1);
    }

    #[test]
    fn test_identity_display() {
        let identity = Identity::random();
        assert_eq!(identity.as_bytes().len(), 16);
        assert!(Uuid::parse_str(&identity.to_string()).is_ok());

        let short = Identity::new(Bytes::from_static(&[0xab, 0x01]));
        assert_eq!(short.to_string(), "ab01");
    }

    #[test]
    fn test_multipart_wrap_unwrap() {
        let worker = Identity::new(Bytes::from_static(b"w1"));
        let mut msg = Multipart::from(vec![Bytes::from_static(b"client"), Bytes::new()]);

        msg.wrap(&worker);
        assert_eq!(msg.len(), 3);
        assert_eq!(msg.unwrap_identity(), Some(worker));
        assert_eq!(msg.first().map(|f| f.as_ref()), Some(&b"client"[..]));
    }

    #[test]
    fn test_multipart_remove_keeps_order() {
        let mut msg: Multipart = ["a", "b", "c", "d"]
            .into_iter()
            .map(|s| Bytes::from_static(s.as_bytes()))
            .collect();
        assert_eq!(msg.remove(2), Some(Bytes::from_static(b"c")));
        let frames = msg.into_frames();
        assert_eq!(
            frames,
            vec![
                Bytes::from_static(b"a"),
                Bytes::from_static(b"b"),
                Bytes::from_static(b"d")
            ]
        );
    }

    #[test]
    fn test_worker_configuration_frame() {
        let config = WorkerConfiguration::new(vec![0, 7], true);
        let frame = config.to_frame().unwrap();
        assert_eq!(WorkerConfiguration::from_frame(&frame).unwrap(), config);
        assert!(WorkerConfiguration::from_frame(b"not json").is_err());
    }

    #[test]
    fn test_envelope_pack_unpack() {
        let request = EvaluateRequest {
            solution: vec![1, 2, 3],
        };
        let envelope = Envelope::pack(&request).unwrap();
        assert!(envelope.is::<EvaluateRequest>());
        assert!(!envelope.is::<MutateRequest>());

        let frame = envelope.to_frame().unwrap();
        let decoded = Envelope::from_frame(&frame).unwrap();
        assert_eq!(decoded.unpack::<EvaluateRequest>().unwrap(), request);
        assert!(matches!(
            decoded.unpack::<MutateRequest>(),
            Err(ProtocolError::InvalidMessage(_))
        ));
    }

    #[test]
    fn test_envelope_message_name_strips_namespace() {
        let envelope = Envelope::new("type.example.com/optimization.messages.MutateRequest", vec![]);
        assert_eq!(envelope.message_name(), "MutateRequest");
        assert!(envelope.is::<MutateRequest>());

        assert_eq!(Envelope::new("Plain", vec![]).message_name(), "Plain");
        assert!(Envelope::empty().is_empty());
    }

    #[test]
    fn test_envelope_payload_is_base64() {
        let envelope = Envelope::new("Raw", vec![0xff, 0x00]);
        let json: serde_json::Value = serde_json::from_slice(&envelope.to_frame().unwrap()).unwrap();
        assert_eq!(json["payload"], "/wA=");
        assert_eq!(json["type_tag"], "Raw");
    }
}
