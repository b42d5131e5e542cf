use super::BusError;
use crate::ID;
use serde::Deserialize;
use serde::Serialize;
use serde::de::DeserializeOwned;

/// marker for trace identifiers, threaded through every envelope so a
/// task can be followed across processes in the logs
pub struct Trace;

/// self-describing wire frame. payloads are validated once, at this
/// boundary, and travel as typed values everywhere else.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub schema_version: u32,
    pub kind: String,
    pub payload: serde_json::Value,
    pub trace_id: ID<Trace>,
    pub enqueued_at: u64,
}

impl Envelope {
    pub fn pack<T: Serialize>(kind: &str, payload: &T) -> Result<Self, BusError> {
        Ok(Self {
            schema_version: crate::WIRE_SCHEMA_VERSION,
            kind: String::from(kind),
            payload: serde_json::to_value(payload).map_err(|e| BusError::Codec(e.to_string()))?,
            trace_id: ID::new(),
            enqueued_at: crate::clock(),
        })
    }

    pub fn open<T: DeserializeOwned>(&self) -> Result<T, BusError> {
        if self.schema_version != crate::WIRE_SCHEMA_VERSION {
            return Err(BusError::Codec(format!(
                "unsupported schema version: {}",
                self.schema_version
            )));
        }
        serde_json::from_value(self.payload.clone()).map_err(|e| BusError::Codec(e.to_string()))
    }

    pub fn encode(&self) -> Result<String, BusError> {
        serde_json::to_string(self).map_err(|e| BusError::Codec(e.to_string()))
    }
    pub fn decode(raw: &str) -> Result<Self, BusError> {
        serde_json::from_str(raw).map_err(|e| BusError::Codec(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Probe {
        n: usize,
        s: String,
    }

    #[test]
    fn pack_open_is_identity() {
        let probe = Probe {
            n: 42,
            s: String::from("hello"),
        };
        let envelope = Envelope::pack("probe", &probe).unwrap();
        assert!(envelope.schema_version == crate::WIRE_SCHEMA_VERSION);
        assert!(envelope.kind == "probe");
        assert!(envelope.open::<Probe>().unwrap() == probe);
    }

    #[test]
    fn encode_decode_is_identity() {
        let probe = Probe {
            n: 7,
            s: String::from("wire"),
        };
        let envelope = Envelope::pack("probe", &probe).unwrap();
        let raw = envelope.encode().unwrap();
        let back = Envelope::decode(&raw).unwrap();
        assert!(back.trace_id == envelope.trace_id);
        assert!(back.open::<Probe>().unwrap() == probe);
    }

    #[test]
    fn version_mismatch_is_rejected() {
        let mut envelope = Envelope::pack("probe", &0usize).unwrap();
        envelope.schema_version += 1;
        assert!(envelope.open::<usize>().is_err());
    }
}
