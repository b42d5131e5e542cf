use crate::cfr::Variant;
use crate::cfr::node::InfoSetNode;
use crate::cfr::node::Nodes;
use byteorder::LittleEndian;
use byteorder::ReadBytesExt;
use byteorder::WriteBytesExt;
use std::io::Read;
use std::io::Write;

/// a simulation's solver state at a wave boundary, serialisable to a
/// versioned little-endian blob:
///   header   schema_version:u32  iteration:u32  variant_tag:u8  node_count:u64
///   node     key_len:u32  key_bytes  arity:u32  regret:f64[arity]  strategy:f64[arity]
///   trailer  len:u32  bytes   (the master sampling seed for sampled variants)
#[derive(Debug, Clone, PartialEq)]
pub struct Checkpoint {
    pub iteration: u32,
    pub variant: Variant,
    pub nodes: Nodes,
    pub seed: Option<u64>,
}

impl Checkpoint {
    pub fn encode(&self) -> Result<Vec<u8>, String> {
        let mut blob = Vec::new();
        let err = |e: std::io::Error| e.to_string();
        blob.write_u32::<LittleEndian>(crate::CHECKPOINT_VERSION)
            .map_err(err)?;
        blob.write_u32::<LittleEndian>(self.iteration).map_err(err)?;
        blob.write_u8(self.variant.tag()).map_err(err)?;
        blob.write_u64::<LittleEndian>(self.nodes.len() as u64)
            .map_err(err)?;
        for (key, node) in self.nodes.iter() {
            let key = key.to_string();
            blob.write_u32::<LittleEndian>(key.len() as u32).map_err(err)?;
            blob.write_all(key.as_bytes()).map_err(err)?;
            blob.write_u32::<LittleEndian>(node.arity() as u32)
                .map_err(err)?;
            for r in node.regret() {
                blob.write_f64::<LittleEndian>(*r).map_err(err)?;
            }
            for s in node.strategy() {
                blob.write_f64::<LittleEndian>(*s).map_err(err)?;
            }
        }
        match self.seed {
            Some(seed) => {
                blob.write_u32::<LittleEndian>(8).map_err(err)?;
                blob.write_u64::<LittleEndian>(seed).map_err(err)?;
            }
            None => blob.write_u32::<LittleEndian>(0).map_err(err)?,
        }
        Ok(blob)
    }

    pub fn decode(blob: &[u8]) -> Result<Self, String> {
        let ref mut reader = std::io::Cursor::new(blob);
        let err = |e: std::io::Error| format!("truncated checkpoint: {}", e);
        let version = reader.read_u32::<LittleEndian>().map_err(err)?;
        if version != crate::CHECKPOINT_VERSION {
            return Err(format!("bad checkpoint version: {}", version));
        }
        let iteration = reader.read_u32::<LittleEndian>().map_err(err)?;
        let variant = Variant::try_from(reader.read_u8().map_err(err)?)?;
        let count = reader.read_u64::<LittleEndian>().map_err(err)?;
        let mut nodes = Nodes::new();
        for _ in 0..count {
            let key_len = reader.read_u32::<LittleEndian>().map_err(err)? as usize;
            let mut key = vec![0u8; key_len];
            reader.read_exact(&mut key).map_err(err)?;
            let key = String::from_utf8(key)
                .map_err(|e| format!("checkpoint key not utf8: {}", e))?
                .parse()?;
            let arity = reader.read_u32::<LittleEndian>().map_err(err)? as usize;
            if arity == 0 {
                return Err(String::from("checkpoint node with zero arity"));
            }
            let mut regret = vec![0.0; arity];
            let mut strategy = vec![0.0; arity];
            for r in regret.iter_mut() {
                *r = reader.read_f64::<LittleEndian>().map_err(err)?;
            }
            for s in strategy.iter_mut() {
                *s = reader.read_f64::<LittleEndian>().map_err(err)?;
            }
            nodes.insert(key, InfoSetNode::from_parts(regret, strategy));
        }
        let trailer = reader.read_u32::<LittleEndian>().map_err(err)?;
        let seed = match trailer {
            0 => None,
            8 => Some(reader.read_u64::<LittleEndian>().map_err(err)?),
            n => return Err(format!("unexpected checkpoint trailer length: {}", n)),
        };
        Ok(Self {
            iteration,
            variant,
            nodes,
            seed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Arbitrary;
    use crate::gameplay::infoset::InfoSetKey;

    fn checkpoint() -> Checkpoint {
        let mut nodes = Nodes::new();
        for i in 0..16 {
            nodes.insert(
                InfoSetKey::random(),
                InfoSetNode::from_parts(
                    vec![i as f64, -1.5, 0.25],
                    vec![0.0, 2.0, 4.0],
                ),
            );
        }
        Checkpoint {
            iteration: 50,
            variant: Variant::ChanceSampling,
            nodes,
            seed: Some(0xDEADBEEF),
        }
    }

    #[test]
    fn roundtrip_is_byte_identical() {
        let original = checkpoint();
        let blob = original.encode().unwrap();
        let decoded = Checkpoint::decode(&blob).unwrap();
        assert!(decoded == original);
        assert!(decoded.encode().unwrap() == blob);
    }

    #[test]
    fn vanilla_has_no_trailer_seed() {
        let checkpoint = Checkpoint {
            iteration: 1,
            variant: Variant::Vanilla,
            nodes: Nodes::new(),
            seed: None,
        };
        let decoded = Checkpoint::decode(&checkpoint.encode().unwrap()).unwrap();
        assert!(decoded.seed.is_none());
    }

    #[test]
    fn bad_version_is_rejected() {
        let mut blob = checkpoint().encode().unwrap();
        blob[0] = 0xFF;
        assert!(Checkpoint::decode(&blob).is_err());
    }

    #[test]
    fn truncation_is_rejected() {
        let blob = checkpoint().encode().unwrap();
        assert!(Checkpoint::decode(&blob[..blob.len() / 2]).is_err());
    }
}
