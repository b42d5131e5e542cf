use super::action::Action;
use std::hash::Hash;
use std::hash::Hasher;

/// history of solved actions since the root, as compact tokens:
/// f / x / c for fold / check / call and the raise's ladder ordinal
/// as a digit. two states with equal paths from one root took
/// identical abstracted lines, so they present identical legal
/// action lists.
#[derive(Debug, Default, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct Path(String);

impl Path {
    pub fn with(&self, token: char) -> Self {
        let mut inner = self.0.clone();
        inner.push(token);
        Self(inner)
    }
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for Path {
    fn from(inner: String) -> Self {
        Self(inner)
    }
}

impl std::fmt::Display for Path {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// token for the action at this index of an abstracted action list
pub fn token(actions: &[Action], index: usize) -> char {
    match actions[index] {
        Action::Fold => 'f',
        Action::Check => 'x',
        Action::Call(_) => 'c',
        Action::Raise(_) => {
            let nth = actions[..=index].iter().filter(|a| a.is_raise()).count() - 1;
            (b'0' + nth as u8) as char
        }
    }
}

/// canonical identifier of an information set: everything the acting
/// player can see, nothing they cannot. states sharing a key share
/// their ordered legal abstracted action list.
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct InfoSetKey {
    player: u8,
    street: u8,
    texture: u8,
    path: Path,
    bucket: u16,
}

impl InfoSetKey {
    pub fn new(player: u8, street: u8, texture: u8, path: Path, bucket: u16) -> Self {
        Self {
            player,
            street,
            texture,
            path,
            bucket,
        }
    }
    pub fn player(&self) -> u8 {
        self.player
    }
    pub fn street(&self) -> u8 {
        self.street
    }
    pub fn bucket(&self) -> u16 {
        self.bucket
    }
    pub fn path(&self) -> &Path {
        &self.path
    }
    /// stable shard index for lock striping
    pub fn shard(&self, shards: usize) -> usize {
        let ref mut hasher = std::collections::hash_map::DefaultHasher::new();
        self.hash(hasher);
        (hasher.finish() % shards as u64) as usize
    }
}

impl std::fmt::Display for InfoSetKey {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "p{}|s{}|b{}|h{}|k{}",
            self.player, self.street, self.texture, self.path, self.bucket
        )
    }
}

impl std::str::FromStr for InfoSetKey {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let fields = s.split('|').collect::<Vec<_>>();
        match fields.as_slice() {
            [p, s, b, h, k] => Ok(Self {
                player: Self::field(p, 'p')?,
                street: Self::field(s, 's')?,
                texture: Self::field(b, 'b')?,
                path: Path::from(
                    h.strip_prefix('h')
                        .ok_or_else(|| format!("missing history field: {}", h))?
                        .to_string(),
                ),
                bucket: Self::field(k, 'k')?,
            }),
            _ => Err(format!("malformed infoset key: {}", s)),
        }
    }
}

impl InfoSetKey {
    fn field<T: std::str::FromStr>(s: &str, prefix: char) -> Result<T, String> {
        s.strip_prefix(prefix)
            .ok_or_else(|| format!("missing {} field: {}", prefix, s))?
            .parse()
            .map_err(|_| format!("bad {} field: {}", prefix, s))
    }
}

impl serde::Serialize for InfoSetKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
impl<'de> serde::Deserialize<'de> for InfoSetKey {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        use serde::Deserialize;
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

impl crate::Arbitrary for InfoSetKey {
    fn random() -> Self {
        use rand::Rng;
        let mut rng = rand::rng();
        Self {
            player: rng.random_range(0..9),
            street: rng.random_range(0..4),
            texture: rng.random_range(0..64),
            path: Path::from(String::from("cx0c")),
            bucket: rng.random_range(0..179),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Arbitrary;

    #[test]
    fn display_parse_roundtrip() {
        for _ in 0..32 {
            let key = InfoSetKey::random();
            let back: InfoSetKey = key.to_string().parse().unwrap();
            assert!(back == key);
        }
    }

    #[test]
    fn serde_uses_canonical_string() {
        let key = InfoSetKey::new(0, 1, 23, Path::from(String::from("ccx1")), 42);
        let json = serde_json::to_string(&key).unwrap();
        assert!(json == "\"p0|s1|b23|hccx1|k42\"");
        let back: InfoSetKey = serde_json::from_str(&json).unwrap();
        assert!(back == key);
    }

    #[test]
    fn tokens_index_raises() {
        let actions = vec![
            Action::Fold,
            Action::Call(1.0),
            Action::Raise(2.0),
            Action::Raise(5.0),
        ];
        assert!(token(&actions, 0) == 'f');
        assert!(token(&actions, 1) == 'c');
        assert!(token(&actions, 2) == '0');
        assert!(token(&actions, 3) == '1');
    }

    #[test]
    fn shard_is_stable() {
        let key = InfoSetKey::random();
        assert!(key.shard(64) == key.shard(64));
        assert!(key.shard(64) < 64);
    }
}
