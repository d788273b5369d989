use serde::de::{Error as DeError, MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use std::fmt::{self, Formatter};
use std::hash::{BuildHasher, Hash};
use std::marker::PhantomData;

use crate::MemoMap;

struct MapVisitor<K, V, S1, S2> {
    _marker: PhantomData<MemoMap<K, V, S1, S2>>,
}

impl<K, V, S1, S2> Serialize for MemoMap<K, V, S1, S2>
where
    K: Serialize,
    V: Serialize,
{
    fn serialize<Sr>(&self, serializer: Sr) -> Result<Sr::Ok, Sr::Error>
    where
        Sr: Serializer,
    {
        serializer.collect_map(self.iter())
    }
}

impl<'de, K, V, S1, S2> Deserialize<'de> for MemoMap<K, V, S1, S2>
where
    K: Deserialize<'de> + Hash + Eq + Clone,
    V: Deserialize<'de> + Clone,
    S1: Default + BuildHasher,
    S2: Default + BuildHasher,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_map(MapVisitor {
            _marker: PhantomData,
        })
    }
}

impl<'de, K, V, S1, S2> Visitor<'de> for MapVisitor<K, V, S1, S2>
where
    K: Deserialize<'de> + Hash + Eq + Clone,
    V: Deserialize<'de> + Clone,
    S1: Default + BuildHasher,
    S2: Default + BuildHasher,
{
    type Value = MemoMap<K, V, S1, S2>;

    fn expecting(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "a map")
    }

    fn visit_map<M>(self, mut access: M) -> Result<Self::Value, M::Error>
    where
        M: MapAccess<'de>,
    {
        let values = match access.size_hint() {
            Some(size) => MemoMap::builder()
                .estimated_entries(size)
                .hasher1(S1::default())
                .hasher2(S2::default())
                .build()
                .map_err(M::Error::custom)?,
            None => MemoMap::default(),
        };

        while let Some((key, value)) = access.next_entry()? {
            values.insert(key, value).map_err(M::Error::custom)?;
        }

        Ok(values)
    }
}
