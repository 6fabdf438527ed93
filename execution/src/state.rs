use anyhow::Result;
use bytes::{Buf, BufMut, BytesMut};
use commonware_codec::{EncodeSize, Error, Read, ReadExt, Write};
use meridian_types::{
    hash::H256,
    ledger::{Key, RequestKind, RequestStatus, Value},
};
use std::future::Future;

#[cfg(any(test, feature = "mocks"))]
use std::collections::HashMap;

/// Point-in-time key-value store the pipeline reads from and commits into.
pub trait State {
    fn get(&self, key: &Key) -> impl Future<Output = Result<Option<Value>>>;
    fn insert(&mut self, key: Key, value: Value) -> impl Future<Output = Result<()>>;
    fn delete(&mut self, key: &Key) -> impl Future<Output = Result<()>>;

    fn apply(&mut self, changes: Vec<(Key, Status)>) -> impl Future<Output = Result<()>> {
        async {
            for (key, status) in changes {
                match status {
                    Status::Update(value) => self.insert(key, value).await?,
                    Status::Delete => self.delete(&key).await?,
                }
            }
            Ok(())
        }
    }
}

#[cfg(any(test, feature = "mocks"))]
#[derive(Default)]
pub struct Memory {
    state: HashMap<Key, Value>,
}

#[cfg(any(test, feature = "mocks"))]
impl State for Memory {
    async fn get(&self, key: &Key) -> Result<Option<Value>> {
        Ok(self.state.get(key).cloned())
    }

    async fn insert(&mut self, key: Key, value: Value) -> Result<()> {
        self.state.insert(key, value);
        Ok(())
    }

    async fn delete(&mut self, key: &Key) -> Result<()> {
        self.state.remove(key);
        Ok(())
    }
}

/// A pending write.
#[derive(Clone, Debug, PartialEq, Eq)]
#[allow(clippy::large_enum_variant)]
pub enum Status {
    Update(Value),
    Delete,
}

impl Write for Status {
    fn write(&self, writer: &mut impl BufMut) {
        match self {
            Status::Update(value) => {
                0u8.write(writer);
                value.write(writer);
            }
            Status::Delete => 1u8.write(writer),
        }
    }
}

impl Read for Status {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        let kind = u8::read(reader)?;
        match kind {
            0 => Ok(Status::Update(Value::read(reader)?)),
            1 => Ok(Status::Delete),
            _ => Err(Error::InvalidEnum(kind)),
        }
    }
}

impl EncodeSize for Status {
    fn encode_size(&self) -> usize {
        1 + match self {
            Status::Update(value) => value.encode_size(),
            Status::Delete => 0,
        }
    }
}

/// SHA-256 over the encoded `(key, status)` pairs, in commit order.
///
/// Nodes that applied the same height compare this to detect a diverged ledger.
pub fn changes_digest(changes: &[(Key, Status)]) -> H256 {
    let size = changes
        .iter()
        .map(|(key, status)| key.encode_size() + status.encode_size())
        .sum();
    let mut buf = BytesMut::with_capacity(size);
    for (key, status) in changes {
        key.write(&mut buf);
        status.write(&mut buf);
    }
    H256::digest(&buf)
}

/// Last beacon height applied to `state` (0 before the first).
pub async fn beacon_height<S: State>(state: &S) -> Result<u64> {
    Ok(match state.get(&Key::BeaconHeight).await? {
        Some(Value::Height(height)) => height,
        _ => 0,
    })
}

/// Status of a tracked request; `None` means not found.
pub async fn request_status<S: State>(
    state: &S,
    kind: RequestKind,
    id: &str,
) -> Result<Option<RequestStatus>> {
    Ok(
        match state
            .get(&Key::RequestStatus(kind, id.to_string()))
            .await?
        {
            Some(Value::RequestStatus(record)) => Some(record.status),
            _ => None,
        },
    )
}
