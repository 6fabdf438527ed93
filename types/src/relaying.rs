//! External chain headers relayed onto the beacon.

use crate::{hash::H256, meta::MetaType};
use bytes::{Buf, BufMut};
use commonware_codec::{Encode, EncodeSize, Error, FixedSize, Read, ReadExt, ReadRangeExt, Write};
use serde::{Deserialize, Serialize};

/// Most pending headers a chain state will decode.
pub const MAX_UNCONFIRMED_HEADERS: usize = 1024;

/// An external chain whose headers are relayed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelayChain {
    Bnb,
    Btc,
}

impl RelayChain {
    pub const ALL: [RelayChain; 2] = [RelayChain::Bnb, RelayChain::Btc];

    pub fn meta_type(self) -> MetaType {
        match self {
            RelayChain::Bnb => MetaType::RelayingBnbHeader,
            RelayChain::Btc => MetaType::RelayingBtcHeader,
        }
    }

    pub fn from_meta_type(meta: MetaType) -> Option<Self> {
        match meta {
            MetaType::RelayingBnbHeader => Some(RelayChain::Bnb),
            MetaType::RelayingBtcHeader => Some(RelayChain::Btc),
            _ => None,
        }
    }
}

impl Write for RelayChain {
    fn write(&self, writer: &mut impl BufMut) {
        match self {
            RelayChain::Bnb => 0u8.write(writer),
            RelayChain::Btc => 1u8.write(writer),
        }
    }
}

impl Read for RelayChain {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        match u8::read(reader)? {
            0 => Ok(RelayChain::Bnb),
            1 => Ok(RelayChain::Btc),
            i => Err(Error::InvalidEnum(i)),
        }
    }
}

impl EncodeSize for RelayChain {
    fn encode_size(&self) -> usize {
        u8::SIZE
    }
}

/// Header of an external block. Its identity is the SHA-256 of its encoding.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayHeader {
    pub height: u64,
    pub last_block_hash: H256,
    pub data_hash: H256,
    pub time: u64,
}

impl RelayHeader {
    pub fn hash(&self) -> H256 {
        H256::digest(&self.encode())
    }
}

impl Write for RelayHeader {
    fn write(&self, writer: &mut impl BufMut) {
        self.height.write(writer);
        self.last_block_hash.write(writer);
        self.data_hash.write(writer);
        self.time.write(writer);
    }
}

impl Read for RelayHeader {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        Ok(Self {
            height: u64::read(reader)?,
            last_block_hash: H256::read(reader)?,
            data_hash: H256::read(reader)?,
            time: u64::read(reader)?,
        })
    }
}

impl EncodeSize for RelayHeader {
    fn encode_size(&self) -> usize {
        self.height.encode_size()
            + self.last_block_hash.encode_size()
            + self.data_hash.encode_size()
            + self.time.encode_size()
    }
}

/// Commit for the parent block, carried with each header.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastCommit {
    pub block_hash: H256,
}

/// Decoded form of the base64 `header` field of a relaying action.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayBlock {
    pub header: RelayHeader,
    pub last_commit: LastCommit,
}

/// Locally maintained partial copy of one external chain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RelayingHeaderChainState {
    pub latest: RelayHeader,
    /// Headers ahead of `latest` that do not link to it yet, sorted by (height, hash).
    pub unconfirmed: Vec<RelayHeader>,
}

impl RelayingHeaderChainState {
    pub fn genesis(header: RelayHeader) -> Self {
        Self {
            latest: header,
            unconfirmed: Vec::new(),
        }
    }
}

impl Write for RelayingHeaderChainState {
    fn write(&self, writer: &mut impl BufMut) {
        self.latest.write(writer);
        self.unconfirmed.write(writer);
    }
}

impl Read for RelayingHeaderChainState {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        Ok(Self {
            latest: RelayHeader::read(reader)?,
            unconfirmed: Vec::<RelayHeader>::read_range(reader, 0..=MAX_UNCONFIRMED_HEADERS)?,
        })
    }
}

impl EncodeSize for RelayingHeaderChainState {
    fn encode_size(&self) -> usize {
        self.latest.encode_size() + self.unconfirmed.encode_size()
    }
}
