//! Name registry parser — short names and metadata digests for avatars.

use alloy_primitives::{Address, B256};

use crate::decode;
use crate::error::IndexError;
use crate::event::{EventKind, IndexEvent, RegisterShortName, UpdateMetadataDigest};
use crate::schema::{EventSchema, SchemaRegistry};
use crate::types::{Block, LogEntry, Receipt};

use super::{event_meta, topic_matches, LogParser};

const NAMESPACE: &str = "CrcV2";

pub fn schemas() -> Result<Vec<(EventKind, EventSchema)>, IndexError> {
    Ok(vec![
        (
            EventKind::RegisterShortName,
            EventSchema::from_signature(
                NAMESPACE,
                "event RegisterShortName(address indexed avatar, uint72 shortName, uint256 nonce)",
            )?,
        ),
        (
            EventKind::UpdateMetadataDigest,
            EventSchema::from_signature(
                NAMESPACE,
                "event UpdateMetadataDigest(address indexed avatar, bytes32 metadataDigest)",
            )?,
        ),
    ])
}

pub struct NameRegistryParser {
    registry_address: Address,
    register_short_name_topic: B256,
    update_metadata_digest_topic: B256,
}

impl NameRegistryParser {
    pub fn new(registry: &SchemaRegistry, registry_address: Address) -> Self {
        Self {
            registry_address,
            register_short_name_topic: registry.topic(EventKind::RegisterShortName),
            update_metadata_digest_topic: registry.topic(EventKind::UpdateMetadataDigest),
        }
    }
}

impl LogParser for NameRegistryParser {
    fn is_candidate(&self, log: &LogEntry) -> bool {
        log.address == self.registry_address
    }

    fn parse(
        &self,
        block: &Block,
        receipt: &Receipt,
        log: &LogEntry,
    ) -> Result<Vec<IndexEvent>, IndexError> {
        if log.address != self.registry_address {
            return Ok(Vec::new());
        }

        if topic_matches(log, &self.register_short_name_topic) {
            return Ok(vec![IndexEvent::RegisterShortName(RegisterShortName {
                meta: event_meta(block, receipt, log),
                avatar: decode::topic_address("RegisterShortName", log, 1)?,
                short_name: decode::data_u256("RegisterShortName", &log.data, 0)?,
                nonce: decode::data_u256("RegisterShortName", &log.data, 1)?,
            })]);
        }

        if topic_matches(log, &self.update_metadata_digest_topic) {
            // bytes32, a single fixed word in the payload.
            let digest = decode::data_u256("UpdateMetadataDigest", &log.data, 0)?;
            return Ok(vec![IndexEvent::UpdateMetadataDigest(UpdateMetadataDigest {
                meta: event_meta(block, receipt, log),
                avatar: decode::topic_address("UpdateMetadataDigest", log, 1)?,
                metadata_digest: digest.to_be_bytes::<32>().to_vec(),
            })]);
        }

        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::encode::{payload, topic_for_address, word_u64, Part};
    use crate::parsers::tests::{block, log, receipt};
    use alloy_primitives::{address, U256};

    const REGISTRY: Address = address!("a27566fd89162cc3d40cb59c87aaaa49b85f3474");

    fn parser() -> NameRegistryParser {
        let registry = SchemaRegistry::build().unwrap();
        NameRegistryParser::new(&registry, REGISTRY)
    }

    #[test]
    fn register_short_name_decodes_name_and_nonce() {
        let parser = parser();
        let avatar = address!("0000000000000000000000000000000000000011");
        let data = payload(vec![Part::Word(word_u64(314)), Part::Word(word_u64(9))]);
        let entry = log(
            0,
            REGISTRY,
            vec![parser.register_short_name_topic, topic_for_address(avatar)],
            data,
        );
        let receipt = receipt(0, vec![entry.clone()]);
        let events = parser.parse(&block(1), &receipt, &entry).unwrap();
        match &events[0] {
            IndexEvent::RegisterShortName(e) => {
                assert_eq!(e.avatar, avatar);
                assert_eq!(e.short_name, U256::from(314u64));
                assert_eq!(e.nonce, U256::from(9u64));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn metadata_digest_is_the_raw_word() {
        let parser = parser();
        let avatar = address!("0000000000000000000000000000000000000011");
        let digest = [0xabu8; 32];
        let entry = log(
            0,
            REGISTRY,
            vec![
                parser.update_metadata_digest_topic,
                topic_for_address(avatar),
            ],
            digest.to_vec(),
        );
        let receipt = receipt(0, vec![entry.clone()]);
        let events = parser.parse(&block(1), &receipt, &entry).unwrap();
        match &events[0] {
            IndexEvent::UpdateMetadataDigest(e) => {
                assert_eq!(e.avatar, avatar);
                assert_eq!(e.metadata_digest, digest.to_vec());
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn other_contracts_are_ignored() {
        let parser = parser();
        let entry = log(
            0,
            address!("00000000000000000000000000000000000000ff"),
            vec![parser.register_short_name_topic],
            vec![],
        );
        assert!(!parser.is_candidate(&entry));
    }
}
