//! Circles V2 hub parser.
//!
//! The V2 hub is an ERC-1155 contract, so alongside the Circles-specific
//! events it emits the standard token events. `TransferBatch` is the only
//! log that fans out into multiple index events: one per `(id, value)` pair,
//! numbered by `batch_index`.

use alloy_primitives::{keccak256, Address, B256};

use crate::decode;
use crate::error::IndexError;
use crate::event::{
    Erc1155ApprovalForAll, Erc1155TransferBatch, Erc1155TransferSingle, Erc1155Uri, EventKind,
    IndexEvent, V2DiscountCost, V2InviteHuman, V2PersonalMint, V2RegisterGroup, V2RegisterHuman,
    V2RegisterOrganization, V2Stopped, V2Trust,
};
use crate::schema::{meta_columns, EventColumn, EventSchema, SchemaRegistry};
use crate::types::{Block, LogEntry, Receipt};
use crate::value::ValueType;

use super::{event_meta, topic_matches, LogParser};

const NAMESPACE: &str = "CrcV2";

/// Schemas for the V2 hub, including the ERC-1155 token events.
pub fn schemas() -> Result<Vec<(EventKind, EventSchema)>, IndexError> {
    // TransferBatch expands into one row per batch member, keyed by an extra
    // batch_index column, so its schema is built by hand.
    let mut batch_columns = meta_columns();
    batch_columns.insert(4, EventColumn::new("batchIndex", ValueType::Int, false, true));
    batch_columns.extend([
        EventColumn::new("operator", ValueType::Address, true, false),
        EventColumn::new("from", ValueType::Address, true, false),
        EventColumn::new("to", ValueType::Address, true, false),
        EventColumn::new("id", ValueType::BigInt, true, false),
        EventColumn::new("value", ValueType::BigInt, false, false),
    ]);
    let transfer_batch = EventSchema::new(
        NAMESPACE,
        "TransferBatch",
        keccak256(b"TransferBatch(address,address,address,uint256[],uint256[])"),
        batch_columns,
    );

    Ok(vec![
        (
            EventKind::V2RegisterHuman,
            EventSchema::from_signature(NAMESPACE, "event RegisterHuman(address indexed avatar)")?,
        ),
        (
            EventKind::V2RegisterOrganization,
            EventSchema::from_signature(
                NAMESPACE,
                "event RegisterOrganization(address indexed organization, string indexed name)",
            )?,
        ),
        (
            EventKind::V2RegisterGroup,
            EventSchema::from_signature(
                NAMESPACE,
                "event RegisterGroup(address indexed group, address indexed mint, address indexed treasury, string indexed name, string indexed symbol)",
            )?,
        ),
        (
            EventKind::V2PersonalMint,
            EventSchema::from_signature(
                NAMESPACE,
                "event PersonalMint(address indexed human, uint256 amount, uint256 startPeriod, uint256 endPeriod)",
            )?,
        ),
        (
            EventKind::V2InviteHuman,
            EventSchema::from_signature(
                NAMESPACE,
                "event InviteHuman(address indexed inviter, address indexed invited);",
            )?,
        ),
        (
            EventKind::V2Trust,
            EventSchema::from_signature(
                NAMESPACE,
                "event Trust(address indexed truster, address indexed trustee, uint256 expiryTime)",
            )?,
        ),
        (
            EventKind::V2Stopped,
            EventSchema::from_signature(NAMESPACE, "event Stopped(address indexed avatar)")?,
        ),
        (
            EventKind::Erc1155ApprovalForAll,
            EventSchema::from_signature(
                NAMESPACE,
                "event ApprovalForAll(address indexed account, address indexed operator, bool approved)",
            )?,
        ),
        (
            EventKind::Erc1155TransferSingle,
            EventSchema::from_signature(
                NAMESPACE,
                "event TransferSingle(address indexed operator, address indexed from, address indexed to, uint256 indexed id, uint256 value)",
            )?,
        ),
        (EventKind::Erc1155TransferBatch, transfer_batch),
        (
            EventKind::Erc1155Uri,
            EventSchema::from_signature(NAMESPACE, "event URI(string value, uint256 indexed id)")?,
        ),
        (
            EventKind::V2DiscountCost,
            EventSchema::from_signature(
                NAMESPACE,
                "event DiscountCost(address indexed account, uint256 indexed id, uint256 discountCost)",
            )?,
        ),
    ])
}

pub struct V2Parser {
    hub: Address,
    register_human_topic: B256,
    register_organization_topic: B256,
    register_group_topic: B256,
    personal_mint_topic: B256,
    invite_human_topic: B256,
    trust_topic: B256,
    stopped_topic: B256,
    approval_for_all_topic: B256,
    transfer_single_topic: B256,
    transfer_batch_topic: B256,
    uri_topic: B256,
    discount_cost_topic: B256,
}

impl V2Parser {
    pub fn new(registry: &SchemaRegistry, hub: Address) -> Self {
        Self {
            hub,
            register_human_topic: registry.topic(EventKind::V2RegisterHuman),
            register_organization_topic: registry.topic(EventKind::V2RegisterOrganization),
            register_group_topic: registry.topic(EventKind::V2RegisterGroup),
            personal_mint_topic: registry.topic(EventKind::V2PersonalMint),
            invite_human_topic: registry.topic(EventKind::V2InviteHuman),
            trust_topic: registry.topic(EventKind::V2Trust),
            stopped_topic: registry.topic(EventKind::V2Stopped),
            approval_for_all_topic: registry.topic(EventKind::Erc1155ApprovalForAll),
            transfer_single_topic: registry.topic(EventKind::Erc1155TransferSingle),
            transfer_batch_topic: registry.topic(EventKind::Erc1155TransferBatch),
            uri_topic: registry.topic(EventKind::Erc1155Uri),
            discount_cost_topic: registry.topic(EventKind::V2DiscountCost),
        }
    }

    fn parse_transfer_batch(
        &self,
        block: &Block,
        receipt: &Receipt,
        log: &LogEntry,
    ) -> Result<Vec<IndexEvent>, IndexError> {
        let operator = decode::topic_address("TransferBatch", log, 1)?;
        let from = decode::topic_address("TransferBatch", log, 2)?;
        let to = decode::topic_address("TransferBatch", log, 3)?;
        let ids = decode::dynamic_u256_array("TransferBatch", &log.data, 0)?;
        let values = decode::dynamic_u256_array("TransferBatch", &log.data, 1)?;
        if ids.len() != values.len() {
            return Err(IndexError::decode(
                "TransferBatch",
                format!("{} ids but {} values", ids.len(), values.len()),
            ));
        }
        Ok(ids
            .into_iter()
            .zip(values)
            .enumerate()
            .map(|(i, (id, value))| {
                IndexEvent::Erc1155TransferBatch(Erc1155TransferBatch {
                    meta: event_meta(block, receipt, log),
                    batch_index: i as i32,
                    operator,
                    from,
                    to,
                    id,
                    value,
                })
            })
            .collect())
    }
}

impl LogParser for V2Parser {
    fn is_candidate(&self, log: &LogEntry) -> bool {
        log.address == self.hub
    }

    fn parse(
        &self,
        block: &Block,
        receipt: &Receipt,
        log: &LogEntry,
    ) -> Result<Vec<IndexEvent>, IndexError> {
        if log.address != self.hub {
            return Ok(Vec::new());
        }
        let meta = event_meta(block, receipt, log);

        if topic_matches(log, &self.register_human_topic) {
            return Ok(vec![IndexEvent::V2RegisterHuman(V2RegisterHuman {
                meta,
                avatar: decode::topic_address("RegisterHuman", log, 1)?,
            })]);
        }
        if topic_matches(log, &self.register_organization_topic) {
            return Ok(vec![IndexEvent::V2RegisterOrganization(
                V2RegisterOrganization {
                    meta,
                    organization: decode::topic_address("RegisterOrganization", log, 1)?,
                    name: decode::dynamic_string("RegisterOrganization", &log.data, 0)?,
                },
            )]);
        }
        if topic_matches(log, &self.register_group_topic) {
            return Ok(vec![IndexEvent::V2RegisterGroup(V2RegisterGroup {
                meta,
                group: decode::topic_address("RegisterGroup", log, 1)?,
                mint: decode::topic_address("RegisterGroup", log, 2)?,
                treasury: decode::topic_address("RegisterGroup", log, 3)?,
                name: decode::dynamic_string("RegisterGroup", &log.data, 0)?,
                symbol: decode::dynamic_string("RegisterGroup", &log.data, 1)?,
            })]);
        }
        if topic_matches(log, &self.personal_mint_topic) {
            return Ok(vec![IndexEvent::V2PersonalMint(V2PersonalMint {
                meta,
                human: decode::topic_address("PersonalMint", log, 1)?,
                amount: decode::data_u256("PersonalMint", &log.data, 0)?,
                start_period: decode::data_u256("PersonalMint", &log.data, 1)?,
                end_period: decode::data_u256("PersonalMint", &log.data, 2)?,
            })]);
        }
        if topic_matches(log, &self.invite_human_topic) {
            return Ok(vec![IndexEvent::V2InviteHuman(V2InviteHuman {
                meta,
                inviter: decode::topic_address("InviteHuman", log, 1)?,
                invited: decode::topic_address("InviteHuman", log, 2)?,
            })]);
        }
        if topic_matches(log, &self.trust_topic) {
            return Ok(vec![IndexEvent::V2Trust(V2Trust {
                meta,
                truster: decode::topic_address("Trust", log, 1)?,
                trustee: decode::topic_address("Trust", log, 2)?,
                expiry_time: decode::data_u256("Trust", &log.data, 0)?,
            })]);
        }
        if topic_matches(log, &self.stopped_topic) {
            return Ok(vec![IndexEvent::V2Stopped(V2Stopped {
                meta,
                avatar: decode::topic_address("Stopped", log, 1)?,
            })]);
        }
        if topic_matches(log, &self.approval_for_all_topic) {
            return Ok(vec![IndexEvent::Erc1155ApprovalForAll(
                Erc1155ApprovalForAll {
                    meta,
                    account: decode::topic_address("ApprovalForAll", log, 1)?,
                    operator: decode::topic_address("ApprovalForAll", log, 2)?,
                    approved: decode::data_bool("ApprovalForAll", &log.data, 0)?,
                },
            )]);
        }
        if topic_matches(log, &self.transfer_single_topic) {
            return Ok(vec![IndexEvent::Erc1155TransferSingle(
                Erc1155TransferSingle {
                    meta,
                    operator: decode::topic_address("TransferSingle", log, 1)?,
                    from: decode::topic_address("TransferSingle", log, 2)?,
                    to: decode::topic_address("TransferSingle", log, 3)?,
                    id: decode::topic_u256("TransferSingle", log, 4)?,
                    value: decode::data_u256("TransferSingle", &log.data, 0)?,
                },
            )]);
        }
        if topic_matches(log, &self.transfer_batch_topic) {
            return self.parse_transfer_batch(block, receipt, log);
        }
        if topic_matches(log, &self.uri_topic) {
            return Ok(vec![IndexEvent::Erc1155Uri(Erc1155Uri {
                meta,
                id: decode::topic_u256("URI", log, 1)?,
                value: decode::dynamic_string("URI", &log.data, 0)?,
            })]);
        }
        if topic_matches(log, &self.discount_cost_topic) {
            return Ok(vec![IndexEvent::V2DiscountCost(V2DiscountCost {
                meta,
                account: decode::topic_address("DiscountCost", log, 1)?,
                id: decode::topic_u256("DiscountCost", log, 2)?,
                discount_cost: decode::data_u256("DiscountCost", &log.data, 0)?,
            })]);
        }

        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::encode::{payload, topic_for_address, topic_for_u256, word_u64, Part};
    use crate::parsers::tests::{block, log, receipt};
    use alloy_primitives::{address, U256};

    const HUB: Address = address!("c12c1e50abb450d6205ea2c3fa861b3b834d13e8");

    fn parser() -> V2Parser {
        let registry = SchemaRegistry::build().unwrap();
        V2Parser::new(&registry, HUB)
    }

    #[test]
    fn register_group_decodes_name_and_symbol() {
        let parser = parser();
        let group = address!("0000000000000000000000000000000000000011");
        let mint = address!("0000000000000000000000000000000000000022");
        let treasury = address!("0000000000000000000000000000000000000033");
        let data = payload(vec![
            Part::Dynamic(b"My Group".to_vec()),
            Part::Dynamic(b"MG".to_vec()),
        ]);
        let entry = log(
            0,
            HUB,
            vec![
                parser.register_group_topic,
                topic_for_address(group),
                topic_for_address(mint),
                topic_for_address(treasury),
            ],
            data,
        );
        let receipt = receipt(0, vec![entry.clone()]);
        let events = parser.parse(&block(1), &receipt, &entry).unwrap();
        match &events[0] {
            IndexEvent::V2RegisterGroup(e) => {
                assert_eq!((e.group, e.mint, e.treasury), (group, mint, treasury));
                assert_eq!(e.name, "My Group");
                assert_eq!(e.symbol, "MG");
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn personal_mint_reads_three_words() {
        let parser = parser();
        let human = address!("0000000000000000000000000000000000000011");
        let data = payload(vec![
            Part::Word(word_u64(1000)),
            Part::Word(word_u64(10)),
            Part::Word(word_u64(20)),
        ]);
        let entry = log(
            0,
            HUB,
            vec![parser.personal_mint_topic, topic_for_address(human)],
            data,
        );
        let receipt = receipt(0, vec![entry.clone()]);
        let events = parser.parse(&block(1), &receipt, &entry).unwrap();
        match &events[0] {
            IndexEvent::V2PersonalMint(e) => {
                assert_eq!(e.human, human);
                assert_eq!(e.amount, U256::from(1000u64));
                assert_eq!(e.start_period, U256::from(10u64));
                assert_eq!(e.end_period, U256::from(20u64));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn transfer_batch_fans_out_with_batch_indices() {
        let parser = parser();
        let a = address!("0000000000000000000000000000000000000011");
        let data = payload(vec![
            Part::Array(vec![U256::from(1u64), U256::from(2u64), U256::from(3u64)]),
            Part::Array(vec![U256::from(10u64), U256::from(20u64), U256::from(30u64)]),
        ]);
        let entry = log(
            5,
            HUB,
            vec![
                parser.transfer_batch_topic,
                topic_for_address(a),
                topic_for_address(a),
                topic_for_address(a),
            ],
            data,
        );
        let receipt = receipt(1, vec![entry.clone()]);
        let events = parser.parse(&block(9), &receipt, &entry).unwrap();

        assert_eq!(events.len(), 3);
        for (i, event) in events.iter().enumerate() {
            match event {
                IndexEvent::Erc1155TransferBatch(e) => {
                    assert_eq!(e.batch_index, i as i32);
                    assert_eq!(e.id, U256::from((i + 1) as u64));
                    assert_eq!(e.value, U256::from(((i + 1) * 10) as u64));
                    assert_eq!(e.meta.log_index, 5);
                }
                other => panic!("unexpected event {other:?}"),
            }
        }
        // Fan-out members order strictly under the total ordering key.
        assert!(events[0].sort_key() < events[1].sort_key());
        assert!(events[1].sort_key() < events[2].sort_key());
    }

    #[test]
    fn mismatched_batch_arrays_are_a_decode_error() {
        let parser = parser();
        let a = address!("0000000000000000000000000000000000000011");
        let data = payload(vec![
            Part::Array(vec![U256::from(1u64), U256::from(2u64)]),
            Part::Array(vec![U256::from(10u64)]),
        ]);
        let entry = log(
            0,
            HUB,
            vec![
                parser.transfer_batch_topic,
                topic_for_address(a),
                topic_for_address(a),
                topic_for_address(a),
            ],
            data,
        );
        let receipt = receipt(0, vec![entry.clone()]);
        let err = parser.parse(&block(1), &receipt, &entry).unwrap_err();
        assert!(matches!(err, crate::error::IndexError::Decode { .. }));
    }

    #[test]
    fn uri_id_comes_from_topic() {
        let parser = parser();
        let data = payload(vec![Part::Dynamic(b"ipfs://QmHash".to_vec())]);
        let entry = log(
            0,
            HUB,
            vec![parser.uri_topic, topic_for_u256(U256::from(77u64))],
            data,
        );
        let receipt = receipt(0, vec![entry.clone()]);
        let events = parser.parse(&block(1), &receipt, &entry).unwrap();
        match &events[0] {
            IndexEvent::Erc1155Uri(e) => {
                assert_eq!(e.id, U256::from(77u64));
                assert_eq!(e.value, "ipfs://QmHash");
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn transfer_single_id_comes_from_topic_four() {
        let parser = parser();
        let operator = address!("0000000000000000000000000000000000000011");
        let from = address!("0000000000000000000000000000000000000022");
        let to = address!("0000000000000000000000000000000000000033");
        // Four indexed params, one value word in data.
        let entry = log(
            0,
            HUB,
            vec![
                parser.transfer_single_topic,
                topic_for_address(operator),
                topic_for_address(from),
                topic_for_address(to),
                topic_for_u256(U256::from(42u64)),
            ],
            payload(vec![Part::Word(word_u64(500))]),
        );
        let receipt = receipt(0, vec![entry.clone()]);
        let events = parser.parse(&block(1), &receipt, &entry).unwrap();
        match &events[0] {
            IndexEvent::Erc1155TransferSingle(e) => {
                assert_eq!((e.operator, e.from, e.to), (operator, from, to));
                assert_eq!(e.id, U256::from(42u64));
                assert_eq!(e.value, U256::from(500u64));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn approval_for_all_reads_the_flag_from_data() {
        let parser = parser();
        let account = address!("0000000000000000000000000000000000000011");
        let operator = address!("0000000000000000000000000000000000000022");
        let entry = log(
            0,
            HUB,
            vec![
                parser.approval_for_all_topic,
                topic_for_address(account),
                topic_for_address(operator),
            ],
            payload(vec![Part::Word(word_u64(1))]),
        );
        let receipt = receipt(0, vec![entry.clone()]);
        let events = parser.parse(&block(1), &receipt, &entry).unwrap();
        match &events[0] {
            IndexEvent::Erc1155ApprovalForAll(e) => {
                assert_eq!((e.account, e.operator), (account, operator));
                assert!(e.approved);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn trust_expiry_comes_from_data() {
        let parser = parser();
        let truster = address!("0000000000000000000000000000000000000011");
        let trustee = address!("0000000000000000000000000000000000000022");
        let entry = log(
            0,
            HUB,
            vec![
                parser.trust_topic,
                topic_for_address(truster),
                topic_for_address(trustee),
            ],
            payload(vec![Part::Word(word_u64(1_893_456_000))]),
        );
        let receipt = receipt(0, vec![entry.clone()]);
        let events = parser.parse(&block(1), &receipt, &entry).unwrap();
        match &events[0] {
            IndexEvent::V2Trust(e) => {
                assert_eq!((e.truster, e.trustee), (truster, trustee));
                assert_eq!(e.expiry_time, U256::from(1_893_456_000u64));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn invite_human_is_all_topics() {
        let parser = parser();
        let inviter = address!("0000000000000000000000000000000000000011");
        let invited = address!("0000000000000000000000000000000000000022");
        let entry = log(
            0,
            HUB,
            vec![
                parser.invite_human_topic,
                topic_for_address(inviter),
                topic_for_address(invited),
            ],
            vec![],
        );
        let receipt = receipt(0, vec![entry.clone()]);
        let events = parser.parse(&block(1), &receipt, &entry).unwrap();
        match &events[0] {
            IndexEvent::V2InviteHuman(e) => {
                assert_eq!((e.inviter, e.invited), (inviter, invited));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn register_organization_decodes_the_name_tail() {
        let parser = parser();
        let organization = address!("0000000000000000000000000000000000000011");
        let entry = log(
            0,
            HUB,
            vec![
                parser.register_organization_topic,
                topic_for_address(organization),
            ],
            payload(vec![Part::Dynamic(b"Open Collective".to_vec())]),
        );
        let receipt = receipt(0, vec![entry.clone()]);
        let events = parser.parse(&block(1), &receipt, &entry).unwrap();
        match &events[0] {
            IndexEvent::V2RegisterOrganization(e) => {
                assert_eq!(e.organization, organization);
                assert_eq!(e.name, "Open Collective");
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn unknown_topic_from_hub_yields_nothing() {
        let parser = parser();
        let entry = log(
            0,
            HUB,
            vec![alloy_primitives::keccak256(b"SomethingElse()")],
            vec![],
        );
        let receipt = receipt(0, vec![entry.clone()]);
        assert!(parser.parse(&block(1), &receipt, &entry).unwrap().is_empty());
    }
}
