//! Circles V1 hub parser.
//!
//! Besides the four hub events, V1 indexing tracks ERC-20 `Transfer`s of
//! personal Circles tokens. Token contracts are only discovered through
//! `Signup` events, so the parser keeps a set of known token addresses and
//! re-scans the signup receipt for the mint that happened before the token
//! became known.

use std::collections::HashSet;
use std::sync::RwLock;

use alloy_primitives::{keccak256, Address, B256};

use crate::decode;
use crate::error::IndexError;
use crate::event::{
    Erc20Transfer, EventKind, IndexEvent, V1HubTransfer, V1OrganizationSignup, V1Signup, V1Trust,
};
use crate::schema::{meta_columns, EventColumn, EventSchema, SchemaRegistry};
use crate::value::ValueType;

use super::{event_meta, topic_matches, LogParser};

const NAMESPACE: &str = "CrcV1";

/// Schemas for the V1 hub and the ERC-20 transfer table.
pub fn schemas() -> Result<Vec<(EventKind, EventSchema)>, IndexError> {
    let mut trust = EventSchema::from_signature(
        NAMESPACE,
        "event Trust(address indexed canSendTo, address indexed user, uint256 limit)",
    )?;
    // Trust limits are percentages; stored as a plain integer column.
    for column in &mut trust.columns {
        if column.name == "limit" {
            column.ty = ValueType::Int;
        }
    }

    // The transfer table carries the emitting token as an extra column, so
    // its schema is built by hand rather than from the Solidity definition.
    let mut transfer_columns = meta_columns();
    transfer_columns.extend([
        EventColumn::new("tokenAddress", ValueType::Address, true, false),
        EventColumn::new("from", ValueType::Address, true, false),
        EventColumn::new("to", ValueType::Address, true, false),
        EventColumn::new("amount", ValueType::BigInt, false, false),
    ]);
    let transfer = EventSchema::new(
        NAMESPACE,
        "Transfer",
        keccak256(b"Transfer(address,address,uint256)"),
        transfer_columns,
    );

    Ok(vec![
        (
            EventKind::V1Signup,
            EventSchema::from_signature(
                NAMESPACE,
                "event Signup(address indexed user, address token)",
            )?,
        ),
        (
            EventKind::V1OrganizationSignup,
            EventSchema::from_signature(
                NAMESPACE,
                "event OrganizationSignup(address indexed organization)",
            )?,
        ),
        (EventKind::V1Trust, trust),
        (
            EventKind::V1HubTransfer,
            EventSchema::from_signature(
                NAMESPACE,
                "event HubTransfer(address indexed from, address indexed to, uint256 amount)",
            )?,
        ),
        (EventKind::Erc20Transfer, transfer),
    ])
}

pub struct V1Parser {
    hub: Address,
    signup_topic: B256,
    organization_signup_topic: B256,
    trust_topic: B256,
    hub_transfer_topic: B256,
    transfer_topic: B256,
    /// Personal token contracts discovered via `Signup` so far.
    tokens: RwLock<HashSet<Address>>,
}

impl V1Parser {
    pub fn new(registry: &SchemaRegistry, hub: Address) -> Self {
        Self {
            hub,
            signup_topic: registry.topic(EventKind::V1Signup),
            organization_signup_topic: registry.topic(EventKind::V1OrganizationSignup),
            trust_topic: registry.topic(EventKind::V1Trust),
            hub_transfer_topic: registry.topic(EventKind::V1HubTransfer),
            transfer_topic: registry.topic(EventKind::Erc20Transfer),
            tokens: RwLock::new(HashSet::new()),
        }
    }

    /// Number of token contracts discovered so far.
    pub fn known_tokens(&self) -> usize {
        match self.tokens.read() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    fn is_known_token(&self, address: &Address) -> bool {
        match self.tokens.read() {
            Ok(guard) => guard.contains(address),
            Err(poisoned) => poisoned.into_inner().contains(address),
        }
    }

    fn register_token(&self, address: Address) {
        match self.tokens.write() {
            Ok(mut guard) => {
                guard.insert(address);
            }
            Err(poisoned) => {
                poisoned.into_inner().insert(address);
            }
        }
    }

    fn parse_erc20_transfer(
        &self,
        block: &crate::types::Block,
        receipt: &crate::types::Receipt,
        log: &crate::types::LogEntry,
    ) -> Result<IndexEvent, IndexError> {
        Ok(IndexEvent::Erc20Transfer(Erc20Transfer {
            meta: event_meta(block, receipt, log),
            token_address: log.address,
            from: decode::topic_address("Transfer", log, 1)?,
            to: decode::topic_address("Transfer", log, 2)?,
            amount: decode::data_u256("Transfer", &log.data, 0)?,
        }))
    }
}

impl LogParser for V1Parser {
    fn is_candidate(&self, log: &crate::types::LogEntry) -> bool {
        log.address == self.hub
            || (topic_matches(log, &self.transfer_topic) && self.is_known_token(&log.address))
    }

    fn parse(
        &self,
        block: &crate::types::Block,
        receipt: &crate::types::Receipt,
        log: &crate::types::LogEntry,
    ) -> Result<Vec<IndexEvent>, IndexError> {
        if log.address != self.hub {
            if topic_matches(log, &self.transfer_topic) && self.is_known_token(&log.address) {
                return Ok(vec![self.parse_erc20_transfer(block, receipt, log)?]);
            }
            return Ok(Vec::new());
        }

        if topic_matches(log, &self.signup_topic) {
            let user = decode::topic_address("Signup", log, 1)?;
            let token = decode::data_address("Signup", &log.data, 0)?;
            self.register_token(token);

            let mut events = vec![IndexEvent::V1Signup(V1Signup {
                meta: event_meta(block, receipt, log),
                user,
                token,
            })];
            // The signup bonus is minted by the token inside the same
            // transaction, before the token address was known. Earlier logs
            // of this receipt were therefore skipped; pick the mint up now.
            for earlier in &receipt.logs {
                if earlier.log_index < log.log_index
                    && earlier.address == token
                    && topic_matches(earlier, &self.transfer_topic)
                {
                    events.push(self.parse_erc20_transfer(block, receipt, earlier)?);
                }
            }
            return Ok(events);
        }

        if topic_matches(log, &self.organization_signup_topic) {
            return Ok(vec![IndexEvent::V1OrganizationSignup(V1OrganizationSignup {
                meta: event_meta(block, receipt, log),
                organization: decode::topic_address("OrganizationSignup", log, 1)?,
            })]);
        }

        if topic_matches(log, &self.trust_topic) {
            let limit = decode::data_u256("Trust", &log.data, 0)?;
            return Ok(vec![IndexEvent::V1Trust(V1Trust {
                meta: event_meta(block, receipt, log),
                can_send_to: decode::topic_address("Trust", log, 1)?,
                user: decode::topic_address("Trust", log, 2)?,
                limit: decode::u256_to_i64("Trust", limit)?,
            })]);
        }

        if topic_matches(log, &self.hub_transfer_topic) {
            return Ok(vec![IndexEvent::V1HubTransfer(V1HubTransfer {
                meta: event_meta(block, receipt, log),
                from: decode::topic_address("HubTransfer", log, 1)?,
                to: decode::topic_address("HubTransfer", log, 2)?,
                amount: decode::data_u256("HubTransfer", &log.data, 0)?,
            })]);
        }

        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::encode::{payload, topic_for_address, word_address, word_u64, Part};
    use crate::parsers::tests::{block, log, receipt};
    use alloy_primitives::{address, U256};

    const HUB: Address = address!("29b9a7fbb8995b2423a71cc17cf9810798f6c543");

    fn parser() -> V1Parser {
        let registry = SchemaRegistry::build().unwrap();
        V1Parser::new(&registry, HUB)
    }

    #[test]
    fn signup_yields_event_and_registers_token() {
        let parser = parser();
        let user = address!("00000000000000000000000000000000000000aa");
        let token = address!("00000000000000000000000000000000000000bb");
        let signup = log(
            1,
            HUB,
            vec![parser.signup_topic, topic_for_address(user)],
            word_address(token).to_vec(),
        );
        let receipt = receipt(0, vec![signup.clone()]);
        let events = parser.parse(&block(100), &receipt, &signup).unwrap();

        assert_eq!(events.len(), 1);
        match &events[0] {
            IndexEvent::V1Signup(e) => {
                assert_eq!(e.user, user);
                assert_eq!(e.token, token);
                assert_eq!(e.meta.block_number, 100);
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(parser.known_tokens(), 1);
    }

    #[test]
    fn signup_picks_up_earlier_bonus_mint() {
        let parser = parser();
        let user = address!("00000000000000000000000000000000000000aa");
        let token = address!("00000000000000000000000000000000000000bb");
        let mint = log(
            0,
            token,
            vec![
                parser.transfer_topic,
                topic_for_address(Address::ZERO),
                topic_for_address(user),
            ],
            word_u64(50).to_vec(),
        );
        let signup = log(
            1,
            HUB,
            vec![parser.signup_topic, topic_for_address(user)],
            word_address(token).to_vec(),
        );
        let receipt = receipt(0, vec![mint, signup.clone()]);

        // Before the signup, the mint log is not a candidate.
        assert!(!parser.is_candidate(&receipt.logs[0]));

        let events = parser.parse(&block(100), &receipt, &signup).unwrap();
        assert_eq!(events.len(), 2);
        match &events[1] {
            IndexEvent::Erc20Transfer(e) => {
                assert_eq!(e.token_address, token);
                assert_eq!(e.from, Address::ZERO);
                assert_eq!(e.to, user);
                assert_eq!(e.amount, U256::from(50u64));
                assert_eq!(e.meta.log_index, 0);
            }
            other => panic!("unexpected event {other:?}"),
        }

        // Afterwards the token's transfers match directly.
        assert!(parser.is_candidate(&receipt.logs[0]));
    }

    #[test]
    fn trust_limit_is_decoded_from_data() {
        let parser = parser();
        let can_send_to = address!("0000000000000000000000000000000000000011");
        let user = address!("0000000000000000000000000000000000000022");
        let trust = log(
            0,
            HUB,
            vec![
                parser.trust_topic,
                topic_for_address(can_send_to),
                topic_for_address(user),
            ],
            word_u64(100).to_vec(),
        );
        let receipt = receipt(2, vec![trust.clone()]);
        let events = parser.parse(&block(7), &receipt, &trust).unwrap();
        match &events[0] {
            IndexEvent::V1Trust(e) => {
                assert_eq!(e.can_send_to, can_send_to);
                assert_eq!(e.user, user);
                assert_eq!(e.limit, 100);
                assert_eq!(e.meta.transaction_index, 2);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn hub_transfer_decodes_amount() {
        let parser = parser();
        let from = address!("0000000000000000000000000000000000000011");
        let to = address!("0000000000000000000000000000000000000022");
        let data = payload(vec![Part::Word(word_u64(12345))]);
        let transfer = log(
            0,
            HUB,
            vec![
                parser.hub_transfer_topic,
                topic_for_address(from),
                topic_for_address(to),
            ],
            data,
        );
        let receipt = receipt(0, vec![transfer.clone()]);
        let events = parser.parse(&block(1), &receipt, &transfer).unwrap();
        match &events[0] {
            IndexEvent::V1HubTransfer(e) => {
                assert_eq!((e.from, e.to), (from, to));
                assert_eq!(e.amount, U256::from(12345u64));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn foreign_logs_are_ignored() {
        let parser = parser();
        let elsewhere = address!("00000000000000000000000000000000000000ff");
        let noise = log(0, elsewhere, vec![parser.trust_topic], vec![0u8; 32]);
        assert!(!parser.is_candidate(&noise));
        let receipt = receipt(0, vec![noise.clone()]);
        assert!(parser.parse(&block(1), &receipt, &noise).unwrap().is_empty());
    }
}
