//! Typed index events — the closed set of domain events this indexer knows.
//!
//! Every decoded log becomes one (or, for batch transfers, several) of these
//! variants. The set is a closed enum so routing an event to its table is an
//! exhaustive match instead of a runtime type lookup.

use alloy_primitives::{Address, U256};

// ─── EventMeta ───────────────────────────────────────────────────────────────

/// Positional metadata carried by every event.
///
/// `(block_number, transaction_index, log_index[, batch_index])` is the total
/// ordering key across a block range and the primary key of every event table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventMeta {
    pub block_number: i64,
    /// Unix timestamp of the containing block.
    pub timestamp: i64,
    pub transaction_index: i32,
    pub log_index: i32,
    /// Transaction hash as lowercase `0x…` text.
    pub transaction_hash: String,
}

// ─── Circles V1 hub events ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct V1Signup {
    pub meta: EventMeta,
    pub user: Address,
    /// The personal Circles token deployed for this user.
    pub token: Address,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct V1OrganizationSignup {
    pub meta: EventMeta,
    pub organization: Address,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct V1Trust {
    pub meta: EventMeta,
    pub user: Address,
    pub can_send_to: Address,
    pub limit: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct V1HubTransfer {
    pub meta: EventMeta,
    pub from: Address,
    pub to: Address,
    pub amount: U256,
}

/// ERC-20 `Transfer` from a discovered personal Circles token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Erc20Transfer {
    pub meta: EventMeta,
    pub token_address: Address,
    pub from: Address,
    pub to: Address,
    pub amount: U256,
}

// ─── Circles V2 hub events ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct V2RegisterHuman {
    pub meta: EventMeta,
    pub avatar: Address,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct V2RegisterOrganization {
    pub meta: EventMeta,
    pub organization: Address,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct V2RegisterGroup {
    pub meta: EventMeta,
    pub group: Address,
    pub mint: Address,
    pub treasury: Address,
    pub name: String,
    pub symbol: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct V2PersonalMint {
    pub meta: EventMeta,
    pub human: Address,
    pub amount: U256,
    pub start_period: U256,
    pub end_period: U256,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct V2InviteHuman {
    pub meta: EventMeta,
    pub inviter: Address,
    pub invited: Address,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct V2Trust {
    pub meta: EventMeta,
    pub truster: Address,
    pub trustee: Address,
    pub expiry_time: U256,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct V2Stopped {
    pub meta: EventMeta,
    pub avatar: Address,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Erc1155ApprovalForAll {
    pub meta: EventMeta,
    pub account: Address,
    pub operator: Address,
    pub approved: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Erc1155TransferSingle {
    pub meta: EventMeta,
    pub operator: Address,
    pub from: Address,
    pub to: Address,
    pub id: U256,
    pub value: U256,
}

/// One logical member of an ERC-1155 `TransferBatch` log.
///
/// A single batch log expands into N of these, numbered `0..N-1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Erc1155TransferBatch {
    pub meta: EventMeta,
    pub batch_index: i32,
    pub operator: Address,
    pub from: Address,
    pub to: Address,
    pub id: U256,
    pub value: U256,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Erc1155Uri {
    pub meta: EventMeta,
    pub id: U256,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct V2DiscountCost {
    pub meta: EventMeta,
    pub account: Address,
    pub id: U256,
    pub discount_cost: U256,
}

// ─── Name registry events ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterShortName {
    pub meta: EventMeta,
    pub avatar: Address,
    pub short_name: U256,
    pub nonce: U256,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateMetadataDigest {
    pub meta: EventMeta,
    pub avatar: Address,
    pub metadata_digest: Vec<u8>,
}

// ─── IndexEvent ──────────────────────────────────────────────────────────────

/// The tagged union over every concrete event kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexEvent {
    V1Signup(V1Signup),
    V1OrganizationSignup(V1OrganizationSignup),
    V1Trust(V1Trust),
    V1HubTransfer(V1HubTransfer),
    Erc20Transfer(Erc20Transfer),
    V2RegisterHuman(V2RegisterHuman),
    V2RegisterOrganization(V2RegisterOrganization),
    V2RegisterGroup(V2RegisterGroup),
    V2PersonalMint(V2PersonalMint),
    V2InviteHuman(V2InviteHuman),
    V2Trust(V2Trust),
    V2Stopped(V2Stopped),
    Erc1155ApprovalForAll(Erc1155ApprovalForAll),
    Erc1155TransferSingle(Erc1155TransferSingle),
    Erc1155TransferBatch(Erc1155TransferBatch),
    Erc1155Uri(Erc1155Uri),
    V2DiscountCost(V2DiscountCost),
    RegisterShortName(RegisterShortName),
    UpdateMetadataDigest(UpdateMetadataDigest),
}

/// Discriminator for [`IndexEvent`] variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    V1Signup,
    V1OrganizationSignup,
    V1Trust,
    V1HubTransfer,
    Erc20Transfer,
    V2RegisterHuman,
    V2RegisterOrganization,
    V2RegisterGroup,
    V2PersonalMint,
    V2InviteHuman,
    V2Trust,
    V2Stopped,
    Erc1155ApprovalForAll,
    Erc1155TransferSingle,
    Erc1155TransferBatch,
    Erc1155Uri,
    V2DiscountCost,
    RegisterShortName,
    UpdateMetadataDigest,
}

impl EventKind {
    /// Every kind, in declaration order.
    pub const ALL: [EventKind; 19] = [
        EventKind::V1Signup,
        EventKind::V1OrganizationSignup,
        EventKind::V1Trust,
        EventKind::V1HubTransfer,
        EventKind::Erc20Transfer,
        EventKind::V2RegisterHuman,
        EventKind::V2RegisterOrganization,
        EventKind::V2RegisterGroup,
        EventKind::V2PersonalMint,
        EventKind::V2InviteHuman,
        EventKind::V2Trust,
        EventKind::V2Stopped,
        EventKind::Erc1155ApprovalForAll,
        EventKind::Erc1155TransferSingle,
        EventKind::Erc1155TransferBatch,
        EventKind::Erc1155Uri,
        EventKind::V2DiscountCost,
        EventKind::RegisterShortName,
        EventKind::UpdateMetadataDigest,
    ];

    /// Physical table this kind is persisted to.
    pub fn table(&self) -> &'static str {
        match self {
            Self::V1Signup => "crc_v1_signup",
            Self::V1OrganizationSignup => "crc_v1_organization_signup",
            Self::V1Trust => "crc_v1_trust",
            Self::V1HubTransfer => "crc_v1_hub_transfer",
            Self::Erc20Transfer => "erc20_transfer",
            Self::V2RegisterHuman => "crc_v2_register_human",
            Self::V2RegisterOrganization => "crc_v2_register_organization",
            Self::V2RegisterGroup => "crc_v2_register_group",
            Self::V2PersonalMint => "crc_v2_personal_mint",
            Self::V2InviteHuman => "crc_v2_invite_human",
            Self::V2Trust => "crc_v2_trust",
            Self::V2Stopped => "crc_v2_stopped",
            Self::Erc1155ApprovalForAll => "erc1155_approval_for_all",
            Self::Erc1155TransferSingle => "erc1155_transfer_single",
            Self::Erc1155TransferBatch => "erc1155_transfer_batch",
            Self::Erc1155Uri => "erc1155_uri",
            Self::V2DiscountCost => "crc_v2_discount_cost",
            Self::RegisterShortName => "crc_v2_register_short_name",
            Self::UpdateMetadataDigest => "crc_v2_update_metadata_digest",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

impl IndexEvent {
    /// The kind discriminator of this event.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::V1Signup(_) => EventKind::V1Signup,
            Self::V1OrganizationSignup(_) => EventKind::V1OrganizationSignup,
            Self::V1Trust(_) => EventKind::V1Trust,
            Self::V1HubTransfer(_) => EventKind::V1HubTransfer,
            Self::Erc20Transfer(_) => EventKind::Erc20Transfer,
            Self::V2RegisterHuman(_) => EventKind::V2RegisterHuman,
            Self::V2RegisterOrganization(_) => EventKind::V2RegisterOrganization,
            Self::V2RegisterGroup(_) => EventKind::V2RegisterGroup,
            Self::V2PersonalMint(_) => EventKind::V2PersonalMint,
            Self::V2InviteHuman(_) => EventKind::V2InviteHuman,
            Self::V2Trust(_) => EventKind::V2Trust,
            Self::V2Stopped(_) => EventKind::V2Stopped,
            Self::Erc1155ApprovalForAll(_) => EventKind::Erc1155ApprovalForAll,
            Self::Erc1155TransferSingle(_) => EventKind::Erc1155TransferSingle,
            Self::Erc1155TransferBatch(_) => EventKind::Erc1155TransferBatch,
            Self::Erc1155Uri(_) => EventKind::Erc1155Uri,
            Self::V2DiscountCost(_) => EventKind::V2DiscountCost,
            Self::RegisterShortName(_) => EventKind::RegisterShortName,
            Self::UpdateMetadataDigest(_) => EventKind::UpdateMetadataDigest,
        }
    }

    /// Positional metadata shared by every variant.
    pub fn meta(&self) -> &EventMeta {
        match self {
            Self::V1Signup(e) => &e.meta,
            Self::V1OrganizationSignup(e) => &e.meta,
            Self::V1Trust(e) => &e.meta,
            Self::V1HubTransfer(e) => &e.meta,
            Self::Erc20Transfer(e) => &e.meta,
            Self::V2RegisterHuman(e) => &e.meta,
            Self::V2RegisterOrganization(e) => &e.meta,
            Self::V2RegisterGroup(e) => &e.meta,
            Self::V2PersonalMint(e) => &e.meta,
            Self::V2InviteHuman(e) => &e.meta,
            Self::V2Trust(e) => &e.meta,
            Self::V2Stopped(e) => &e.meta,
            Self::Erc1155ApprovalForAll(e) => &e.meta,
            Self::Erc1155TransferSingle(e) => &e.meta,
            Self::Erc1155TransferBatch(e) => &e.meta,
            Self::Erc1155Uri(e) => &e.meta,
            Self::V2DiscountCost(e) => &e.meta,
            Self::RegisterShortName(e) => &e.meta,
            Self::UpdateMetadataDigest(e) => &e.meta,
        }
    }

    /// Total ordering key: `(block_number, transaction_index, log_index,
    /// batch_index)`; `batch_index` is 0 for non-batch kinds.
    pub fn sort_key(&self) -> (i64, i32, i32, i32) {
        let batch_index = match self {
            Self::Erc1155TransferBatch(e) => e.batch_index,
            _ => 0,
        };
        let meta = self.meta();
        (
            meta.block_number,
            meta.transaction_index,
            meta.log_index,
            batch_index,
        )
    }
}
