use alloy::primitives::{Address, B256, U256};
use alloy::rpc::types::Log;
use alloy::sol_types::SolEvent;
use serde_json::{Value, json};
use thiserror::Error;

use crate::abi::{KyeFactory, KyeGroup};

/// Names of the contract events the indexer understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    CircleCreated,
    MemberJoined,
    RoundStarted,
    DepositMade,
    PayoutExecuted,
    PenaltyCharged,
    PhaseChanged,
}

impl EventKind {
    pub const ALL: &'static [EventKind] = &[
        EventKind::CircleCreated,
        EventKind::MemberJoined,
        EventKind::RoundStarted,
        EventKind::DepositMade,
        EventKind::PayoutExecuted,
        EventKind::PenaltyCharged,
        EventKind::PhaseChanged,
    ];

    /// Solidity event name, also used as `blockchain_events.event_name`.
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::CircleCreated => "CircleCreated",
            EventKind::MemberJoined => "MemberJoined",
            EventKind::RoundStarted => "RoundStarted",
            EventKind::DepositMade => "DepositMade",
            EventKind::PayoutExecuted => "PayoutExecuted",
            EventKind::PenaltyCharged => "PenaltyCharged",
            EventKind::PhaseChanged => "PhaseChanged",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Lifecycle phase of a circle contract, as emitted by `PhaseChanged`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Setup,
    Recruiting,
    Active,
    Settling,
    Completed,
    Disputed,
}

impl Phase {
    pub fn from_u8(raw: u8) -> Option<Self> {
        Some(match raw {
            0 => Phase::Setup,
            1 => Phase::Recruiting,
            2 => Phase::Active,
            3 => Phase::Settling,
            4 => Phase::Completed,
            5 => Phase::Disputed,
            _ => return None,
        })
    }
}

/// A decoded circle event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KyeEvent {
    CircleCreated {
        creator: Address,
        circle: Address,
        group_id_hash: B256,
        deposit_amount: U256,
    },
    MemberJoined {
        member: Address,
        user_id_hash: B256,
    },
    RoundStarted {
        round_index: U256,
        beneficiary: Address,
        /// Unix seconds.
        deadline: U256,
    },
    DepositMade {
        member: Address,
        round_index: U256,
        amount: U256,
        penalty: U256,
    },
    PayoutExecuted {
        beneficiary: Address,
        round_index: U256,
        amount: U256,
    },
    PenaltyCharged {
        member: Address,
        round_index: U256,
        amount: U256,
    },
    PhaseChanged {
        old_phase: u8,
        new_phase: u8,
    },
}

impl KyeEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            KyeEvent::CircleCreated { .. } => EventKind::CircleCreated,
            KyeEvent::MemberJoined { .. } => EventKind::MemberJoined,
            KyeEvent::RoundStarted { .. } => EventKind::RoundStarted,
            KyeEvent::DepositMade { .. } => EventKind::DepositMade,
            KyeEvent::PayoutExecuted { .. } => EventKind::PayoutExecuted,
            KyeEvent::PenaltyCharged { .. } => EventKind::PenaltyCharged,
            KyeEvent::PhaseChanged { .. } => EventKind::PhaseChanged,
        }
    }

    /// Event arguments as stored in `blockchain_events.args`.
    /// Integers are decimal strings, addresses and hashes lowercase hex.
    pub fn args(&self) -> Value {
        match self {
            KyeEvent::CircleCreated {
                creator,
                circle,
                group_id_hash,
                deposit_amount,
            } => json!({
                "creator": format!("{creator:#x}"),
                "circleAddress": format!("{circle:#x}"),
                "groupIdHash": format!("{group_id_hash:#x}"),
                "depositAmount": deposit_amount.to_string(),
            }),
            KyeEvent::MemberJoined {
                member,
                user_id_hash,
            } => json!({
                "member": format!("{member:#x}"),
                "userIdHash": format!("{user_id_hash:#x}"),
            }),
            KyeEvent::RoundStarted {
                round_index,
                beneficiary,
                deadline,
            } => json!({
                "roundIndex": round_index.to_string(),
                "beneficiary": format!("{beneficiary:#x}"),
                "deadline": deadline.to_string(),
            }),
            KyeEvent::DepositMade {
                member,
                round_index,
                amount,
                penalty,
            } => json!({
                "member": format!("{member:#x}"),
                "roundIndex": round_index.to_string(),
                "amount": amount.to_string(),
                "penalty": penalty.to_string(),
            }),
            KyeEvent::PayoutExecuted {
                beneficiary,
                round_index,
                amount,
            } => json!({
                "beneficiary": format!("{beneficiary:#x}"),
                "roundIndex": round_index.to_string(),
                "amount": amount.to_string(),
            }),
            KyeEvent::PenaltyCharged {
                member,
                round_index,
                amount,
            } => json!({
                "member": format!("{member:#x}"),
                "roundIndex": round_index.to_string(),
                "amount": amount.to_string(),
            }),
            KyeEvent::PhaseChanged {
                old_phase,
                new_phase,
            } => json!({ "oldPhase": old_phase, "newPhase": new_phase }),
        }
    }
}

/// Where a log came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventMeta {
    pub contract: Address,
    pub block_number: u64,
    pub log_index: u64,
    pub transaction_hash: String,
    /// Present when the node includes `blockTimestamp` in log responses.
    pub block_timestamp: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedLog {
    pub meta: EventMeta,
    pub event: KyeEvent,
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("log has no {0}")]
    MissingField(&'static str),

    #[error("malformed {event} log: {source}")]
    Abi {
        event: &'static str,
        #[source]
        source: alloy::sol_types::Error,
    },
}

fn meta(log: &Log) -> Result<EventMeta, DecodeError> {
    Ok(EventMeta {
        contract: log.address(),
        block_number: log.block_number.ok_or(DecodeError::MissingField("block number"))?,
        log_index: log.log_index.ok_or(DecodeError::MissingField("log index"))?,
        transaction_hash: log
            .transaction_hash
            .map(|h| format!("{h:#x}"))
            .ok_or(DecodeError::MissingField("transaction hash"))?,
        block_timestamp: log.block_timestamp,
    })
}

fn decode<E: SolEvent>(log: &Log) -> Result<E, DecodeError> {
    log.log_decode::<E>()
        .map(|decoded| decoded.inner.data)
        .map_err(|source| DecodeError::Abi {
            event: E::SIGNATURE,
            source,
        })
}

/// Decode a log emitted by the factory contract.
///
/// Returns `Ok(None)` for events the indexer does not track.
pub fn decode_factory_log(log: &Log) -> Result<Option<DecodedLog>, DecodeError> {
    let Some(topic0) = log.topic0() else {
        return Ok(None);
    };
    if *topic0 != KyeFactory::CircleCreated::SIGNATURE_HASH {
        return Ok(None);
    }

    let meta = meta(log)?;
    let d = decode::<KyeFactory::CircleCreated>(log)?;
    Ok(Some(DecodedLog {
        meta,
        event: KyeEvent::CircleCreated {
            creator: d.creator,
            circle: d.circleAddress,
            group_id_hash: d.groupIdHash,
            deposit_amount: d.depositAmount,
        },
    }))
}

/// Decode a log emitted by a circle contract.
///
/// Returns `Ok(None)` for events the indexer does not track.
pub fn decode_group_log(log: &Log) -> Result<Option<DecodedLog>, DecodeError> {
    let Some(&topic0) = log.topic0() else {
        return Ok(None);
    };

    let event = if topic0 == KyeGroup::MemberJoined::SIGNATURE_HASH {
        let d = decode::<KyeGroup::MemberJoined>(log)?;
        KyeEvent::MemberJoined {
            member: d.member,
            user_id_hash: d.userIdHash,
        }
    } else if topic0 == KyeGroup::RoundStarted::SIGNATURE_HASH {
        let d = decode::<KyeGroup::RoundStarted>(log)?;
        KyeEvent::RoundStarted {
            round_index: d.roundIndex,
            beneficiary: d.beneficiary,
            deadline: d.deadline,
        }
    } else if topic0 == KyeGroup::DepositMade::SIGNATURE_HASH {
        let d = decode::<KyeGroup::DepositMade>(log)?;
        KyeEvent::DepositMade {
            member: d.member,
            round_index: d.roundIndex,
            amount: d.amount,
            penalty: d.penalty,
        }
    } else if topic0 == KyeGroup::PayoutExecuted::SIGNATURE_HASH {
        let d = decode::<KyeGroup::PayoutExecuted>(log)?;
        KyeEvent::PayoutExecuted {
            beneficiary: d.beneficiary,
            round_index: d.roundIndex,
            amount: d.amount,
        }
    } else if topic0 == KyeGroup::PenaltyCharged::SIGNATURE_HASH {
        let d = decode::<KyeGroup::PenaltyCharged>(log)?;
        KyeEvent::PenaltyCharged {
            member: d.member,
            round_index: d.roundIndex,
            amount: d.amount,
        }
    } else if topic0 == KyeGroup::PhaseChanged::SIGNATURE_HASH {
        let d = decode::<KyeGroup::PhaseChanged>(log)?;
        KyeEvent::PhaseChanged {
            old_phase: d.oldPhase,
            new_phase: d.newPhase,
        }
    } else {
        return Ok(None);
    };

    Ok(Some(DecodedLog {
        meta: meta(log)?,
        event,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::rpc_log;
    use alloy::primitives::{LogData, address, b256};

    const CIRCLE: Address = address!("00000000000000000000000000000000000000c1");
    const ALICE: Address = address!("00000000000000000000000000000000000000a1");

    #[test]
    fn decodes_circle_created_from_factory() {
        let event = KyeFactory::CircleCreated {
            creator: ALICE,
            circleAddress: CIRCLE,
            groupIdHash: b256!("1111111111111111111111111111111111111111111111111111111111111111"),
            depositAmount: U256::from(100_000_000u64),
        };
        let log = rpc_log(Address::repeat_byte(0xfa), &event, 42, 3, B256::repeat_byte(0x01));

        let decoded = decode_factory_log(&log).unwrap().unwrap();
        assert_eq!(decoded.meta.block_number, 42);
        assert_eq!(decoded.meta.log_index, 3);
        assert_eq!(decoded.event.kind(), EventKind::CircleCreated);

        let args = decoded.event.args();
        assert_eq!(args["circleAddress"], format!("{CIRCLE:#x}"));
        assert_eq!(args["depositAmount"], "100000000");
    }

    #[test]
    fn group_events_are_not_decoded_as_factory_events() {
        let event = KyeGroup::MemberJoined {
            member: ALICE,
            userIdHash: B256::ZERO,
        };
        let log = rpc_log(CIRCLE, &event, 1, 0, B256::repeat_byte(0x02));
        assert!(decode_factory_log(&log).unwrap().is_none());

        let decoded = decode_group_log(&log).unwrap().unwrap();
        assert_eq!(
            decoded.event,
            KyeEvent::MemberJoined {
                member: ALICE,
                user_id_hash: B256::ZERO,
            }
        );
    }

    #[test]
    fn round_started_keeps_deadline_and_beneficiary() {
        let event = KyeGroup::RoundStarted {
            roundIndex: U256::from(2),
            beneficiary: ALICE,
            deadline: U256::from(1_700_000_000u64),
        };
        let log = rpc_log(CIRCLE, &event, 7, 1, B256::repeat_byte(0x03));
        let decoded = decode_group_log(&log).unwrap().unwrap();
        let args = decoded.event.args();
        assert_eq!(args["roundIndex"], "2");
        assert_eq!(args["deadline"], "1700000000");
        assert_eq!(args["beneficiary"], format!("{ALICE:#x}"));
    }

    #[test]
    fn unknown_topics_are_skipped() {
        let mut log = rpc_log(
            CIRCLE,
            &KyeGroup::PhaseChanged {
                oldPhase: 1,
                newPhase: 2,
            },
            1,
            0,
            B256::ZERO,
        );
        log.inner.data = LogData::new_unchecked(vec![B256::repeat_byte(0xee)], Default::default());
        assert!(decode_group_log(&log).unwrap().is_none());
    }

    #[test]
    fn truncated_data_is_a_decode_error() {
        let mut log = rpc_log(
            CIRCLE,
            &KyeGroup::PhaseChanged {
                oldPhase: 1,
                newPhase: 2,
            },
            1,
            0,
            B256::ZERO,
        );
        let topics = log.inner.data.topics().to_vec();
        log.inner.data = LogData::new_unchecked(topics, Default::default());
        assert!(matches!(
            decode_group_log(&log),
            Err(DecodeError::Abi { .. })
        ));
    }

    #[test]
    fn phase_numbers_outside_the_contract_enum_are_rejected() {
        assert_eq!(Phase::from_u8(2), Some(Phase::Active));
        assert_eq!(Phase::from_u8(5), Some(Phase::Disputed));
        assert_eq!(Phase::from_u8(6), None);
    }
}
