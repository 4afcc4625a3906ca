//! pool events and the per-account event log
//!
//! events are stored the way external indexers read them: a kind tag plus a
//! flat list of 32-byte fields. field 0 is always the sequence index, the
//! rest is the kind-specific payload. decoding is driven by the tag.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{Account, Identity, MapKind, TokenId};

/// fixed-width event field
pub type Field = [u8; 32];

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EventError {
    #[error("unknown event kind {0}")]
    UnknownKind(u8),

    #[error("{kind:?} expects {expected} fields, got {got}")]
    FieldCount {
        kind: EventKind,
        expected: usize,
        got: usize,
    },

    #[error("field {0} does not fit in u64")]
    FieldOverflow(usize),
}

#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    LiquidityAdd = 0,
    LiquidityRemove = 1,
    Borrow = 2,
    Repay = 3,
    TokenTransfer = 4,
}

impl EventKind {
    /// number of fields including the sequence index
    pub fn field_count(&self) -> usize {
        match self {
            EventKind::LiquidityAdd | EventKind::LiquidityRemove | EventKind::Repay => 4,
            EventKind::Borrow => 3,
            EventKind::TokenTransfer => 5,
        }
    }
}

impl TryFrom<u8> for EventKind {
    type Error = EventError;

    fn try_from(tag: u8) -> Result<Self, EventError> {
        match tag {
            0 => Ok(EventKind::LiquidityAdd),
            1 => Ok(EventKind::LiquidityRemove),
            2 => Ok(EventKind::Borrow),
            3 => Ok(EventKind::Repay),
            4 => Ok(EventKind::TokenTransfer),
            other => Err(EventError::UnknownKind(other)),
        }
    }
}

/// typed pool event
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PoolEvent {
    LiquidityAdd {
        identity: Identity,
        amount: u64,
        new_total: u64,
    },
    LiquidityRemove {
        identity: Identity,
        amount: u64,
        new_total: u64,
    },
    Borrow {
        identity: Identity,
        amount: u64,
    },
    Repay {
        identity: Identity,
        amount: u64,
        remaining: u64,
    },
    TokenTransfer {
        from: Account,
        to: Account,
        amount: u64,
        token: TokenId,
    },
}

impl PoolEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            PoolEvent::LiquidityAdd { .. } => EventKind::LiquidityAdd,
            PoolEvent::LiquidityRemove { .. } => EventKind::LiquidityRemove,
            PoolEvent::Borrow { .. } => EventKind::Borrow,
            PoolEvent::Repay { .. } => EventKind::Repay,
            PoolEvent::TokenTransfer { .. } => EventKind::TokenTransfer,
        }
    }

    /// signed change this event made to a balance leaf
    pub fn leaf_delta(&self) -> Option<(Identity, MapKind, i128)> {
        match *self {
            PoolEvent::LiquidityAdd { identity, amount, .. } => {
                Some((identity, MapKind::Liquidity, amount as i128))
            }
            PoolEvent::LiquidityRemove { identity, amount, .. } => {
                Some((identity, MapKind::Liquidity, -(amount as i128)))
            }
            PoolEvent::Borrow { identity, amount } => {
                Some((identity, MapKind::Borrows, amount as i128))
            }
            PoolEvent::Repay { identity, amount, .. } => {
                Some((identity, MapKind::Borrows, -(amount as i128)))
            }
            PoolEvent::TokenTransfer { .. } => None,
        }
    }

    pub fn encode(&self, sequence_index: u64) -> EncodedEvent {
        let mut fields = vec![u64_field(sequence_index)];
        match self {
            PoolEvent::LiquidityAdd { identity, amount, new_total }
            | PoolEvent::LiquidityRemove { identity, amount, new_total } => {
                fields.push(identity.0);
                fields.push(u64_field(*amount));
                fields.push(u64_field(*new_total));
            }
            PoolEvent::Borrow { identity, amount } => {
                fields.push(identity.0);
                fields.push(u64_field(*amount));
            }
            PoolEvent::Repay { identity, amount, remaining } => {
                fields.push(identity.0);
                fields.push(u64_field(*amount));
                fields.push(u64_field(*remaining));
            }
            PoolEvent::TokenTransfer { from, to, amount, token } => {
                fields.push(from.0);
                fields.push(to.0);
                fields.push(u64_field(*amount));
                fields.push(token.0);
            }
        }
        EncodedEvent {
            kind: self.kind(),
            fields,
        }
    }
}

/// wire form of an event
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedEvent {
    pub kind: EventKind,
    pub fields: Vec<Field>,
}

impl EncodedEvent {
    pub fn sequence_index(&self) -> Result<u64, EventError> {
        let first = self.fields.first().ok_or(EventError::FieldCount {
            kind: self.kind,
            expected: self.kind.field_count(),
            got: 0,
        })?;
        field_u64(first, 0)
    }

    /// decode into (sequence index, event)
    pub fn decode(&self) -> Result<(u64, PoolEvent), EventError> {
        let expected = self.kind.field_count();
        if self.fields.len() != expected {
            return Err(EventError::FieldCount {
                kind: self.kind,
                expected,
                got: self.fields.len(),
            });
        }

        let f = &self.fields;
        let sequence_index = field_u64(&f[0], 0)?;
        let event = match self.kind {
            EventKind::LiquidityAdd => PoolEvent::LiquidityAdd {
                identity: Identity(f[1]),
                amount: field_u64(&f[2], 2)?,
                new_total: field_u64(&f[3], 3)?,
            },
            EventKind::LiquidityRemove => PoolEvent::LiquidityRemove {
                identity: Identity(f[1]),
                amount: field_u64(&f[2], 2)?,
                new_total: field_u64(&f[3], 3)?,
            },
            EventKind::Borrow => PoolEvent::Borrow {
                identity: Identity(f[1]),
                amount: field_u64(&f[2], 2)?,
            },
            EventKind::Repay => PoolEvent::Repay {
                identity: Identity(f[1]),
                amount: field_u64(&f[2], 2)?,
                remaining: field_u64(&f[3], 3)?,
            },
            EventKind::TokenTransfer => PoolEvent::TokenTransfer {
                from: Account(f[1]),
                to: Account(f[2]),
                amount: field_u64(&f[3], 3)?,
                token: TokenId(f[4]),
            },
        };
        Ok((sequence_index, event))
    }
}

fn u64_field(value: u64) -> Field {
    let mut field = [0u8; 32];
    field[..8].copy_from_slice(&value.to_le_bytes());
    field
}

fn field_u64(field: &Field, position: usize) -> Result<u64, EventError> {
    if field[8..].iter().any(|b| *b != 0) {
        return Err(EventError::FieldOverflow(position));
    }
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&field[..8]);
    Ok(u64::from_le_bytes(bytes))
}

/// append-only, strictly ordered event stream for one account
#[derive(Clone, Debug, Default)]
pub struct EventLog {
    events: Vec<EncodedEvent>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// append and return the assigned sequence index
    pub fn append(&mut self, event: &PoolEvent) -> u64 {
        let sequence_index = self.events.len() as u64;
        self.events.push(event.encode(sequence_index));
        sequence_index
    }

    /// events with sequence index >= `start`
    pub fn read_from(&self, start: u64) -> &[EncodedEvent] {
        let start = (start as usize).min(self.events.len());
        &self.events[start..]
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> Identity {
        Identity([7; 32])
    }

    #[test]
    fn test_log_orders_and_decodes() {
        let mut log = EventLog::new();
        let add = PoolEvent::LiquidityAdd { identity: alice(), amount: 10_000, new_total: 10_000 };
        let transfer = PoolEvent::TokenTransfer {
            from: Account([1; 32]),
            to: Account([2; 32]),
            amount: 5_000,
            token: TokenId([3; 32]),
        };

        assert_eq!(log.append(&add), 0);
        assert_eq!(log.append(&transfer), 1);
        assert_eq!(log.len(), 2);

        let tail = log.read_from(1);
        assert_eq!(tail.len(), 1);
        assert_eq!(tail[0].decode().unwrap(), (1, transfer));
        assert_eq!(log.read_from(0)[0].decode().unwrap(), (0, add));
        assert!(log.read_from(10).is_empty());
    }

    #[test]
    fn test_decode_checks_field_count_against_kind() {
        let event = PoolEvent::Borrow { identity: alice(), amount: 5 };
        let mut encoded = event.encode(4);
        // same fields relabelled with a kind that needs more
        encoded.kind = EventKind::Repay;
        assert_eq!(
            encoded.decode(),
            Err(EventError::FieldCount { kind: EventKind::Repay, expected: 4, got: 3 })
        );
        assert_eq!(encoded.sequence_index(), Ok(4));
    }

    #[test]
    fn test_overflowing_amount_field() {
        let mut encoded = PoolEvent::Borrow { identity: alice(), amount: 5 }.encode(0);
        encoded.fields[2][31] = 1;
        assert_eq!(encoded.decode(), Err(EventError::FieldOverflow(2)));
    }

    #[test]
    fn test_kind_tags() {
        assert_eq!(EventKind::try_from(2), Ok(EventKind::Borrow));
        assert_eq!(EventKind::try_from(9), Err(EventError::UnknownKind(9)));
        assert_eq!(EventKind::TokenTransfer as u8, 4);
    }

    #[test]
    fn test_leaf_delta_sign() {
        let remove = PoolEvent::LiquidityRemove { identity: alice(), amount: 30, new_total: 0 };
        assert_eq!(remove.leaf_delta(), Some((alice(), MapKind::Liquidity, -30)));
        let repay = PoolEvent::Repay { identity: alice(), amount: 2, remaining: 1 };
        assert_eq!(repay.leaf_delta(), Some((alice(), MapKind::Borrows, -2)));
    }
}
