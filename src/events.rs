use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decimal::{Bps, FeeRate, Money};
use crate::types::{Address, LoanId};

/// all events that can be emitted by the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    LoanOriginated {
        loan_id: LoanId,
        document_hash: String,
    },
    InterestRateAdjusted {
        loan_id: LoanId,
        new_rate: Bps,
    },
    PaymentReceived {
        loan_id: LoanId,
        payer: Address,
        amount: Money,
    },
    ServiceFeePaid {
        loan_id: LoanId,
        fee_amount: Money,
    },
    ServiceFeeRateUpdated {
        new_rate: FeeRate,
    },
    MsrHolderChanged {
        new_holder: Address,
    },
}

impl Event {
    /// loan the event belongs to, if any
    pub fn loan_id(&self) -> Option<LoanId> {
        match self {
            Event::LoanOriginated { loan_id, .. }
            | Event::InterestRateAdjusted { loan_id, .. }
            | Event::PaymentReceived { loan_id, .. }
            | Event::ServiceFeePaid { loan_id, .. } => Some(*loan_id),
            Event::ServiceFeeRateUpdated { .. } | Event::MsrHolderChanged { .. } => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Event::LoanOriginated { .. } => "LoanOriginated",
            Event::InterestRateAdjusted { .. } => "InterestRateAdjusted",
            Event::PaymentReceived { .. } => "PaymentReceived",
            Event::ServiceFeePaid { .. } => "ServiceFeePaid",
            Event::ServiceFeeRateUpdated { .. } => "ServiceFeeRateUpdated",
            Event::MsrHolderChanged { .. } => "MSRHolderChanged",
        }
    }

    /// fixed binary encoding fed into the chain hash
    fn canonical_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(64);
        match self {
            Event::LoanOriginated { loan_id, document_hash } => {
                out.push(1);
                out.extend_from_slice(&loan_id.to_be_bytes());
                out.extend_from_slice(&(document_hash.len() as u64).to_be_bytes());
                out.extend_from_slice(document_hash.as_bytes());
            }
            Event::InterestRateAdjusted { loan_id, new_rate } => {
                out.push(2);
                out.extend_from_slice(&loan_id.to_be_bytes());
                out.extend_from_slice(&new_rate.value().to_be_bytes());
            }
            Event::PaymentReceived { loan_id, payer, amount } => {
                out.push(3);
                out.extend_from_slice(&loan_id.to_be_bytes());
                out.extend_from_slice(payer.as_bytes());
                out.extend_from_slice(&amount.minor().to_be_bytes());
            }
            Event::ServiceFeePaid { loan_id, fee_amount } => {
                out.push(4);
                out.extend_from_slice(&loan_id.to_be_bytes());
                out.extend_from_slice(&fee_amount.minor().to_be_bytes());
            }
            Event::ServiceFeeRateUpdated { new_rate } => {
                out.push(5);
                out.extend_from_slice(&new_rate.raw().to_be_bytes());
            }
            Event::MsrHolderChanged { new_holder } => {
                out.push(6);
                out.extend_from_slice(new_holder.as_bytes());
            }
        }
        out
    }
}

/// one entry in the append-only log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggedEvent {
    pub sequence: u64,
    pub entry_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub event: Event,
    #[serde(with = "hash_hex")]
    pub prev_hash: [u8; 32],
    #[serde(with = "hash_hex")]
    pub hash: [u8; 32],
}

impl LoggedEvent {
    fn compute_hash(
        prev_hash: &[u8; 32],
        sequence: u64,
        entry_id: &Uuid,
        timestamp: &DateTime<Utc>,
        event: &Event,
    ) -> [u8; 32] {
        let mut hasher = blake3::Hasher::new();
        hasher.update(prev_hash);
        hasher.update(&sequence.to_be_bytes());
        hasher.update(entry_id.as_bytes());
        hasher.update(&timestamp.timestamp_micros().to_be_bytes());
        hasher.update(&event.canonical_bytes());
        *hasher.finalize().as_bytes()
    }

    fn is_consistent(&self) -> bool {
        Self::compute_hash(
            &self.prev_hash,
            self.sequence,
            &self.entry_id,
            &self.timestamp,
            &self.event,
        ) == self.hash
    }
}

/// append-only, hash-chained event log
///
/// Each entry commits to the previous entry's hash, so editing, dropping or
/// reordering any entry breaks every hash after it. Observers poll with
/// `since` and keep their own cursor, which gives at-least-once delivery.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventLog {
    entries: Vec<LoggedEvent>,
}

impl EventLog {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// append an event, returns its sequence number
    pub fn append(&mut self, event: Event, timestamp: DateTime<Utc>) -> u64 {
        let sequence = self.entries.len() as u64;
        let prev_hash = self.latest_hash();
        let entry_id = Uuid::new_v4();
        let hash = LoggedEvent::compute_hash(&prev_hash, sequence, &entry_id, &timestamp, &event);

        tracing::debug!(sequence, event = event.name(), "event appended");

        self.entries.push(LoggedEvent {
            sequence,
            entry_id,
            timestamp,
            event,
            prev_hash,
            hash,
        });
        sequence
    }

    pub fn entries(&self) -> &[LoggedEvent] {
        &self.entries
    }

    /// events only, in append order
    pub fn events(&self) -> impl Iterator<Item = &Event> {
        self.entries.iter().map(|e| &e.event)
    }

    /// entries with sequence >= cursor
    pub fn since(&self, cursor: u64) -> &[LoggedEvent] {
        let start = (cursor as usize).min(self.entries.len());
        &self.entries[start..]
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// hash of the newest entry, zero for an empty log
    pub fn latest_hash(&self) -> [u8; 32] {
        self.entries.last().map(|e| e.hash).unwrap_or([0u8; 32])
    }

    /// sequence of the first entry whose hash or link does not check out
    pub fn first_tampered(&self) -> Option<u64> {
        let mut expected_prev = [0u8; 32];
        for (index, entry) in self.entries.iter().enumerate() {
            if entry.sequence != index as u64
                || entry.prev_hash != expected_prev
                || !entry.is_consistent()
            {
                return Some(index as u64);
            }
            expected_prev = entry.hash;
        }
        None
    }

    pub fn verify_chain(&self) -> bool {
        self.first_tampered().is_none()
    }

    /// drop entries appended after `len`; only used to roll back an aborted operation
    pub(crate) fn truncate(&mut self, len: usize) {
        self.entries.truncate(len);
    }
}

mod hash_hex {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<[u8; 32], D::Error> {
        let raw = String::deserialize(deserializer)?;
        let mut out = [0u8; 32];
        hex::decode_to_slice(raw, &mut out).map_err(serde::de::Error::custom)?;
        Ok(out)
    }
}
