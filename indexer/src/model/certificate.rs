//! Stake delegation and pool certificates.

use serde::{Deserialize, Serialize};

/// Wire kind of a certificate, including the owner-stake form of delegation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CertificateKind {
    StakeDelegation,
    OwnerStakeDelegation,
    PoolRegistration,
    PoolRetirement,
    PoolUpdate,
}

impl CertificateKind {
    pub fn as_str(self) -> &'static str {
        match self {
            CertificateKind::StakeDelegation => "StakeDelegation",
            CertificateKind::OwnerStakeDelegation => "OwnerStakeDelegation",
            CertificateKind::PoolRegistration => "PoolRegistration",
            CertificateKind::PoolRetirement => "PoolRetirement",
            CertificateKind::PoolUpdate => "PoolUpdate",
        }
    }
}

/// The raw certificate bytes, hex-encoded, tagged with their wire kind.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificatePayload {
    pub kind: CertificateKind,
    pub payload_hex: String,
}

/// A decoded certificate.
///
/// Pool and account identifiers are hex strings. Only `StakeDelegation`
/// affects account ledger rows; the pool variants are recorded as-is.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Certificate {
    PoolRegistration {
        payload: CertificatePayload,
        pool_id: String,
        start_validity: u64,
        owners: Vec<String>,
        operators: Vec<String>,
    },
    PoolRetirement {
        payload: CertificatePayload,
        pool_id: String,
        retirement_time: u64,
    },
    PoolUpdate {
        payload: CertificatePayload,
        pool_id: String,
    },
    /// `pool_id` is `None` when the account un-delegates. Owner-stake
    /// delegations resolve `account` from the transaction's single account
    /// input.
    StakeDelegation {
        payload: CertificatePayload,
        pool_id: Option<String>,
        account: String,
    },
}

impl Certificate {
    pub fn payload(&self) -> &CertificatePayload {
        match self {
            Certificate::PoolRegistration { payload, .. }
            | Certificate::PoolRetirement { payload, .. }
            | Certificate::PoolUpdate { payload, .. }
            | Certificate::StakeDelegation { payload, .. } => payload,
        }
    }

    pub fn kind(&self) -> CertificateKind {
        self.payload().kind
    }

    /// Pool the certificate refers to, if any.
    pub fn pool_id(&self) -> Option<&str> {
        match self {
            Certificate::PoolRegistration { pool_id, .. }
            | Certificate::PoolRetirement { pool_id, .. }
            | Certificate::PoolUpdate { pool_id, .. } => Some(pool_id),
            Certificate::StakeDelegation { pool_id, .. } => pool_id.as_deref(),
        }
    }

    pub fn is_delegation(&self) -> bool {
        matches!(self, Certificate::StakeDelegation { .. })
    }
}
