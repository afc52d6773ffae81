//! Certificate payload layouts of extended fragments.
//!
//! Each reader consumes exactly the certificate bytes and keeps them as the
//! hex payload. Owner-stake delegations name no account of their own; they
//! come back as `PendingCertificate::OwnerStake` and the fragment decoder
//! resolves the account from the transaction inputs.

use super::reader::Reader;
use super::DecodeError;
use crate::crypto::blake2b_256;
use crate::model::{Certificate, CertificateKind, CertificatePayload};

const DELEGATION_NONE: u8 = 0;
const DELEGATION_FULL: u8 = 1;
const DELEGATION_RATIO: u8 = 2;

const SERIAL_LEN: usize = 16;
const ID_LEN: usize = 32;

/// A certificate as read from the wire, before inputs are known.
#[derive(Debug)]
pub enum PendingCertificate {
    Ready(Certificate),
    OwnerStake {
        payload: CertificatePayload,
        pool_id: Option<String>,
    },
}

pub fn read_certificate(
    reader: &mut Reader<'_>,
    kind: CertificateKind,
) -> Result<PendingCertificate, DecodeError> {
    let start = reader.consumed().len();
    let pending = match kind {
        CertificateKind::StakeDelegation => {
            let account = hex::encode(reader.read_fixed::<ID_LEN>()?);
            let pool_id = read_delegation_type(reader)?;
            PendingCertificate::Ready(Certificate::StakeDelegation {
                payload: payload_since(reader, start, kind),
                pool_id,
                account,
            })
        }
        CertificateKind::OwnerStakeDelegation => {
            let pool_id = read_delegation_type(reader)?;
            PendingCertificate::OwnerStake {
                payload: payload_since(reader, start, kind),
                pool_id,
            }
        }
        CertificateKind::PoolRegistration => {
            let registration = read_registration(reader, kind)?;
            let payload_bytes = &reader.consumed()[start..];
            PendingCertificate::Ready(Certificate::PoolRegistration {
                pool_id: hex::encode(blake2b_256(payload_bytes)),
                payload: payload_since(reader, start, kind),
                start_validity: registration.start_validity,
                owners: registration.owners,
                operators: registration.operators,
            })
        }
        CertificateKind::PoolRetirement => {
            let pool_id = hex::encode(reader.read_fixed::<ID_LEN>()?);
            let retirement_time = reader.read_u64()?;
            PendingCertificate::Ready(Certificate::PoolRetirement {
                payload: payload_since(reader, start, kind),
                pool_id,
                retirement_time,
            })
        }
        CertificateKind::PoolUpdate => {
            let pool_id = hex::encode(reader.read_fixed::<ID_LEN>()?);
            // Hash of the registration being replaced.
            reader.read_fixed::<ID_LEN>()?;
            read_registration(reader, kind)?;
            PendingCertificate::Ready(Certificate::PoolUpdate {
                payload: payload_since(reader, start, kind),
                pool_id,
            })
        }
    };
    Ok(pending)
}

fn payload_since(reader: &Reader<'_>, start: usize, kind: CertificateKind) -> CertificatePayload {
    CertificatePayload {
        kind,
        payload_hex: hex::encode(&reader.consumed()[start..]),
    }
}

/// Returns the pool for a full delegation, `None` otherwise.
fn read_delegation_type(reader: &mut Reader<'_>) -> Result<Option<String>, DecodeError> {
    match reader.read_u8()? {
        DELEGATION_NONE => Ok(None),
        DELEGATION_FULL => Ok(Some(hex::encode(reader.read_fixed::<ID_LEN>()?))),
        DELEGATION_RATIO => {
            let _parts = reader.read_u8()?;
            let count = reader.read_u8()?;
            for _ in 0..count {
                reader.read_fixed::<ID_LEN>()?;
                reader.read_u8()?;
            }
            Ok(None)
        }
        other => Err(DecodeError::UnknownDelegationType(other)),
    }
}

struct Registration {
    start_validity: u64,
    owners: Vec<String>,
    operators: Vec<String>,
}

/// serial[16] start_validity:u64 permissions:u64 vrf[32] kes[32]
/// owners operators
fn read_registration(
    reader: &mut Reader<'_>,
    kind: CertificateKind,
) -> Result<Registration, DecodeError> {
    reader.read_fixed::<SERIAL_LEN>()?;
    let start_validity = reader.read_u64()?;
    let _permissions = reader.read_u64()?;
    reader.read_fixed::<ID_LEN>()?;
    reader.read_fixed::<ID_LEN>()?;
    let owners = read_key_list(reader)?;
    let operators = read_key_list(reader)?;
    if owners.is_empty() {
        return Err(DecodeError::MalformedCertificate {
            kind: kind.as_str(),
            reason: "no owners".into(),
        });
    }
    Ok(Registration {
        start_validity,
        owners,
        operators,
    })
}

fn read_key_list(reader: &mut Reader<'_>) -> Result<Vec<String>, DecodeError> {
    let count = reader.read_u8()?;
    let mut keys = Vec::with_capacity(count as usize);
    for _ in 0..count {
        keys.push(hex::encode(reader.read_fixed::<ID_LEN>()?));
    }
    Ok(keys)
}
