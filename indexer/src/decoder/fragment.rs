//! Extended transactions: size-prefixed binary fragments.
//!
//! ```text
//! fragment  = size:u16 tag:u8 content            (size covers tag + content)
//! content   = [certificate] nb_in:u8 nb_out:u8 input* output* witnesses
//! input     = index:u8 value:u64 pointer[32]     (index 0xff: account key)
//! output    = address value:u64
//! ```
//!
//! The fragment id is the Blake2b-256 of `tag ‖ content`. Witnesses are
//! not validated and are skipped.

use super::address::{account_address_hex, read_address};
use super::certificate::{read_certificate, PendingCertificate};
use super::reader::Reader;
use super::DecodeError;
use crate::config::Discrimination;
use crate::crypto::blake2b_256;
use crate::model::{
    Certificate, CertificateKind, Input, Output, Transaction, TxContext, TxStatus,
};

const TAG_TRANSACTION: u8 = 2;
const TAG_OWNER_STAKE_DELEGATION: u8 = 3;
const TAG_STAKE_DELEGATION: u8 = 4;
const TAG_POOL_REGISTRATION: u8 = 5;
const TAG_POOL_RETIREMENT: u8 = 6;
const TAG_POOL_UPDATE: u8 = 7;

const INPUT_ACCOUNT: u8 = 0xff;
const INPUT_MULTISIG: u8 = 0xfe;

/// Multisig account header kind, before discrimination.
const MULTISIG_KIND: u8 = 0x06;

fn certificate_kind(tag: u8) -> Result<Option<CertificateKind>, DecodeError> {
    match tag {
        TAG_TRANSACTION => Ok(None),
        TAG_OWNER_STAKE_DELEGATION => Ok(Some(CertificateKind::OwnerStakeDelegation)),
        TAG_STAKE_DELEGATION => Ok(Some(CertificateKind::StakeDelegation)),
        TAG_POOL_REGISTRATION => Ok(Some(CertificateKind::PoolRegistration)),
        TAG_POOL_RETIREMENT => Ok(Some(CertificateKind::PoolRetirement)),
        TAG_POOL_UPDATE => Ok(Some(CertificateKind::PoolUpdate)),
        other => Err(DecodeError::UnknownFragmentTag(other)),
    }
}

pub fn decode_fragment(
    bytes: &[u8],
    discrimination: Discrimination,
    context: TxContext,
) -> Result<Transaction, DecodeError> {
    let mut framed = Reader::new(bytes);
    let declared = framed.read_u16()? as usize;
    let body = framed.read_rest();
    if declared != body.len() {
        return Err(DecodeError::FragmentSize {
            declared,
            actual: body.len(),
        });
    }

    let mut reader = Reader::new(body);
    let tag = reader.read_u8()?;
    let cert_kind = certificate_kind(tag)?;
    let pending = cert_kind
        .map(|kind| read_certificate(&mut reader, kind))
        .transpose()?;

    let input_count = reader.read_u8()?;
    let output_count = reader.read_u8()?;

    let mut inputs = Vec::with_capacity(input_count as usize);
    for _ in 0..input_count {
        inputs.push(read_input(&mut reader, discrimination)?);
    }

    let mut outputs = Vec::with_capacity(output_count as usize);
    for _ in 0..output_count {
        let (kind, raw) = read_address(&mut reader)?;
        let value = reader.read_u64()?;
        outputs.push(Output::new(kind, hex::encode(raw), value));
    }

    // Witnesses.
    reader.read_rest();

    let certificate = pending.map(|p| resolve_certificate(p, &inputs)).transpose()?;
    let status = if context.block_hash.is_some() {
        TxStatus::Success
    } else {
        TxStatus::Pending
    };

    Ok(Transaction {
        id: blake2b_256(body),
        inputs,
        outputs,
        certificate,
        body: bytes.to_vec(),
        context,
        status,
    })
}

fn read_input(reader: &mut Reader<'_>, discrimination: Discrimination) -> Result<Input, DecodeError> {
    let index = reader.read_u8()?;
    let value = reader.read_u64()?;
    let pointer = reader.read_fixed::<32>()?;
    let input = match index {
        INPUT_ACCOUNT => Input::Account {
            account_id: account_address_hex(&pointer, discrimination),
            value,
        },
        INPUT_MULTISIG => {
            let mut raw = vec![discrimination.header_bit() | MULTISIG_KIND];
            raw.extend_from_slice(&pointer);
            Input::Account {
                account_id: hex::encode(raw),
                value,
            }
        }
        index => Input::Utxo {
            tx_id: pointer,
            index: u32::from(index),
        },
    };
    Ok(input)
}

/// An owner-stake delegation delegates the stake of the single account
/// paying for the transaction. Anything else is malformed.
fn resolve_certificate(
    pending: PendingCertificate,
    inputs: &[Input],
) -> Result<Certificate, DecodeError> {
    match pending {
        PendingCertificate::Ready(certificate) => Ok(certificate),
        PendingCertificate::OwnerStake { payload, pool_id } => match inputs {
            [Input::Account { account_id, .. }] => Ok(Certificate::StakeDelegation {
                payload,
                pool_id,
                account: account_id.clone(),
            }),
            _ => Err(DecodeError::MalformedCertificate {
                kind: CertificateKind::OwnerStakeDelegation.as_str(),
                reason: format!("expected exactly 1 account input, found {} inputs", inputs.len()),
            }),
        },
    }
}

// ---------------------------------------------------------------------------
// Encoding helpers for tests
// ---------------------------------------------------------------------------
