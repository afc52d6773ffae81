//! Legacy CBOR transactions.
//!
//! A block carries each transaction as `[tx, witnesses]` where
//! `tx = [inputs, outputs, attributes]`. The transaction id is the hash of
//! `tx` re-encoded with indefinite-length input and output lists, which is
//! how the producing node framed it, regardless of how the block we
//! received happens to encode it.

use ciborium::value::Value;

use super::address::fix_long_address;
use super::cbor;
use super::DecodeError;
use crate::crypto::{blake2b_256, Hash};
use crate::model::{AddressKind, Input, Output, Transaction, TxContext, TxStatus};

/// Definite-length array header with three elements.
const ARRAY_OF_THREE: u8 = 0x83;

/// The only legacy input type: a pointer to a previous output.
const INPUT_TYPE_UTXO: u64 = 0;

/// Split a transaction element into its `[inputs, outputs, attributes]`
/// base. Signed pairs carry it in the first slot; bare triples are the base.
fn tx_base(value: &Value) -> Result<&[Value], DecodeError> {
    let items = cbor::array(value, "transaction")?;
    match items.len() {
        2 => cbor::array_min(&items[0], 3, "transaction body"),
        3 => Ok(items),
        n => Err(DecodeError::malformed(
            "transaction",
            format!("expected 2 or 3 elements, got {n}"),
        )),
    }
}

/// Canonical body bytes and the id derived from them.
pub fn canonical_body(inputs: &[Value], outputs: &[Value], attributes: &Value) -> Result<(Hash, Vec<u8>), DecodeError> {
    let mut body = vec![ARRAY_OF_THREE];
    body.extend_from_slice(&cbor::encode_indefinite(inputs)?);
    body.extend_from_slice(&cbor::encode_indefinite(outputs)?);
    body.extend_from_slice(&cbor::encode(attributes)?);
    Ok((blake2b_256(&body), body))
}

fn decode_input(value: &Value) -> Result<Input, DecodeError> {
    let items = cbor::array_min(value, 2, "input")?;
    let input_type = cbor::uint(&items[0], "input type")?;
    if input_type != INPUT_TYPE_UTXO {
        return Err(DecodeError::UnknownInputType(input_type));
    }
    let pointer = cbor::embedded(&items[1], "input pointer")?;
    let pointer = cbor::array_min(&pointer, 2, "input pointer")?;
    let tx_id = cbor::hash(&pointer[0], "input tx id")?;
    let index = cbor::uint(&pointer[1], "input index")?;
    let index = u32::try_from(index)
        .map_err(|_| DecodeError::malformed("input index", format!("{index} out of range")))?;
    Ok(Input::Utxo { tx_id, index })
}

fn decode_output(value: &Value) -> Result<Output, DecodeError> {
    let items = cbor::array_min(value, 2, "output")?;
    let address = bs58::encode(cbor::encode(&items[0])?).into_string();
    let amount = cbor::uint(&items[1], "output value")?;
    Ok(Output::new(
        AddressKind::Bootstrap,
        fix_long_address(&address),
        amount,
    ))
}

pub fn decode_transaction(value: &Value, context: TxContext) -> Result<Transaction, DecodeError> {
    let base = tx_base(value)?;
    let inputs = cbor::array(&base[0], "inputs")?;
    let outputs = cbor::array(&base[1], "outputs")?;
    let (id, body) = canonical_body(inputs, outputs, &base[2])?;

    let status = if context.block_hash.is_some() {
        TxStatus::Success
    } else {
        TxStatus::Pending
    };

    Ok(Transaction {
        id,
        inputs: inputs.iter().map(decode_input).collect::<Result<_, _>>()?,
        outputs: outputs.iter().map(decode_output).collect::<Result<_, _>>()?,
        certificate: None,
        body,
        context,
        status,
    })
}
