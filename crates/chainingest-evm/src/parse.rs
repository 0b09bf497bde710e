//! Conversion of `eth_getBlockBy*` and receipt JSON into the core data model.

use serde_json::Value;

use chainingest_core::error::IngestError;
use chainingest_core::types::{Block, Log, Transaction};

/// Parse a hex-encoded quantity (with or without `0x`) to u64.
pub fn parse_hex_u64(s: &str) -> Result<u64, IngestError> {
    let digits = s.strip_prefix("0x").unwrap_or(s);
    if digits.is_empty() {
        return Ok(0);
    }
    u64::from_str_radix(digits, 16)
        .map_err(|e| IngestError::Rpc(format!("invalid hex quantity '{s}': {e}")))
}

/// Format a height as a JSON-RPC block tag.
pub fn hex_height(height: u64) -> String {
    format!("0x{height:x}")
}

fn str_field<'a>(v: &'a Value, field: &str) -> Result<&'a str, IngestError> {
    v[field]
        .as_str()
        .ok_or_else(|| IngestError::Rpc(format!("missing field '{field}'")))
}

fn quantity(v: &Value, field: &str) -> Result<u64, IngestError> {
    parse_hex_u64(str_field(v, field)?)
}

fn opt_quantity(v: &Value, field: &str) -> Result<Option<u64>, IngestError> {
    v[field].as_str().map(parse_hex_u64).transpose()
}

/// Convert a block fetched with full transaction objects.
///
/// Receipt fields are left empty; see [`merge_receipt`].
pub fn block_from_json(v: &Value) -> Result<Block, IngestError> {
    let number = quantity(v, "number")?;
    let hash = str_field(v, "hash")?.to_string();
    let transactions = match v["transactions"].as_array() {
        Some(txs) => txs
            .iter()
            .map(|tx| tx_from_json(tx, number, &hash))
            .collect::<Result<Vec<_>, _>>()?,
        None => Vec::new(),
    };

    Ok(Block {
        number,
        parent_hash: str_field(v, "parentHash")?.to_string(),
        miner: v["miner"].as_str().unwrap_or_default().to_string(),
        timestamp: quantity(v, "timestamp")? as i64,
        gas_used: quantity(v, "gasUsed")?,
        gas_limit: quantity(v, "gasLimit")?,
        tx_count: transactions.len() as u32,
        transactions,
        hash,
    })
}

fn tx_from_json(v: &Value, block_number: u64, block_hash: &str) -> Result<Transaction, IngestError> {
    if v.is_string() {
        return Err(IngestError::Rpc(
            "block fetched without full transaction objects".into(),
        ));
    }
    Ok(Transaction {
        hash: str_field(v, "hash")?.to_string(),
        block_number,
        block_hash: block_hash.to_string(),
        index: quantity(v, "transactionIndex")? as u32,
        from: str_field(v, "from")?.to_string(),
        to: v["to"].as_str().map(str::to_string),
        value: v["value"].as_str().unwrap_or("0x0").to_string(),
        gas: quantity(v, "gas")?,
        gas_price: opt_quantity(v, "gasPrice")?.unwrap_or(0),
        nonce: quantity(v, "nonce")?,
        input: v["input"].as_str().unwrap_or("0x").to_string(),
        status: None,
        gas_used: None,
        logs: Vec::new(),
    })
}

fn log_from_json(v: &Value) -> Result<Log, IngestError> {
    Ok(Log {
        address: str_field(v, "address")?.to_string(),
        topics: v["topics"]
            .as_array()
            .map(|ts| ts.iter().filter_map(|t| t.as_str().map(str::to_string)).collect())
            .unwrap_or_default(),
        data: v["data"].as_str().unwrap_or("0x").to_string(),
        log_index: quantity(v, "logIndex")? as u32,
    })
}

/// Copy status, gas used and logs from an `eth_getTransactionReceipt` result.
pub fn merge_receipt(tx: &mut Transaction, receipt: &Value) -> Result<(), IngestError> {
    if receipt.is_null() {
        return Err(IngestError::Rpc(format!("receipt for {} not available", tx.hash)));
    }
    tx.status = opt_quantity(receipt, "status")?;
    tx.gas_used = opt_quantity(receipt, "gasUsed")?;
    tx.logs = receipt["logs"]
        .as_array()
        .map(|logs| logs.iter().map(log_from_json).collect::<Result<Vec<_>, _>>())
        .transpose()?
        .unwrap_or_default();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_block() -> Value {
        json!({
            "number": "0x10d4f",
            "hash": "0xabc",
            "parentHash": "0xabb",
            "miner": "0x95222290dd7278aa3ddd389cc1e1d165cc4bafe5",
            "timestamp": "0x6553f100",
            "gasUsed": "0x5208",
            "gasLimit": "0x1c9c380",
            "transactions": [{
                "hash": "0xt1",
                "transactionIndex": "0x0",
                "from": "0xf1",
                "to": null,
                "value": "0xde0b6b3a7640000",
                "gas": "0x5208",
                "gasPrice": "0x3b9aca00",
                "nonce": "0x2",
                "input": "0x60806040"
            }]
        })
    }

    #[test]
    fn parse_hex_u64_basic() {
        assert_eq!(parse_hex_u64("0x1").unwrap(), 1);
        assert_eq!(parse_hex_u64("0xff").unwrap(), 255);
        assert_eq!(parse_hex_u64("1234").unwrap(), 0x1234);
        assert_eq!(parse_hex_u64("0x").unwrap(), 0);
        assert!(parse_hex_u64("0xzz").is_err());
        assert_eq!(hex_height(255), "0xff");
    }

    #[test]
    fn block_with_full_transactions() {
        let block = block_from_json(&sample_block()).unwrap();
        assert_eq!(block.number, 0x10d4f);
        assert_eq!(block.tx_count, 1);
        let tx = &block.transactions[0];
        assert_eq!(tx.block_number, 0x10d4f);
        assert_eq!(tx.block_hash, "0xabc");
        assert!(tx.to.is_none(), "contract creation");
        assert_eq!(tx.gas_price, 1_000_000_000);
        assert!(tx.status.is_none());
    }

    #[test]
    fn hash_only_transactions_rejected() {
        let mut v = sample_block();
        v["transactions"] = json!(["0xt1"]);
        assert!(block_from_json(&v).is_err());
    }

    #[test]
    fn receipt_merged() {
        let mut block = block_from_json(&sample_block()).unwrap();
        let receipt = json!({
            "status": "0x1",
            "gasUsed": "0x5208",
            "logs": [{
                "address": "0xc0ffee",
                "topics": ["0xddf252ad"],
                "data": "0x01",
                "logIndex": "0x3"
            }]
        });
        merge_receipt(&mut block.transactions[0], &receipt).unwrap();
        let tx = &block.transactions[0];
        assert_eq!(tx.status, Some(1));
        assert_eq!(tx.gas_used, Some(21_000));
        assert_eq!(tx.logs[0].log_index, 3);
        assert!(merge_receipt(&mut block.transactions[0], &Value::Null).is_err());
    }
}
