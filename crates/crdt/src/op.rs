// SPDX-License-Identifier: MIT

//! The replicated operation (§4.6): a `set` or a tombstone, stamped with an
//! HLC and the producing replica's vector clock at emission time.

use meshnode_core::{Hlc, ReplicaId, VectorClock};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CrdtError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpKind {
    Set,
    Tombstone,
}

/// `deps` is the full vector clock at the moment this op was produced,
/// including the producing replica's own just-ticked counter — causal
/// readiness and `diffSince` both key off `deps[src]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Op {
    pub id: String,
    pub src: ReplicaId,
    pub path: Vec<Value>,
    pub kind: OpKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    pub hlc: Hlc,
    pub deps: VectorClock,
}

impl Op {
    /// `id = src + ":" + base36(hlc.t) + ":" + base36(hlc.c) + ":" +
    /// base36(seq)` (§3). `seq` is a monotonic per-replica counter supplied
    /// by the caller so ids stay unique even when `hlc.t`/`hlc.c` repeat
    /// across distinct ops (can't happen for `set`/`del` on one replica
    /// since both tick the HLC, but keeps the format's stated shape honest).
    pub fn make_id(src: &ReplicaId, hlc: &Hlc, seq: u64) -> String {
        format!("{}:{}:{}:{}", src.as_str(), base36(hlc.t), base36(hlc.c), base36(seq))
    }
}

const BASE36_DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

fn base36(mut n: u64) -> String {
    if n == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while n > 0 {
        digits.push(BASE36_DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    digits.reverse();
    String::from_utf8(digits).unwrap_or_default()
}

/// JSON-encode an op for the wire (`RingPayload::CrdtOp.op` and
/// `CrdtSyncResponse.ops` both carry these).
pub fn encode_op(op: &Op) -> String {
    serde_json::to_string(op).unwrap_or_default()
}

pub fn decode_op(encoded: &str) -> Result<Op, CrdtError> {
    Ok(serde_json::from_str(encoded)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Op {
        let src = ReplicaId::from("r1");
        let hlc = Hlc::zero(src.clone());
        let id = Op::make_id(&src, &hlc, 0);
        Op { id, src, path: vec![Value::String("a".into())], kind: OpKind::Set, value: Some(serde_json::json!(1)), hlc, deps: VectorClock::new() }
    }

    #[test]
    fn encode_decode_roundtrip() {
        let op = sample();
        let encoded = encode_op(&op);
        let decoded = decode_op(&encoded).expect("decode");
        assert_eq!(decoded, op);
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(decode_op("not json").is_err());
    }

    #[test]
    fn make_id_uses_base36_for_time_counter_and_seq() {
        let src = ReplicaId::from("r1");
        let hlc = Hlc { t: 36, c: 37, r: src.clone() };
        assert_eq!(Op::make_id(&src, &hlc, 72), "r1:10:11:20");
    }

    #[test]
    fn make_id_is_distinct_across_increasing_seq() {
        let src = ReplicaId::from("r1");
        let hlc = Hlc::zero(src.clone());
        assert_ne!(Op::make_id(&src, &hlc, 0), Op::make_id(&src, &hlc, 1));
    }
}
