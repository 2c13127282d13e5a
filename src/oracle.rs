use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::keys::Address;

/// A transaction touching the wallet address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub txid: String,
    pub confirmed: bool,
}

/// What the oracle said about a submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SubmissionResult {
    Accepted { txid: String },
    Rejected { reason: String },
}

impl SubmissionResult {
    pub fn is_accepted(&self) -> bool {
        matches!(self, SubmissionResult::Accepted { .. })
    }
}

/// Ledger indexing and broadcast service.
#[async_trait]
pub trait LedgerOracle: Send + Sync {
    /// Confirmed balance of `address` in satoshis.
    async fn balance(&self, address: &Address) -> Result<u64>;

    /// Transactions touching `address`, in oracle order.
    async fn history(&self, address: &Address) -> Result<Vec<HistoryEntry>>;

    /// Submit a serialized transaction. Never retried.
    async fn submit_raw(&self, raw_tx: &[u8]) -> Result<SubmissionResult>;
}

#[derive(Deserialize)]
struct BalanceResponse {
    confirmed: u64,
}

#[derive(Serialize)]
struct SubmitRequest<'a> {
    rawtx: &'a str,
}

/// REST oracle speaking the WhatsOnChain-style address and tx endpoints.
pub struct HttpOracle {
    client: reqwest::Client,
    base_url: String,
}

impl HttpOracle {
    pub fn new(base_url: &str) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        log::debug!("oracle GET {url}");
        let resp = self.client.get(&url).send().await?;
        let status = resp.status();
        if status.is_server_error() {
            return Err(Error::Network(format!("GET {path}: {status}")));
        }
        if !status.is_success() {
            return Err(Error::OracleResponse(format!("GET {path}: {status}")));
        }
        let body = resp.text().await?;
        serde_json::from_str(&body).map_err(|e| Error::OracleResponse(format!("GET {path}: {e}")))
    }
}

#[async_trait]
impl LedgerOracle for HttpOracle {
    async fn balance(&self, address: &Address) -> Result<u64> {
        let body: BalanceResponse = self
            .get_json(&format!("/address/{address}/balance"))
            .await?;
        Ok(body.confirmed)
    }

    async fn history(&self, address: &Address) -> Result<Vec<HistoryEntry>> {
        self.get_json(&format!("/address/{address}/txs")).await
    }

    async fn submit_raw(&self, raw_tx: &[u8]) -> Result<SubmissionResult> {
        let url = format!("{}/tx/raw", self.base_url);
        let rawtx = hex::encode(raw_tx);
        log::debug!("oracle POST {url} ({} bytes)", raw_tx.len());
        let resp = self
            .client
            .post(&url)
            .json(&SubmitRequest { rawtx: &rawtx })
            .send()
            .await?;
        let status = resp.status();
        let body = resp.text().await?;
        parse_submission(status, &body)
    }
}

/// Map a `/tx/raw` response onto a [`SubmissionResult`].
pub(crate) fn parse_submission(status: StatusCode, body: &str) -> Result<SubmissionResult> {
    if status.is_server_error() {
        return Err(Error::Network(format!("POST /tx/raw: {status}")));
    }

    let parsed: Option<serde_json::Value> = serde_json::from_str(body).ok();
    let reason = parsed.as_ref().and_then(rejection_reason);

    if status.is_client_error() {
        let reason = reason.unwrap_or_else(|| {
            let trimmed = body.trim();
            if trimmed.is_empty() {
                status.to_string()
            } else {
                trimmed.to_string()
            }
        });
        return Ok(SubmissionResult::Rejected { reason });
    }
    if !status.is_success() {
        return Err(Error::OracleResponse(format!("POST /tx/raw: {status}")));
    }

    let txid = match &parsed {
        Some(serde_json::Value::String(s)) => Some(s.clone()),
        Some(v) if v.is_object() => v.get("txid").and_then(|t| t.as_str()).map(str::to_string),
        // Some oracles answer with the bare txid as plain text.
        _ => Some(body.trim().to_string()),
    };
    // A well-formed txid wins over any error field alongside it.
    if let Some(txid) = txid.filter(|t| is_txid(t)) {
        return Ok(SubmissionResult::Accepted { txid });
    }
    if let Some(reason) = reason {
        return Ok(SubmissionResult::Rejected { reason });
    }
    Err(Error::OracleResponse(format!(
        "unrecognized submission response: {}",
        body.trim()
    )))
}

/// First non-empty `error`, `message` or `reason` field. `null` and `""`
/// do not count.
fn rejection_reason(value: &serde_json::Value) -> Option<String> {
    ["error", "message", "reason"].iter().find_map(|k| {
        match value.get(*k)? {
            serde_json::Value::Null => None,
            serde_json::Value::String(s) if s.trim().is_empty() => None,
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    })
}

fn is_txid(s: &str) -> bool {
    s.len() == 64 && s.bytes().all(|b| b.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;

    const TXID: &str = "4a5e1e4baab89f3a32518a88c31bc87f618f76673e2cc77ab2127b7afdeda33b";

    #[test]
    fn accepted_as_json_string() {
        let r = parse_submission(StatusCode::OK, &format!("\"{TXID}\"")).unwrap();
        assert_eq!(r, SubmissionResult::Accepted { txid: TXID.into() });
    }

    #[test]
    fn accepted_as_plain_text_or_object() {
        let r = parse_submission(StatusCode::OK, TXID).unwrap();
        assert!(r.is_accepted());
        let r = parse_submission(StatusCode::OK, &format!(r#"{{"txid":"{TXID}"}}"#)).unwrap();
        assert!(r.is_accepted());
    }

    #[test]
    fn empty_error_fields_do_not_reject() {
        for body in [
            format!(r#"{{"txid":"{TXID}","error":null}}"#),
            format!(r#"{{"txid":"{TXID}","error":"","message":null}}"#),
            format!(r#"{{"txid":"{TXID}","message":"ok"}}"#),
        ] {
            let r = parse_submission(StatusCode::OK, &body).unwrap();
            assert_eq!(r, SubmissionResult::Accepted { txid: TXID.into() }, "{body}");
        }

        let err = parse_submission(StatusCode::OK, r#"{"error":null}"#).unwrap_err();
        assert!(matches!(err, Error::OracleResponse(_)));
        let err = parse_submission(StatusCode::OK, r#"{"error":"  ","reason":null}"#).unwrap_err();
        assert!(matches!(err, Error::OracleResponse(_)));
    }

    #[test]
    fn rejected_payloads() {
        let r = parse_submission(StatusCode::OK, r#"{"error":"mandatory-script-verify-flag-failed"}"#)
            .unwrap();
        assert_eq!(
            r,
            SubmissionResult::Rejected {
                reason: "mandatory-script-verify-flag-failed".into()
            }
        );
        let r = parse_submission(StatusCode::OK, r#"{"error":null,"reason":"dust"}"#).unwrap();
        assert_eq!(r, SubmissionResult::Rejected { reason: "dust".into() });
        let r = parse_submission(StatusCode::OK, r#"{"txid":"n/a","error":{"code":16}}"#).unwrap();
        assert_eq!(r, SubmissionResult::Rejected { reason: r#"{"code":16}"#.into() });
        let r = parse_submission(StatusCode::BAD_REQUEST, "257: txn-already-known").unwrap();
        assert_eq!(
            r,
            SubmissionResult::Rejected {
                reason: "257: txn-already-known".into()
            }
        );
    }

    #[test]
    fn server_errors_are_network_errors() {
        let err = parse_submission(StatusCode::BAD_GATEWAY, "").unwrap_err();
        assert!(matches!(err, Error::Network(_)));
    }

    #[test]
    fn garbage_is_response_error() {
        let err = parse_submission(StatusCode::OK, "{\"ok\":1}").unwrap_err();
        assert!(matches!(err, Error::OracleResponse(_)));
        let err = parse_submission(StatusCode::OK, "hello").unwrap_err();
        assert!(matches!(err, Error::OracleResponse(_)));
    }

    #[test]
    fn history_entry_shape() {
        let entries: Vec<HistoryEntry> =
            serde_json::from_str(&format!(r#"[{{"txid":"{TXID}","confirmed":true}}]"#)).unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].confirmed);
    }
}
