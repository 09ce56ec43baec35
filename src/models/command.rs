use serde::Deserialize;

/// Type of ledger command
///
/// `credit`, `debit`, `full_access` and `pay_in` go through the validated
/// payment pipeline with compound participant identifiers; the rest act on
/// plain account ids.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum CommandType {
    Open,
    Deposit,
    Withdraw,
    Transfer,
    Activate,
    Deactivate,
    Close,
    Credit,
    Debit,
    FullAccess,
    PayIn,
}

/// Command record from CSV input
#[derive(Debug, Deserialize)]
pub struct Command {
    #[serde(rename = "type")]
    pub command_type: CommandType,
    pub account: String,
    #[serde(default, deserialize_with = "deserialize_optional_field")]
    pub counterparty: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_field")]
    pub amount: Option<String>,
    #[serde(default)]
    pub narration: String,
}

/// Custom deserializer to handle empty strings as None
fn deserialize_optional_field<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    let trimmed = s.trim();
    if trimmed.is_empty() {
        Ok(None)
    } else {
        Ok(Some(trimmed.to_string()))
    }
}
