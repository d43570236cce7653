//! Core document record and the workflow status machine
use chrono::{DateTime, TimeZone, Utc};
use serde::{Serialize, Serializer};
use std::fmt;

#[derive(
    minicbor::Encode,
    minicbor::Decode,
    serde::Serialize,
    Debug,
    Clone,
    Copy,
    Eq,
    Hash,
    Ord,
    PartialEq,
    PartialOrd,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentStatus {
    #[n(0)]
    Draft,
    #[n(1)]
    Submitted,
    #[n(2)]
    Approved,
}

/// A transition along DRAFT -> SUBMITTED -> APPROVED. Also the action
/// recorded in the history log.
#[derive(
    minicbor::Encode,
    minicbor::Decode,
    serde::Serialize,
    Debug,
    Clone,
    Copy,
    Eq,
    PartialEq,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    #[n(0)]
    Submit,
    #[n(1)]
    Approve,
}

#[derive(minicbor::Encode, minicbor::Decode, Serialize, Debug, Clone, Eq, PartialEq)]
pub struct Document {
    #[n(0)]
    pub id: u64, // store assigned
    #[n(1)]
    pub token: String, // bech32m encoded uuid7, never reused
    #[n(2)]
    pub author: String,
    #[n(3)]
    pub title: String,
    #[n(4)]
    pub status: DocumentStatus,
    #[n(5)]
    pub created_at: TimeStamp<Utc>,
    #[n(6)]
    pub updated_at: TimeStamp<Utc>,
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct TimeStamp<T: TimeZone>(DateTime<T>);

impl<T: TimeZone + Eq> PartialOrd for TimeStamp<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: TimeZone + Eq> Ord for TimeStamp<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.cmp(&other.0)
    }
}

impl TimeStamp<Utc> {
    pub fn new() -> Self {
        Self(Utc::now())
    }
    pub fn to_datetime_utc(&self) -> DateTime<Utc> {
        self.0
    }
}

impl Default for TimeStamp<Utc> {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Draft => "DRAFT",
            DocumentStatus::Submitted => "SUBMITTED",
            DocumentStatus::Approved => "APPROVED",
        }
    }
}

impl Action {
    /// Status a document must be in for this action to apply
    pub fn requires(&self) -> DocumentStatus {
        match self {
            Action::Submit => DocumentStatus::Draft,
            Action::Approve => DocumentStatus::Submitted,
        }
    }
    /// Status a document moves to once this action commits
    pub fn produces(&self) -> DocumentStatus {
        match self {
            Action::Submit => DocumentStatus::Submitted,
            Action::Approve => DocumentStatus::Approved,
        }
    }
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Submit => "SUBMIT",
            Action::Approve => "APPROVE",
        }
    }
}

impl Document {
    pub fn new(id: u64, token: String, author: String, title: String) -> Self {
        let now = TimeStamp::new();
        Self {
            id,
            token,
            author,
            title,
            status: DocumentStatus::Draft,
            created_at: now.clone(),
            updated_at: now,
        }
    }
    /// Moves the document one step forward. Returns the current status when
    /// the action does not apply to it.
    pub fn apply(&mut self, action: Action) -> Result<(), DocumentStatus> {
        if self.status != action.requires() {
            return Err(self.status);
        }
        self.status = action.produces();
        self.updated_at = TimeStamp::new();
        Ok(())
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // "to submit" / "to approve" in conflict messages
        f.write_str(&self.as_str().to_lowercase())
    }
}

impl std::str::FromStr for DocumentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "DRAFT" => Ok(DocumentStatus::Draft),
            "SUBMITTED" => Ok(DocumentStatus::Submitted),
            "APPROVED" => Ok(DocumentStatus::Approved),
            other => Err(format!("unknown document status: {other}")),
        }
    }
}

impl<T: TimeZone> From<DateTime<T>> for TimeStamp<T> {
    fn from(value: DateTime<T>) -> Self {
        TimeStamp(value)
    }
}
impl<C> minicbor::Encode<C> for TimeStamp<Utc> {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        if let Some(nsec) = self.0.timestamp_nanos_opt() {
            return e.i64(nsec)?.ok();
        }

        Err(minicbor::encode::Error::message(
            "failed to encode timestamp. timestamp_nanos_opt returned None",
        ))
    }
}
impl<'b, C> minicbor::Decode<'b, C> for TimeStamp<Utc> {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let nsecs = d.i64()?;

        Ok(TimeStamp(DateTime::from_timestamp_nanos(nsecs)))
    }
}
impl Serialize for TimeStamp<Utc> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_rfc3339())
    }
}
