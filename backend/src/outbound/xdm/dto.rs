//! Wire types for the XDM endpoints.
//!
//! Create responses are the awkward part: depending on endpoint and
//! service version the assigned id arrives bare (`{"id": 7}`) or inside
//! an envelope (`{"data": {"id": "7"}}`), as a number or a string.
//! [`CreatedResponseDto::into_id`] is the single place both shapes are
//! normalised to a plain identifier.

use serde::{Deserialize, Serialize};

/// Assigned identifier, numeric or textual on the wire.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum CreatedIdDto {
    Text(String),
    Number(i64),
}

impl CreatedIdDto {
    fn into_string(self) -> String {
        match self {
            Self::Text(id) => id,
            Self::Number(id) => id.to_string(),
        }
    }
}

/// Resource body carrying the assigned id.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CreatedResourceDto {
    pub id: CreatedIdDto,
}

/// Enveloped-or-bare create response.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum CreatedResponseDto {
    Enveloped { data: CreatedResourceDto },
    Bare(CreatedResourceDto),
}

impl CreatedResponseDto {
    /// Normalise either shape to the plain identifier.
    pub fn into_id(self) -> String {
        match self {
            Self::Enveloped { data } | Self::Bare(data) => data.id.into_string(),
        }
    }
}

/// Token endpoint response.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponseDto {
    pub access_token: String,
    pub expires_in: Option<u64>,
}

/// Geozone group create/update body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupRequestDto {
    pub name: String,
    pub member_ids: Vec<String>,
}

/// One slot of a per-device settings override.
///
/// `value` must serialise as an explicit `null` to clear the slot, so
/// it is never skipped.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverrideSlotDto {
    pub slot_id: String,
    pub value: Option<String>,
}

/// Per-device settings override body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverrideRequestDto {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_id: Option<String>,
    pub overrides: Vec<OverrideSlotDto>,
}
