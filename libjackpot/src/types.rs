//! Core types for Jackpot

use serde::{Deserialize, Serialize};

// ============================================================================
// User data
// ============================================================================

/// Profile fields shown across screens
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserData {
    /// Currency display string, e.g. `"$10.000"`
    pub balance: String,
    pub name: String,
}

impl Default for UserData {
    fn default() -> Self {
        Self {
            balance: "$0".to_string(),
            name: "Usuario".to_string(),
        }
    }
}

/// Partial update for [`UserData`]; `None` fields are left untouched
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserDataPatch {
    pub balance: Option<String>,
    pub name: Option<String>,
}

impl UserData {
    /// Apply a patch, returning the merged value
    pub fn merged(&self, patch: UserDataPatch) -> Self {
        Self {
            balance: patch.balance.unwrap_or_else(|| self.balance.clone()),
            name: patch.name.unwrap_or_else(|| self.name.clone()),
        }
    }
}

// ============================================================================
// Movements
// ============================================================================

/// Kind of ledger entry
///
/// The set is closed. Tags written by some other build of the app are kept
/// as [`MovementKind::Other`] so the ledger still loads, but they never get
/// a statistics bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MovementKind {
    Group,
    Chance,
    Lottery,
    International,
    Other(String),
}

impl MovementKind {
    /// The known kinds, in statistics display order
    pub const CATEGORIES: [MovementKind; 4] = [
        MovementKind::Lottery,
        MovementKind::Chance,
        MovementKind::Group,
        MovementKind::International,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            MovementKind::Group => "group",
            MovementKind::Chance => "chance",
            MovementKind::Lottery => "lottery",
            MovementKind::International => "international",
            MovementKind::Other(tag) => tag,
        }
    }

    /// Whether this is one of the four known kinds
    pub fn is_known(&self) -> bool {
        !matches!(self, MovementKind::Other(_))
    }
}

impl From<String> for MovementKind {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "group" => MovementKind::Group,
            "chance" => MovementKind::Chance,
            "lottery" => MovementKind::Lottery,
            "international" => MovementKind::International,
            _ => MovementKind::Other(tag),
        }
    }
}

impl From<MovementKind> for String {
    fn from(kind: MovementKind) -> Self {
        match kind {
            MovementKind::Other(tag) => tag,
            known => known.as_str().to_string(),
        }
    }
}

impl std::fmt::Display for MovementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One ledger entry: a bet, a deposit or a group contribution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Movement {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: MovementKind,
    pub title: String,
    /// Display date, stored as the UI formatted it
    pub date: String,
    /// Currency display string
    pub amount: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    /// Opaque image reference tag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo_source: Option<String>,
}

/// Input for appending a movement; the ledger assigns the id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMovement {
    pub kind: MovementKind,
    pub title: String,
    pub date: String,
    pub amount: String,
    pub group_id: Option<String>,
    pub logo_source: Option<String>,
}

impl NewMovement {
    pub fn new(
        kind: MovementKind,
        title: impl Into<String>,
        date: impl Into<String>,
        amount: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            title: title.into(),
            date: date.into(),
            amount: amount.into(),
            group_id: None,
            logo_source: None,
        }
    }

    pub fn with_group(mut self, group_id: impl Into<String>) -> Self {
        self.group_id = Some(group_id.into());
        self
    }

    pub fn with_logo(mut self, logo_source: impl Into<String>) -> Self {
        self.logo_source = Some(logo_source.into());
        self
    }

    pub(crate) fn into_movement(self, id: String) -> Movement {
        Movement {
            id,
            kind: self.kind,
            title: self.title,
            date: self.date,
            amount: self.amount,
            group_id: self.group_id,
            logo_source: self.logo_source,
        }
    }
}

// ============================================================================
// Statistics
// ============================================================================

/// One aggregated bucket of the statistics view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryData {
    #[serde(rename = "type")]
    pub kind: MovementKind,
    pub title: String,
    pub amount: u64,
    pub color: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percentage: Option<f64>,
}

/// Snapshot of the derived statistics view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Statistics {
    pub categories: Vec<CategoryData>,
    pub total_amount: u64,
    pub current_month: String,
}

impl Statistics {
    /// Look up the bucket for a kind
    pub fn category(&self, kind: &MovementKind) -> Option<&CategoryData> {
        self.categories.iter().find(|c| &c.kind == kind)
    }
}

// ============================================================================
// Avatar
// ============================================================================

/// A selectable profile image
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvatarInfo {
    pub id: String,
    /// Opaque image reference tag
    pub source: String,
    pub name: String,
}

// ============================================================================
// Notifications
// ============================================================================

/// Notification opt-ins, persisted as a JSON object of booleans
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationPreferences {
    pub push: bool,
    pub email: bool,
    pub sms: bool,
    pub promotions: bool,
    /// Draw results for tickets the user holds
    pub results: bool,
}

impl Default for NotificationPreferences {
    fn default() -> Self {
        Self {
            push: true,
            email: true,
            sms: false,
            promotions: false,
            results: true,
        }
    }
}

/// Partial update for [`NotificationPreferences`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NotificationPatch {
    pub push: Option<bool>,
    pub email: Option<bool>,
    pub sms: Option<bool>,
    pub promotions: Option<bool>,
    pub results: Option<bool>,
}

impl NotificationPatch {
    /// Combine with a later patch; fields set in `later` win
    pub fn then(self, later: NotificationPatch) -> Self {
        Self {
            push: later.push.or(self.push),
            email: later.email.or(self.email),
            sms: later.sms.or(self.sms),
            promotions: later.promotions.or(self.promotions),
            results: later.results.or(self.results),
        }
    }
}

impl NotificationPreferences {
    pub fn merged(&self, patch: NotificationPatch) -> Self {
        Self {
            push: patch.push.unwrap_or(self.push),
            email: patch.email.unwrap_or(self.email),
            sms: patch.sms.unwrap_or(self.sms),
            promotions: patch.promotions.unwrap_or(self.promotions),
            results: patch.results.unwrap_or(self.results),
        }
    }
}

// ============================================================================
// Security
// ============================================================================

/// Result of a password change attempt
///
/// A wrong current password is an expected outcome, not an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordChangeOutcome {
    pub success: bool,
    pub message: String,
}

impl PasswordChangeOutcome {
    pub(crate) fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub(crate) fn refused(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}
