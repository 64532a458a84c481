use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Association {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub short_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address_line1: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address_line2: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address_line3: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub street: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postcode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    pub lat: f64,
    pub lng: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goals: Option<TextBlock>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activities: Option<TextBlock>,
    #[serde(default)]
    pub contacts: Vec<Contact>,
    #[serde(default)]
    pub links: Vec<Link>,
    #[serde(default)]
    pub social_media: Vec<SocialMediaLink>,
    #[serde(default)]
    pub images: Vec<Image>,
    #[serde(default)]
    pub district_list: Vec<String>,
    #[serde(default)]
    pub activity_list: Vec<String>,
}

impl Association {
    /// Name shown in lists: the short name when present, the full name otherwise.
    pub fn display_name(&self) -> &str {
        match self.short_name.as_deref() {
            Some(short) if !short.is_empty() => short,
            _ => &self.name,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TextBlock {
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fax: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mail: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Link {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_text: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SocialMediaLink {
    // Free text on the wire, see `SocialMediaPlatform` for the known ones
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_text: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Image {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alt_text: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocialMediaPlatform {
    Facebook,
    Instagram,
    Twitter,
    YouTube,
    Other,
}

impl SocialMediaPlatform {
    pub fn parse(raw: &str) -> Self {
        match raw.to_lowercase().as_str() {
            "facebook" => Self::Facebook,
            "instagram" => Self::Instagram,
            "twitter" => Self::Twitter,
            "youtube" => Self::YouTube,
            _ => Self::Other,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropdownOption {
    pub value: String,
    pub label: String,
    #[serde(default)]
    pub category: Option<String>,
}

impl DropdownOption {
    pub fn new(value: &str, label: &str, category: Option<&str>) -> Self {
        Self {
            value: value.to_string(),
            label: label.to_string(),
            category: category.map(str::to_string),
        }
    }

    /// Top-level options have no category; an empty string counts as none.
    pub fn is_top_level(&self) -> bool {
        self.category.as_deref().map_or(true, str::is_empty)
    }
}

/// Option enriched with its parent's label, as used by grouped dropdowns and the options editor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupedOption {
    pub value: Option<String>,
    pub label: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub category_label: Option<String>,
    #[serde(default)]
    pub is_sub_option: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionType {
    #[default]
    Activities,
    Districts,
}

impl OptionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Activities => "activities",
            Self::Districts => "districts",
        }
    }

    /// German name of what the options are assigned as, used in confirmation prompts.
    pub fn assignment_noun(&self) -> &'static str {
        match self {
            Self::Activities => "Tätigkeitsfeldern",
            Self::Districts => "Aktivitätsgebieten",
        }
    }
}

impl fmt::Display for OptionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OptionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "activities" => Ok(Self::Activities),
            "districts" => Ok(Self::Districts),
            other => Err(format!("unknown option type: {}", other)),
        }
    }
}

/// Envelope every data service response comes wrapped in.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceResponse<T> {
    pub data: Option<T>,
    #[serde(default)]
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Success,
    Info,
    Warn,
    Error,
}

/// Transient notification shown to the operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Toast {
    pub severity: Severity,
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl Toast {
    pub fn success(summary: &str) -> Self {
        Self {
            severity: Severity::Success,
            summary: summary.to_string(),
            detail: None,
        }
    }

    pub fn error(summary: &str, detail: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            summary: summary.to_string(),
            detail: Some(detail.into()),
        }
    }
}
