//! Notification ingestion parser
//!
//! Turns free-text delivery notifications into candidate packages. Parsing is
//! deterministic and has no side effects; deciding whether a candidate is
//! inserted or queued for confirmation is the coordinator's job.
//!
//! ## Confidence
//!
//! | Signal                                  | Weight |
//! |-----------------------------------------|--------|
//! | Courier keyword                         | 0.40   |
//! | Tracking number in the courier's format | 0.30   |
//! | Tracking number in a generic format     | 0.15   |
//! | Status keyword                          | 0.15   |
//! | Item name                               | 0.15   |
//!
//! Text without a courier keyword or without any tracking number yields no
//! candidate.

pub mod couriers;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;
use tracing::trace;

use crate::model::{NewPackage, PackageStatus, Provenance};
use couriers::{
    CourierDef, COURIERS, FAILURE_PHRASES, GENERIC_TRACKING_PATTERN, ITEM_LABEL_PATTERN, ITEM_QUOTED_PATTERN,
    STATUS_HINTS,
};

const WEIGHT_COURIER: f64 = 0.40;
const WEIGHT_COURIER_TRACKING: f64 = 0.30;
const WEIGHT_GENERIC_TRACKING: f64 = 0.15;
const WEIGHT_STATUS: f64 = 0.15;
const WEIGHT_ITEM: f64 = 0.15;

const MAX_ITEM_NAME_CHARS: usize = 60;

/// A package the parser believes a notification refers to
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    pub courier_id: String,
    pub tracking_number: String,
    pub item_name: Option<String>,
    /// Status the notification reports, if any
    pub status_hint: Option<PackageStatus>,
    pub confidence: f64,
    pub received_at: DateTime<Utc>,
    /// Notification title, kept for step descriptions
    pub source_title: String,
}

impl Candidate {
    /// Registration input for this candidate, flagged as auto-detected
    pub fn to_new_package(&self) -> NewPackage {
        NewPackage {
            tracking_number: self.tracking_number.clone(),
            courier_id: self.courier_id.clone(),
            item_name: self.item_name.clone().unwrap_or_default(),
            category: String::new(),
            memo: None,
            estimated_delivery: None,
            provenance: Provenance::AutoDetected {
                confidence: self.confidence,
            },
        }
    }
}

struct CourierMatcher {
    def: &'static CourierDef,
    keywords: Regex,
    tracking: Regex,
}

/// Compiled courier patterns
pub struct NotificationParser {
    couriers: Vec<CourierMatcher>,
    generic_tracking: Regex,
    item_label: Regex,
    item_quoted: Regex,
    /// Most specific first
    status_hints: Vec<(PackageStatus, Regex)>,
    failure: Regex,
}

impl NotificationParser {
    /// Compile every courier pattern once
    pub fn new() -> Result<Self, regex::Error> {
        let couriers = COURIERS
            .iter()
            .map(|def| -> Result<CourierMatcher, regex::Error> {
                Ok(CourierMatcher {
                    def,
                    keywords: Regex::new(&couriers::keyword_pattern(def))?,
                    tracking: Regex::new(def.tracking_pattern)?,
                })
            })
            .collect::<Result<Vec<_>, regex::Error>>()?;

        let status_hints = STATUS_HINTS
            .iter()
            .map(|(status, phrases)| -> Result<(PackageStatus, Regex), regex::Error> {
                Ok((*status, Regex::new(&couriers::phrase_pattern(phrases))?))
            })
            .collect::<Result<Vec<_>, regex::Error>>()?;

        Ok(Self {
            couriers,
            generic_tracking: Regex::new(GENERIC_TRACKING_PATTERN)?,
            item_label: Regex::new(ITEM_LABEL_PATTERN)?,
            item_quoted: Regex::new(ITEM_QUOTED_PATTERN)?,
            status_hints,
            failure: Regex::new(&couriers::phrase_pattern(FAILURE_PHRASES))?,
        })
    }

    /// Parse one notification. Unrecognized text yields `None`.
    pub fn parse(&self, title: &str, body: &str, received_at: DateTime<Utc>) -> Option<Candidate> {
        let text = format!("{}\n{}", title, body);
        if text.trim().is_empty() {
            return None;
        }

        // Prefer a courier whose own tracking format is present
        let mut best: Option<(&CourierMatcher, String, bool)> = None;
        for matcher in self.couriers.iter().filter(|m| m.keywords.is_match(&text)) {
            if let Some(tracking) = first_capture(&matcher.tracking, &text) {
                best = Some((matcher, tracking, true));
                break;
            }
            if best.is_none() {
                if let Some(tracking) = first_capture(&self.generic_tracking, &text) {
                    best = Some((matcher, tracking, false));
                }
            }
        }

        let (matcher, tracking_number, courier_format) = match best {
            Some(found) => found,
            None => {
                trace!(title, "Notification did not match any courier");
                return None;
            }
        };

        let status_hint = self.status_hint(&text);
        let item_name = self.item_name(&text);

        let mut confidence = WEIGHT_COURIER;
        confidence += if courier_format {
            WEIGHT_COURIER_TRACKING
        } else {
            WEIGHT_GENERIC_TRACKING
        };
        if status_hint.is_some() {
            confidence += WEIGHT_STATUS;
        }
        if item_name.is_some() {
            confidence += WEIGHT_ITEM;
        }

        Some(Candidate {
            courier_id: matcher.def.id.to_string(),
            tracking_number: tracking_number.to_ascii_uppercase(),
            item_name,
            status_hint,
            confidence: round2(confidence.min(1.0)),
            received_at,
            source_title: title.trim().to_string(),
        })
    }

    fn status_hint(&self, text: &str) -> Option<PackageStatus> {
        if self.failure.is_match(text) {
            trace!("Failed delivery report, no status hint");
            return None;
        }
        self.status_hints
            .iter()
            .find(|(_, re)| re.is_match(text))
            .map(|(status, _)| *status)
    }

    fn item_name(&self, text: &str) -> Option<String> {
        first_capture(&self.item_label, text)
            .or_else(|| first_capture(&self.item_quoted, text))
            .map(|name| name.trim().chars().take(MAX_ITEM_NAME_CHARS).collect::<String>())
            .filter(|name| !name.is_empty())
    }
}

fn first_capture(re: &Regex, text: &str) -> Option<String> {
    re.captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
