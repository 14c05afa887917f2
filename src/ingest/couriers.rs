//! Known couriers and the text signals that identify them

use crate::model::PackageStatus;

/// Static description of a courier
#[derive(Debug, Clone, Copy)]
pub struct CourierDef {
    /// Stable id stored on packages
    pub id: &'static str,
    pub name: &'static str,
    /// Matched case-insensitively. ASCII keywords must stand alone as words.
    pub keywords: &'static [&'static str],
    /// Courier-specific tracking number format, first capture group
    pub tracking_pattern: &'static str,
}

pub const COURIERS: &[CourierDef] = &[
    CourierDef {
        id: "cj",
        name: "CJ Logistics",
        keywords: &["cj대한통운", "대한통운", "cj logistics", "cj"],
        tracking_pattern: r"\b(\d{10}|\d{12})\b",
    },
    CourierDef {
        id: "hanjin",
        name: "Hanjin",
        keywords: &["한진택배", "한진", "hanjin"],
        tracking_pattern: r"\b(\d{10}|\d{12})\b",
    },
    CourierDef {
        id: "lotte",
        name: "Lotte Global Logistics",
        keywords: &["롯데택배", "롯데글로벌로지스", "lotte"],
        tracking_pattern: r"\b(\d{12})\b",
    },
    CourierDef {
        id: "koreapost",
        name: "Korea Post",
        keywords: &["우체국택배", "우체국", "korea post", "epost"],
        tracking_pattern: r"\b(\d{13})\b",
    },
    CourierDef {
        id: "coupang",
        name: "Coupang Logistics",
        keywords: &["쿠팡", "로켓배송", "coupang"],
        tracking_pattern: r"\b(\d{12,14})\b",
    },
    CourierDef {
        id: "ups",
        name: "UPS",
        keywords: &["ups"],
        tracking_pattern: r"(?i)\b(1Z[0-9A-Z]{16})\b",
    },
    CourierDef {
        id: "fedex",
        name: "FedEx",
        keywords: &["fedex"],
        tracking_pattern: r"\b(\d{12}|\d{15})\b",
    },
    CourierDef {
        id: "usps",
        name: "USPS",
        keywords: &["usps"],
        tracking_pattern: r"\b(9[1-5]\d{20})\b",
    },
    CourierDef {
        id: "dhl",
        name: "DHL",
        keywords: &["dhl"],
        tracking_pattern: r"\b(\d{10})\b",
    },
];

/// Fallback for couriers whose format did not match: any long digit run or
/// uppercase alphanumeric token
pub const GENERIC_TRACKING_PATTERN: &str = r"\b(\d{9,22}|[A-Z]{2}\d{9}[A-Z]{2})\b";

/// Status keyword hints, most specific first
pub const STATUS_HINTS: &[(PackageStatus, &[&str])] = &[
    (
        PackageStatus::ArrivedAtBox,
        &["보관함", "택배함", "무인함", "parcel locker", "locker", "parcel box", "delivery box"],
    ),
    (
        PackageStatus::Delivered,
        &["배송완료", "배송 완료", "배달완료", "배달 완료", "delivered"],
    ),
    (
        PackageStatus::InTransit,
        &[
            "배송출발",
            "배송중",
            "배송 중",
            "배달출발",
            "집화",
            "발송",
            "in transit",
            "out for delivery",
            "shipped",
            "on its way",
        ],
    ),
];

/// Failed or negated delivery reports. Any match suppresses the status hint
/// so a "could not be delivered" notice never reads as delivered.
pub const FAILURE_PHRASES: &[&str] = &[
    "not be delivered",
    "not delivered",
    "undelivered",
    "undeliverable",
    "could not deliver",
    "unable to deliver",
    "delivery failed",
    "attempt failed",
    "delivery exception",
    "returned to sender",
    "배송실패",
    "배송 실패",
    "배달실패",
    "배달 실패",
    "미배달",
    "미배송",
    "배송불가",
    "반송",
];

/// Labels that introduce an item name, e.g. `상품명: 무선 키보드`
pub const ITEM_LABEL_PATTERN: &str =
    r"(?i)(?:상품명|상품|품목|item|product|order)\s*[:：]\s*([^\n,;]+)";

/// Item names quoted in the notification text
pub const ITEM_QUOTED_PATTERN: &str = r#"["“'‘]([^"”'’\n]{2,60})["”'’]"#;

pub fn find(id: &str) -> Option<&'static CourierDef> {
    COURIERS.iter().find(|c| c.id == id)
}

/// Regex alternation matching any of the courier's keywords
pub(crate) fn keyword_pattern(courier: &CourierDef) -> String {
    phrase_pattern(courier.keywords)
}

/// Case-insensitive alternation of `phrases`. ASCII phrases must stand alone
/// as words; Korean ones match anywhere.
pub(crate) fn phrase_pattern(phrases: &[&str]) -> String {
    let alternatives: Vec<String> = phrases
        .iter()
        .map(|phrase| {
            let escaped = regex::escape(phrase);
            if phrase.is_ascii() {
                format!(r"\b{}\b", escaped)
            } else {
                escaped
            }
        })
        .collect();
    format!("(?i)(?:{})", alternatives.join("|"))
}
