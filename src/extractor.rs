//! Free-text date / time / category extraction
//!
//! Three independent sub-extractions over one utterance, each with its own
//! fallback: date defaults to tomorrow, slot to the afternoon, category to
//! `General`. The only side effect is the single classifier call.

use chrono::{Datelike, Duration, NaiveDate, NaiveTime, Timelike};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, warn};

use crate::catalog::{ExpertiseCatalog, EASY_BOOK_INTENT, GENERAL_CATEGORY};
use crate::classifier::{Classification, IntentClassifier};
use crate::models::TimeSlot;

/// Primary label must reach this to be taken as is.
pub const PRIMARY_CONFIDENCE: f32 = 0.5;
/// Ranked alternatives must exceed this.
pub const SECONDARY_CONFIDENCE: f32 = 0.3;

pub const DEFAULT_SLOT: TimeSlot = TimeSlot::Afternoon;

lazy_static! {
    static ref DATE: Regex = Regex::new(r"(\d{1,2})[/-](\d{1,2})").unwrap();
    static ref MERIDIEM_TIME: Regex =
        Regex::new(r"(?i)\b(\d{1,2})(?::(\d{2}))?\s*([ap]m)\b").unwrap();
    static ref CLOCK_TIME: Regex = Regex::new(r"\b(\d{1,2}):(\d{2})\b").unwrap();

    /// Removed before classification, in this order.
    static ref NOISE: Vec<Regex> = vec![
        Regex::new(r"(?i)\b(?:at|on)\s+\d{1,2}[/-]\d{1,2}").unwrap(),
        Regex::new(r"(?i)\b(?:at|on)\s+\d{1,2}(?::\d{2})?\s*(?:am|pm)?\b").unwrap(),
        Regex::new(r"\d{1,2}[/-]\d{1,2}").unwrap(),
        Regex::new(r"(?i)\b\d{1,2}(?::\d{2})?\s*(?:am|pm)\b").unwrap(),
        Regex::new(r"\b\d{1,2}:\d{2}\b").unwrap(),
        Regex::new(r"(?i)\b(?:today|tomorrow|next week|next month)\b").unwrap(),
    ];

    static ref BOOKING_PHRASES: Vec<Regex> = [
        "i want to book",
        "i wanna book",
        "i need to book",
        "book a handyman",
        "book handyman",
        "book an expert",
        "book a service",
        "book a technician",
        "book a repair",
        "book an",
        "book a",
        "schedule an",
        "schedule a",
        "i want to schedule",
        "i need a handyman",
        "i need a",
        "please book",
        "please schedule",
    ]
    .iter()
    .map(|phrase| Regex::new(&format!(r"(?i)\b{}\b", regex::escape(phrase))).unwrap())
    .collect();

    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
}

/// What one utterance yields.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Extraction {
    pub date: NaiveDate,
    pub slot: TimeSlot,
    pub category: String,
    /// Lowercased utterance with date/time and booking filler removed
    pub problem: String,
    pub date_given: bool,
    /// Parsed clock time, if any, even when it fell outside booking hours
    pub time: Option<NaiveTime>,
}

/// Stateless apart from the catalog it reads.
pub struct FreeTextExtractor<'a> {
    catalog: &'a ExpertiseCatalog,
}

impl<'a> FreeTextExtractor<'a> {
    pub fn new(catalog: &'a ExpertiseCatalog) -> Self {
        Self { catalog }
    }

    pub async fn extract(
        &self,
        utterance: &str,
        today: NaiveDate,
        classifier: &dyn IntentClassifier,
    ) -> Extraction {
        let parsed_date = extract_date(utterance, today.year());
        let time = extract_time(utterance);
        let slot = time
            .and_then(|t| TimeSlot::for_hour(t.hour()))
            .unwrap_or(DEFAULT_SLOT);

        let problem = problem_text(utterance);
        let classification = match classifier.classify(&problem).await {
            Ok(c) => c,
            Err(e) => {
                warn!("Classifier unavailable, treating as unknown: {}", e);
                Classification::unknown()
            }
        };
        let category = self.resolve_category(&classification);

        let extraction = Extraction {
            date: parsed_date.unwrap_or(today + Duration::days(1)),
            slot,
            category,
            problem,
            date_given: parsed_date.is_some(),
            time,
        };

        debug!(
            date = %extraction.date,
            slot = %extraction.slot,
            category = %extraction.category,
            problem = %extraction.problem,
            "Extracted booking request"
        );

        extraction
    }

    /// Primary label at >= 0.5, else first mapped alternative above 0.3,
    /// else `General`.
    pub fn resolve_category(&self, classification: &Classification) -> String {
        if classification.label != EASY_BOOK_INTENT
            && classification.confidence >= PRIMARY_CONFIDENCE
        {
            if let Some(category) = self.catalog.category_for_intent(&classification.label) {
                return category.to_string();
            }
        }

        classification
            .ranking
            .iter()
            .filter(|alt| alt.confidence > SECONDARY_CONFIDENCE)
            .find_map(|alt| self.catalog.category_for_intent(&alt.label))
            .map(str::to_string)
            .unwrap_or_else(|| GENERAL_CATEGORY.to_string())
    }
}

/// First `a/b` or `a-b` pair as (day, month), else as (month, day).
pub fn extract_date(utterance: &str, year: i32) -> Option<NaiveDate> {
    let caps = DATE.captures(utterance)?;
    let first: u32 = caps[1].parse().ok()?;
    let second: u32 = caps[2].parse().ok()?;

    NaiveDate::from_ymd_opt(year, second, first)
        .or_else(|| NaiveDate::from_ymd_opt(year, first, second))
}

/// Meridiem form wins over a bare `H:MM`. A meridiem match that is not a
/// real time ("25pm") is ignored.
pub fn extract_time(utterance: &str) -> Option<NaiveTime> {
    if let Some(time) = MERIDIEM_TIME.captures(utterance).and_then(|caps| meridiem_time(&caps)) {
        return Some(time);
    }

    let caps = CLOCK_TIME.captures(utterance)?;
    let hour: u32 = caps[1].parse().ok()?;
    let minute: u32 = caps[2].parse().ok()?;
    NaiveTime::from_hms_opt(hour, minute, 0)
}

fn meridiem_time(caps: &regex::Captures) -> Option<NaiveTime> {
    let mut hour: u32 = caps[1].parse().ok()?;
    let minute: u32 = caps.get(2).map_or(Ok(0), |m| m.as_str().parse()).ok()?;
    let pm = caps[3].eq_ignore_ascii_case("pm");
    if pm && hour < 12 {
        hour += 12;
    } else if !pm && hour == 12 {
        hour = 0;
    }
    NaiveTime::from_hms_opt(hour, minute, 0)
}

/// Residual problem description, lowercased.
pub fn problem_text(utterance: &str) -> String {
    let mut text = utterance.to_string();
    for pattern in NOISE.iter().chain(BOOKING_PHRASES.iter()) {
        text = pattern.replace_all(&text, " ").into_owned();
    }
    WHITESPACE.replace_all(&text, " ").trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::RankedIntent;
    use crate::error::BookingError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Returns a canned classification and remembers what it was asked.
    struct StubClassifier {
        reply: Option<Classification>,
        seen: Mutex<Vec<String>>,
    }

    impl StubClassifier {
        fn replying(reply: Classification) -> Self {
            Self { reply: Some(reply), seen: Mutex::new(Vec::new()) }
        }

        fn failing() -> Self {
            Self { reply: None, seen: Mutex::new(Vec::new()) }
        }
    }

    #[async_trait]
    impl IntentClassifier for StubClassifier {
        async fn classify(&self, text: &str) -> crate::Result<Classification> {
            self.seen.lock().unwrap().push(text.to_string());
            self.reply
                .clone()
                .ok_or_else(|| BookingError::ClassificationUnavailable("down".to_string()))
        }
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_plumber_tomorrow_at_3pm() {
        let catalog = ExpertiseCatalog::default();
        let extractor = FreeTextExtractor::new(&catalog);
        let stub = StubClassifier::replying(Classification::new("report_issue_plumber", 0.9));
        let today = day(2026, 10, 19);

        let result = tokio_test::block_on(extractor.extract("need a plumber tomorrow at 3pm", today, &stub));

        assert_eq!(result.category, "Plumber");
        assert_eq!(result.slot, TimeSlot::Afternoon);
        assert_eq!(result.date, day(2026, 10, 20));
        assert!(!result.date_given);
        assert_eq!(stub.seen.lock().unwrap().as_slice(), ["need a plumber"]);
    }

    #[test]
    fn test_low_confidence_recovers_from_ranking() {
        let catalog = ExpertiseCatalog::default();
        let extractor = FreeTextExtractor::new(&catalog);
        let stub = StubClassifier::replying(
            Classification::new("easy_book", 0.45).with_ranking(vec![
                RankedIntent { label: "easy_book".into(), confidence: 0.45 },
                RankedIntent { label: "report_issue_AC".into(), confidence: 0.4 },
            ]),
        );

        let result = tokio_test::block_on(extractor.extract("25/12 10am fix my aircon", day(2026, 10, 19), &stub));

        assert_eq!(result.category, "AC Repair");
        assert_eq!(result.date, day(2026, 12, 25));
        assert!(result.date_given);
        assert_eq!(result.slot, TimeSlot::Morning);
        assert_eq!(result.problem, "fix my aircon");
    }

    #[test]
    fn test_classifier_failure_falls_back_to_general() {
        let catalog = ExpertiseCatalog::default();
        let extractor = FreeTextExtractor::new(&catalog);
        let stub = StubClassifier::failing();

        let result = tokio_test::block_on(extractor.extract("something odd", day(2026, 10, 19), &stub));
        assert_eq!(result.category, GENERAL_CATEGORY);
        assert_eq!(result.slot, DEFAULT_SLOT);
    }

    #[test]
    fn test_alternatives_at_threshold_are_rejected() {
        let catalog = ExpertiseCatalog::default();
        let extractor = FreeTextExtractor::new(&catalog);
        let classification = Classification::new("greet", 0.2).with_ranking(vec![
            RankedIntent { label: "report_issue_painter".into(), confidence: 0.3 },
        ]);
        assert_eq!(extractor.resolve_category(&classification), GENERAL_CATEGORY);
    }

    #[test]
    fn test_date_swaps_when_day_month_is_invalid() {
        assert_eq!(extract_date("on 5/29 please", 2026), Some(day(2026, 5, 29)));
        assert_eq!(extract_date("3-4", 2026), Some(day(2026, 4, 3)));
        assert_eq!(extract_date("45/45", 2026), None);
        assert_eq!(extract_date("no date here", 2026), None);
    }

    #[test]
    fn test_time_forms() {
        assert_eq!(extract_time("at 12am"), NaiveTime::from_hms_opt(0, 0, 0));
        assert_eq!(extract_time("at 12pm"), NaiveTime::from_hms_opt(12, 0, 0));
        assert_eq!(extract_time("7:30 PM"), NaiveTime::from_hms_opt(19, 30, 0));
        // meridiem beats an earlier bare clock time
        assert_eq!(extract_time("14:00 or 9am"), NaiveTime::from_hms_opt(9, 0, 0));
        assert_eq!(extract_time("around 16:45"), NaiveTime::from_hms_opt(16, 45, 0));
        assert_eq!(extract_time("whenever"), None);
    }

    #[test]
    fn test_impossible_meridiem_falls_back_to_clock_time() {
        assert_eq!(extract_time("25pm, or 14:30"), NaiveTime::from_hms_opt(14, 30, 0));
        assert_eq!(extract_time("at 99am"), None);
    }

    #[test]
    fn test_out_of_hours_uses_default_slot() {
        let catalog = ExpertiseCatalog::default();
        let extractor = FreeTextExtractor::new(&catalog);
        let stub = StubClassifier::replying(Classification::new("report_issue_painter", 0.8));

        let result = tokio_test::block_on(extractor.extract("paint my wall at 6am", day(2026, 10, 19), &stub));
        assert_eq!(result.time, NaiveTime::from_hms_opt(6, 0, 0));
        assert_eq!(result.slot, DEFAULT_SLOT);
    }

    #[test]
    fn test_problem_text_strips_filler() {
        assert_eq!(
            problem_text("I want to book a plumber on 12/11 at 9:30 for a leaking tap"),
            "a plumber for a leaking tap"
        );
        assert_eq!(problem_text("Please book   someone today"), "someone");
    }
}
