use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a commenter posted, ordered from most to least conversion-ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IntentCategory {
    /// Wants to become this doctor's patient
    BookingIntent,
    /// Frustrated with waits, costs, or dismissive care elsewhere
    FrustrationWithSystem,
    /// Describes personal symptoms or asks for personal advice
    MedicalHelpSeeking,
    /// Mentions a place while asking about care
    GeographicMention,
    /// Thanks, praise, success stories
    GratitudeEngagement,
    /// Everything else
    General,
}

impl IntentCategory {
    pub fn weight(&self) -> u32 {
        match self {
            IntentCategory::BookingIntent => 10,
            IntentCategory::FrustrationWithSystem => 7,
            IntentCategory::MedicalHelpSeeking => 5,
            IntentCategory::GeographicMention => 3,
            IntentCategory::GratitudeEngagement => 1,
            IntentCategory::General => 0,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            IntentCategory::BookingIntent => "Booking Intent",
            IntentCategory::FrustrationWithSystem => "System Frustration",
            IntentCategory::MedicalHelpSeeking => "Help Seeking",
            IntentCategory::GeographicMention => "Geographic",
            IntentCategory::GratitudeEngagement => "Gratitude",
            IntentCategory::General => "General",
        }
    }

    /// Wire name used in prompts and model output.
    pub fn code(&self) -> &'static str {
        match self {
            IntentCategory::BookingIntent => "BOOKING_INTENT",
            IntentCategory::FrustrationWithSystem => "FRUSTRATION_WITH_SYSTEM",
            IntentCategory::MedicalHelpSeeking => "MEDICAL_HELP_SEEKING",
            IntentCategory::GeographicMention => "GEOGRAPHIC_MENTION",
            IntentCategory::GratitudeEngagement => "GRATITUDE_ENGAGEMENT",
            IntentCategory::General => "GENERAL",
        }
    }

    /// Anything outside the taxonomy becomes `General`.
    pub fn from_model(raw: &str) -> Self {
        let wanted = raw.trim();
        Self::all()
            .iter()
            .copied()
            .find(|category| category.code().eq_ignore_ascii_case(wanted))
            .unwrap_or(IntentCategory::General)
    }

    pub fn all() -> &'static [IntentCategory] {
        &[
            IntentCategory::BookingIntent,
            IntentCategory::FrustrationWithSystem,
            IntentCategory::MedicalHelpSeeking,
            IntentCategory::GeographicMention,
            IntentCategory::GratitudeEngagement,
            IntentCategory::General,
        ]
    }
}

impl fmt::Display for IntentCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weights_match_taxonomy() {
        let weights: Vec<u32> = IntentCategory::all().iter().map(|c| c.weight()).collect();
        assert_eq!(weights, vec![10, 7, 5, 3, 1, 0]);
    }

    #[test]
    fn unknown_model_categories_become_general() {
        assert_eq!(IntentCategory::from_model("SPAM"), IntentCategory::General);
        assert_eq!(IntentCategory::from_model(""), IntentCategory::General);
        assert_eq!(
            IntentCategory::from_model("booking_intent"),
            IntentCategory::BookingIntent
        );
    }

    #[test]
    fn serde_uses_wire_codes() {
        for category in IntentCategory::all() {
            let json = serde_json::to_string(category).unwrap();
            assert_eq!(json, format!("\"{}\"", category.code()));
        }
    }
}
