use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::chat::{ChatMessage, ChatModel, ChatRequest};
use super::intent::IntentCategory;
use super::types::{AnalysisResult, Classification};
use super::scoring;
use crate::config::LlmConfig;
use crate::error::{Result, ScanError};

const TOP_COMMENTS: usize = 5;
const TOP_COMMENT_CHARS: usize = 150;

const CLASSIFY_SYSTEM_PROMPT: &str = r#"You are an analyst who estimates patient conversion potential from YouTube comments left on medical doctors' videos. You work for {platform}, a service where patients subscribe to a doctor for $20-40/month of ongoing chat-based care.

Classify every comment by how likely its author would pay for direct access to this doctor. Be strict. Marketing decisions depend on your accuracy."#;

const CLASSIFY_INSTRUCTIONS: &str = r#"Put each comment below into exactly one category.

## CATEGORIES

### BOOKING_INTENT
The author wants to become this doctor's patient or is trying to reach their care.
- "Do you take new patients?"
- "I wish you were my dermatologist"
- "How do I get an appointment with you?"
Not booking intent: "Great doctor!" is gratitude. "I need a dermatologist" is help seeking, because it is not about THIS doctor.

### MEDICAL_HELP_SEEKING
The author describes personal symptoms, shares their medical situation or asks for personal advice, without asking to see this doctor.
- "I've had this rash on my arm for 3 months and nothing works"
- "Is it normal for minoxidil to cause shedding in the first month?"
- "My 2 year old has a fever of 102 and spots on her tongue, should I go to the ER?"

### FRUSTRATION_WITH_SYSTEM
The author is frustrated with their current healthcare: waits, dismissive doctors, insurance, access.
- "My dermatologist spent 2 minutes with me and charged $300"
- "I've been waiting 4 months for an appointment"
- "I can't afford a specialist visit without insurance"

### GEOGRAPHIC_MENTION
The author names a place while asking about care or availability.
- "I'm in Florida, do you know anyone good here?"
- "Do you see patients in the UK?"
If another category also applies, choose the other category and still extract the location.

### GRATITUDE_ENGAGEMENT
Thanks, success stories, praise.
- "Your retinol video changed my skin, thank you!"
- "Best dermatologist on YouTube"

### GENERAL
Everything else: product questions, off-topic remarks, spam, jokes, debates.

## INTENT SCORE (1-10)

- 10: trying to book AND mentions an urgent or ongoing condition
- 9: asking to see this doctor
- 8: serious condition AND frustrated with current care
- 7: personal condition with clear emotional weight
- 6: asks for personal medical advice with detail
- 5: describes symptoms casually
- 4: general medical question without personal context
- 3: system frustration without a personal condition
- 2: positive engagement, trust building
- 1: off-topic, spam, product questions

## LOCATION

If a comment mentions any geographic location, copy it into "location" whatever the category. Otherwise set "location" to null.

## OUTPUT

Return ONLY a JSON array, starting with [ and ending with ]. No markdown, no explanation.

[
  {
    "comment_index": 0,
    "category": "BOOKING_INTENT",
    "intent_score": 9,
    "location": null,
    "key_phrase": "How can I book a consultation"
  }
]

"comment_index" is the number in brackets before each comment.

## COMMENTS

"#;

const DRAFT_SYSTEM_PROMPT: &str = "You are a medical doctor writing a pinned comment on your own YouTube video. You are genuine, clinically credible and care about your audience. You are not a marketer.";

/// Model output for one comment, before validation. Fields are kept as raw
/// JSON so a wrongly typed value degrades to a default instead of losing the
/// comment.
#[derive(Deserialize)]
struct RawClassification {
    #[serde(default)]
    comment_index: Value,
    #[serde(default)]
    category: Value,
    #[serde(default)]
    intent_score: Value,
    #[serde(default)]
    location: Value,
    #[serde(default)]
    key_phrase: Value,
}

impl RawClassification {
    fn index(&self) -> Option<i64> {
        let index = number(&self.comment_index)?;
        (index.fract() == 0.0).then_some(index as i64)
    }

    fn into_classification(self, comment_index: usize) -> Classification {
        let score = number(&self.intent_score).unwrap_or(1.0).round().clamp(1.0, 10.0);
        Classification {
            comment_index,
            category: self
                .category
                .as_str()
                .map(IntentCategory::from_model)
                .unwrap_or(IntentCategory::General),
            intent_score: score as u8,
            location: self
                .location
                .as_str()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string),
            key_phrase: self.key_phrase.as_str().unwrap_or_default().to_string(),
        }
    }
}

/// A JSON number, or a string holding one.
fn number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    n.filter(|n| n.is_finite())
}

#[derive(Debug, Clone, Copy)]
pub struct IndexedComment<'a> {
    pub index: usize,
    pub text: &'a str,
}

/// Inputs for drafting the creator's pinned comment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftContext {
    pub channel_name: String,
    pub video_title: String,
    /// Newline-joined `[CATEGORY] "text"` lines for the strongest comments
    pub top_comments: String,
    pub dominant_category: String,
    pub help_seeking_count: usize,
    pub booking_intent_count: usize,
}

impl DraftContext {
    pub fn from_analysis(
        channel_name: impl Into<String>,
        video_title: impl Into<String>,
        result: &AnalysisResult,
    ) -> Self {
        let mut ranked: Vec<&Classification> = result.classifications.iter().collect();
        ranked.sort_by(|a, b| b.intent_score.cmp(&a.intent_score));

        let top_comments = ranked
            .into_iter()
            .filter_map(|c| {
                let comment = result.comments.get(c.comment_index)?;
                let excerpt: String = comment.text.chars().take(TOP_COMMENT_CHARS).collect();
                Some(format!("[{}] \"{}\"", c.category.code(), excerpt))
            })
            .take(TOP_COMMENTS)
            .collect::<Vec<_>>()
            .join("\n");

        let counts = &result.category_counts;
        Self {
            channel_name: channel_name.into(),
            video_title: video_title.into(),
            top_comments,
            dominant_category: scoring::dominant_category(counts).label().to_string(),
            help_seeking_count: counts.get(IntentCategory::MedicalHelpSeeking),
            booking_intent_count: counts.get(IntentCategory::BookingIntent),
        }
    }
}

/// Turns comments into classifications through a chat model.
pub struct Classifier<M> {
    model: M,
    platform_name: String,
    classify_temperature: f32,
    draft_temperature: f32,
    backoff: Duration,
}

impl<M: ChatModel> Classifier<M> {
    pub fn new(model: M, config: &LlmConfig) -> Self {
        Self {
            model,
            platform_name: config.platform_name.clone(),
            classify_temperature: config.classify_temperature,
            draft_temperature: config.draft_temperature,
            backoff: config.rate_limit_backoff(),
        }
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    /// Classifies the batch in a single model call. Comments the model skips
    /// are simply absent from the result.
    pub async fn classify(&self, comments: &[IndexedComment<'_>]) -> Result<Vec<Classification>> {
        if comments.is_empty() {
            return Ok(Vec::new());
        }

        let valid: HashSet<usize> = comments.iter().map(|c| c.index).collect();
        let request = self.classify_request(comments);

        let response = self.complete_with_retry(&request).await?;
        let classifications = match parse_classifications(&response, &valid) {
            Ok(classifications) => classifications,
            Err(e) => {
                warn!("Unparseable classification output ({}), asking again", e);
                let retry = self.complete_with_retry(&request).await?;
                parse_classifications(&retry, &valid)
                    .map_err(|e| ScanError::MalformedResponse(e.to_string()))?
            }
        };

        info!(
            "Classified {}/{} comments",
            classifications.len(),
            comments.len()
        );
        Ok(classifications)
    }

    /// Drafts a pinned comment in the creator's voice.
    pub async fn draft_pinned_comment(&self, context: &DraftContext) -> Result<String> {
        let request = ChatRequest {
            messages: vec![
                ChatMessage::system(DRAFT_SYSTEM_PROMPT),
                ChatMessage::user(self.draft_instructions(context)),
            ],
            temperature: self.draft_temperature,
            json_mode: false,
        };

        let draft = self.complete_with_retry(&request).await?;
        Ok(draft.trim().to_string())
    }

    async fn complete_with_retry(&self, request: &ChatRequest) -> Result<String> {
        match self.model.complete(request).await {
            Err(ScanError::RateLimited) => {
                warn!("Model rate limited, retrying in {:?}", self.backoff);
                tokio::time::sleep(self.backoff).await;
                self.model.complete(request).await
            }
            other => other,
        }
    }

    fn classify_request(&self, comments: &[IndexedComment<'_>]) -> ChatRequest {
        let numbered = comments
            .iter()
            .map(|c| format!("[{}] \"{}\"", c.index, c.text))
            .collect::<Vec<_>>()
            .join("\n");
        debug!(comments = comments.len(), chars = numbered.len(), "Built classification prompt");

        ChatRequest {
            messages: vec![
                ChatMessage::system(CLASSIFY_SYSTEM_PROMPT.replace("{platform}", &self.platform_name)),
                ChatMessage::user(format!("{}{}", CLASSIFY_INSTRUCTIONS, numbered)),
            ],
            temperature: self.classify_temperature,
            json_mode: true,
        }
    }

    fn draft_instructions(&self, context: &DraftContext) -> String {
        format!(
            "Write a pinned comment for me to post on my YouTube video.\n\n\
             My channel name: {channel}\n\
             Video title: {title}\n\n\
             The top concerns my audience raises in the comments on this video:\n{top}\n\n\
             Most common kind of intent: {dominant}\n\
             People asking for personal help: {help}\n\
             People trying to book with me: {booking}\n\n\
             The comment must:\n\
             1. Name the specific medical concern that keeps coming up, not vague language\n\
             2. Acknowledge it with genuine clinical credibility\n\
             3. Mention naturally that I now offer personal consultations through {platform} where I can review someone's specific case\n\
             4. Sound like me answering my community, not like an advertisement\n\
             5. Be 3-4 sentences at most\n\
             6. End with a soft call to action such as \"Link in my bio\" or \"Link below if you'd like to connect\"\n\
             7. Avoid hashtags, emoji and piles of exclamation marks\n\n\
             Write ONE comment only. No preamble, no options, no explanation.",
            channel = context.channel_name,
            title = context.video_title,
            top = context.top_comments,
            dominant = context.dominant_category,
            help = context.help_seeking_count,
            booking = context.booking_intent_count,
            platform = self.platform_name,
        )
    }
}

/// Cuts the JSON array out of a model reply: drops code fences, then keeps
/// everything from the first `[` to the last `]`.
pub fn extract_json(text: &str) -> &str {
    let mut cleaned = text.trim();
    if let Some(rest) = cleaned.strip_prefix("```") {
        let rest = match rest.get(..4) {
            Some(tag) if tag.eq_ignore_ascii_case("json") => &rest[4..],
            _ => rest,
        };
        cleaned = rest.trim_start();
    }
    if let Some(rest) = cleaned.strip_suffix("```") {
        cleaned = rest.trim_end();
    }

    match (cleaned.find('['), cleaned.rfind(']')) {
        (Some(first), Some(last)) if last > first => &cleaned[first..=last],
        _ => cleaned,
    }
}

/// Parses a model reply into classifications for the given input indices.
/// Elements without a usable index, pointing outside the batch or repeating
/// an index already seen are dropped. Anything else is kept, with unreadable
/// fields falling back to `GENERAL` and a score of 1. Fails only when no JSON array can be read.
pub fn parse_classifications(
    text: &str,
    valid_indices: &HashSet<usize>,
) -> std::result::Result<Vec<Classification>, serde_json::Error> {
    let values: Vec<Value> = serde_json::from_str(extract_json(text))?;

    let mut seen = HashSet::new();
    let mut classifications = Vec::with_capacity(values.len());
    for value in values {
        let raw: RawClassification = match serde_json::from_value(value) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Skipping unreadable classification: {}", e);
                continue;
            }
        };
        let Some(index) = raw.index().and_then(|i| usize::try_from(i).ok()) else {
            warn!("Skipping classification with comment_index {}", raw.comment_index);
            continue;
        };
        if !valid_indices.contains(&index) {
            warn!("Skipping classification for unknown comment {}", index);
            continue;
        }
        if !seen.insert(index) {
            debug!("Ignoring repeated classification for comment {}", index);
            continue;
        }
        classifications.push(raw.into_classification(index));
    }

    Ok(classifications)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::types::{CategoryCounts, DebugInfo, FreshnessData};
    use crate::youtube::Comment;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct ScriptedModel {
        replies: Mutex<VecDeque<Result<String>>>,
        requests: Mutex<Vec<ChatRequest>>,
    }

    impl ScriptedModel {
        fn new(replies: Vec<Result<String>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ChatModel for ScriptedModel {
        async fn complete(&self, request: &ChatRequest) -> Result<String> {
            self.requests.lock().unwrap().push(request.clone());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(String::new()))
        }
    }

    fn classifier(replies: Vec<Result<String>>) -> Classifier<ScriptedModel> {
        Classifier::new(ScriptedModel::new(replies), &LlmConfig::default())
            .with_backoff(Duration::ZERO)
    }

    fn batch<'a>(texts: &[&'a str]) -> Vec<IndexedComment<'a>> {
        texts
            .iter()
            .copied()
            .enumerate()
            .map(|(index, text)| IndexedComment { index, text })
            .collect()
    }

    fn indices(n: usize) -> HashSet<usize> {
        (0..n).collect()
    }

    #[test]
    fn extracts_array_from_prose() {
        assert_eq!(extract_json("Sure! Here you go: [1, 2] hope it helps"), "[1, 2]");
        assert_eq!(extract_json("```json\n[{\"a\": 1}]\n```"), "[{\"a\": 1}]");
        assert_eq!(extract_json("```JSON\n[]\n```"), "[]");
        assert_eq!(extract_json("{\"items\": [1]}"), "[1]");
        assert_eq!(extract_json("no json here"), "no json here");
    }

    #[test]
    fn truncated_output_does_not_parse() {
        let text = r#"[{"comment_index": 0, "category": "GENERAL""#;
        assert!(parse_classifications(text, &indices(1)).is_err());
    }

    #[test]
    fn unknown_category_becomes_general() {
        let text = r#"[{"comment_index": 0, "category": "SPAM", "intent_score": 1, "location": null, "key_phrase": "buy now"}]"#;
        let parsed = parse_classifications(text, &indices(1)).unwrap();
        assert_eq!(parsed[0].category, IntentCategory::General);
    }

    #[test]
    fn drops_out_of_range_and_repeated_indices() {
        let text = r#"[
            {"comment_index": 0, "category": "BOOKING_INTENT", "intent_score": 9, "location": null, "key_phrase": "a"},
            {"comment_index": 5, "category": "GENERAL", "intent_score": 1, "location": null, "key_phrase": "b"},
            {"comment_index": -1, "category": "GENERAL", "intent_score": 1, "location": null, "key_phrase": "c"},
            {"comment_index": 0, "category": "GENERAL", "intent_score": 1, "location": null, "key_phrase": "d"},
            "not an object"
        ]"#;
        let parsed = parse_classifications(text, &indices(2)).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].category, IntentCategory::BookingIntent);
        assert_eq!(parsed[0].key_phrase, "a");
    }

    #[test]
    fn wrongly_typed_fields_fall_back_instead_of_dropping() {
        let text = r#"[
            {"comment_index": 0, "category": null, "intent_score": 4, "location": null, "key_phrase": "a"},
            {"comment_index": 1, "category": 42, "intent_score": null, "location": 7, "key_phrase": null},
            {"comment_index": "2", "category": "SPAM", "intent_score": "7", "location": "Leeds", "key_phrase": "c"},
            {"comment_index": 3, "intent_score": "high"}
        ]"#;
        let parsed = parse_classifications(text, &indices(4)).unwrap();
        assert_eq!(parsed.len(), 4);
        assert!(parsed.iter().all(|c| c.category == IntentCategory::General));
        assert_eq!(parsed[0].intent_score, 4);
        assert_eq!(parsed[1].intent_score, 1);
        assert_eq!(parsed[1].location, None);
        assert_eq!(parsed[1].key_phrase, "");
        assert_eq!(parsed[2].comment_index, 2);
        assert_eq!(parsed[2].intent_score, 7);
        assert_eq!(parsed[2].location.as_deref(), Some("Leeds"));
        assert_eq!(parsed[3].intent_score, 1);
    }

    #[test]
    fn fractional_index_is_dropped() {
        let text = r#"[{"comment_index": 0.5, "category": "GENERAL", "intent_score": 1}]"#;
        assert!(parse_classifications(text, &indices(1)).unwrap().is_empty());
    }

    #[test]
    fn clamps_scores_and_blank_locations() {
        let text = r#"[
            {"comment_index": 0, "category": "general", "intent_score": 14, "location": "  ", "key_phrase": "x"},
            {"comment_index": 1, "category": "GEOGRAPHIC_MENTION", "intent_score": 0.2, "location": " Ohio ", "key_phrase": "y"}
        ]"#;
        let parsed = parse_classifications(text, &indices(2)).unwrap();
        assert_eq!(parsed[0].intent_score, 10);
        assert_eq!(parsed[0].location, None);
        assert_eq!(parsed[1].intent_score, 1);
        assert_eq!(parsed[1].location.as_deref(), Some("Ohio"));
    }

    #[tokio::test]
    async fn classify_sends_numbered_comments_in_json_mode() {
        let classifier = classifier(vec![Ok(
            r#"[{"comment_index": 1, "category": "MEDICAL_HELP_SEEKING", "intent_score": 6, "location": null, "key_phrase": "rash"}]"#
                .to_string(),
        )]);

        let result = classifier
            .classify(&batch(&["great video", "I have a rash"]))
            .await
            .unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].comment_index, 1);

        let requests = classifier.model().requests.lock().unwrap();
        let request = &requests[0];
        assert!(request.json_mode);
        assert_eq!(request.temperature, 0.1);
        assert!(request.messages[0].content.contains("FutureClinic"));
        assert!(request.messages[1].content.ends_with("[0] \"great video\"\n[1] \"I have a rash\""));
    }

    #[tokio::test]
    async fn retries_once_after_rate_limit() {
        let classifier = classifier(vec![Err(ScanError::RateLimited), Ok("[]".to_string())]);
        let result = classifier.classify(&batch(&["hello"])).await.unwrap();
        assert!(result.is_empty());
        assert_eq!(classifier.model().calls(), 2);
    }

    #[tokio::test]
    async fn second_rate_limit_propagates() {
        let classifier = classifier(vec![Err(ScanError::RateLimited), Err(ScanError::RateLimited)]);
        let err = classifier.classify(&batch(&["hello"])).await.unwrap_err();
        assert_eq!(err, ScanError::RateLimited);
    }

    #[tokio::test]
    async fn asks_again_after_unparseable_reply() {
        let classifier = classifier(vec![
            Ok("I cannot do that".to_string()),
            Ok(r#"[{"comment_index": 0, "category": "GRATITUDE_ENGAGEMENT", "intent_score": 2, "location": null, "key_phrase": "thanks"}]"#.to_string()),
        ]);
        let result = classifier.classify(&batch(&["thanks doc"])).await.unwrap();
        assert_eq!(result[0].category, IntentCategory::GratitudeEngagement);
        assert_eq!(classifier.model().calls(), 2);
    }

    #[tokio::test]
    async fn two_unparseable_replies_are_malformed() {
        let classifier = classifier(vec![Ok("nope".to_string()), Ok("[{".to_string())]);
        let err = classifier.classify(&batch(&["x"])).await.unwrap_err();
        assert!(matches!(err, ScanError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn empty_batch_skips_the_model() {
        let classifier = classifier(vec![]);
        assert!(classifier.classify(&[]).await.unwrap().is_empty());
        assert_eq!(classifier.model().calls(), 0);
    }

    fn comment(text: &str) -> Comment {
        Comment {
            comment_id: text.to_string(),
            text: text.to_string(),
            author_name: "viewer".to_string(),
            like_count: 0,
            published_at: "2024-01-01T00:00:00Z".to_string(),
            updated_at: "2024-01-01T00:00:00Z".to_string(),
        }
    }

    fn classification(index: usize, category: IntentCategory, score: u8) -> Classification {
        Classification {
            comment_index: index,
            category,
            intent_score: score,
            location: None,
            key_phrase: String::new(),
        }
    }

    fn analysis(comments: Vec<Comment>, classifications: Vec<Classification>) -> AnalysisResult {
        AnalysisResult {
            video_id: "dQw4w9WgXcQ".to_string(),
            category_counts: CategoryCounts::from_classifications(&classifications),
            comments,
            classifications,
            raw_score: 0,
            density_score: 0.0,
            average_intent_score: 0.0,
            geo_mentions: Vec::new(),
            geo_places: Vec::new(),
            freshness: FreshnessData::cold(),
            debug: DebugInfo {
                relevance_count: 0,
                time_count: 0,
                unique_count: 0,
                analysis_time_ms: 0,
                total_characters: 0,
            },
        }
    }

    #[test]
    fn draft_context_ranks_top_comments() {
        let long = "a".repeat(200);
        let texts = ["thanks", long.as_str(), "book me", "rash", "itch", "ok"];
        let comments: Vec<Comment> = texts.iter().map(|t| comment(t)).collect();
        let result = analysis(
            comments,
            vec![
                classification(0, IntentCategory::GratitudeEngagement, 2),
                classification(1, IntentCategory::MedicalHelpSeeking, 6),
                classification(2, IntentCategory::BookingIntent, 9),
                classification(3, IntentCategory::MedicalHelpSeeking, 5),
                classification(4, IntentCategory::MedicalHelpSeeking, 5),
                classification(5, IntentCategory::General, 1),
            ],
        );

        let context = DraftContext::from_analysis("Dr. Skin", "Rashes explained", &result);
        let lines: Vec<&str> = context.top_comments.lines().collect();
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[0], "[BOOKING_INTENT] \"book me\"");
        assert_eq!(lines[1], format!("[MEDICAL_HELP_SEEKING] \"{}\"", "a".repeat(150)));
        assert_eq!(lines[4], "[GRATITUDE_ENGAGEMENT] \"thanks\"");
        assert_eq!(context.dominant_category, IntentCategory::MedicalHelpSeeking.label());
        assert_eq!(context.help_seeking_count, 3);
        assert_eq!(context.booking_intent_count, 1);
    }

    #[tokio::test]
    async fn draft_is_trimmed_and_uses_creative_temperature() {
        let classifier = classifier(vec![Ok("  Pinned text.\n".to_string())]);
        let context = DraftContext {
            channel_name: "Dr. Skin".to_string(),
            video_title: "Rashes".to_string(),
            top_comments: "[MEDICAL_HELP_SEEKING] \"rash\"".to_string(),
            dominant_category: "Help Seeking".to_string(),
            help_seeking_count: 4,
            booking_intent_count: 1,
        };

        let draft = classifier.draft_pinned_comment(&context).await.unwrap();
        assert_eq!(draft, "Pinned text.");

        let requests = classifier.model().requests.lock().unwrap();
        assert!(!requests[0].json_mode);
        assert_eq!(requests[0].temperature, 0.7);
        assert!(requests[0].messages[1].content.contains("Video title: Rashes"));
    }
}
