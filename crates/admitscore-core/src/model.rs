//! Core data model types for admitscore.
//!
//! These types describe the answer-key configuration, the raw submission
//! payload, and the per-question / per-domain results the pipeline produces.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::text;

// ---------------------------------------------------------------------------
// Domains and question types
// ---------------------------------------------------------------------------

/// An academic or dispositional area assessed by the test.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    English,
    Mathematics,
    Reasoning,
    Mindset,
    Values,
    Creativity,
}

impl Domain {
    pub const ALL: [Domain; 6] = [
        Domain::English,
        Domain::Mathematics,
        Domain::Reasoning,
        Domain::Mindset,
        Domain::Values,
        Domain::Creativity,
    ];

    /// Domains that feed the academic percentage and threshold checks.
    pub const ACADEMIC: [Domain; 3] = [Domain::English, Domain::Mathematics, Domain::Reasoning];

    pub fn is_academic(self) -> bool {
        Self::ACADEMIC.contains(&self)
    }

    /// Domains whose writing is judged on prose quality as well as content.
    pub fn is_language(self) -> bool {
        self == Domain::English
    }

    /// Domains whose writing is judged primarily on reasoning content.
    pub fn is_quantitative(self) -> bool {
        matches!(self, Domain::Mathematics | Domain::Reasoning)
    }

    /// Qualitative lenses that inform, but never dominate, the recommendation.
    pub fn is_lens(self) -> bool {
        matches!(self, Domain::Values | Domain::Creativity)
    }

    /// Lowercase tokens that identify this domain inside a field name.
    pub fn keywords(self) -> &'static [&'static str] {
        match self {
            Domain::English => &["english", "eng", "literacy", "ela"],
            Domain::Mathematics => &["mathematics", "maths", "math", "numeracy"],
            Domain::Reasoning => &["reasoning", "logic", "nvr", "vr"],
            Domain::Mindset => &["mindset", "growth"],
            Domain::Values => &["values", "character"],
            Domain::Creativity => &["creativity", "creative"],
        }
    }

    /// Infer a single domain from a list of tokens. More than one candidate
    /// domain yields `None`.
    pub fn infer_from_tokens(tokens: &[String]) -> Option<Domain> {
        let mut found = Domain::ALL
            .into_iter()
            .filter(|d| d.keywords().iter().any(|k| tokens.iter().any(|t| t == k)));
        let first = found.next()?;
        match found.next() {
            Some(_) => None,
            None => Some(first),
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Domain::English => "English",
            Domain::Mathematics => "Mathematics",
            Domain::Reasoning => "Reasoning",
            Domain::Mindset => "Mindset",
            Domain::Values => "Values",
            Domain::Creativity => "Creativity",
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Domain::English => "english",
            Domain::Mathematics => "mathematics",
            Domain::Reasoning => "reasoning",
            Domain::Mindset => "mindset",
            Domain::Values => "values",
            Domain::Creativity => "creativity",
        };
        f.write_str(s)
    }
}

impl FromStr for Domain {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        Domain::ALL
            .into_iter()
            .find(|d| d.keywords().contains(&lower.as_str()))
            .ok_or_else(|| format!("unknown domain: {s}"))
    }
}

/// Kind of question in the answer key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionType {
    #[serde(alias = "MCQ", alias = "multiple_choice")]
    Mcq,
    #[serde(alias = "Writing", alias = "extended", alias = "essay")]
    Writing,
}

/// A multiple-choice option letter.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum Letter {
    A,
    B,
    C,
    D,
}

impl Letter {
    pub const ALL: [Letter; 4] = [Letter::A, Letter::B, Letter::C, Letter::D];

    pub fn from_char(c: char) -> Option<Letter> {
        match c.to_ascii_uppercase() {
            'A' => Some(Letter::A),
            'B' => Some(Letter::B),
            'C' => Some(Letter::C),
            'D' => Some(Letter::D),
            _ => None,
        }
    }

    pub fn as_char(self) -> char {
        match self {
            Letter::A => 'A',
            Letter::B => 'B',
            Letter::C => 'C',
            Letter::D => 'D',
        }
    }
}

impl fmt::Display for Letter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

// ---------------------------------------------------------------------------
// Answer key configuration
// ---------------------------------------------------------------------------

/// Canonical definition of one question for a grade/form version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerKey {
    /// Unique label within the grade/form version (e.g. "eng_q3").
    pub label: String,
    pub domain: Domain,
    /// Sub-skill tag, e.g. "reading comprehension".
    #[serde(default)]
    pub construct: String,
    pub question_type: QuestionType,
    #[serde(default)]
    pub question_number: u32,
    #[serde(default)]
    pub question_text: String,
    /// Correct option letter, or the text of the correct option.
    #[serde(default)]
    pub correct_answer: String,
    #[serde(default)]
    pub option_a: String,
    #[serde(default)]
    pub option_b: String,
    #[serde(default)]
    pub option_c: String,
    #[serde(default)]
    pub option_d: String,
}

impl AnswerKey {
    pub fn option(&self, letter: Letter) -> &str {
        match letter {
            Letter::A => &self.option_a,
            Letter::B => &self.option_b,
            Letter::C => &self.option_c,
            Letter::D => &self.option_d,
        }
    }

    /// Non-empty options with their letters.
    pub fn options(&self) -> impl Iterator<Item = (Letter, &str)> + '_ {
        Letter::ALL
            .into_iter()
            .map(move |l| (l, self.option(l).trim()))
            .filter(|(_, text)| !text.is_empty())
    }

    pub fn is_mcq(&self) -> bool {
        self.question_type == QuestionType::Mcq
    }

    /// Resolve the configured correct answer to an option letter.
    ///
    /// Accepts a bare letter (`"B"`, `"b)"`, `"B."`) or the exact text of one
    /// option. Anything else yields `None`.
    pub fn correct_letter(&self) -> Option<Letter> {
        let trimmed = self.correct_answer.trim();
        let mut chars = trimmed.chars();
        if let Some(first) = chars.next() {
            let rest = chars.as_str().trim();
            if rest.is_empty() || rest == ")" || rest == "." {
                if let Some(letter) = Letter::from_char(first) {
                    if !self.option(letter).trim().is_empty() {
                        return Some(letter);
                    }
                }
            }
        }
        let wanted = text::normalize(trimmed);
        if wanted.is_empty() {
            return None;
        }
        let mut matches = self
            .options()
            .filter(|(_, opt)| text::normalize(opt) == wanted)
            .map(|(l, _)| l);
        let first = matches.next()?;
        match matches.next() {
            Some(_) => None,
            None => Some(first),
        }
    }
}

/// All questions for one grade and form version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerKeySet {
    pub grade: String,
    pub form_version: String,
    #[serde(default)]
    pub questions: Vec<AnswerKey>,
}

impl AnswerKeySet {
    pub fn get(&self, label: &str) -> Option<&AnswerKey> {
        self.questions.iter().find(|q| q.label == label)
    }

    pub fn mcq(&self) -> impl Iterator<Item = &AnswerKey> {
        self.questions.iter().filter(|q| q.is_mcq())
    }

    pub fn writing(&self) -> impl Iterator<Item = &AnswerKey> {
        self.questions.iter().filter(|q| !q.is_mcq())
    }

    /// The only writing question configured for `domain`, if exactly one exists.
    pub fn sole_writing_key(&self, domain: Domain) -> Option<&AnswerKey> {
        let mut found = self.writing().filter(|q| q.domain == domain);
        let first = found.next()?;
        match found.next() {
            Some(_) => None,
            None => Some(first),
        }
    }
}

// ---------------------------------------------------------------------------
// Raw submission payload
// ---------------------------------------------------------------------------

/// One raw answer value. Historical form schemas delivered either a plain
/// string, a list of selections, or a tagged object such as
/// `{"type": "choice", "value": "B) Paris"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Text(String),
    List(Vec<Value>),
    Tagged(serde_json::Map<String, Value>),
    Other(Value),
}

const VALUE_KEYS: [&str; 6] = ["value", "answer", "text", "response", "label", "choice"];
const KIND_KEYS: [&str; 3] = ["type", "kind", "field_type"];

impl RawValue {
    /// The answer text carried by this value, trimmed. Empty answers and
    /// multi-selections yield `None`.
    pub fn text(&self) -> Option<String> {
        match self {
            RawValue::Text(s) => non_empty(s),
            RawValue::List(items) => match items.as_slice() {
                [single] => value_text(single, 1),
                _ => None,
            },
            RawValue::Tagged(map) => map_text(map, 1),
            RawValue::Other(v) => value_text(v, 0),
        }
    }

    /// The field kind tag of a tagged value (e.g. "textarea").
    pub fn kind(&self) -> Option<&str> {
        match self {
            RawValue::Tagged(map) => KIND_KEYS
                .iter()
                .find_map(|k| map.get(*k).and_then(Value::as_str)),
            _ => None,
        }
    }
}

fn non_empty(s: &str) -> Option<String> {
    let trimmed = s.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn value_text(value: &Value, depth: u8) -> Option<String> {
    match value {
        Value::String(s) => non_empty(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Object(map) if depth > 0 => map_text(map, depth - 1),
        _ => None,
    }
}

fn map_text(map: &serde_json::Map<String, Value>, depth: u8) -> Option<String> {
    VALUE_KEYS
        .iter()
        .filter_map(|k| map.get(*k))
        .find_map(|v| value_text(v, depth))
}

/// A complete admissions-test submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub submission_id: String,
    pub student_name: String,
    #[serde(default)]
    pub grade: String,
    #[serde(default = "default_locale")]
    pub locale: String,
    #[serde(default)]
    pub programme: String,
    /// Opaque versioned field identifier → raw answer.
    #[serde(default)]
    pub answers: BTreeMap<String, RawValue>,
}

fn default_locale() -> String {
    "en".to_string()
}

// ---------------------------------------------------------------------------
// Scoring results
// ---------------------------------------------------------------------------

/// Which letter-inference strategy matched a student answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LetterMatch {
    ExactText,
    Containment,
    LeadingLetter,
    SingleLetter,
}

/// Resolved outcome of one MCQ item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionResult {
    pub label: String,
    pub question_number: u32,
    pub domain: Domain,
    pub construct: String,
    pub student_answer: Option<String>,
    pub inferred_letter: Option<Letter>,
    pub letter_match: Option<LetterMatch>,
    pub correct_answer: Option<Letter>,
    pub is_correct: bool,
}

/// Aggregate MCQ score for one domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainScore {
    pub domain: Domain,
    pub correct: u32,
    pub total: u32,
    /// Percentage correct, one decimal place.
    pub pct: f64,
    /// `false` when the domain had no scorable items ("not assessed").
    pub assessed: bool,
    /// 0–4 rescaled value (mindset only).
    #[serde(default)]
    pub scaled: Option<f64>,
}

/// Aggregate MCQ score for one construct within a domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstructScore {
    pub domain: Domain,
    pub construct: String,
    pub correct: u32,
    pub total: u32,
    pub pct: f64,
}

/// An extended-response answer awaiting evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WritingTask {
    pub domain: Domain,
    /// Answer-key label when the field resolved to a configured question.
    #[serde(default)]
    pub label: Option<String>,
    pub source_key: String,
    /// Prompt from configuration; empty when none is configured.
    pub prompt_text: String,
    pub student_response: String,
    pub grade: String,
    pub locale: String,
    pub programme: String,
}

/// Qualitative band for a piece of writing.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum WritingBand {
    Insufficient,
    Emerging,
    Developing,
    Good,
    Excellent,
}

impl WritingBand {
    /// Map free text from the generative service onto the fixed enumeration.
    pub fn normalize(raw: &str) -> Option<WritingBand> {
        let lower = text::normalize(raw);
        let word = lower.trim_matches(|c: char| !c.is_alphanumeric());
        match word {
            "excellent" | "exceptional" | "outstanding" | "exceeding" | "advanced" => {
                Some(WritingBand::Excellent)
            }
            "good" | "secure" | "proficient" | "strong" | "meeting" => Some(WritingBand::Good),
            "developing" | "satisfactory" | "approaching" | "adequate" => {
                Some(WritingBand::Developing)
            }
            "emerging" | "beginning" | "limited" | "weak" | "basic" => Some(WritingBand::Emerging),
            "insufficient" | "none" | "not enough evidence" => Some(WritingBand::Insufficient),
            _ => None,
        }
    }

    /// Band implied by a 0–4 score.
    pub fn for_score(score: f64) -> WritingBand {
        if score >= 3.5 {
            WritingBand::Excellent
        } else if score >= 2.5 {
            WritingBand::Good
        } else if score >= 1.5 {
            WritingBand::Developing
        } else if score > 0.0 {
            WritingBand::Emerging
        } else {
            WritingBand::Insufficient
        }
    }

    /// Representative score when only a band is known.
    pub fn nominal_score(self) -> f64 {
        match self {
            WritingBand::Excellent => 4.0,
            WritingBand::Good => 3.0,
            WritingBand::Developing => 2.0,
            WritingBand::Emerging => 1.0,
            WritingBand::Insufficient => 0.0,
        }
    }
}

impl fmt::Display for WritingBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WritingBand::Excellent => "Excellent",
            WritingBand::Good => "Good",
            WritingBand::Developing => "Developing",
            WritingBand::Emerging => "Emerging",
            WritingBand::Insufficient => "Insufficient",
        };
        f.write_str(s)
    }
}

/// Where a writing evaluation came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationSource {
    Ai,
    Fallback,
    TooShort,
}

/// Qualitative evaluation of one writing task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WritingEvaluation {
    pub domain: Domain,
    pub band: WritingBand,
    /// Always within [0, 4].
    pub score: f64,
    pub content_narrative: String,
    pub writing_narrative: String,
    pub threshold_comment: String,
    #[serde(default)]
    pub needs_manual_review: bool,
    pub source: EvaluationSource,
}

// ---------------------------------------------------------------------------
// Thresholds
// ---------------------------------------------------------------------------

/// School-configured minimum pass percentages per grade and domain.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ThresholdTable {
    #[serde(default)]
    pub school: String,
    /// Grade → domain → minimum pass percentage.
    #[serde(default)]
    pub grades: BTreeMap<String, BTreeMap<Domain, f64>>,
}

impl ThresholdTable {
    pub fn threshold(&self, grade: &str, domain: Domain) -> Option<f64> {
        let wanted = normalize_grade(grade);
        self.grades
            .iter()
            .find(|(g, _)| normalize_grade(g) == wanted)
            .and_then(|(_, domains)| domains.get(&domain).copied())
    }
}

/// Reduce "Grade 7", "G7", "year 7" and "7" to the same key.
pub fn normalize_grade(grade: &str) -> String {
    let lower = grade.trim().to_lowercase();
    let stripped = ["grade", "year", "g", "y"]
        .iter()
        .find_map(|p| lower.strip_prefix(p))
        .unwrap_or(&lower);
    stripped.trim().to_string()
}
