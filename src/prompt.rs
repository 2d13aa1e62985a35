use crate::detect::Doi;
use crate::extract::PaperContent;

/// How much of the full text is sent to the model.
pub const FULL_TEXT_PROMPT_CHARS: usize = 8000;

const NOT_AVAILABLE: &str = "N/A";

const RESPONSE_INSTRUCTIONS: &str = r#"INSTRUCTIONS:
1. Analyze the paper against each criterion in the criteria list
2. Determine if the paper is RELEVANT, IRRELEVANT, or HIGHLY RELEVANT
3. Provide a confidence score (0-100)
4. Explain your reasoning

Respond ONLY with a valid JSON object in this exact format:
{
  "verdict": "RELEVANT" | "IRRELEVANT" | "HIGHLY RELEVANT",
  "confidence": 85,
  "criteriaAssessment": [
    {
      "criterion": "Topic Relevance",
      "met": true,
      "explanation": "Brief explanation"
    }
  ],
  "reasoning": "Detailed explanation of the verdict"
}"#;

/// Build the analysis prompt for one paper.
pub fn build(content: &PaperContent, doi: Option<&Doi>, criteria: &str) -> String {
    let doi = doi.map(Doi::as_str).unwrap_or(NOT_AVAILABLE);
    let full_text: String = content.full_text.chars().take(FULL_TEXT_PROMPT_CHARS).collect();

    format!(
        "You are a research paper analyzer. Analyze the following research paper against the provided criteria and provide a structured JSON response.

CRITERIA:
{criteria}

PAPER INFORMATION:
Title: {title}
Authors: {authors}
Year: {year}
DOI: {doi}

Abstract:
{abstract_text}

Full Text (first {limit} characters):
{full_text}

{RESPONSE_INSTRUCTIONS}",
        title = or_na(&content.title),
        authors = or_na(&content.authors),
        year = or_na(&content.year),
        abstract_text = or_na(&content.abstract_text),
        limit = FULL_TEXT_PROMPT_CHARS,
    )
}

fn or_na(value: &str) -> &str {
    if value.is_empty() {
        NOT_AVAILABLE
    } else {
        value
    }
}
