//! Request complexity estimation.

use crate::types::{ComplexityEstimate, ComplexityFactors, InferenceRequest};

/// Reasoning markers; three or more hits saturate the reasoning factor.
const REASONING_KEYWORDS: &[&str] = &[
    "analyze",
    "explain",
    "compare",
    "evaluate",
    "argue",
    "reason",
    "deduce",
    "infer",
    "conclude",
    "synthesize",
    "step by step",
    "think through",
    "let me break down",
];

/// Technical domain markers; two hits saturate the domain factor.
const TECHNICAL_DOMAINS: &[&str] = &[
    "code",
    "programming",
    "algorithm",
    "mathematics",
    "science",
    "physics",
    "chemistry",
    "biology",
    "legal",
    "medical",
    "financial",
    "engineering",
];

/// Factor weights: length, reasoning, domain, context, output_length.
const WEIGHTS: [f64; 5] = [0.2, 0.3, 0.2, 0.15, 0.15];

/// Estimates request complexity to guide model tier selection.
///
/// Five subscores, each clamped to [0, 1]: input length (chars / 2000),
/// reasoning keyword density, technical domain hits, multi-turn context,
/// and requested output length (max_tokens / 2000). The overall score is
/// their weighted sum, monotone non-decreasing in every factor.
#[derive(Debug, Clone, Default)]
pub struct ComplexityEstimator;

impl ComplexityEstimator {
    pub fn new() -> Self {
        Self
    }

    pub fn estimate(&self, request: &InferenceRequest) -> ComplexityEstimate {
        let text = request.text().to_lowercase();
        let input_length = text.len();

        let length = (input_length as f64 / 2000.0).min(1.0);

        let reasoning_count = REASONING_KEYWORDS
            .iter()
            .filter(|kw| text.contains(*kw))
            .count();
        let reasoning = (reasoning_count as f64 / 3.0).min(1.0);

        let domain_count = TECHNICAL_DOMAINS
            .iter()
            .filter(|kw| text.contains(*kw))
            .count();
        let domain = (domain_count as f64 / 2.0).min(1.0);

        let requires_context = request.messages.len() > 2;
        let context = if requires_context { 0.5 } else { 0.0 };

        let output_length = (f64::from(request.parameters.max_tokens) / 2000.0).min(1.0);

        let factors = ComplexityFactors {
            length,
            reasoning,
            domain,
            context,
            output_length,
        };
        let score = WEIGHTS[0] * length
            + WEIGHTS[1] * reasoning
            + WEIGHTS[2] * domain
            + WEIGHTS[3] * context
            + WEIGHTS[4] * output_length;

        ComplexityEstimate {
            score,
            factors,
            input_length,
            estimated_reasoning_steps: reasoning_count,
            requires_context,
            domain_specific: domain_count > 0,
        }
    }
}
