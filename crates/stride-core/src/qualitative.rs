//! Program-level qualitative feedback: prompt, response parsing, and
//! cross-language materialization.

use std::collections::BTreeMap;

use anyhow::Context;

use crate::error::EngineError;
use crate::feedback::build_learning_journey;
use crate::language::language_name;
use crate::metrics::ProgramMetrics;
use crate::model::{DomainContext, Program, QualitativeFeedback, Task, TaskStatus};
use crate::settle::settle_or_default;
use crate::traits::{FeedbackGenerator, Translator};

/// Generate qualitative feedback for a finished program.
///
/// Best-effort: any failure is logged and yields an empty feedback object.
pub async fn generate_qualitative_feedback(
    generator: &dyn FeedbackGenerator,
    program: &Program,
    tasks: &[Task],
    metrics: &ProgramMetrics,
    domain_context: Option<&DomainContext>,
    language: &str,
) -> QualitativeFeedback {
    let prompt = build_program_prompt(program, tasks, metrics, domain_context, language);
    let outcome = async {
        let response = generator
            .send_message(&prompt)
            .await
            .context("qualitative feedback request failed")?;
        parse_qualitative_feedback(&response.content)
    }
    .await;

    match outcome {
        Ok(feedback) => feedback,
        Err(e) => {
            let err = EngineError::external("qualitative feedback", &e);
            tracing::warn!(program_id = %program.id, "{err}; storing empty feedback");
            QualitativeFeedback::default()
        }
    }
}

fn build_program_prompt(
    program: &Program,
    tasks: &[Task],
    metrics: &ProgramMetrics,
    domain_context: Option<&DomainContext>,
    language: &str,
) -> String {
    let mut prompt = format!(
        "You are a career and learning mentor. A learner has finished the \"{}\" program ({} mode).\n\n\
         Summary:\n- Completed tasks: {}/{}\n- Total XP: {}\n- Average score: {}/100\n- Days used: {}\n",
        program.scenario_id,
        program.mode,
        metrics.completed_tasks,
        metrics.total_tasks,
        metrics.total_xp,
        metrics.avg_score,
        metrics.days_used,
    );

    if let Some(ctx) = domain_context.filter(|c| !c.is_empty()) {
        prompt.push_str(&format!("\nTarget domain: {}\n", ctx.title));
        if !ctx.description.is_empty() {
            prompt.push_str(&format!("{}\n", ctx.description));
        }
        if !ctx.skill_focus.is_empty() {
            prompt.push_str(&format!("Key skills: {}\n", ctx.skill_focus.join(", ")));
        }
    }

    prompt.push_str("\nTasks:\n");
    for task in tasks.iter().filter(|t| t.status == TaskStatus::Completed) {
        let attempts = build_learning_journey(&task.interactions).len();
        prompt.push_str(&format!(
            "- {} (score {}, {} attempt{})\n",
            if task.title.is_empty() { &task.id } else { &task.title },
            task.score(),
            attempts,
            if attempts == 1 { "" } else { "s" },
        ));
        if let Some(summary) = &task.metadata.evaluation {
            let excerpt: String = summary.feedback.chars().take(200).collect();
            if !excerpt.is_empty() {
                prompt.push_str(&format!("  Feedback: {excerpt}\n"));
            }
        }
    }

    prompt.push_str(&format!(
        "\nRespond with a single JSON object and nothing else:\n\
         {{\"overallAssessment\": string, \"careerAlignment\": string, \
         \"strengths\": [string], \"growthAreas\": [string], \"nextSteps\": [string]}}\n\
         Give 2-3 items per list. Write all text in {}.",
        language_name(language)
    ));
    prompt
}

/// Parse the generator's reply into structured feedback.
pub fn parse_qualitative_feedback(response: &str) -> anyhow::Result<QualitativeFeedback> {
    let json = extract_json_block(response);
    let feedback: QualitativeFeedback =
        serde_json::from_str(json).context("qualitative feedback is not valid JSON")?;
    anyhow::ensure!(!feedback.is_empty(), "qualitative feedback has no content");
    Ok(feedback)
}

/// Extract a JSON object from a generator reply.
///
/// Handles:
/// - ```json fenced blocks (preferred)
/// - Generic ``` fenced blocks
/// - Bare text, trimmed to the outermost `{ ... }`
pub fn extract_json_block(response: &str) -> &str {
    let mut generic: Option<&str> = None;
    let mut rest = response;

    while let Some(open) = rest.find("```") {
        let after_fence = &rest[open + 3..];
        let line_end = after_fence.find('\n').unwrap_or(after_fence.len());
        let lang = after_fence[..line_end].trim().to_lowercase();
        let body_start = (line_end + 1).min(after_fence.len());
        let body = &after_fence[body_start..];
        let (block, remainder) = match body.find("```") {
            Some(close) => (&body[..close], &body[close + 3..]),
            // Truncated (unclosed) block: take what we have.
            None => (body, ""),
        };

        if lang == "json" {
            return block.trim();
        }
        if lang.is_empty() && generic.is_none() {
            generic = Some(block.trim());
        }
        rest = remainder;
    }

    if let Some(block) = generic {
        return block;
    }

    match (response.find('{'), response.rfind('}')) {
        (Some(start), Some(end)) if end > start => &response[start..=end],
        _ => response.trim(),
    }
}

/// Store feedback under the caller's language and the canonical language.
///
/// When the two differ, every field is translated to the canonical language
/// in one all-settled batch. A field whose translation fails keeps its
/// original text under the canonical key.
pub async fn materialize_versions(
    translator: &dyn Translator,
    feedback: QualitativeFeedback,
    language: &str,
    canonical: &str,
    domain_context: Option<&DomainContext>,
) -> BTreeMap<String, QualitativeFeedback> {
    if language == canonical || feedback.is_empty() {
        return BTreeMap::from([(language.to_string(), feedback)]);
    }

    let mut texts = vec![
        feedback.overall_assessment.clone(),
        feedback.career_alignment.clone(),
    ];
    texts.extend(feedback.strengths.iter().cloned());
    texts.extend(feedback.growth_areas.iter().cloned());
    texts.extend(feedback.next_steps.iter().cloned());

    let pairs = texts.iter().map(|text| {
        let translation = async move {
            if text.trim().is_empty() {
                Ok(String::new())
            } else {
                translator
                    .translate_feedback(text, canonical, domain_context)
                    .await
                    .map_err(|e| EngineError::external("field translation", &e))
            }
        };
        (translation, text.clone())
    });
    let mut translated = settle_or_default(pairs).await.into_iter();

    let mut take = |n: usize| -> Vec<String> { translated.by_ref().take(n).collect() };
    let overall_assessment = take(1).pop().unwrap_or_default();
    let career_alignment = take(1).pop().unwrap_or_default();
    let canonical_version = QualitativeFeedback {
        overall_assessment,
        career_alignment,
        strengths: take(feedback.strengths.len()),
        growth_areas: take(feedback.growth_areas.len()),
        next_steps: take(feedback.next_steps.len()),
    };

    BTreeMap::from([
        (canonical.to_string(), canonical_version),
        (language.to_string(), feedback),
    ])
}
