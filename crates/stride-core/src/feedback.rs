//! Task-level feedback: learning journeys, generated feedback, localized caches.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::error::EngineError;
use crate::evaluator::{count_passed_attempts, extract_skills_improved, find_best_xp_earned};
use crate::language::{language_name, normalize_language};
use crate::model::{DomainContext, Interaction, InteractionKind, Program, Task};
use crate::traits::{FeedbackGenerator, TaskPatch, TaskStore, Translator};

/// One attempt: a learner submission and the response it received.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptRecord {
    /// 1-based attempt number.
    pub attempt: u32,
    pub answer: String,
    pub passed: bool,
    pub feedback: String,
    pub strengths: Vec<String>,
    pub improvements: Vec<String>,
    #[serde(rename = "xpEarned")]
    pub xp_earned: u32,
}

/// Pair each user input with the AI response that follows it.
///
/// Responses without a preceding input are not attempts; an input that is
/// followed by another input before any response is superseded.
pub fn build_learning_journey(interactions: &[Interaction]) -> Vec<AttemptRecord> {
    let mut journey = Vec::new();
    let mut pending: Option<&str> = None;

    for interaction in interactions {
        match &interaction.kind {
            InteractionKind::UserInput(answer) => pending = Some(answer.as_str()),
            InteractionKind::AiResponse(response) => {
                let Some(answer) = pending.take() else {
                    continue;
                };
                journey.push(AttemptRecord {
                    attempt: journey.len() as u32 + 1,
                    answer: answer.to_string(),
                    passed: response.completed,
                    feedback: response.feedback.clone(),
                    strengths: response.strengths.clone(),
                    improvements: response.improvements.clone(),
                    xp_earned: response.xp_earned,
                });
            }
        }
    }

    journey
}

/// Feedback produced for a completed task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComprehensiveFeedback {
    pub feedback: String,
    #[serde(rename = "bestXP")]
    pub best_xp: u32,
    pub passed_attempts: u32,
}

/// Localized strings for the deterministic parts of task feedback.
struct Labels {
    fallback: &'static str,
    stats_heading: &'static str,
    attempts: &'static str,
    passes: &'static str,
    best_score: &'static str,
    skills_heading: &'static str,
}

fn labels(language: &str) -> &'static Labels {
    const EN: Labels = Labels {
        fallback: "Great work completing this task! You stayed with it, learned from each attempt, and reached the goal. Keep building on this momentum in the next challenge.",
        stats_heading: "Learning statistics",
        attempts: "Total attempts",
        passes: "Passed attempts",
        best_score: "Best score",
        skills_heading: "Skills practiced",
    };
    const ZH_TW: Labels = Labels {
        fallback: "恭喜你完成這個任務！你持續嘗試、從每次練習中學習，最終達成目標。帶著這份動力迎接下一個挑戰吧。",
        stats_heading: "學習統計",
        attempts: "總嘗試次數",
        passes: "通過次數",
        best_score: "最佳分數",
        skills_heading: "練習的技能",
    };
    const ZH_CN: Labels = Labels {
        fallback: "恭喜你完成这个任务！你坚持尝试、从每次练习中学习，最终达成目标。带着这份动力迎接下一个挑战吧。",
        stats_heading: "学习统计",
        attempts: "总尝试次数",
        passes: "通过次数",
        best_score: "最佳分数",
        skills_heading: "练习的技能",
    };
    const JA: Labels = Labels {
        fallback: "タスク完了おめでとうございます！試行を重ねながら学び、目標に到達しました。この勢いで次の課題にも挑戦しましょう。",
        stats_heading: "学習の記録",
        attempts: "試行回数",
        passes: "合格回数",
        best_score: "最高スコア",
        skills_heading: "練習したスキル",
    };
    const KO: Labels = Labels {
        fallback: "과제를 완료한 것을 축하합니다! 매 시도에서 배우며 목표에 도달했습니다. 이 기세로 다음 도전도 이어가세요.",
        stats_heading: "학습 통계",
        attempts: "총 시도 횟수",
        passes: "통과 횟수",
        best_score: "최고 점수",
        skills_heading: "연습한 기술",
    };
    const ES: Labels = Labels {
        fallback: "¡Excelente trabajo al completar esta tarea! Perseveraste, aprendiste de cada intento y alcanzaste la meta. Sigue aprovechando este impulso en el próximo desafío.",
        stats_heading: "Estadísticas de aprendizaje",
        attempts: "Intentos totales",
        passes: "Intentos aprobados",
        best_score: "Mejor puntuación",
        skills_heading: "Habilidades practicadas",
    };
    const FR: Labels = Labels {
        fallback: "Bravo pour avoir terminé cette tâche ! Tu as persévéré, appris de chaque tentative et atteint l'objectif. Garde cet élan pour le prochain défi.",
        stats_heading: "Statistiques d'apprentissage",
        attempts: "Tentatives",
        passes: "Tentatives réussies",
        best_score: "Meilleur score",
        skills_heading: "Compétences travaillées",
    };
    const DE: Labels = Labels {
        fallback: "Großartig, dass du diese Aufgabe abgeschlossen hast! Du bist drangeblieben, hast aus jedem Versuch gelernt und das Ziel erreicht. Nutze diesen Schwung für die nächste Herausforderung.",
        stats_heading: "Lernstatistik",
        attempts: "Versuche insgesamt",
        passes: "Bestandene Versuche",
        best_score: "Beste Punktzahl",
        skills_heading: "Geübte Fähigkeiten",
    };

    match language {
        "zhTW" => &ZH_TW,
        "zhCN" => &ZH_CN,
        "ja" => &JA,
        "ko" => &KO,
        "es" => &ES,
        "fr" => &FR,
        "de" => &DE,
        _ => &EN,
    }
}

/// Canned encouraging text used when the generator is unavailable.
pub fn fallback_message(language: &str) -> &'static str {
    labels(language).fallback
}

/// Builds task feedback through the external generator and keeps its
/// per-language versions.
pub struct FeedbackAggregator {
    generator: Arc<dyn FeedbackGenerator>,
    translator: Arc<dyn Translator>,
    tasks: Arc<dyn TaskStore>,
    canonical_language: String,
}

impl FeedbackAggregator {
    pub fn new(
        generator: Arc<dyn FeedbackGenerator>,
        translator: Arc<dyn Translator>,
        tasks: Arc<dyn TaskStore>,
        canonical_language: impl Into<String>,
    ) -> Self {
        Self {
            generator,
            translator,
            tasks,
            canonical_language: canonical_language.into(),
        }
    }

    /// Generate feedback for a task from its whole learning journey.
    ///
    /// Issues exactly one generator call. Generator errors are returned so
    /// the caller can decide on a fallback.
    #[instrument(skip_all, fields(task_id = %task.id, generator = self.generator.name()))]
    pub async fn generate_comprehensive_feedback(
        &self,
        task: &Task,
        program: &Program,
        domain_context: Option<&DomainContext>,
        language: &str,
    ) -> anyhow::Result<ComprehensiveFeedback> {
        let language = normalize_language(language, &self.canonical_language);
        let journey = build_learning_journey(&task.interactions);
        let best_xp = find_best_xp_earned(&task.interactions);
        let passed_attempts = count_passed_attempts(&task.interactions);
        let skills = extract_skills_improved(&task.interactions);

        let prompt = build_task_prompt(task, program, &journey, domain_context, &language);
        let response = self.generator.send_message(&prompt).await?;

        let mut feedback = response.content.trim().to_string();
        anyhow::ensure!(!feedback.is_empty(), "generator returned empty feedback");

        let attempts = journey.len() as u32;
        if attempts > 1 {
            let l = labels(&language);
            feedback.push_str(&format!(
                "\n\n---\n**{}**\n- {}: {}\n- {}: {}\n- {}: {}/100",
                l.stats_heading, l.attempts, attempts, l.passes, passed_attempts, l.best_score, best_xp
            ));
            if !skills.is_empty() {
                feedback.push_str(&format!("\n\n**{}**: {}", l.skills_heading, skills.join(", ")));
            }
        }

        Ok(ComprehensiveFeedback {
            feedback,
            best_xp,
            passed_attempts,
        })
    }

    /// Feedback for a completed task in `language`, translating and caching
    /// the version on first request.
    ///
    /// A failed translation returns the best existing version uncached.
    #[instrument(skip(self, domain_context))]
    pub async fn localized_task_feedback(
        &self,
        task_id: &str,
        language: &str,
        domain_context: Option<&DomainContext>,
    ) -> Result<String, EngineError> {
        let task = self
            .tasks
            .find_by_id(task_id)
            .await?
            .ok_or_else(|| EngineError::not_found("task", task_id))?;
        let mut summary = task.metadata.evaluation.ok_or_else(|| {
            EngineError::Validation(format!("task {task_id} has not been evaluated"))
        })?;

        let language = normalize_language(language, &self.canonical_language);
        if let Some(cached) = summary.feedback_versions.get(&language) {
            return Ok(cached.clone());
        }

        let source = summary
            .feedback_versions
            .get(&self.canonical_language)
            .cloned()
            .unwrap_or_else(|| summary.feedback.clone());

        match self
            .translator
            .translate_feedback(&source, &language, domain_context)
            .await
        {
            Ok(translated) => {
                summary
                    .feedback_versions
                    .insert(language.clone(), translated.clone());
                self.tasks
                    .update(
                        task_id,
                        TaskPatch {
                            evaluation: Some(summary),
                            ..Default::default()
                        },
                    )
                    .await?;
                tracing::debug!("cached {language} feedback for task {task_id}");
                Ok(translated)
            }
            Err(e) => {
                let err = EngineError::external("feedback translation", &e);
                tracing::warn!(task_id, %language, "{err}; serving stored text");
                Ok(source)
            }
        }
    }
}

fn build_task_prompt(
    task: &Task,
    program: &Program,
    journey: &[AttemptRecord],
    domain_context: Option<&DomainContext>,
    language: &str,
) -> String {
    let mut prompt = format!(
        "You are a supportive learning coach reviewing a learner's work.\n\n\
         Task: {}\nScenario: {} ({} mode)\n",
        if task.title.is_empty() { &task.id } else { &task.title },
        program.scenario_id,
        program.mode,
    );

    if let Some(ctx) = domain_context.filter(|c| !c.is_empty()) {
        prompt.push_str("\nDomain context:\n");
        if !ctx.title.is_empty() {
            prompt.push_str(&format!("- Field: {}\n", ctx.title));
        }
        if !ctx.description.is_empty() {
            prompt.push_str(&format!("- Description: {}\n", ctx.description));
        }
        if !ctx.skill_focus.is_empty() {
            prompt.push_str(&format!("- Key skills: {}\n", ctx.skill_focus.join(", ")));
        }
    }

    prompt.push_str("\nLearning journey:\n");
    if journey.is_empty() {
        prompt.push_str("(no recorded attempts)\n");
    }
    for record in journey {
        prompt.push_str(&format!(
            "Attempt {} ({}, {} XP)\n  Answer: {}\n",
            record.attempt,
            if record.passed { "passed" } else { "not passed" },
            record.xp_earned,
            record.answer,
        ));
        if !record.feedback.is_empty() {
            prompt.push_str(&format!("  Feedback: {}\n", record.feedback));
        }
        if !record.strengths.is_empty() {
            prompt.push_str(&format!("  Strengths: {}\n", record.strengths.join("; ")));
        }
        if !record.improvements.is_empty() {
            prompt.push_str(&format!("  Improvements: {}\n", record.improvements.join("; ")));
        }
    }

    prompt.push_str(&format!(
        "\nWrite 150-250 words of encouraging, specific feedback. Acknowledge how the learner \
         progressed across attempts, name what they did well, and suggest one concrete next step. \
         Do not include scores or statistics.\nRespond in {}.",
        language_name(language)
    ));
    prompt
}
