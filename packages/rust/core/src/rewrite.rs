//! Research-driven rewrite of the post body.
//!
//! Short posts go to the model in one call. Long posts are split at headings and
//! each chunk is rewritten on its own with a trimmed copy of the digest; a chunk
//! whose call fails keeps its original text, and once the deadline passes the
//! remaining chunks are passed through untouched.

use tracing::{info, instrument, warn};

use postcheck_content::{split, strip_code_fences, truncate_with_marker};
use postcheck_providers::{CompletionRequest, LanguageModel};
use postcheck_shared::{Deadline, PipelineConfig, PostcheckError, Result};

use crate::pipeline::ProgressReporter;
use crate::research::ResearchDigest;

/// Precedes the text to rewrite; always the last part of the prompt.
pub(crate) const CONTENT_MARKER: &str = "Content to rewrite:\n";

const REWRITE_SYSTEM: &str = "\
You are a meticulous editor who fact-checks and rewrites blog posts.

Rules:
1. Apply every factual correction supported by the research findings to every place the \
affected product, plan, price or figure appears, not only the first mention.
2. Preserve all HTML structure verbatim: links and their href values, images, tables, \
embedded widgets, lists and attributes. Never drop or invent markup.
3. Replace every em dash with a hyphen surrounded by spaces.
4. Prefer contractions, use the active voice and keep sentences under 25 words.
5. Do not add claims the research does not support. Where the findings contradict the \
post, trust the findings.
6. Return the complete rewritten content and nothing else: no commentary, no preamble, \
no markdown code fences, no truncation.";

/// What to rewrite and with which findings.
#[derive(Debug, Clone, Copy)]
pub struct RewriteInput<'a> {
    pub content: &'a str,
    pub title: &'a str,
    pub digest: &'a ResearchDigest,
    pub writing_instructions: Option<&'a str>,
}

/// Result of the rewrite stage.
#[derive(Debug, Clone)]
pub struct RewriteOutcome {
    pub content: String,
    /// Model calls attempted, including failed chunk attempts.
    pub llm_calls: usize,
    /// Whether the chunked path was taken.
    pub chunked: bool,
    pub sections_total: usize,
    /// Sections replaced with model output.
    pub sections_updated: usize,
    /// Sections that kept their original text after a failed call.
    pub sections_kept: usize,
    /// Sections passed through because the deadline had passed.
    pub sections_skipped: usize,
}

/// Rewrite `input.content` using the research digest.
///
/// The single-pass path fails if its one call fails; the chunked path never fails.
#[instrument(
    skip_all,
    fields(content_len = input.content.len(), digest_len = input.digest.len())
)]
pub async fn rewrite(
    llm: &dyn LanguageModel,
    llm_key: &str,
    input: &RewriteInput<'_>,
    deadline: &Deadline,
    config: &PipelineConfig,
    progress: &dyn ProgressReporter,
) -> Result<RewriteOutcome> {
    let outcome = if input.content.len() <= config.rewrite_threshold {
        rewrite_single(llm, llm_key, input, deadline, config).await?
    } else {
        rewrite_chunked(llm, llm_key, input, deadline, config, progress).await
    };

    info!(
        llm_calls = outcome.llm_calls,
        chunked = outcome.chunked,
        sections_total = outcome.sections_total,
        sections_updated = outcome.sections_updated,
        sections_kept = outcome.sections_kept,
        sections_skipped = outcome.sections_skipped,
        "rewrite complete"
    );
    Ok(outcome)
}

async fn rewrite_single(
    llm: &dyn LanguageModel,
    llm_key: &str,
    input: &RewriteInput<'_>,
    deadline: &Deadline,
    config: &PipelineConfig,
) -> Result<RewriteOutcome> {
    let mut outcome = RewriteOutcome {
        content: input.content.to_string(),
        llm_calls: 0,
        chunked: false,
        sections_total: 1,
        sections_updated: 0,
        sections_kept: 0,
        sections_skipped: 0,
    };

    if deadline.is_expired() {
        warn!("time budget exhausted before rewrite, returning original content");
        outcome.sections_skipped = 1;
        return Ok(outcome);
    }

    let prompt = format!(
        "Title: {title}\n\nResearch findings:\n{digest}\n\n{CONTENT_MARKER}{content}",
        title = input.title.trim(),
        digest = input.digest.as_str(),
        content = input.content,
    );
    let request = CompletionRequest {
        system: Some(system_prompt(input.writing_instructions)),
        prompt,
        max_tokens: config.rewrite_max_tokens,
    };

    outcome.llm_calls = 1;
    let raw = match complete_before(llm, llm_key, &request, deadline).await {
        Err(PostcheckError::Timeout { .. }) => {
            warn!("time budget ran out during rewrite, returning original content");
            outcome.sections_skipped = 1;
            return Ok(outcome);
        }
        other => other?,
    };
    let text = strip_code_fences(&raw);
    if text.is_empty() {
        return Err(PostcheckError::parse("model returned an empty rewrite"));
    }

    outcome.content = text;
    outcome.sections_updated = 1;
    Ok(outcome)
}

async fn rewrite_chunked(
    llm: &dyn LanguageModel,
    llm_key: &str,
    input: &RewriteInput<'_>,
    deadline: &Deadline,
    config: &PipelineConfig,
    progress: &dyn ProgressReporter,
) -> RewriteOutcome {
    let chunks = split(input.content, config.rewrite_threshold);
    let total = chunks.len();
    let system = system_prompt(input.writing_instructions);
    let digest = truncate_with_marker(input.digest.as_str(), config.digest_limit);

    let mut outcome = RewriteOutcome {
        content: String::with_capacity(input.content.len()),
        llm_calls: 0,
        chunked: true,
        sections_total: total,
        sections_updated: 0,
        sections_kept: 0,
        sections_skipped: 0,
    };

    info!(
        chunks = total,
        max_chunk = config.rewrite_threshold,
        "rewriting in chunks"
    );

    for (i, chunk) in chunks.iter().enumerate() {
        if i > 0 && !config.chunk_delay.is_zero() {
            tokio::time::sleep(config.chunk_delay).await;
        }
        if deadline.is_expired() {
            warn!(
                remaining = total - i,
                "time budget exhausted, passing remaining sections through"
            );
            for rest in &chunks[i..] {
                outcome.content.push_str(rest.text);
            }
            outcome.sections_skipped = total - i;
            break;
        }

        let request = CompletionRequest {
            system: Some(system.clone()),
            prompt: format!(
                "This is section {n} of {total} of the post \"{title}\". Rewrite only this \
                 section and return all of it.\n\n\
                 Research findings (excerpt):\n{digest}\n\n{CONTENT_MARKER}{text}",
                n = i + 1,
                title = input.title.trim(),
                text = chunk.text,
            ),
            max_tokens: config.rewrite_max_tokens,
        };

        outcome.llm_calls += 1;
        match complete_before(llm, llm_key, &request, deadline).await {
            Ok(raw) => {
                let text = strip_code_fences(&raw);
                if text.is_empty() {
                    warn!(section = i + 1, "empty rewrite, keeping original section");
                    outcome.content.push_str(chunk.text);
                    outcome.sections_kept += 1;
                } else {
                    outcome.content.push_str(&text);
                    // keep the separator the model trimmed away
                    if chunk.text.ends_with('\n') {
                        outcome.content.push('\n');
                    }
                    outcome.sections_updated += 1;
                }
            }
            Err(e) => {
                warn!(section = i + 1, error = %e, "section rewrite failed, keeping original");
                outcome.content.push_str(chunk.text);
                outcome.sections_kept += 1;
            }
        }
        progress.chunk_rewritten(i + 1, total);
    }

    outcome
}

/// Run one completion, giving up with `Timeout` when the deadline passes.
async fn complete_before(
    llm: &dyn LanguageModel,
    llm_key: &str,
    request: &CompletionRequest,
    deadline: &Deadline,
) -> Result<String> {
    tokio::time::timeout(deadline.remaining(), llm.complete(llm_key, request))
        .await
        .map_err(|_| PostcheckError::Timeout { stage: "rewrite" })?
}

fn system_prompt(writing_instructions: Option<&str>) -> String {
    match writing_instructions {
        Some(extra) => {
            format!("{REWRITE_SYSTEM}\n\nAdditional instructions from the editor:\n{extra}")
        }
        None => REWRITE_SYSTEM.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::*;
    use crate::pipeline::SilentProgress;
    use crate::research::SearchFinding;
    use crate::testing::{self, FakeModel};

    fn digest() -> ResearchDigest {
        let mut digest = ResearchDigest::default();
        digest.push(&SearchFinding {
            query: "webflow pricing".into(),
            hits: testing::hits_for("webflow pricing", 3),
        });
        digest
    }

    fn input<'a>(content: &'a str, digest: &'a ResearchDigest) -> RewriteInput<'a> {
        RewriteInput {
            content,
            title: "",
            digest,
            writing_instructions: None,
        }
    }

    fn open_deadline() -> Deadline {
        Deadline::after(Duration::from_secs(60))
    }

    /// Three ~320-byte sections; chunked into three with a 400-byte threshold.
    fn three_sections() -> (String, PipelineConfig) {
        let content = format!(
            "<h2>One</h2><p>{}</p>\n<h2>Two</h2><p>{}</p>\n<h2>Three</h2><p>{}</p>\n",
            "a".repeat(300),
            "b".repeat(300),
            "c".repeat(300)
        );
        let config = PipelineConfig {
            rewrite_threshold: 400,
            ..testing::config()
        };
        (content, config)
    }

    fn chunk_texts(content: &str, config: &PipelineConfig) -> Vec<String> {
        split(content, config.rewrite_threshold)
            .iter()
            .map(|c| c.text.to_string())
            .collect()
    }

    #[tokio::test]
    async fn short_content_uses_one_call_and_strips_fences() {
        let llm = FakeModel::cooperative(&[]);
        let digest = digest();
        let input = RewriteInput {
            content: "<p>Webflow starts at $12 \u{2014} cheap.</p>",
            title: "Webflow",
            digest: &digest,
            writing_instructions: Some("Use US spelling"),
        };
        let config = testing::config();

        let outcome = rewrite(&llm, "k", &input, &open_deadline(), &config, &SilentProgress)
            .await
            .unwrap();

        assert_eq!(outcome.llm_calls, 1);
        assert_eq!(llm.calls(), 1);
        assert!(!outcome.chunked);
        assert!(!outcome.content.contains("```"));
        assert_eq!(outcome.content, testing::tag_rewrite(input.content));

        let sent = &llm.requests()[0];
        assert!(sent.system.as_deref().unwrap().contains("Use US spelling"));
        assert!(sent.prompt.contains("### Search: webflow pricing"));
    }

    #[tokio::test]
    async fn content_at_threshold_stays_single_pass() {
        let llm = FakeModel::cooperative(&[]);
        let digest = digest();
        let config = PipelineConfig {
            rewrite_threshold: 100,
            ..testing::config()
        };
        let content = format!("<h2>A</h2>{}", "x".repeat(90));
        assert_eq!(content.len(), 100);

        let outcome = rewrite(
            &llm,
            "k",
            &input(&content, &digest),
            &open_deadline(),
            &config,
            &SilentProgress,
        )
        .await
        .unwrap();
        assert_eq!(outcome.llm_calls, 1);
        assert!(!outcome.chunked);
    }

    #[tokio::test]
    async fn single_pass_failure_is_fatal() {
        let digest = digest();
        let input = input("<p>x</p>", &digest);
        let config = testing::config();

        let llm = FakeModel::failing();
        let result = rewrite(&llm, "k", &input, &open_deadline(), &config, &SilentProgress).await;
        assert!(result.is_err());

        let empty = FakeModel::new(|_| Ok("```html\n```".into()));
        let result = rewrite(&empty, "k", &input, &open_deadline(), &config, &SilentProgress).await;
        assert!(matches!(result, Err(PostcheckError::Parse { .. })));
    }

    #[tokio::test]
    async fn single_pass_after_deadline_returns_original() {
        let llm = FakeModel::cooperative(&[]);
        let digest = digest();
        let expired = Deadline::after(Duration::ZERO);

        let outcome = rewrite(
            &llm,
            "k",
            &input("<p>x</p>", &digest),
            &expired,
            &testing::config(),
            &SilentProgress,
        )
        .await
        .unwrap();

        assert_eq!(outcome.content, "<p>x</p>");
        assert_eq!(outcome.llm_calls, 0);
        assert_eq!(outcome.sections_skipped, 1);
        assert_eq!(llm.calls(), 0);
    }

    #[tokio::test]
    async fn slow_single_pass_is_cut_off_at_the_deadline() {
        let llm = FakeModel::cooperative(&[]).with_latency(Duration::from_secs(5));
        let digest = digest();
        let deadline = Deadline::after(Duration::from_millis(100));
        let started = Instant::now();

        let outcome = rewrite(
            &llm,
            "k",
            &input("<p>x</p>", &digest),
            &deadline,
            &testing::config(),
            &SilentProgress,
        )
        .await
        .unwrap();

        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(outcome.content, "<p>x</p>");
        assert_eq!(outcome.llm_calls, 1);
        assert_eq!(outcome.sections_updated, 0);
        assert_eq!(outcome.sections_skipped, 1);
    }

    #[tokio::test]
    async fn long_content_makes_one_call_per_chunk_at_the_threshold() {
        let llm = FakeModel::cooperative(&[]);
        let digest = digest();
        let config = testing::config();
        let content = testing::long_post(30_000, 1_500);
        let expected_chunks = split(&content, config.rewrite_threshold).len();
        assert_eq!(expected_chunks, 2);

        let input = RewriteInput {
            title: "Long",
            ..input(&content, &digest)
        };
        let outcome = rewrite(&llm, "k", &input, &open_deadline(), &config, &SilentProgress)
            .await
            .unwrap();

        assert!(outcome.chunked);
        assert_eq!(outcome.llm_calls, expected_chunks);
        assert_eq!(llm.calls(), expected_chunks);
        assert_eq!(outcome.sections_updated, expected_chunks);
        let first = &llm.requests()[0].prompt;
        assert!(first.contains(&format!("section 1 of {expected_chunks}")));
    }

    #[tokio::test]
    async fn chunk_prompts_carry_truncated_digest() {
        let llm = FakeModel::cooperative(&[]);
        let mut digest = ResearchDigest::default();
        for i in 0..200 {
            digest.push(&SearchFinding {
                query: format!("query {i}"),
                hits: testing::hits_for("q", 3),
            });
        }
        let config = PipelineConfig {
            digest_limit: 500,
            ..testing::config()
        };
        let content = testing::long_post(25_000, 1_200);

        rewrite(
            &llm,
            "k",
            &input(&content, &digest),
            &open_deadline(),
            &config,
            &SilentProgress,
        )
        .await
        .unwrap();

        let prompt = &llm.requests()[0].prompt;
        assert!(prompt.contains("truncated"));
        assert!(!prompt.contains("query 199"));
    }

    #[tokio::test]
    async fn failed_chunk_keeps_original_text_in_place() {
        let (content, config) = three_sections();
        let chunks = chunk_texts(&content, &config);
        assert_eq!(chunks.len(), 3);

        let llm = FakeModel::new(|req| {
            let target = testing::rewrite_target(req);
            if target.contains("<h2>Two</h2>") {
                Err(PostcheckError::Network("reset".into()))
            } else {
                Ok(testing::tag_rewrite(target))
            }
        });
        let digest = digest();
        let outcome = rewrite(
            &llm,
            "k",
            &input(&content, &digest),
            &open_deadline(),
            &config,
            &SilentProgress,
        )
        .await
        .unwrap();

        let expected = format!(
            "{}\n{}{}\n",
            testing::tag_rewrite(&chunks[0]),
            chunks[1],
            testing::tag_rewrite(&chunks[2])
        );
        assert_eq!(outcome.content, expected);
        assert_eq!(outcome.llm_calls, 3);
        assert_eq!(outcome.sections_updated, 2);
        assert_eq!(outcome.sections_kept, 1);
    }

    #[tokio::test]
    async fn expired_deadline_passes_all_chunks_through() {
        let llm = FakeModel::cooperative(&[]);
        let digest = digest();
        let content = testing::long_post(25_000, 1_200);

        let outcome = rewrite(
            &llm,
            "k",
            &input(&content, &digest),
            &Deadline::after(Duration::ZERO),
            &testing::config(),
            &SilentProgress,
        )
        .await
        .unwrap();

        assert_eq!(outcome.content, content);
        assert_eq!(outcome.llm_calls, 0);
        assert_eq!(outcome.sections_skipped, outcome.sections_total);
    }

    #[tokio::test]
    async fn deadline_mid_loop_passes_later_chunks_through_verbatim() {
        let (content, config) = three_sections();
        let chunks = chunk_texts(&content, &config);
        let llm = FakeModel::cooperative(&[]).with_latency(Duration::from_millis(200));
        let digest = digest();
        // first call finishes at ~200ms, the second is cut off at 300ms
        let deadline = Deadline::after(Duration::from_millis(300));

        let outcome = rewrite(
            &llm,
            "k",
            &input(&content, &digest),
            &deadline,
            &config,
            &SilentProgress,
        )
        .await
        .unwrap();

        let rewritten_first = format!("{}\n", testing::tag_rewrite(&chunks[0]));
        assert!(outcome.content.starts_with(&rewritten_first));
        assert_eq!(
            &outcome.content[rewritten_first.len()..],
            format!("{}{}", chunks[1], chunks[2])
        );
        assert_eq!(outcome.sections_updated, 1);
        assert!(outcome.sections_skipped > 0);
        assert_eq!(outcome.sections_kept + outcome.sections_skipped, 2);
    }

    #[tokio::test]
    async fn deadline_is_checked_after_the_pause_between_chunks() {
        let (content, config) = three_sections();
        let config = PipelineConfig {
            chunk_delay: Duration::from_millis(200),
            ..config
        };
        let chunks = chunk_texts(&content, &config);
        let llm = FakeModel::cooperative(&[]);
        let digest = digest();
        let deadline = Deadline::after(Duration::from_millis(100));

        let outcome = rewrite(
            &llm,
            "k",
            &input(&content, &digest),
            &deadline,
            &config,
            &SilentProgress,
        )
        .await
        .unwrap();

        assert_eq!(outcome.llm_calls, 1);
        assert_eq!(llm.calls(), 1);
        assert_eq!(outcome.sections_skipped, 2);
        assert!(outcome.content.ends_with(&format!("{}{}", chunks[1], chunks[2])));
    }
}
