//! Content-shape checks evaluated against a single message: caps ratio,
//! combining-mark (zalgo) density, and repeated text. Repeated text also
//! keeps a guild-wide window of recent message bodies, so identical spam
//! from several accounts still trips.

use super::{CheckContext, CheckOutcome};
use crate::counter::bucket_start;
use crate::repeat::{count_occurrences, most_frequent_repeated_substring};
use crate::rules::CheckRule;
use crate::store::StoreError;
use unicode_normalization::char::is_combining_mark;

pub(super) fn caps(ctx: &CheckContext<'_>, rule: &CheckRule) -> CheckOutcome {
    let percent = rule.percent(70);
    let content = &ctx.facts.content;
    if content.is_empty() {
        return CheckOutcome::Pass;
    }

    let total = content.chars().count();
    let upper = content.chars().filter(|c| c.is_uppercase()).count();
    let ratio = (100 * upper / total) as i64;
    // very short messages ("OK", "LOL") are exempt
    if ratio > percent && total > 3 {
        CheckOutcome::Fail {
            reason: format!("Excessive use of caps ({}%)", ratio),
        }
    } else {
        CheckOutcome::Pass
    }
}

/// Per-word ratio of combining marks, aggregated as the 75th percentile
/// across words. A couple of accented words in a normal sentence stay well
/// below threshold; text where most words are stacked with marks does not.
fn zalgo_score(s: &str) -> f64 {
    let scores: Vec<f64> = s
        .split_whitespace()
        .map(|word| {
            let len = word.chars().count();
            let marks = word.chars().filter(|c| is_combining_mark(*c)).count();
            marks as f64 / len as f64
        })
        .collect();
    if scores.is_empty() {
        return 0.0;
    }
    percentile(scores, 0.75)
}

/// Linear-interpolated percentile over the sample, `q` in 0..=1.
fn percentile(mut values: Vec<f64>, q: f64) -> f64 {
    values.sort_by(f64::total_cmp);
    let rank = (values.len() - 1) as f64 * q;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        values[lo]
    } else {
        values[lo] + (rank - lo as f64) * (values[hi] - values[lo])
    }
}

pub(super) fn zalgo(ctx: &CheckContext<'_>, rule: &CheckRule) -> CheckOutcome {
    let percent = rule.percent(70);
    let score = zalgo_score(&ctx.facts.content);
    if score * 100.0 > percent as f64 {
        CheckOutcome::Fail {
            reason: format!("Zalgo text detected ({:.0}%)", score * 100.0),
        }
    } else {
        CheckOutcome::Pass
    }
}

fn preview(s: &str) -> String {
    let head: String = s.chars().take(8).collect();
    if s.chars().count() >= 8 {
        format!("{}...", head)
    } else {
        head
    }
}

pub(super) async fn repeated_text(
    ctx: &CheckContext<'_>,
    rule: &CheckRule,
) -> Result<CheckOutcome, StoreError> {
    let amount = rule.amount(3);
    let per = rule.per(30);

    let stripped = ctx.facts.stripped.as_str();
    if stripped.is_empty() {
        return Ok(CheckOutcome::Pass);
    }

    // cross-message: identical bodies anywhere in the guild share one
    // hash field within the aligned window
    let key = format!(
        "automod:check_repeated_text:{}:{}",
        ctx.facts.guild_id,
        bucket_start(ctx.now, per)
    );
    let seen = if ctx.read_only {
        let stored = ctx
            .store
            .hget(&key, stripped)
            .await?
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(0);
        stored + 1
    } else {
        let seen = ctx.store.hincr_by(&key, stripped, 1).await?;
        ctx.store.expire(&key, per + 1).await?;
        seen
    };
    if seen > amount {
        return Ok(CheckOutcome::Fail {
            reason: format!("Repeated text [{}] ({}/{}s)", preview(stripped), seen, per),
        });
    }

    // single message: dominant repeating substring, compared lowercased
    let lowered = stripped.to_lowercase();
    let repeated = most_frequent_repeated_substring(&lowered);
    if repeated.trim().chars().count() <= 1 {
        return Ok(CheckOutcome::Pass);
    }
    let occurrences = count_occurrences(&lowered, repeated) as i64;
    if occurrences > amount {
        return Ok(CheckOutcome::Fail {
            reason: format!(
                "Repeated text [{}] ({}/{}s)",
                preview(stripped),
                occurrences,
                per
            ),
        });
    }
    Ok(CheckOutcome::Pass)
}
