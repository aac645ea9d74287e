//! Turns free-form model output into typed decisions.
//!
//! Model text is untrusted: it may be bare JSON, JSON inside a markdown fence,
//! or JSON buried in prose. Everything here returns `AgentError::Parse` rather
//! than panicking, and the workflow decides how to recover.

use rust_decimal::Decimal;
use serde::Deserialize;
use tradeloop_models::agent_state::{MarketCycle, PlanStatus, TradeAction, TradingPlan};
use tradeloop_models::decision::ReviewVerdict;

use crate::error::AgentError;

/// Pull the decision object out of model text.
///
/// Candidates are tried in order: the whole reply, the first code fence, then
/// the first balanced `{ ... }`. The first that parses as JSON wins.
pub fn extract_json(text: &str) -> Result<String, AgentError> {
    let reply = text.trim();
    let candidates = [
        reply.starts_with('{').then(|| reply.to_string()),
        fenced_block(reply),
        balanced_object(reply),
    ];

    candidates
        .into_iter()
        .flatten()
        .find(|candidate| serde_json::from_str::<serde_json::Value>(candidate).is_ok())
        .ok_or_else(|| {
            AgentError::Parse(format!(
                "No valid JSON object found in response (length={})",
                text.len()
            ))
        })
}

/// Body of the first code fence, with or without a `json` tag.
fn fenced_block(reply: &str) -> Option<String> {
    let open = reply.find("```")?;
    let after_ticks = &reply[open + 3..];
    // Skip the language tag line, if any.
    let body_start = after_ticks.find('\n')? + 1;
    let tag = after_ticks[..body_start].trim();
    if !tag.is_empty() && !tag.eq_ignore_ascii_case("json") {
        return None;
    }
    let body = &after_ticks[body_start..];
    let close = body.find("```")?;
    Some(body[..close].trim().to_string())
}

/// First balanced `{ ... }`, skipping braces inside string literals and any
/// stray `}` before the first `{`.
fn balanced_object(reply: &str) -> Option<String> {
    let open = reply.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in reply[open..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(reply[open..=open + offset].to_string());
                }
            }
            _ => {}
        }
    }

    None
}

/// Advisor output as it may arrive: either the plan's own field names or the
/// `signal`/`analysis`/`*_level` names the advisor prompt asks for.
#[derive(Debug, Deserialize)]
struct RawAdvisorPlan {
    market_cycle: String,
    #[serde(alias = "signal")]
    action: String,
    #[serde(default, alias = "take_profit_level")]
    target_price: Option<Decimal>,
    #[serde(default, alias = "stop_loss_level")]
    stop_loss: Option<Decimal>,
    #[serde(default, alias = "analysis")]
    reasoning: Option<String>,
    #[serde(default)]
    confidence: Option<Decimal>,
}

/// A parsed advisor proposal before any gating.
#[derive(Debug, Clone, PartialEq)]
pub struct AdvisorPlan {
    pub plan: TradingPlan,
    pub confidence: Option<Decimal>,
}

/// Parse advisor text into a PENDING plan.
///
/// Exit levels are required for BUY/SELL and default to zero for HOLD.
pub fn parse_advisor_plan(raw: &str) -> Result<AdvisorPlan, AgentError> {
    let json_str = extract_json(raw)?;
    let parsed: RawAdvisorPlan = serde_json::from_str(&json_str)
        .map_err(|e| AgentError::Parse(format!("Failed to parse trading plan: {e}")))?;

    let action: TradeAction = parsed.action.parse().map_err(AgentError::Parse)?;
    let market_cycle: MarketCycle = parsed.market_cycle.parse().map_err(AgentError::Parse)?;

    let (target_price, stop_loss) = match action {
        TradeAction::Hold => (
            parsed.target_price.unwrap_or(Decimal::ZERO),
            parsed.stop_loss.unwrap_or(Decimal::ZERO),
        ),
        TradeAction::Buy | TradeAction::Sell => (
            parsed
                .target_price
                .ok_or_else(|| AgentError::Parse(format!("{action} plan missing target_price")))?,
            parsed
                .stop_loss
                .ok_or_else(|| AgentError::Parse(format!("{action} plan missing stop_loss")))?,
        ),
    };

    Ok(AdvisorPlan {
        plan: TradingPlan {
            market_cycle,
            action,
            target_price,
            stop_loss,
            status: PlanStatus::Pending,
            reasoning: parsed.reasoning.unwrap_or_default(),
        },
        confidence: parsed.confidence,
    })
}

/// Parse the reviewer's `{approved, reasoning}` verdict. `approved` must be a boolean.
pub fn parse_review(raw: &str) -> Result<ReviewVerdict, AgentError> {
    let json_str = extract_json(raw)?;
    serde_json::from_str(&json_str)
        .map_err(|e| AgentError::Parse(format!("Failed to parse review verdict: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn extract_clean_json() {
        let input = r#"{"approved": true, "reasoning": "ok"}"#;
        assert_eq!(extract_json(input).unwrap(), input);
    }

    #[test]
    fn extract_from_markdown() {
        let input = "Here is my plan:\n```json\n{\"signal\": \"buy\"}\n```\nGood luck.";
        assert_eq!(extract_json(input).unwrap(), r#"{"signal": "buy"}"#);
    }

    #[test]
    fn extract_from_markdown_no_lang() {
        let input = "Verdict:\n```\n{\"approved\": false}\n```";
        assert_eq!(extract_json(input).unwrap(), r#"{"approved": false}"#);
    }

    #[test]
    fn extract_with_prefix_text() {
        let input = "After reviewing the plan I conclude:\n{\"approved\": true, \"reasoning\": \"sound\"}";
        assert!(extract_json(input).unwrap().contains("approved"));
    }

    #[test]
    fn extract_ignores_braces_in_strings() {
        let input = r#"Plan: {"analysis": "range {36000} to {37000}", "signal": "hold"} end"#;
        let parsed: serde_json::Value = serde_json::from_str(&extract_json(input).unwrap()).unwrap();
        assert_eq!(parsed["signal"], "hold");
    }

    #[test]
    fn stray_closing_brace_before_object() {
        let input = "} noise {\"approved\": true}";
        assert_eq!(extract_json(input).unwrap(), r#"{"approved": true}"#);
    }

    #[test]
    fn extract_no_json() {
        assert!(extract_json("I think you should buy.").is_err());
    }

    #[test]
    fn parse_plan_field_names() {
        let raw = r#"{
            "market_cycle": "bull_trend",
            "action": "BUY",
            "target_price": 36800.0,
            "stop_loss": 36200.0,
            "reasoning": "Strong bull signal bar above rising EMA 20"
        }"#;

        let parsed = parse_advisor_plan(raw).unwrap();
        assert_eq!(parsed.plan.action, TradeAction::Buy);
        assert_eq!(parsed.plan.market_cycle, MarketCycle::BullTrend);
        assert_eq!(parsed.plan.target_price, dec!(36800));
        assert_eq!(parsed.plan.stop_loss, dec!(36200));
        assert_eq!(parsed.plan.status, PlanStatus::Pending);
        assert!(parsed.confidence.is_none());
    }

    #[test]
    fn parse_signal_dialect() {
        let raw = r#"```json
{
  "market_cycle": "bull_trend",
  "analysis": "Higher highs and higher lows above EMA 20.",
  "signal": "buy",
  "confidence": 0.7,
  "stop_loss_level": 36200.0,
  "take_profit_level": 36800.0
}
```"#;

        let parsed = parse_advisor_plan(raw).unwrap();
        assert_eq!(parsed.plan.action, TradeAction::Buy);
        assert_eq!(parsed.plan.target_price, dec!(36800));
        assert_eq!(parsed.plan.stop_loss, dec!(36200));
        assert_eq!(
            parsed.plan.reasoning,
            "Higher highs and higher lows above EMA 20."
        );
        assert_eq!(parsed.confidence, Some(dec!(0.7)));
    }

    #[test]
    fn hold_without_levels_defaults_to_zero() {
        let raw = r#"{"market_cycle": "trading_range", "signal": "hold", "analysis": "Overlapping bars"}"#;
        let parsed = parse_advisor_plan(raw).unwrap();
        assert_eq!(parsed.plan.action, TradeAction::Hold);
        assert_eq!(parsed.plan.target_price, Decimal::ZERO);
        assert_eq!(parsed.plan.stop_loss, Decimal::ZERO);
    }

    #[test]
    fn status_from_model_is_ignored() {
        let raw = r#"{"market_cycle": "bull_trend", "action": "BUY", "target_price": 2, "stop_loss": 1, "status": "ACTIVE"}"#;
        assert_eq!(parse_advisor_plan(raw).unwrap().plan.status, PlanStatus::Pending);
    }

    #[test]
    fn buy_without_stop_is_rejected() {
        let raw = r#"{"market_cycle": "bull_trend", "action": "BUY", "target_price": 36800}"#;
        let err = parse_advisor_plan(raw).unwrap_err();
        assert!(err.to_string().contains("stop_loss"));
    }

    #[test]
    fn unknown_action_is_rejected() {
        let raw = r#"{"market_cycle": "bull_trend", "action": "SHORT", "target_price": 1, "stop_loss": 2}"#;
        assert!(matches!(parse_advisor_plan(raw), Err(AgentError::Parse(_))));
    }

    #[test]
    fn missing_market_cycle_is_rejected() {
        let raw = r#"{"action": "BUY", "target_price": 36800, "stop_loss": 36200}"#;
        assert!(parse_advisor_plan(raw).is_err());
    }

    #[test]
    fn parse_review_approved() {
        let verdict =
            parse_review("```json\n{\"approved\": true, \"reasoning\": \"R:R 1:1, acceptable\"}\n```")
                .unwrap();
        assert!(verdict.approved);
        assert_eq!(verdict.reasoning, "R:R 1:1, acceptable");
    }

    #[test]
    fn parse_review_requires_boolean() {
        assert!(parse_review(r#"{"approved": "true"}"#).is_err());
        assert!(parse_review(r#"{"decision": "approve"}"#).is_err());
        assert!(parse_review("Looks good to me, approve.").is_err());
    }
}
