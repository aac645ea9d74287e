use rust_decimal::Decimal;
use tradeloop_models::agent_state::TradingPlan;
use tradeloop_models::market::MarketSnapshot;

/// System prompt for the advisor role: price-action read of the chart, one plan out.
pub fn advisor_system_prompt() -> String {
    let example = serde_json::json!({
        "market_cycle": "bull_trend | bear_trend | trading_range",
        "analysis": "<brief price-action reasoning>",
        "signal": "buy | sell | hold",
        "confidence": 0.0,
        "stop_loss_level": 0.0,
        "take_profit_level": 0.0
    });

    format!(
        "You are a discretionary crypto trader who reads raw price action the way Al Brooks \
         teaches it: candles and the 20-period EMA, nothing else.\n\n\
         ## FRAMEWORK\n\n\
         1. Market cycle. Trend (bars moving one direction, gaps between bars) or trading \
         range (overlapping bars, price crossing the EMA back and forth)?\n\
         2. Signal bars. A bull signal bar has a strong body closing near its high with a \
         bottom tail; a bear signal bar closes near its low with a top tail.\n\
         3. EMA 20. Price above a rising EMA is bullish, below a falling EMA is bearish.\n\n\
         ## INSTRUCTIONS\n\n\
         - Describe the structure (HH/HL or LH/LL) and the nearest support and resistance.\n\
         - Judge whether the latest bars are strong enough to enter on.\n\
         - If the chart and the numbers disagree, trust price action and lower confidence.\n\
         - If nothing is clear, answer hold.\n\
         - For buy: stop_loss_level below the current price, take_profit_level above it.\n\
         - For sell: stop_loss_level above the current price, take_profit_level below it.\n\n\
         Respond with ONLY a JSON object of this shape:\n{}",
        serde_json::to_string_pretty(&example).unwrap_or_default()
    )
}

/// User prompt for the advisor: the numeric snapshot plus the chart location.
pub fn advisor_user_prompt(snapshot: &MarketSnapshot) -> String {
    let mut prompt = format!(
        "Current Price: {}\nVolume: {}\nSymbol: {}\nTimeframe: {}\nAs of: {}",
        snapshot.current_price,
        snapshot.volume_24h,
        snapshot.symbol,
        snapshot.timeframe,
        snapshot.timestamp.to_rfc3339(),
    );
    if let Some(chart) = &snapshot.chart_reference {
        prompt.push_str(&format!("\nChart image: {chart}"));
    }
    prompt
}

/// System prompt for the reviewer role. The reviewer never sizes or edits a plan;
/// it only approves or rejects.
pub fn reviewer_system_prompt() -> String {
    let example = serde_json::json!({
        "approved": true,
        "reasoning": "<why the plan is or is not acceptable>"
    });

    format!(
        "You are the risk manager of a single-asset trading desk. A trader has proposed a \
         plan. Decide whether capital may be committed to it.\n\n\
         ## REJECT WHEN\n\n\
         - The stop is on the wrong side of the current price for the action.\n\
         - The target is on the wrong side of the current price for the action.\n\
         - Reward (distance to target) is clearly smaller than risk (distance to stop).\n\
         - The stop is so tight that normal bar noise would trigger it.\n\
         - The reasoning does not support the action.\n\n\
         When in doubt, reject. Respond with ONLY a JSON object of this shape:\n{}\n\n\
         `approved` MUST be a JSON boolean.",
        serde_json::to_string_pretty(&example).unwrap_or_default()
    )
}

pub fn reviewer_user_prompt(plan: &TradingPlan, current_price: Decimal) -> String {
    format!(
        "Action: {}\nTarget Price: {}\nStop Loss: {}\nCurrent Price: {}\nReasoning: {}",
        plan.action, plan.target_price, plan.stop_loss, current_price, plan.reasoning,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use tradeloop_models::agent_state::{MarketCycle, PlanStatus, TradeAction};

    fn snapshot(chart: Option<&str>) -> MarketSnapshot {
        MarketSnapshot {
            symbol: "BTC/USDT".to_string(),
            timeframe: "1h".to_string(),
            current_price: dec!(36500),
            volume_24h: dec!(2000),
            chart_reference: chart.map(str::to_string),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn advisor_prompt_documents_output_fields() {
        let prompt = advisor_system_prompt();
        for field in ["market_cycle", "signal", "confidence", "stop_loss_level", "take_profit_level"] {
            assert!(prompt.contains(field), "missing {field}");
        }
    }

    #[test]
    fn advisor_user_prompt_carries_snapshot() {
        let prompt = advisor_user_prompt(&snapshot(Some("/data/BTC_USDT_1h.png")));
        assert!(prompt.contains("Current Price: 36500"));
        assert!(prompt.contains("Symbol: BTC/USDT"));
        assert!(prompt.contains("Timeframe: 1h"));
        assert!(prompt.contains("Chart image: /data/BTC_USDT_1h.png"));

        assert!(!advisor_user_prompt(&snapshot(None)).contains("Chart image"));
    }

    #[test]
    fn reviewer_user_prompt_carries_plan() {
        let plan = TradingPlan {
            market_cycle: MarketCycle::BullTrend,
            action: TradeAction::Buy,
            target_price: dec!(36800),
            stop_loss: dec!(36200),
            status: PlanStatus::Pending,
            reasoning: "Bull breakout".to_string(),
        };

        let prompt = reviewer_user_prompt(&plan, dec!(36500));
        assert!(prompt.contains("Action: BUY"));
        assert!(prompt.contains("Target Price: 36800"));
        assert!(prompt.contains("Stop Loss: 36200"));
        assert!(prompt.contains("Current Price: 36500"));
        assert!(prompt.contains("Reasoning: Bull breakout"));
    }

    #[test]
    fn reviewer_prompt_demands_boolean() {
        assert!(reviewer_system_prompt().contains("`approved` MUST be a JSON boolean"));
    }
}
