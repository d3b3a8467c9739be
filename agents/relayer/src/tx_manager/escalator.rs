use bridge_core::U256;

/// Percent added to the gas price per attempt
pub const GAS_PRICE_BUMP_PERCENT: u64 = 15;

/// Gas price of attempt `attempt` (1-based).
///
/// Starts from the larger of the node's current suggestion and the price of
/// the previous attempt, then adds `15% * attempt` on top. The result never
/// drops below the previous attempt's price.
pub fn escalate_gas_price(suggested: U256, previous: Option<U256>, attempt: u32) -> U256 {
    let base = previous.map_or(suggested, |previous| previous.max(suggested));
    let percent = U256::from(100u64)
        .saturating_add(U256::from(GAS_PRICE_BUMP_PERCENT).saturating_mul(attempt.into()));
    base.saturating_mul(percent) / U256::from(100u64)
}
