use tracing::debug;

use crate::browser::PageDriver;
use crate::clock::Clock;
use crate::config::{Selectors, Timing};
use crate::error::Result;
use crate::odds::extractor::extract_totals;
use crate::types::TotalsOutcome;

/// Load the match page, open the totals view and read the quarter-totals block.
///
/// Page errors propagate; turning them into a failure row is the caller's call.
pub async fn capture_totals<P: PageDriver + ?Sized>(
    page: &mut P,
    url: &str,
    selectors: &Selectors,
    timing: &Timing,
    clock: &dyn Clock,
) -> Result<TotalsOutcome> {
    page.goto(url).await?;
    page.wait_for(&selectors.totals_tab, timing.totals_timeout).await?;
    page.click(&selectors.totals_tab, 0).await?;
    clock.sleep(timing.totals_settle).await;

    let blocks = page.texts(&selectors.odds_block).await?;
    debug!(url, blocks = blocks.len(), "Scanning page blocks for totals");
    Ok(extract_totals(&blocks))
}
