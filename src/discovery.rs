use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::browser::{PageDriver, SessionProvider};
use crate::clock::Clock;
use crate::config::{Config, Selectors, Timing};
use crate::error::Result;
use crate::schedule::parse_schedule_text;
use crate::store::MatchRegistry;
use crate::types::{Match, Schedule};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DiscoveryStats {
    pub cards_visited: usize,
    pub recorded: usize,
    pub failed_cards: usize,
    pub unknown_schedule: usize,
    /// Rows actually appended to the registry (new URLs only).
    pub added: usize,
}

/// One pass over the listing page, feeding the registry.
#[async_trait]
pub trait Discovery: Send + Sync {
    async fn run_pass(&self) -> Result<DiscoveryStats>;
}

/// Walks the basketball listing card by card, opening each card to learn
/// its canonical URL.
pub struct DiscoveryWorker<P: SessionProvider> {
    provider: P,
    registry: MatchRegistry,
    clock: Arc<dyn Clock>,
    listing_url: String,
    selectors: Selectors,
    timing: Timing,
}

impl<P: SessionProvider> DiscoveryWorker<P> {
    pub fn new(cfg: &Config, provider: P, registry: MatchRegistry, clock: Arc<dyn Clock>) -> Self {
        Self {
            provider,
            registry,
            clock,
            listing_url: cfg.listing_url.clone(),
            selectors: cfg.selectors.clone(),
            timing: cfg.timing.clone(),
        }
    }

    /// Cards are addressed by position and the list is re-queried on every
    /// step: each visit navigates away, and cards come and go between visits.
    async fn collect(&self, page: &mut P::Page) -> Result<(Vec<Match>, DiscoveryStats)> {
        info!("Opening {}", self.listing_url);
        self.open_listing(page).await?;
        info!("Start parsing match cards");

        let mut matches = Vec::new();
        let mut stats = DiscoveryStats::default();
        let mut index = 0usize;

        loop {
            let available = match page.count(&self.selectors.match_card).await {
                Ok(n) => n,
                Err(e) => {
                    warn!(card = index + 1, "Could not list match cards, ending pass: {e}");
                    break;
                }
            };
            if index >= available {
                break;
            }
            stats.cards_visited += 1;

            match self.visit_card(page, index).await {
                Ok(m) => {
                    if m.schedule.start().is_none() {
                        stats.unknown_schedule += 1;
                    }
                    info!(
                        card = index + 1,
                        "[{}] {} | {} | {} | status: {}",
                        index + 1,
                        m.title,
                        m.schedule,
                        m.url,
                        m.status
                    );
                    matches.push(m);
                    stats.recorded += 1;

                    if let Err(e) = self.back_to_listing(page).await {
                        warn!(card = index + 1, "Return to listing failed: {e}");
                        self.reopen_listing(page, index).await;
                    }
                }
                Err(e) => {
                    stats.failed_cards += 1;
                    warn!(card = index + 1, "[{}] Error while parsing card: {e}", index + 1);
                    self.reopen_listing(page, index).await;
                }
            }

            index += 1;
        }

        Ok((matches, stats))
    }

    async fn visit_card(&self, page: &mut P::Page, index: usize) -> Result<Match> {
        let card = &self.selectors.match_card;

        let teams = page.child_texts(card, index, &self.selectors.card_teams).await?;
        let title = if teams.is_empty() {
            "unknown".to_string()
        } else {
            teams.iter().map(|t| t.trim()).collect::<Vec<_>>().join(" vs ")
        };

        let raw_schedule = page
            .child_texts(card, index, &self.selectors.card_time)
            .await?
            .into_iter()
            .next()
            .unwrap_or_else(|| Schedule::UNKNOWN.to_string());
        let schedule = parse_schedule_text(&raw_schedule, self.clock.now());
        debug!(card = index + 1, raw = %raw_schedule, parsed = %schedule, "Card schedule");

        page.scroll_into_view(card, index).await?;
        self.clock.sleep(self.timing.scroll_settle).await;
        page.click(card, index).await?;
        page.wait_for(&self.selectors.page_header, self.timing.detail_timeout)
            .await?;
        self.clock.sleep(self.timing.detail_settle).await;

        let url = page.current_url().await?;
        Ok(Match::discovered(title, url, schedule))
    }

    async fn open_listing(&self, page: &mut P::Page) -> Result<()> {
        page.goto(&self.listing_url).await?;
        self.enter_category(page).await
    }

    async fn back_to_listing(&self, page: &mut P::Page) -> Result<()> {
        page.go_back().await?;
        self.enter_category(page).await
    }

    /// Best effort; if this fails too the next card count comes back empty
    /// and the pass ends.
    async fn reopen_listing(&self, page: &mut P::Page, index: usize) {
        if let Err(e) = self.open_listing(page).await {
            warn!(card = index + 1, "Could not reopen listing: {e}");
        }
    }

    async fn enter_category(&self, page: &mut P::Page) -> Result<()> {
        page.wait_for(&self.selectors.category_button, self.timing.listing_timeout)
            .await?;
        page.click(&self.selectors.category_button, 0).await?;
        page.wait_for(&self.selectors.match_card, self.timing.listing_timeout)
            .await?;
        self.clock.sleep(self.timing.cards_settle).await;
        Ok(())
    }
}

#[async_trait]
impl<P: SessionProvider> Discovery for DiscoveryWorker<P> {
    /// A listing that never renders aborts the pass before the registry is touched.
    async fn run_pass(&self) -> Result<DiscoveryStats> {
        let mut page = self.provider.open().await?;
        let collected = self.collect(&mut page).await;
        if let Err(e) = page.close().await {
            warn!("Closing discovery session failed: {e}");
        }

        let (matches, mut stats) = collected?;
        stats.added = self.registry.append_new(&matches)?;
        info!(
            visited = stats.cards_visited,
            recorded = stats.recorded,
            failed = stats.failed_cards,
            unknown_schedule = stats.unknown_schedule,
            added = stats.added,
            "Discovery pass complete",
        );
        Ok(stats)
    }
}
