use fxhash::FxHashSet;
use scraper::{ElementRef, Selector};
use tracing::debug;

use crate::error::ScrapeError;

use super::fields::parse_selector;


/// One way of finding job cards on a listing page.
#[derive(Debug, Clone, Copy)]
pub(crate) enum CardStrategy {
    /// Elements carrying the marketplace's own job card marker.
    Marker(&'static str),
    /// Generic tiles inside the list container. Falls back to the whole scope if there is no container.
    UnderContainer {
        container: &'static str,
        tiles: &'static str
    },
    /// The nearest `containers` ancestor of every link to a job detail page.
    AnchorAncestor {
        anchor: &'static str,
        containers: &'static [&'static str]
    }
}


enum Tier {
    Marker(Selector),
    UnderContainer {
        container: Selector,
        tiles: Selector
    },
    AnchorAncestor {
        anchor: Selector,
        containers: &'static [&'static str]
    }
}


impl Tier {
    fn find<'a>(&self, scope: ElementRef<'a>) -> Vec<ElementRef<'a>> {
        match self {
            Self::Marker(marker) => scope.select(marker).collect(),
            Self::UnderContainer { container, tiles } => scope
                .select(container)
                .next()
                .unwrap_or(scope)
                .select(tiles)
                .collect(),
            Self::AnchorAncestor { anchor, containers } => {
                let mut seen = FxHashSet::default();
                scope
                    .select(anchor)
                    .filter_map(|link| {
                        link.ancestors()
                            .filter_map(ElementRef::wrap)
                            .find(|el| containers.contains(&el.value().name()))
                    })
                    .filter(|card| seen.insert(card.id()))
                    .collect()
            }
        }
    }
}


/// Finds job cards by trying each tier once, in order. The first tier that finds anything wins.
pub(crate) struct CardLocator {
    tiers: Vec<Tier>
}


impl CardLocator {
    pub(crate) fn compile(strategies: &[CardStrategy]) -> Result<Self, ScrapeError> {
        let tiers = strategies
            .iter()
            .map(|strategy| -> Result<Tier, ScrapeError> {
                Ok(match *strategy {
                    CardStrategy::Marker(marker) => Tier::Marker(parse_selector(marker)?),
                    CardStrategy::UnderContainer { container, tiles } => Tier::UnderContainer {
                        container: parse_selector(container)?,
                        tiles: parse_selector(tiles)?
                    },
                    CardStrategy::AnchorAncestor { anchor, containers } => Tier::AnchorAncestor {
                        anchor: parse_selector(anchor)?,
                        containers
                    }
                })
            })
            .collect::<Result<_, _>>()?;
        Ok(Self { tiers })
    }

    /// Returns the cards in document order. A page without cards yields an empty list.
    pub(crate) fn locate<'a>(&self, scope: ElementRef<'a>) -> Vec<ElementRef<'a>> {
        for (tier, strategy) in self.tiers.iter().enumerate() {
            let cards = strategy.find(scope);
            if !cards.is_empty() {
                debug!(tier = tier + 1, count = cards.len(), "located job cards");
                return cards;
            }
        }
        debug!("no job cards on this page");
        Vec::new()
    }
}
